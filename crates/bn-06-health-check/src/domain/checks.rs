//! # Check Evaluation
//!
//! Pure functions from observed data to a [`CheckResult`]. The service
//! gathers the data; nothing here does I/O.

use shared_types::{
    Amount, Bundle, CctpMessage, ChainId, ChainWatermark, RouteKey, TransferId, TransferRecord,
    TransferState,
};

use super::report::{CheckItem, CheckName, CheckResult};

/// Time bounds of one audit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditWindow {
    pub now: u64,
    /// Entities older than this are out of scope.
    pub start: u64,
}

impl AuditWindow {
    pub fn new(now: u64, window_secs: u64) -> Self {
        Self {
            now,
            start: now.saturating_sub(window_secs),
        }
    }

    /// `at` lies in the window and is older than `grace`.
    pub fn overdue(&self, at: u64, grace: u64) -> bool {
        at >= self.start && self.now.saturating_sub(at) > grace
    }

    fn age(&self, at: u64) -> u64 {
        self.now.saturating_sub(at)
    }
}

/// Outcome of a per-entity read; `Err` holds the rendered failure.
pub type Reading<T> = Result<T, String>;

pub fn is_unbonded(record: &TransferRecord, window: &AuditWindow, grace: u64) -> bool {
    record.state == TransferState::Sent
        && record.unbondable.is_none()
        && window.overdue(record.transfer.sent_at, grace)
}

pub fn unbonded_transfers(
    records: &[TransferRecord],
    window: &AuditWindow,
    grace: u64,
) -> CheckResult {
    let items = records
        .iter()
        .filter(|r| is_unbonded(r, window, grace))
        .map(|r| {
            CheckItem::new(
                r.id(),
                format!(
                    "{} {} to chain {}, sent {}s ago",
                    r.transfer.amount,
                    r.transfer.token,
                    r.transfer.destination_chain,
                    window.age(r.transfer.sent_at)
                ),
            )
        })
        .collect();
    CheckResult::from_items(CheckName::UnbondedTransfers, items)
}

pub fn is_unsettled(bundle: &Bundle, window: &AuditWindow, grace: u64) -> bool {
    !bundle.is_settled() && window.overdue(bundle.committed_at, grace)
}

pub fn unsettled_bundles(bundles: &[Bundle], window: &AuditWindow, grace: u64) -> CheckResult {
    let items = bundles
        .iter()
        .filter(|b| is_unsettled(b, window, grace))
        .map(|b| {
            CheckItem::new(
                b.bundle_id,
                format!(
                    "{} transfers, {} {} to chain {}, committed {}s ago",
                    b.members.len(),
                    b.total_amount,
                    b.token,
                    b.destination_chain,
                    window.age(b.committed_at)
                ),
            )
        })
        .collect();
    CheckResult::from_items(CheckName::UnsettledBundles, items)
}

pub fn is_unrelayed(message: &CctpMessage, window: &AuditWindow, grace: u64) -> bool {
    !message.is_relayed() && window.overdue(message.observed_at, grace)
}

pub fn unrelayed_messages(
    messages: &[CctpMessage],
    window: &AuditWindow,
    grace: u64,
) -> CheckResult {
    let items = messages
        .iter()
        .filter(|m| is_unrelayed(m, window, grace))
        .map(|m| {
            CheckItem::new(
                m.message_hash,
                format!(
                    "nonce {} from chain {} to chain {}, observed {}s ago",
                    m.nonce,
                    m.source_chain,
                    m.destination_chain,
                    window.age(m.observed_at)
                ),
            )
        })
        .collect();
    CheckResult::from_items(CheckName::UnrelayedMessages, items)
}

/// A bond that does not match its transfer: wrong amount, or made after
/// the transfer's deadline.
pub fn is_invalid_bond(record: &TransferRecord) -> Option<String> {
    let bond = record.bond.as_ref()?;
    let transfer = &record.transfer;
    if bond.amount != transfer.amount {
        return Some(format!(
            "bonded {} by {} in {}, transfer amount {}",
            bond.amount, bond.bonder, bond.tx_hash, transfer.amount
        ));
    }
    if transfer.deadline != 0 && bond.bonded_at > transfer.deadline {
        return Some(format!(
            "bonded at {} by {} in {}, after deadline {}",
            bond.bonded_at, bond.bonder, bond.tx_hash, transfer.deadline
        ));
    }
    None
}

pub fn invalid_bond_withdrawals(records: &[TransferRecord]) -> CheckResult {
    let items = records
        .iter()
        .filter_map(|r| is_invalid_bond(r).map(|detail| CheckItem::new(r.id(), detail)))
        .collect();
    CheckResult::from_items(CheckName::InvalidBondWithdrawals, items)
}

/// Bonded, but no bundle carrying the transfer has been committed.
pub fn is_uncommitted_bond(record: &TransferRecord, window: &AuditWindow, grace: u64) -> bool {
    record.state == TransferState::Bonded
        && record
            .bond
            .as_ref()
            .is_some_and(|b| window.overdue(b.bonded_at, grace))
}

pub fn uncommitted_bonds(records: &[TransferRecord], window: &AuditWindow, grace: u64) -> CheckResult {
    let items = records
        .iter()
        .filter(|r| is_uncommitted_bond(r, window, grace))
        .filter_map(|r| {
            let bond = r.bond.as_ref()?;
            Some(CheckItem::new(
                r.id(),
                format!(
                    "{} {} to chain {}, bonded {}s ago, no bundle committed",
                    bond.amount,
                    r.transfer.token,
                    r.transfer.destination_chain,
                    window.age(bond.bonded_at)
                ),
            ))
        })
        .collect();
    CheckResult::from_items(CheckName::UncommittedBonds, items)
}

/// Bundle members the store never saw a `TransferSent` for. A bundle is
/// given `grace` for its members' events to arrive.
pub fn missed_events<F>(bundles: &[Bundle], window: &AuditWindow, grace: u64, known: F) -> CheckResult
where
    F: Fn(&TransferId) -> bool,
{
    let known = &known;
    let items = bundles
        .iter()
        .filter(|b| window.overdue(b.committed_at, grace))
        .flat_map(|b| {
            b.members
                .iter()
                .filter(move |id| !known(*id))
                .map(move |id| {
                    CheckItem::new(
                        id,
                        format!(
                            "member of bundle {} on chain {}, no transfer event seen",
                            b.bundle_id, b.source_chain
                        ),
                    )
                })
        })
        .collect();
    CheckResult::from_items(CheckName::MissedEvents, items)
}

/// `(chain, floor, balance)` per configured chain.
pub fn low_bonder_balance(readings: &[(ChainId, Amount, Reading<Amount>)]) -> CheckResult {
    let items = readings
        .iter()
        .filter_map(|(chain, floor, balance)| match balance {
            Ok(balance) if balance < floor => Some(CheckItem::new(
                chain,
                format!("balance {balance} below floor {floor}"),
            )),
            Ok(_) => None,
            Err(e) => Some(CheckItem::new(chain, format!("balance query failed: {e}"))),
        })
        .collect();
    CheckResult::from_items(CheckName::LowBonderBalance, items)
}

/// `(route, floor, available)` per configured route.
pub fn low_available_liquidity(readings: &[(RouteKey, Amount, Reading<Amount>)]) -> CheckResult {
    let items = readings
        .iter()
        .filter_map(|(route, floor, available)| match available {
            Ok(available) if available < floor => Some(CheckItem::new(
                route,
                format!("available {available} below floor {floor}"),
            )),
            Ok(_) => None,
            Err(e) => Some(CheckItem::new(route, format!("liquidity query failed: {e}"))),
        })
        .collect();
    CheckResult::from_items(CheckName::LowAvailableLiquidity, items)
}

/// `(watermark, max_lag, head)` per watcher.
pub fn unsynced_data_sources(readings: &[(ChainWatermark, u64, Reading<u64>)]) -> CheckResult {
    let items = readings
        .iter()
        .filter_map(|(watermark, max_lag, head)| match head {
            Ok(head) => {
                let lag = head.saturating_sub(watermark.block_number);
                (lag > *max_lag).then(|| {
                    CheckItem::new(
                        watermark.key,
                        format!(
                            "synced to {} of {head}, {lag} blocks behind",
                            watermark.block_number
                        ),
                    )
                })
            }
            Err(e) => Some(CheckItem::new(watermark.key, format!("head query failed: {e}"))),
        })
        .collect();
    CheckResult::from_items(CheckName::UnsyncedDataSources, items)
}
