//! # Liquidity Tracker
//!
//! Bonder capital committed per route, in two buckets:
//!
//! - **reserved**: held for a bond that is being submitted;
//! - **bonded**: paid out on the destination chain, waiting for the bundle
//!   that reimburses it to settle.
//!
//! `available = credit - (reserved + bonded)`, saturating at zero. A
//! reservation succeeds only when `available >= amount + fee_margin` and
//! `available - amount >= floor`, checked and recorded under one lock.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared_types::{Amount, RouteKey, TransferId};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("insufficient liquidity on {route}: available {available}, required {required}")]
pub struct InsufficientLiquidity {
    pub route: RouteKey,
    pub available: Amount,
    pub required: Amount,
}

/// Reservation request for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveRequest {
    pub route: RouteKey,
    pub transfer_id: TransferId,
    pub amount: Amount,
    /// Bonder credit on the destination chain, freshly read.
    pub credit: Amount,
    pub fee_margin: Amount,
    pub floor: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Reserved,
    Bonded,
}

#[derive(Debug, Clone)]
struct Commitment {
    route: RouteKey,
    amount: Amount,
    bucket: Bucket,
}

/// Per-route totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteLiquidity {
    pub reserved: Amount,
    pub bonded: Amount,
}

impl RouteLiquidity {
    pub fn outstanding(&self) -> Amount {
        self.reserved.saturating_add(self.bonded)
    }
}

#[derive(Debug, Default)]
struct Inner {
    commitments: HashMap<TransferId, Commitment>,
    routes: HashMap<RouteKey, RouteLiquidity>,
}

impl Inner {
    fn add(&mut self, id: TransferId, commitment: Commitment) {
        let totals = self.routes.entry(commitment.route.clone()).or_default();
        match commitment.bucket {
            Bucket::Reserved => totals.reserved = totals.reserved.saturating_add(commitment.amount),
            Bucket::Bonded => totals.bonded = totals.bonded.saturating_add(commitment.amount),
        }
        self.commitments.insert(id, commitment);
    }

    fn remove(&mut self, id: &TransferId) -> Option<Commitment> {
        let commitment = self.commitments.remove(id)?;
        if let Some(totals) = self.routes.get_mut(&commitment.route) {
            match commitment.bucket {
                Bucket::Reserved => {
                    totals.reserved = totals.reserved.saturating_sub(commitment.amount)
                }
                Bucket::Bonded => totals.bonded = totals.bonded.saturating_sub(commitment.amount),
            }
        }
        Some(commitment)
    }
}

#[derive(Debug, Default)]
pub struct LiquidityTracker {
    inner: Mutex<Inner>,
}

impl LiquidityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outstanding(&self, route: &RouteKey) -> Amount {
        self.inner
            .lock()
            .routes
            .get(route)
            .map(RouteLiquidity::outstanding)
            .unwrap_or_default()
    }

    pub fn available(&self, route: &RouteKey, credit: Amount) -> Amount {
        credit.saturating_sub(self.outstanding(route))
    }

    /// Reserve `amount` for a transfer. Reserving a transfer that already
    /// holds a commitment is a no-op.
    pub fn try_reserve(&self, request: &ReserveRequest) -> Result<Amount, InsufficientLiquidity> {
        let mut inner = self.inner.lock();
        let outstanding = inner
            .routes
            .get(&request.route)
            .map(RouteLiquidity::outstanding)
            .unwrap_or_default();
        let available = request.credit.saturating_sub(outstanding);

        if inner.commitments.contains_key(&request.transfer_id) {
            return Ok(available);
        }

        let required = request.amount.saturating_add(request.fee_margin);
        let remaining = available.checked_sub(request.amount);
        let enough = available >= required && remaining.is_some_and(|r| r >= request.floor);
        if !enough {
            return Err(InsufficientLiquidity {
                route: request.route.clone(),
                available,
                required: required.max(request.amount.saturating_add(request.floor)),
            });
        }

        inner.add(
            request.transfer_id,
            Commitment {
                route: request.route.clone(),
                amount: request.amount,
                bucket: Bucket::Reserved,
            },
        );
        Ok(available - request.amount)
    }

    /// Drop a reservation that did not become a bond.
    pub fn release(&self, transfer_id: &TransferId) -> Option<Amount> {
        let mut inner = self.inner.lock();
        match inner.commitments.get(transfer_id) {
            Some(c) if c.bucket == Bucket::Reserved => inner.remove(transfer_id).map(|c| c.amount),
            _ => None,
        }
    }

    /// Move a reservation into the bonded bucket.
    pub fn mark_bonded(&self, transfer_id: &TransferId) -> bool {
        let mut inner = self.inner.lock();
        match inner.remove(transfer_id) {
            Some(mut commitment) => {
                commitment.bucket = Bucket::Bonded;
                inner.add(*transfer_id, commitment);
                true
            }
            None => false,
        }
    }

    /// Record an existing bond, e.g. when rebuilding from the store at
    /// startup. A transfer already tracked is left alone.
    pub fn restore_bonded(&self, route: RouteKey, transfer_id: TransferId, amount: Amount) -> bool {
        let mut inner = self.inner.lock();
        if inner.commitments.contains_key(&transfer_id) {
            return false;
        }
        inner.add(
            transfer_id,
            Commitment {
                route,
                amount,
                bucket: Bucket::Bonded,
            },
        );
        true
    }

    /// Release a bonded transfer whose bundle settled. Returns the amount
    /// the first time only.
    pub fn settle(&self, transfer_id: &TransferId) -> Option<Amount> {
        let mut inner = self.inner.lock();
        match inner.commitments.get(transfer_id) {
            Some(c) if c.bucket == Bucket::Bonded => inner.remove(transfer_id).map(|c| c.amount),
            _ => None,
        }
    }

    /// A bond for the transfer is being submitted.
    pub fn is_reserved(&self, transfer_id: &TransferId) -> bool {
        self.bucket_of(transfer_id) == Some(Bucket::Reserved)
    }

    pub fn is_bonded(&self, transfer_id: &TransferId) -> bool {
        self.bucket_of(transfer_id) == Some(Bucket::Bonded)
    }

    fn bucket_of(&self, transfer_id: &TransferId) -> Option<Bucket> {
        self.inner.lock().commitments.get(transfer_id).map(|c| c.bucket)
    }

    pub fn snapshot(&self) -> HashMap<RouteKey, RouteLiquidity> {
        self.inner.lock().routes.clone()
    }
}
