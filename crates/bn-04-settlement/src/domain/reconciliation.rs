//! # Reconciliation Book
//!
//! Per-bundle accounting of which members are still waiting for a bond.
//! A member is *accounted* once it is bonded or marked unbondable. Pure:
//! callers pass the accounting predicate and the current time.
//!
//! ```text
//!            register / settled
//!                  │
//!       missing ≠ ∅│            missing = ∅
//!   Pending ───────┼────────────────────────► Reconciled
//!      │ now > deadline                          ▲
//!      ▼                                         │ last member accounted
//!   Incomplete ──────────────────────────────────┘
//! ```
//!
//! A settled bundle with nothing missing leaves the book. Escalations are
//! remembered across [`ReconciliationBook::clear`], so a rebuilt bundle that
//! is still missing members comes back `Incomplete` instead of `Pending`.

use serde::{Deserialize, Serialize};
use shared_types::{Bundle, BundleId, RouteKey, TransferId};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BundlePhase {
    Committed,
    Settled,
}

impl BundlePhase {
    pub fn name(&self) -> &'static str {
        match self {
            BundlePhase::Committed => "committed",
            BundlePhase::Settled => "settled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileStatus {
    Pending { deadline: u64 },
    Reconciled,
    Incomplete { deadline: u64, escalated_at: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub bundle_id: BundleId,
    pub route: RouteKey,
    pub phase: BundlePhase,
    pub members: Vec<TransferId>,
    pub missing: BTreeSet<TransferId>,
    pub status: ReconcileStatus,
}

/// A bundle whose members did not all bond before the deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompleteSettlement {
    pub bundle_id: BundleId,
    pub route: RouteKey,
    pub phase: BundlePhase,
    pub missing: Vec<TransferId>,
    pub deadline: u64,
    pub escalated_at: u64,
}

/// Effect of accounting one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberProgress {
    pub bundle_id: BundleId,
    pub phase: BundlePhase,
    pub status: ReconcileStatus,
    /// The bundle had been escalated and is now reconciled.
    pub recovered: bool,
}

#[derive(Debug, Clone)]
pub struct ReconciliationBook {
    timeout_secs: u64,
    entries: HashMap<BundleId, Reconciliation>,
    /// Missing member -> bundle waiting on it.
    waiting: HashMap<TransferId, BundleId>,
    /// Bundle -> time it was escalated.
    escalated: HashMap<BundleId, u64>,
}

impl ReconciliationBook {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout_secs,
            entries: HashMap::new(),
            waiting: HashMap::new(),
            escalated: HashMap::new(),
        }
    }

    /// Track a committed bundle. Registering a known bundle changes nothing.
    pub fn register<F>(&mut self, bundle: &Bundle, accounted: F) -> ReconcileStatus
    where
        F: Fn(&TransferId) -> bool,
    {
        if let Some(existing) = self.entries.get(&bundle.bundle_id) {
            return existing.status;
        }
        let deadline = bundle.committed_at.saturating_add(self.timeout_secs);
        self.insert(bundle, BundlePhase::Committed, deadline, accounted)
    }

    /// Record that a bundle settled on chain. Members still unaccounted stay
    /// pending under the existing deadline, or `now + timeout` for a bundle
    /// not seen before.
    pub fn settled<F>(&mut self, bundle: &Bundle, accounted: F, now: u64) -> ReconcileStatus
    where
        F: Fn(&TransferId) -> bool,
    {
        let status = match self.entries.get_mut(&bundle.bundle_id) {
            Some(entry) => {
                entry.phase = BundlePhase::Settled;
                let now_accounted: Vec<TransferId> =
                    entry.missing.iter().copied().filter(|id| accounted(id)).collect();
                for id in &now_accounted {
                    entry.missing.remove(id);
                    self.waiting.remove(id);
                }
                if entry.missing.is_empty() {
                    entry.status = ReconcileStatus::Reconciled;
                }
                entry.status
            }
            None => {
                let deadline = now.saturating_add(self.timeout_secs);
                self.insert(bundle, BundlePhase::Settled, deadline, accounted)
            }
        };
        if status == ReconcileStatus::Reconciled {
            self.entries.remove(&bundle.bundle_id);
            self.escalated.remove(&bundle.bundle_id);
        }
        status
    }

    fn insert<F>(
        &mut self,
        bundle: &Bundle,
        phase: BundlePhase,
        deadline: u64,
        accounted: F,
    ) -> ReconcileStatus
    where
        F: Fn(&TransferId) -> bool,
    {
        let missing: BTreeSet<TransferId> = bundle
            .members
            .iter()
            .copied()
            .filter(|id| !accounted(id))
            .collect();
        let status = match self.escalated.get(&bundle.bundle_id) {
            _ if missing.is_empty() => ReconcileStatus::Reconciled,
            Some(&escalated_at) => ReconcileStatus::Incomplete {
                deadline,
                escalated_at,
            },
            None => ReconcileStatus::Pending { deadline },
        };
        if status == ReconcileStatus::Reconciled {
            self.escalated.remove(&bundle.bundle_id);
        }
        for id in &missing {
            self.waiting.insert(*id, bundle.bundle_id);
        }
        self.entries.insert(
            bundle.bundle_id,
            Reconciliation {
                bundle_id: bundle.bundle_id,
                route: RouteKey::new(bundle.token.clone(), bundle.destination_chain),
                phase,
                members: bundle.members.clone(),
                missing,
                status,
            },
        );
        status
    }

    /// A member bonded or was marked unbondable.
    pub fn accounted(&mut self, transfer_id: &TransferId) -> Option<MemberProgress> {
        let bundle_id = self.waiting.remove(transfer_id)?;
        let entry = self.entries.get_mut(&bundle_id)?;
        entry.missing.remove(transfer_id);

        let was_incomplete = matches!(entry.status, ReconcileStatus::Incomplete { .. });
        if entry.missing.is_empty() {
            entry.status = ReconcileStatus::Reconciled;
            self.escalated.remove(&bundle_id);
        }
        let progress = MemberProgress {
            bundle_id,
            phase: entry.phase,
            status: entry.status,
            recovered: was_incomplete && entry.status == ReconcileStatus::Reconciled,
        };
        if progress.status == ReconcileStatus::Reconciled && progress.phase == BundlePhase::Settled {
            self.entries.remove(&bundle_id);
        }
        Some(progress)
    }

    /// Escalate pending bundles whose deadline has passed. Each bundle is
    /// returned once.
    pub fn expire(&mut self, now: u64) -> Vec<IncompleteSettlement> {
        let mut escalated = Vec::new();
        for entry in self.entries.values_mut() {
            if let ReconcileStatus::Pending { deadline } = entry.status {
                if now > deadline {
                    entry.status = ReconcileStatus::Incomplete {
                        deadline,
                        escalated_at: now,
                    };
                    self.escalated.insert(entry.bundle_id, now);
                    escalated.extend(incomplete_of(entry));
                }
            }
        }
        escalated.sort_by_key(|i| i.deadline);
        escalated
    }

    pub fn incomplete(&self) -> Vec<IncompleteSettlement> {
        let mut all: Vec<_> = self.entries.values().filter_map(incomplete_of).collect();
        all.sort_by_key(|i| i.deadline);
        all
    }

    /// Bundles still waiting on at least one member.
    pub fn waiting_count(&self) -> usize {
        self.entries.values().filter(|e| !e.missing.is_empty()).count()
    }

    /// Committed bundles with every member accounted.
    pub fn reconciled_committed(&self) -> Vec<BundleId> {
        self.entries
            .values()
            .filter(|e| e.phase == BundlePhase::Committed && e.status == ReconcileStatus::Reconciled)
            .map(|e| e.bundle_id)
            .collect()
    }

    pub fn get(&self, bundle_id: &BundleId) -> Option<&Reconciliation> {
        self.entries.get(bundle_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &Reconciliation> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry. Escalations are kept until
    /// [`forget_untracked_escalations`](Self::forget_untracked_escalations).
    pub fn clear(&mut self) {
        self.entries.clear();
        self.waiting.clear();
    }

    /// Drop escalations of bundles no longer in the book.
    pub fn forget_untracked_escalations(&mut self) {
        let entries = &self.entries;
        self.escalated.retain(|bundle_id, _| entries.contains_key(bundle_id));
    }
}

fn incomplete_of(entry: &Reconciliation) -> Option<IncompleteSettlement> {
    match entry.status {
        ReconcileStatus::Incomplete {
            deadline,
            escalated_at,
        } => Some(IncompleteSettlement {
            bundle_id: entry.bundle_id,
            route: entry.route.clone(),
            phase: entry.phase,
            missing: entry.missing.iter().copied().collect(),
            deadline,
            escalated_at,
        }),
        _ => None,
    }
}
