//! # Settlement Flow
//!
//! A bundle committed before its members are bonded waits in reconciliation
//! until every member is accounted for, or is escalated as an incomplete
//! settlement once its deadline passes.

#[cfg(test)]
mod tests {
    use bn_02_transfer_store::TransferStateApi;
    use bn_03_bonding_engine::{BondDecision, BondingApi};
    use bn_04_settlement::{ReconcileStatus, SettlementApi};
    use shared_bus::TransitionTopic;
    use shared_types::{RouteKey, TimeSource, TransferState};

    use crate::fixtures::*;

    const TIMEOUT: u64 = 3_600;

    fn feeds(node: &Node) -> Vec<shared_bus::Subscription> {
        vec![
            node.bus.subscribe(TransitionTopic::Transfers),
            node.bus.subscribe(TransitionTopic::Bundles),
        ]
    }

    async fn bond(engine: &bn_03_bonding_engine::BondingDecisionEngine, t: &shared_types::Transfer) {
        let decision = engine.on_transfer_sent(t.clone()).await.unwrap();
        assert!(matches!(decision, BondDecision::Bonded { .. }), "got {decision}");
    }

    #[tokio::test]
    async fn test_bundle_before_bonds_reconciles_once_members_bond() {
        let node = Node::new(1_000);
        let engine = node.engine(route());
        let coordinator = node.coordinator(TIMEOUT);
        let mut feeds = feeds(&node);

        let a = transfer(1, 100, 1);
        let b = transfer(2, 100, 1);
        node.apply(transfer_sent(&a));
        node.apply(transfer_sent(&b));
        let bundle = bundle(&[&a, &b], NOW);
        node.apply(bundle_committed(&bundle));
        pump(&mut feeds, &coordinator);

        let pending = coordinator.reconciliation(&bundle.bundle_id).unwrap();
        assert_eq!(pending.status, ReconcileStatus::Pending { deadline: NOW + TIMEOUT });
        assert_eq!(pending.missing.len(), 2);

        bond(&engine, &a).await;
        pump(&mut feeds, &coordinator);
        assert_eq!(coordinator.reconciliation(&bundle.bundle_id).unwrap().missing.len(), 1);

        bond(&engine, &b).await;
        pump(&mut feeds, &coordinator);
        let reconciled = coordinator.reconciliation(&bundle.bundle_id).unwrap();
        assert_eq!(reconciled.status, ReconcileStatus::Reconciled);
        assert!(reconciled.missing.is_empty());

        // Bonded after the commit, so both records move straight to RootCommitted.
        for t in [&a, &b] {
            assert_eq!(node.store.get(&t.transfer_id).unwrap().state, TransferState::RootCommitted);
        }
        node.time.advance(TIMEOUT + 1);
        assert!(coordinator.tick(node.time.now()).is_empty());
        assert!(coordinator.incomplete_settlements().is_empty());
    }

    #[tokio::test]
    async fn test_unbonded_member_past_deadline_is_incomplete() {
        let node = Node::new(1_000);
        let engine = node.engine(route());
        let coordinator = node.coordinator(TIMEOUT);
        let mut feeds = feeds(&node);

        let a = transfer(1, 100, 1);
        let b = transfer(2, 100, 1);
        node.apply(transfer_sent(&a));
        node.apply(transfer_sent(&b));
        let bundle = bundle(&[&a, &b], NOW);
        node.apply(bundle_committed(&bundle));
        bond(&engine, &a).await;
        pump(&mut feeds, &coordinator);

        node.time.advance(TIMEOUT - 1);
        assert!(coordinator.tick(node.time.now()).is_empty());

        node.time.advance(2);
        let escalated = coordinator.tick(node.time.now());
        assert_eq!(escalated.len(), 1);
        assert_eq!(escalated[0].bundle_id, bundle.bundle_id);
        assert_eq!(escalated[0].missing, vec![b.transfer_id]);
        assert_eq!(escalated[0].deadline, NOW + TIMEOUT);

        // Reported once, and still listed until it recovers.
        assert!(coordinator.tick(node.time.now()).is_empty());
        assert_eq!(coordinator.incomplete_settlements().len(), 1);

        bond(&engine, &b).await;
        pump(&mut feeds, &coordinator);
        assert!(coordinator.incomplete_settlements().is_empty());
        assert_eq!(
            coordinator.reconciliation(&bundle.bundle_id).unwrap().status,
            ReconcileStatus::Reconciled
        );
    }

    #[tokio::test]
    async fn test_settled_bundle_releases_bonded_liquidity() {
        let node = Node::new(1_000);
        let engine = node.engine(route());
        let coordinator = node.coordinator(TIMEOUT);
        let mut feeds = feeds(&node);
        let key = RouteKey::new(usdc(), DESTINATION);

        let a = transfer(1, 100, 1);
        let b = transfer(2, 250, 1);
        node.apply(transfer_sent(&a));
        node.apply(transfer_sent(&b));
        bond(&engine, &a).await;
        bond(&engine, &b).await;
        assert_eq!(engine.outstanding(&key), units(350));

        let bundle = bundle(&[&a, &b], NOW);
        node.apply(bundle_committed(&bundle));
        node.apply(bundle_settled(&bundle, NOW + 600));
        pump(&mut feeds, &coordinator);

        assert!(engine.outstanding(&key).is_zero());
        for t in [&a, &b] {
            let record = node.store.get(&t.transfer_id).unwrap();
            assert_eq!(record.state, TransferState::Settled);
            assert_eq!(
                record.history,
                vec![
                    TransferState::Sent,
                    TransferState::Bonded,
                    TransferState::RootCommitted,
                    TransferState::Settled
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_unbondable_member_settles_without_bond() {
        let node = Node::new(1_000);
        let engine = node.engine(route());
        let coordinator = node.coordinator(TIMEOUT);
        let mut feeds = feeds(&node);

        let a = transfer(1, 100, 1);
        let b = transfer(2, 100, 1);
        node.apply(transfer_sent(&a));
        node.apply(transfer_sent(&b));
        bond(&engine, &a).await;
        node.store
            .mark_unbondable(b.transfer_id, "bonded by another node".into())
            .unwrap();

        let bundle = bundle(&[&a, &b], NOW);
        node.apply(bundle_committed(&bundle));
        node.apply(bundle_settled(&bundle, NOW + 600));
        pump(&mut feeds, &coordinator);

        let settled = node.store.get(&b.transfer_id).unwrap();
        assert_eq!(settled.state, TransferState::Settled);
        assert!(settled.settled_without_bond());
        assert!(coordinator.incomplete_settlements().is_empty());
    }
}
