//! # Bonding Flow
//!
//! A `TransferSent` in the store reaches the bonding engine, which checks
//! liquidity against the bonder's on-chain credit and records the bond
//! back into the store.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bn_02_transfer_store::TransferStateApi;
    use bn_03_bonding_engine::{BondDecision, BondingApi, SkipReason};
    use shared_bus::{StoreTransition, TransitionTopic};
    use shared_types::{ContractCall, RouteKey, TransferState};
    use tokio::sync::watch;
    use tokio::time::timeout;

    use crate::fixtures::*;

    fn floored_route() -> bn_03_bonding_engine::RouteConfig {
        let mut r = route();
        r.liquidity_floor = units(50);
        r
    }

    // =========================================================================
    // LIQUIDITY
    // =========================================================================

    #[tokio::test]
    async fn test_transfer_with_enough_liquidity_is_bonded() {
        let node = Node::new(200);
        let engine = node.engine(floored_route());
        let t = transfer(1, 100, 1);
        node.apply(transfer_sent(&t));

        let decision = engine.on_transfer_sent(t.clone()).await.unwrap();
        let BondDecision::Bonded { tx_hash } = decision else {
            panic!("expected a bond, got {decision}");
        };

        let record = node.store.get(&t.transfer_id).unwrap();
        assert_eq!(record.state, TransferState::Bonded);
        let bond = record.bond.unwrap();
        assert_eq!(bond.tx_hash, tx_hash);
        assert_eq!(bond.bonder, BONDER);
        assert_eq!(bond.amount, units(100));

        let sent = node.submitter.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chain_id, DESTINATION);
        assert_eq!(sent[0].to, BRIDGE);
        assert_eq!(
            sent[0].call,
            ContractCall::BondWithdrawal {
                recipient: t.recipient,
                amount: units(100),
                transfer_nonce: t.nonce,
                bonder_fee: units(1),
            }
        );
        assert_eq!(engine.outstanding(&RouteKey::new(usdc(), DESTINATION)), units(100));
    }

    #[tokio::test]
    async fn test_transfer_without_liquidity_stays_sent() {
        let node = Node::new(50);
        let engine = node.engine(floored_route());
        let t = transfer(1, 100, 1);
        node.apply(transfer_sent(&t));

        assert_eq!(
            engine.on_transfer_sent(t.clone()).await.unwrap(),
            BondDecision::Skip(SkipReason::InsufficientLiquidity)
        );
        let record = node.store.get(&t.transfer_id).unwrap();
        assert_eq!(record.state, TransferState::Sent);
        assert!(record.unbondable.is_none());
        assert_eq!(node.submitter.sends(), 0);
        assert!(engine.outstanding(&RouteKey::new(usdc(), DESTINATION)).is_zero());

        // Liquidity arriving later makes the same transfer bondable.
        node.chain.set_credit(units(200));
        assert!(matches!(
            engine.on_transfer_sent(t).await.unwrap(),
            BondDecision::Bonded { .. }
        ));
    }

    #[tokio::test]
    async fn test_outstanding_bonds_reduce_available_credit() {
        let node = Node::new(200);
        let engine = node.engine(floored_route());
        let first = transfer(1, 100, 1);
        let second = transfer(2, 100, 1);
        node.apply(transfer_sent(&first));
        node.apply(transfer_sent(&second));

        assert!(matches!(
            engine.on_transfer_sent(first).await.unwrap(),
            BondDecision::Bonded { .. }
        ));
        // 200 credit - 100 outstanding leaves 100, and 100 - 100 breaks the floor.
        assert_eq!(
            engine.on_transfer_sent(second).await.unwrap(),
            BondDecision::Skip(SkipReason::InsufficientLiquidity)
        );
        assert_eq!(node.submitter.sends(), 1);
    }

    // =========================================================================
    // RUN LOOP
    // =========================================================================

    #[tokio::test]
    async fn test_run_loop_bonds_observed_transfer() {
        let node = Node::new(1_000);
        let engine = node.engine(route());
        let (stop, rx) = watch::channel(false);
        let handle = tokio::spawn(engine.clone().run(node.bus.subscribe(TransitionTopic::Transfers), rx));
        let mut transfers = node.bus.subscribe(TransitionTopic::Transfers);

        let t = transfer(7, 100, 1);
        node.apply(transfer_sent(&t));

        let advanced = timeout(
            Duration::from_secs(5),
            transfers.next_matching(|tr| matches!(tr, StoreTransition::TransferAdvanced { .. })),
        )
        .await
        .expect("bond within timeout")
        .unwrap();
        assert_eq!(
            advanced,
            StoreTransition::TransferAdvanced {
                transfer_id: t.transfer_id,
                from: TransferState::Sent,
                to: TransferState::Bonded,
            }
        );

        stop.send(true).unwrap();
        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert_eq!(node.submitter.sends(), 1);
    }

    #[tokio::test]
    async fn test_restart_restores_bonded_liquidity() {
        let node = Node::new(1_000);
        let t = transfer(1, 300, 1);
        node.apply(transfer_sent(&t));
        node.engine(route()).on_transfer_sent(t).await.unwrap();

        // A fresh tracker sees nothing until it is rebuilt from the ledger.
        let restarted = Node {
            liquidity: Arc::new(bn_03_bonding_engine::LiquidityTracker::new()),
            ..node
        };
        let engine = restarted.engine(route());
        let key = RouteKey::new(usdc(), DESTINATION);
        assert!(engine.outstanding(&key).is_zero());
        assert_eq!(engine.restore_liquidity(), 1);
        assert_eq!(engine.outstanding(&key), units(300));
    }
}
