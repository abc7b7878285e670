//! # Watcher Into Store
//!
//! A watcher reading a scripted source chain commits through the runtime's
//! `StoreBridge`, so the bonding engine sees exactly what the chain logged.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bn_01_chain_watcher::{ChainEventWatcher, ChainWatcherApi, PollOutcome, ScriptedChain, WatcherConfig};
    use bn_02_transfer_store::TransferStateApi;
    use bn_03_bonding_engine::{BondDecision, BondingApi};
    use node_runtime::adapters::StoreBridge;
    use serde_json::json;
    use shared_bus::{StoreTransition, TransitionTopic};
    use shared_types::{Address, EventKind, TransferId, TransferState, TxHash};

    use crate::fixtures::*;

    const SOURCE_BRIDGE: Address = Address([0xaa; 20]);

    fn transfer_fields(n: u8, amount: u64) -> serde_json::Value {
        json!({
            "destination_chain": DESTINATION.0,
            "sender": format!("0x{}", "11".repeat(20)),
            "recipient": format!("0x{}", "22".repeat(20)),
            "amount": amount.to_string(),
            "bonder_fee": "1",
            "nonce": format!("0x{}", hex::encode([n; 32])),
        })
    }

    fn expected_id(n: u8, amount: u64) -> TransferId {
        TransferId::derive(SOURCE, &Address([0x11; 20]), &Address([0x22; 20]), units(amount), &[n; 32])
    }

    fn watcher(node: &Node, chain: &Arc<ScriptedChain>) -> ChainEventWatcher {
        let mut config = WatcherConfig::new(SOURCE, EventKind::TransferSent, SOURCE_BRIDGE).with_token(usdc());
        config.start_block = 1;
        config.confirmations = 2;
        config.reorg_safety_depth = 4;
        let sink = Arc::new(StoreBridge::new(node.store.clone(), BONDER));
        ChainEventWatcher::new(config, chain.clone(), sink, fast_retry())
    }

    #[tokio::test]
    async fn test_logged_transfer_is_stored_and_bonded() {
        let node = Node::new(1_000);
        let chain = Arc::new(ScriptedChain::new(SOURCE, NOW));
        chain.emit(SOURCE_BRIDGE, EventKind::TransferSent, TxHash([1; 32]), transfer_fields(1, 100));
        chain.mine(3);

        let mut w = watcher(&node, &chain);
        w.init().await.unwrap();
        assert!(matches!(
            w.poll_once().await.unwrap(),
            PollOutcome::Advanced { events: 1, .. }
        ));

        let id = expected_id(1, 100);
        let record = node.store.get(&id).unwrap();
        assert_eq!(record.state, TransferState::Sent);
        assert_eq!(record.transfer.destination_chain, DESTINATION);
        assert_eq!(record.transfer.token, usdc());
        assert_eq!(
            node.store.watermark(&w.key()).unwrap(),
            w.current_watermark().unwrap()
        );

        let engine = node.engine(route());
        assert!(matches!(
            engine.on_transfer_sent(record.transfer).await.unwrap(),
            BondDecision::Bonded { .. }
        ));
        assert_eq!(node.store.get(&id).unwrap().state, TransferState::Bonded);
    }

    #[tokio::test]
    async fn test_reorged_transfer_is_retracted_from_store() {
        let node = Node::new(1_000);
        let chain = Arc::new(ScriptedChain::new(SOURCE, NOW));
        chain.emit(SOURCE_BRIDGE, EventKind::TransferSent, TxHash([1; 32]), transfer_fields(1, 100));
        chain.mine(12);

        let mut w = watcher(&node, &chain);
        w.init().await.unwrap();
        w.poll_once().await.unwrap();
        let id = expected_id(1, 100);
        assert!(node.store.get(&id).is_some());

        let mut retractions = node.bus.subscribe(TransitionTopic::Retractions);
        chain.reorg(1);
        let outcome = w.poll_once().await.unwrap();
        assert!(matches!(outcome, PollOutcome::Reorg { retracted: 1, .. }), "got {outcome:?}");

        assert!(node.store.get(&id).is_none());
        let retracted = retractions.try_recv().unwrap().unwrap();
        assert!(matches!(
            retracted,
            StoreTransition::Retracted { kind: EventKind::TransferSent, .. }
        ));

        // The log is gone on the new fork, so re-scanning finds nothing.
        assert!(matches!(
            w.poll_once().await.unwrap(),
            PollOutcome::Advanced { events: 0, .. }
        ));
        assert!(node.store.get(&id).is_none());
    }
}
