//! # Cross-Subsystem Properties
//!
//! Randomized runs of the bonding engine and settlement coordinator over one
//! shared store. Single-crate properties live next to their code.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bn_02_transfer_store::TransferStateApi;
    use bn_03_bonding_engine::BondingApi;
    use proptest::prelude::*;
    use shared_bus::TransitionTopic;
    use shared_types::{Amount, RouteKey, TransferState};
    use tokio::task::JoinSet;

    use crate::fixtures::*;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    struct Settled {
        outstanding: Amount,
        expected: Amount,
        bonded_total: Amount,
        unbacked_settled: usize,
    }

    /// Bond what liquidity allows, then settle the first `settle` transfers.
    async fn bond_and_settle(credit: u64, amounts: &[u64], settle: usize) -> Settled {
        let node = Node::new(credit);
        let engine = node.engine(route());
        let coordinator = node.coordinator(3_600);
        let mut feeds = vec![
            node.bus.subscribe(TransitionTopic::Transfers),
            node.bus.subscribe(TransitionTopic::Bundles),
        ];

        let transfers: Vec<_> = amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| transfer(i as u8 + 1, *amount, 1))
            .collect();
        for t in &transfers {
            node.apply(transfer_sent(t));
            let _ = engine.on_transfer_sent(t.clone()).await;
        }

        let members: Vec<_> = transfers.iter().take(settle).collect();
        let bundle = bundle(&members, NOW);
        node.apply(bundle_committed(&bundle));
        node.apply(bundle_settled(&bundle, NOW + 60));
        pump(&mut feeds, &coordinator);

        let mut expected = Amount::zero();
        let mut bonded_total = Amount::zero();
        let mut unbacked_settled = 0;
        for t in &transfers {
            let record = node.store.get(&t.transfer_id).unwrap();
            if let Some(bond) = &record.bond {
                bonded_total = bonded_total.saturating_add(bond.amount);
                if record.state != TransferState::Settled {
                    expected = expected.saturating_add(bond.amount);
                }
            }
            if record.state == TransferState::Settled && record.bond.is_none() && record.unbondable.is_none() {
                unbacked_settled += 1;
            }
        }
        Settled {
            outstanding: engine.outstanding(&RouteKey::new(usdc(), DESTINATION)),
            expected,
            bonded_total,
            unbacked_settled,
        }
    }

    async fn concurrent_sightings(copies: usize) -> usize {
        let node = Node::with_submitter(1_000, RecordingSubmitter::with_latency(Duration::from_millis(5)));
        let engine = node.engine(route());
        let t = transfer(1, 100, 1);
        node.apply(transfer_sent(&t));

        let mut tasks = JoinSet::new();
        for _ in 0..copies {
            let engine = Arc::clone(&engine);
            let t = t.clone();
            tasks.spawn(async move { engine.on_transfer_sent(t).await });
        }
        while tasks.join_next().await.is_some() {}
        node.submitter.sends()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_outstanding_tracks_unsettled_bonds(
            credit in 0u64..1_000,
            amounts in proptest::collection::vec(1u64..300, 1..8),
            settle_seed in any::<usize>(),
        ) {
            let settle = 1 + settle_seed % amounts.len();
            let result = runtime().block_on(bond_and_settle(credit, &amounts, settle));
            prop_assert_eq!(result.outstanding, result.expected);
            prop_assert!(result.bonded_total <= units(credit));
            prop_assert_eq!(result.unbacked_settled, 0);
        }

        #[test]
        fn prop_concurrent_sightings_bond_once(copies in 2usize..6) {
            let sends = runtime().block_on(concurrent_sightings(copies));
            prop_assert_eq!(sends, 1);
        }
    }
}
