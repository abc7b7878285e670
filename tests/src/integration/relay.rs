//! # Relay Flow
//!
//! A `MessageSent` observed on the source chain is relayed to the destination
//! only once the attestation is complete and the pair's delay has passed,
//! measured from when the message was observed.

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use bn_02_transfer_store::TransferStateApi;
    use bn_05_attestation_relay::{RelayOutcome, RelayState, Step};
    use shared_types::{ContractCall, RelayStatus};

    use crate::fixtures::*;

    const DELAY: u64 = 20 * MINUTE;

    #[tokio::test]
    async fn test_attested_message_waits_out_delay_before_relay() {
        let node = Node::new(0);
        let attestation = Arc::new(ScriptedAttestation::default());
        let relayer = node.relayer(attestation.clone(), DELAY);
        let message = cctp_message(42, NOW);
        node.apply(message_sent(&message));
        attestation.complete(vec![0xa7; 65]);

        let mut machine = relayer.machine_for(&message);
        assert_eq!(machine.release_at(), NOW + DELAY);

        assert!(matches!(relayer.step(&message, &mut machine).await.unwrap(), Step::Wait(_)));
        assert_eq!(machine.attestation(), Some(&[0xa7; 65][..]));

        node.time.set(NOW + 10 * MINUTE);
        assert!(matches!(relayer.step(&message, &mut machine).await.unwrap(), Step::Wait(_)));
        assert_eq!(node.submitter.sends(), 0);
        // The attestation is kept, so waiting does not poll again.
        assert_eq!(attestation.fetches.load(Ordering::SeqCst), 1);

        node.time.set(NOW + 21 * MINUTE);
        let Step::Done(RelayOutcome::Relayed { tx_hash }) =
            relayer.step(&message, &mut machine).await.unwrap()
        else {
            panic!("expected the message to be relayed");
        };
        assert_eq!(machine.state(), RelayState::Relayed);

        let sent = node.submitter.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chain_id, DESTINATION);
        assert_eq!(sent[0].to, TRANSMITTER);
        assert_eq!(
            sent[0].call,
            ContractCall::ReceiveMessage {
                message: message.message.clone(),
                attestation: vec![0xa7; 65],
            }
        );

        let stored = node.store.message(&message.message_hash).unwrap();
        assert_eq!(stored.relay, RelayStatus::Relayed { tx_hash: Some(tx_hash) });
    }

    #[tokio::test]
    async fn test_pending_attestation_is_polled_again() {
        let node = Node::new(0);
        let attestation = Arc::new(ScriptedAttestation::default());
        let relayer = node.relayer(attestation.clone(), DELAY);
        let message = cctp_message(43, NOW);
        node.apply(message_sent(&message));
        let mut machine = relayer.machine_for(&message);

        // Past the delay, but the attestor has not signed yet.
        node.time.set(NOW + DELAY + 1);
        assert_eq!(relayer.step(&message, &mut machine).await.unwrap(), Step::Wait(MINUTE));
        assert_eq!(relayer.step(&message, &mut machine).await.unwrap(), Step::Wait(MINUTE));
        assert_eq!(attestation.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(node.submitter.sends(), 0);

        attestation.complete(vec![1; 65]);
        assert!(matches!(
            relayer.step(&message, &mut machine).await.unwrap(),
            Step::Done(RelayOutcome::Relayed { .. })
        ));
    }

    #[tokio::test]
    async fn test_used_nonce_is_recorded_without_sending() {
        let node = Node::new(0);
        let attestation = Arc::new(ScriptedAttestation::default());
        attestation.complete(vec![1; 65]);
        let relayer = node.relayer(attestation, DELAY);
        let message = cctp_message(44, NOW);
        node.apply(message_sent(&message));
        node.chain.use_nonce(message.source_domain, message.nonce);

        node.time.set(NOW + DELAY);
        let mut machine = relayer.machine_for(&message);
        assert_eq!(
            relayer.step(&message, &mut machine).await.unwrap(),
            Step::Done(RelayOutcome::RelayedElsewhere)
        );
        assert_eq!(node.submitter.sends(), 0);
        assert_eq!(
            node.store.message(&message.message_hash).unwrap().relay,
            RelayStatus::Relayed { tx_hash: None }
        );
    }

    #[tokio::test]
    async fn test_message_relayed_by_another_node_is_not_sent() {
        let node = Node::new(0);
        let attestation = Arc::new(ScriptedAttestation::default());
        let relayer = node.relayer(attestation.clone(), DELAY);
        let message = cctp_message(45, NOW);
        node.apply(message_sent(&message));
        node.store.record_relayed(message.message_hash, None).unwrap();

        let mut machine = relayer.machine_for(&message);
        assert_eq!(
            relayer.step(&message, &mut machine).await.unwrap(),
            Step::Done(RelayOutcome::RelayedElsewhere)
        );
        assert_eq!(attestation.fetches.load(Ordering::SeqCst), 0);
        assert_eq!(node.submitter.sends(), 0);
    }
}
