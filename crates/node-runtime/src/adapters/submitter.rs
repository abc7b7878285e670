//! # Signer Submitter
//!
//! [`TransactionSubmitter`] backed by an external signer that accepts
//! `eth_sendTransaction` for the bonder account. Keys never enter this
//! process. Receipts are polled on the destination chain's own RPC.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use shared_types::{Address, ChainId, PreparedTx, SubmitError, TransactionSubmitter, TxHash, TxReceipt};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::abi;
use super::rpc::{amount_to_quantity, parse_quantity, to_quantity, JsonRpcClient, RpcError};
use crate::container::config::SignerConfig;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    block_number: Option<String>,
    status: Option<String>,
}

pub struct SignerSubmitter {
    signer: JsonRpcClient,
    from: Address,
    chains: HashMap<ChainId, JsonRpcClient>,
    confirmations: u64,
    poll_interval: Duration,
    timeout: Duration,
}

impl SignerSubmitter {
    pub fn new(
        signer: JsonRpcClient,
        from: Address,
        chains: HashMap<ChainId, JsonRpcClient>,
        config: &SignerConfig,
    ) -> Self {
        Self {
            signer,
            from,
            chains,
            confirmations: config.confirmations.max(1),
            poll_interval: Duration::from_millis(config.receipt_poll_ms),
            timeout: Duration::from_secs(config.receipt_timeout_secs),
        }
    }

    fn chain(&self, chain_id: ChainId) -> Result<&JsonRpcClient, SubmitError> {
        self.chains
            .get(&chain_id)
            .ok_or_else(|| SubmitError::Rejected(format!("no rpc configured for chain {chain_id}")))
    }

    fn request(&self, tx: &PreparedTx) -> serde_json::Value {
        let mut request = json!({
            "from": self.from,
            "to": tx.to,
            "data": format!("0x{}", hex::encode(abi::encode_call(&tx.call))),
            "chainId": to_quantity(tx.chain_id.0),
        });
        if let Some(gas) = tx.gas_limit {
            request["gas"] = json!(to_quantity(gas));
        }
        if let Some(price) = tx.max_gas_price {
            request["maxFeePerGas"] = json!(amount_to_quantity(price));
        }
        request
    }

    /// Receipt once mined with enough confirmations, `None` while pending.
    async fn poll_receipt(
        &self,
        rpc: &JsonRpcClient,
        tx_hash: TxHash,
    ) -> Result<Option<TxReceipt>, RpcError> {
        let receipt: Option<RpcReceipt> = rpc
            .call_as("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        let Some(RpcReceipt {
            block_number: Some(block),
            status,
        }) = receipt
        else {
            return Ok(None);
        };
        let block_number = parse_quantity(&block)?;

        let head: String = rpc.call_as("eth_blockNumber", json!([])).await?;
        let head = parse_quantity(&head)?;
        if head + 1 < block_number + self.confirmations {
            return Ok(None);
        }
        Ok(Some(TxReceipt {
            tx_hash,
            block_number,
            success: status.as_deref() == Some("0x1"),
        }))
    }
}

impl SignerSubmitter {
    /// Outcome of a wait that ran out: `Dropped` when the node no longer
    /// knows the transaction, otherwise still pending.
    async fn unconfirmed(&self, rpc: &JsonRpcClient, chain_id: ChainId, tx_hash: TxHash) -> SubmitError {
        let known: Result<Option<serde_json::Value>, RpcError> = rpc
            .call_as("eth_getTransactionByHash", json!([tx_hash]))
            .await;
        match known {
            Ok(None) => {
                warn!(chain = %chain_id, %tx_hash, "[runtime] Transaction dropped");
                SubmitError::Dropped { tx_hash }
            }
            Ok(Some(_)) | Err(_) => SubmitError::ConfirmationTimeout { tx_hash },
        }
    }
}

#[async_trait]
impl TransactionSubmitter for SignerSubmitter {
    async fn send(&self, tx: &PreparedTx) -> Result<TxHash, SubmitError> {
        self.chain(tx.chain_id)?;
        let raw: String = self
            .signer
            .call_as("eth_sendTransaction", json!([self.request(tx)]))
            .await?;
        let tx_hash: TxHash = raw
            .parse()
            .map_err(|e| SubmitError::Rpc(format!("signer returned {raw}: {e}")))?;
        info!(
            chain = %tx.chain_id,
            to = %tx.to,
            call = tx.call.name(),
            %tx_hash,
            "[runtime] Transaction sent"
        );
        Ok(tx_hash)
    }

    async fn wait_for_confirmation(
        &self,
        chain_id: ChainId,
        tx_hash: TxHash,
    ) -> Result<TxReceipt, SubmitError> {
        let rpc = self.chain(chain_id)?;
        let deadline = Instant::now() + self.timeout;
        loop {
            match self.poll_receipt(rpc, tx_hash).await {
                Ok(Some(receipt)) => {
                    debug!(chain = %chain_id, %tx_hash, success = receipt.success, "[runtime] Receipt confirmed");
                    return Ok(receipt);
                }
                Ok(None) => {}
                Err(e) => warn!(chain = %chain_id, %tx_hash, error = %e, "[runtime] Receipt poll failed"),
            }
            if Instant::now() + self.poll_interval > deadline {
                return Err(self.unconfirmed(rpc, chain_id, tx_hash).await);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
