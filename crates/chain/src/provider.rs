//! RPC-backed implementation of the orchestrator's [`Network`] seam.
//!
//! Simulation and receipt watching go straight to the node; submission is
//! delegated to a [`WalletTransport`] so browser wallets, local signers and
//! multisig frontends all plug in behind the same trait.

use alloy::network::TransactionBuilder;
use alloy::primitives::B256;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::calldata::CallDescriptor;
use crate::orchestrator::{
    Network, NetworkError, PreparedRequest, ReceiptOutcome, SimulateError,
};
use crate::wallet::SubmissionHandle;

/// Sends a prepared request through whatever wallet the user connected.
#[async_trait]
pub trait WalletTransport: Send + Sync {
    async fn send(&self, prepared: &PreparedRequest) -> Result<SubmissionHandle, NetworkError>;

    /// Send several prepared requests as one all-or-nothing batch.
    ///
    /// Only meaningful for wallets advertising the atomic-batch capability;
    /// the default rejects so a mis-planned batch fails loudly instead of
    /// landing as independent transactions.
    async fn send_calls(
        &self,
        prepared: &[PreparedRequest],
    ) -> Result<SubmissionHandle, NetworkError> {
        let _ = prepared;
        Err(NetworkError::Rejected(
            "wallet does not support atomic batches".into(),
        ))
    }
}

/// [`Network`] implementation over an HTTP JSON-RPC endpoint.
pub struct RpcNetwork {
    rpc_url: String,
    wallet: Arc<dyn WalletTransport>,
    receipt_poll_interval: Duration,
}

impl RpcNetwork {
    /// Connect and verify the endpoint responds before handing the network
    /// to an orchestrator.
    pub async fn connect(
        rpc_url: impl Into<String>,
        wallet: Arc<dyn WalletTransport>,
    ) -> anyhow::Result<Self> {
        let rpc_url = rpc_url.into();
        let url = rpc_url.parse().context("invalid rpc url")?;
        let provider = ProviderBuilder::new().on_http(url);
        let block = provider
            .get_block_number()
            .await
            .context("rpc endpoint unreachable")?;
        info!(rpc_url = %rpc_url, block, "Connected to rpc endpoint");

        Ok(Self {
            rpc_url,
            wallet,
            receipt_poll_interval: Duration::from_secs(4),
        })
    }

    pub fn with_receipt_poll_interval(mut self, interval: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self
    }

    fn provider(&self) -> Result<impl Provider, NetworkError> {
        let url = self
            .rpc_url
            .parse()
            .map_err(|e| NetworkError::Rpc(format!("invalid rpc url: {e}")))?;
        Ok(ProviderBuilder::new().on_http(url))
    }

    fn request_for(prepared: &PreparedRequest) -> TransactionRequest {
        let mut tx = TransactionRequest::default()
            .with_from(prepared.from)
            .with_to(prepared.call.target)
            .with_input(prepared.call.payload.clone());
        if !prepared.call.value.is_zero() {
            tx = tx.with_value(prepared.call.value);
        }
        tx
    }
}

#[async_trait]
impl Network for RpcNetwork {
    async fn simulate(
        &self,
        call: &CallDescriptor,
        from: alloy::primitives::Address,
    ) -> Result<PreparedRequest, SimulateError> {
        let provider = self.provider()?;
        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(call.target)
            .with_input(call.payload.clone())
            .with_value(call.value);

        // eth_call surfaces the revert before the user signs anything.
        provider
            .call(tx.clone())
            .await
            .map_err(|e| SimulateError::Revert(e.to_string()))?;

        // A failed estimate after a clean call is not fatal; the wallet can
        // still estimate at signing time.
        let gas_estimate = provider.estimate_gas(tx).await.ok();
        debug!(target = %call.target, gas = ?gas_estimate, "Simulation passed");

        Ok(PreparedRequest {
            call: call.clone(),
            from,
            gas_estimate,
        })
    }

    async fn submit(&self, prepared: &PreparedRequest) -> Result<SubmissionHandle, NetworkError> {
        self.wallet.send(prepared).await
    }

    async fn submit_batch(
        &self,
        prepared: &[PreparedRequest],
    ) -> Result<SubmissionHandle, NetworkError> {
        self.wallet.send_calls(prepared).await
    }

    async fn wait_for_receipt(&self, hash: B256) -> Result<ReceiptOutcome, NetworkError> {
        let provider = self.provider()?;
        loop {
            let receipt = provider
                .get_transaction_receipt(hash)
                .await
                .map_err(|e| NetworkError::Rpc(e.to_string()))?;
            if let Some(receipt) = receipt {
                return Ok(if receipt.status() {
                    ReceiptOutcome::Success
                } else {
                    ReceiptOutcome::Reverted
                });
            }
            tokio::time::sleep(self.receipt_poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopWallet;

    #[async_trait]
    impl WalletTransport for NoopWallet {
        async fn send(&self, _: &PreparedRequest) -> Result<SubmissionHandle, NetworkError> {
            Err(NetworkError::Rejected("no wallet in tests".into()))
        }
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let result = RpcNetwork::connect("not a url", Arc::new(NoopWallet)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires a reachable node
    async fn test_connect_against_live_node() {
        let rpc_url =
            std::env::var("LOCKSTAKE_RPC_URL").unwrap_or_else(|_| "http://localhost:8545".into());
        let network = RpcNetwork::connect(rpc_url, Arc::new(NoopWallet)).await.unwrap();
        assert!(!network.rpc_url.is_empty());
    }
}
