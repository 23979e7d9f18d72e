//! Read-only chain access.
//!
//! The gateway never signs or submits anything; its only chain dependency is
//! a handful of read queries (code presence, capability reads, creation-code
//! fetches). Those go through [`ChainReader`] so tests can inject a mock and
//! the engine stays agnostic of the transport.

use alloy_primitives::{Address, Bytes};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types_eth::TransactionRequest;
use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::error::DenyReason;

/// A read-only chain query failed at the transport or node level.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("chain read failed: {0}")]
pub struct ChainReadError(pub String);

impl From<ChainReadError> for DenyReason {
    fn from(err: ChainReadError) -> Self {
        // Reads are never retried here; sponsoring on guessed state is worse
        // than a denial the client can retry.
        DenyReason::StateUnavailable(err.0)
    }
}

/// Read-only chain queries needed by the authorization pipeline.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Runtime code at `address` (empty if not deployed).
    async fn get_code(&self, address: Address) -> Result<Bytes, ChainReadError>;

    /// `eth_call` against `to` with the given calldata, at latest.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainReadError>;
}

/// [`ChainReader`] backed by an HTTP JSON-RPC node.
#[derive(Debug, Clone)]
pub struct NodeChainReader {
    provider: RootProvider,
}

impl NodeChainReader {
    /// Connects to the node at `node_url`.
    pub fn new(node_url: Url) -> Self {
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect_http(node_url);

        Self { provider }
    }
}

#[async_trait]
impl ChainReader for NodeChainReader {
    async fn get_code(&self, address: Address) -> Result<Bytes, ChainReadError> {
        self.provider
            .get_code_at(address)
            .await
            .map_err(|e| ChainReadError(e.to_string()))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainReadError> {
        let tx = TransactionRequest::default().to(to).input(data.into());

        self.provider
            .call(tx)
            .await
            .map_err(|e| ChainReadError(e.to_string()))
    }
}
