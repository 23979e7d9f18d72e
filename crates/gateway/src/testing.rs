//! Test doubles shared by unit and integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;

use crate::chain::{ChainReadError, ChainReader};

pub use crate::session::InMemorySessionStore;

/// In-memory chain double. Code defaults to empty (undeployed); `eth_call`
/// answers only exact calldata registered with [`set_call`], so a test fails
/// loudly when the code under test issues an unexpected query.
///
/// [`set_call`]: MockChainReader::set_call
#[derive(Debug, Default)]
pub struct MockChainReader {
    code: Mutex<HashMap<Address, Bytes>>,
    calls: Mutex<HashMap<(Address, Bytes), Bytes>>,
    reads: AtomicUsize,
}

impl MockChainReader {
    pub fn set_code(&self, address: Address, code: impl Into<Bytes>) {
        self.code.lock().unwrap().insert(address, code.into());
    }

    pub fn set_call(&self, to: Address, calldata: impl Into<Bytes>, ret: impl Into<Bytes>) {
        self.calls
            .lock()
            .unwrap()
            .insert((to, calldata.into()), ret.into());
    }

    /// Total reads served, for asserting a code path never touched the chain.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainReader for MockChainReader {
    async fn get_code(&self, address: Address) -> Result<Bytes, ChainReadError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .code
            .lock()
            .unwrap()
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainReadError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap()
            .get(&(to, data.clone()))
            .cloned()
            .ok_or_else(|| ChainReadError(format!("unexpected eth_call to {to} with {data}")))
    }
}

/// A chain double where every read fails, for fail-closed assertions.
#[derive(Debug, Default)]
pub struct FailingChainReader;

#[async_trait]
impl ChainReader for FailingChainReader {
    async fn get_code(&self, _: Address) -> Result<Bytes, ChainReadError> {
        Err(ChainReadError("node unreachable".to_string()))
    }

    async fn call(&self, _: Address, _: Bytes) -> Result<Bytes, ChainReadError> {
        Err(ChainReadError("node unreachable".to_string()))
    }
}

