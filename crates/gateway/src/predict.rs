//! Deterministic address prediction.
//!
//! CREATE2 addresses are recomputed per request from first principles; the
//! only thing cached is the creation code fetched from the on-chain byte-code
//! store, which is immutable for a given id, so the cache never invalidates.

use std::collections::HashMap;
use std::sync::RwLock;

use alloy_primitives::{keccak256, Address, Bytes, B256};
use alloy_sol_types::SolCall;

use crate::chain::{ChainReadError, ChainReader};
use crate::contracts::CodeStore;

/// Derives a request-scoped CREATE2 salt.
///
/// `tag` is a fixed domain separator, so salts derived for different roles
/// from the same `(creator_token, sender)` pair can never collide.
pub fn derive_salt(tag: &[u8], creator_token: Address, sender: Address) -> B256 {
    let mut preimage = Vec::with_capacity(tag.len() + 40);
    preimage.extend_from_slice(tag);
    preimage.extend_from_slice(creator_token.as_slice());
    preimage.extend_from_slice(sender.as_slice());
    keccak256(&preimage)
}

/// `keccak256(creationCode ++ constructorArgs)`, the init-code hash CREATE2
/// commits to.
pub fn init_code_hash(creation_code: &[u8], constructor_args: &[u8]) -> B256 {
    let mut init_code = Vec::with_capacity(creation_code.len() + constructor_args.len());
    init_code.extend_from_slice(creation_code);
    init_code.extend_from_slice(constructor_args);
    keccak256(&init_code)
}

/// Standard CREATE2 address formula, last 20 bytes of
/// `keccak256(0xff ++ deployer ++ salt ++ initCodeHash)`.
pub fn create2_address(deployer: Address, salt: B256, init_code_hash: B256) -> Address {
    let mut buf = [0u8; 85];
    buf[0] = 0xff;
    buf[1..21].copy_from_slice(deployer.as_slice());
    buf[21..53].copy_from_slice(salt.as_slice());
    buf[53..85].copy_from_slice(init_code_hash.as_slice());

    Address::from_slice(&keccak256(buf)[12..])
}

/// Process-lifetime cache of creation code keyed by `(store, codeId)`.
///
/// Append-only with insert-if-absent semantics; concurrent fetchers of the
/// same id may race the read, but the first write wins and all of them return
/// the same immutable bytes.
#[derive(Debug, Default)]
pub struct CreationCodeCache {
    inner: RwLock<HashMap<(Address, B256), Bytes>>,
}

impl CreationCodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the creation code for `code_id`, fetching it from the store
    /// contract on first use.
    pub async fn get_or_fetch(
        &self,
        chain: &dyn ChainReader,
        store: Address,
        code_id: B256,
    ) -> Result<Bytes, ChainReadError> {
        if let Some(code) = self.inner.read().unwrap().get(&(store, code_id)) {
            return Ok(code.clone());
        }

        let calldata = CodeStore::creationCodeCall { codeId: code_id }.abi_encode();
        let ret = chain.call(store, calldata.into()).await?;
        let code = CodeStore::creationCodeCall::abi_decode_returns(&ret)
            .map_err(|e| ChainReadError(format!("creation code response malformed: {e}")))?;

        let mut cached = self.inner.write().unwrap();
        Ok(cached.entry((store, code_id)).or_insert(code).clone())
    }
}
