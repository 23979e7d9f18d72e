//! Creator allowlist gate.
//!
//! Sponsorship is only extended to approved creator tokens. The backing
//! store is external; if it cannot answer, the gate fails closed.

use std::collections::HashSet;
use std::path::Path;

use alloy_primitives::Address;
use async_trait::async_trait;
use thiserror::Error;

use crate::error::DenyReason;

/// The allowlist backing store could not answer.
#[derive(Debug, Clone, Error)]
#[error("allowlist lookup failed: {0}")]
pub struct AllowlistError(pub String);

/// Creator-approval check consulted before policy validation.
#[async_trait]
pub trait CreatorAllowlist: Send + Sync {
    async fn is_approved(&self, creator_token: Address) -> Result<bool, AllowlistError>;
}

/// Gate helper mapping the lookup onto the denial taxonomy.
pub async fn require_approved(
    allowlist: &dyn CreatorAllowlist,
    creator_token: Address,
) -> Result<(), DenyReason> {
    match allowlist.is_approved(creator_token).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(DenyReason::NotAllowlisted(creator_token)),
        // Fail closed: an unreachable store must never become an implicit allow.
        Err(e) => Err(DenyReason::AllowlistUnavailable(e.0)),
    }
}

/// Static allowlist loaded once at process start.
#[derive(Debug, Clone, Default)]
pub struct StaticAllowlist {
    approved: HashSet<Address>,
}

impl StaticAllowlist {
    pub fn new(approved: impl IntoIterator<Item = Address>) -> Self {
        Self {
            approved: approved.into_iter().collect(),
        }
    }

    /// Loads one address per line; blank lines and `#` comments are skipped.
    pub fn from_file(path: &Path) -> Result<Self, AllowlistError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AllowlistError(format!("reading {}: {e}", path.display())))?;

        let mut approved = HashSet::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let address: Address = line
                .parse()
                .map_err(|e| AllowlistError(format!("bad address {line:?}: {e}")))?;
            approved.insert(address);
        }

        Ok(Self { approved })
    }

    pub fn len(&self) -> usize {
        self.approved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.approved.is_empty()
    }
}

#[async_trait]
impl CreatorAllowlist for StaticAllowlist {
    async fn is_approved(&self, creator_token: Address) -> Result<bool, AllowlistError> {
        Ok(self.approved.contains(&creator_token))
    }
}
