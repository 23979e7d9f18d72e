//! The authorization pipeline.
//!
//! One entry point, [`SponsorshipEngine::authorize`], runs the gates in a
//! fixed order: pinning, session, rate limit, calldata decode, then either
//! the cleanup-only branch or the full detect/allowlist/ownership/derive/
//! validate sequence. Cheap and pure checks run before anything that touches
//! the chain, so a request that can be refused locally never costs a read.

use std::sync::Arc;

use alloy_primitives::Address;
use tracing::debug;

use crate::allowlist::{require_approved, CreatorAllowlist};
use crate::chain::ChainReader;
use crate::decode::decode_inner_calls;
use crate::error::DenyReason;
use crate::ownership::OwnershipVerifier;
use crate::policy::PolicyValidator;
use crate::rate_limit::FixedWindowRateLimit;
use crate::rpc::UserOperation;
use crate::session::{Credentials, SessionResolver};

/// A granted authorization, for logging and metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub session: Address,
    pub sender: Address,
    /// The validated intent class, e.g. `deploy_phase1` or `cleanup`.
    pub intent: &'static str,
}

/// Decides whether a user operation deserves gas sponsorship.
pub struct SponsorshipEngine {
    policy: PolicyValidator,
    ownership: OwnershipVerifier,
    sessions: SessionResolver,
    rate_limit: FixedWindowRateLimit,
    allowlist: Arc<dyn CreatorAllowlist>,
    chain: Arc<dyn ChainReader>,
}

impl std::fmt::Debug for SponsorshipEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SponsorshipEngine")
            .field("policy", &self.policy)
            .field("ownership", &self.ownership)
            .field("rate_limit", &self.rate_limit)
            .finish_non_exhaustive()
    }
}

impl SponsorshipEngine {
    pub fn new(
        policy: PolicyValidator,
        ownership: OwnershipVerifier,
        sessions: SessionResolver,
        rate_limit: FixedWindowRateLimit,
        allowlist: Arc<dyn CreatorAllowlist>,
        chain: Arc<dyn ChainReader>,
    ) -> Self {
        Self {
            policy,
            ownership,
            sessions,
            rate_limit,
            allowlist,
            chain,
        }
    }

    /// Authorizes one operation. A denial never carries side effects beyond
    /// the rate-limit count; the decision for identical inputs against
    /// identical state is identical.
    pub async fn authorize(
        &self,
        op: &UserOperation,
        entry_point: Address,
        chain_id: Option<u64>,
        credentials: &Credentials,
    ) -> Result<Authorization, DenyReason> {
        self.policy.check_pinning(entry_point, chain_id)?;

        let session = self.sessions.resolve(credentials).await?;
        self.rate_limit.try_acquire(session.address)?;

        let calls = decode_inner_calls(&op.call_data)
            .map_err(|e| DenyReason::Decode(e.to_string()))?;

        let init_code = op.init_code();

        if session.cleanup_only() {
            debug!(session = %session.address, sender = %op.sender, "cleanup-only session");
            self.policy.validate_cleanup(&session, op.sender, &calls)?;
            self.ownership
                .verify(&*self.chain, session.address, op.sender, init_code.as_ref())
                .await?;
            return Ok(Authorization {
                session: session.address,
                sender: op.sender,
                intent: "cleanup",
            });
        }

        let primary = self.policy.detect_primary(op.sender, &calls)?;
        require_approved(&*self.allowlist, primary.creator_token).await?;
        self.ownership
            .verify(&*self.chain, session.address, op.sender, init_code.as_ref())
            .await?;

        let expected = self
            .policy
            .derive_expected(&*self.chain, op.sender, &primary)
            .await?;
        self.policy
            .validate(&session, op.sender, &calls, &primary, expected.as_ref())?;

        debug!(
            session = %session.address,
            sender = %op.sender,
            intent = primary.mode.as_str(),
            "sponsorship authorized"
        );

        Ok(Authorization {
            session: session.address,
            sender: op.sender,
            intent: primary.mode.as_str(),
        })
    }
}
