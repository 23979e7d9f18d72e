//! Denial taxonomy for the gateway.
//!
//! Every way a sponsorship request can be refused maps to one variant here,
//! and every variant maps to a stable JSON-RPC code/message pair. Denials are
//! ordinary values, never panics; string detail rides along as a diagnostic
//! and is never used for dispatch.

use alloy_primitives::Address;
use thiserror::Error;

use crate::policy::PolicyViolation;

/// Why a request could not be tied to an authenticated actor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    /// No credentials were presented, or the presented token is unknown.
    #[error("no usable session")]
    NoSession,

    /// The deploy-session token signature did not verify.
    #[error("deploy session signature mismatch")]
    InvalidSignature,

    /// The deploy session reached its terminal `completed` state.
    #[error("deploy session is no longer active")]
    SessionInactive,
}

/// Why the authenticated actor is not entitled to act for `sender`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OwnershipViolation {
    /// Capability read came back false, or the counterfactual owners list
    /// does not contain the session address.
    #[error("session {session} is not an owner of {sender}")]
    NotOwner { session: Address, sender: Address },

    /// The init code claims ownership but deploys to a different address.
    #[error("init code deploys to {predicted}, not declared sender {sender}")]
    SenderAddressMismatch { predicted: Address, sender: Address },

    /// The init code names a factory outside the fixed allow-list.
    #[error("account factory {factory} is not allow-listed")]
    FactoryNotAllowed { factory: Address },
}

/// Terminal denial for a sponsorship request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DenyReason {
    /// Bad batch, method, or parameter shape.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// No usable session could be resolved from the request credentials.
    #[error(transparent)]
    Unauthenticated(#[from] AuthFailure),

    /// The session address exhausted its fixed request window.
    #[error("rate limit exceeded")]
    RateLimited,

    /// The creator token has not been approved for sponsorship.
    #[error("creator token {0} is not allow-listed")]
    NotAllowlisted(Address),

    /// The allowlist backing store failed; sponsorship fails closed.
    #[error("allowlist unavailable: {0}")]
    AllowlistUnavailable(String),

    /// The actor is not entitled to act for the declared sender.
    #[error(transparent)]
    Ownership(#[from] OwnershipViolation),

    /// Calldata did not match any expected shape.
    #[error("calldata decode failed: {0}")]
    Decode(String),

    /// A per-call policy rule was violated.
    #[error(transparent)]
    Policy(#[from] PolicyViolation),

    /// A read-only chain query failed. Fails closed, but carries its own
    /// code so clients can distinguish node trouble from an authorization
    /// refusal and retry later.
    #[error("chain state unavailable: {0}")]
    StateUnavailable(String),
}

impl DenyReason {
    /// Stable JSON-RPC error code for this denial.
    pub const fn code(&self) -> i64 {
        match self {
            Self::MalformedRequest(_) => -32602,
            Self::Unauthenticated(_) => -32001,
            Self::NotAllowlisted(_) => -32003,
            Self::AllowlistUnavailable(_) => -32004,
            Self::RateLimited => -32005,
            Self::Ownership(_) => -32006,
            Self::Decode(_) => -32007,
            Self::Policy(_) => -32008,
            Self::StateUnavailable(_) => -32009,
        }
    }

    /// Machine-readable reason tag, suitable for metrics labels and the
    /// JSON-RPC `data` field.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MalformedRequest(_) => "malformed_request",
            Self::Unauthenticated(AuthFailure::NoSession) => "no_session",
            Self::Unauthenticated(AuthFailure::InvalidSignature) => "invalid_signature",
            Self::Unauthenticated(AuthFailure::SessionInactive) => "session_inactive",
            Self::RateLimited => "rate_limited",
            Self::NotAllowlisted(_) => "not_allowlisted",
            Self::AllowlistUnavailable(_) => "allowlist_unavailable",
            Self::Ownership(OwnershipViolation::NotOwner { .. }) => "not_owner",
            Self::Ownership(OwnershipViolation::SenderAddressMismatch { .. }) => {
                "sender_address_mismatch"
            }
            Self::Ownership(OwnershipViolation::FactoryNotAllowed { .. }) => "factory_not_allowed",
            Self::Decode(_) => "decode_failure",
            Self::Policy(violation) => violation.reason(),
            Self::StateUnavailable(_) => "state_unavailable",
        }
    }
}
