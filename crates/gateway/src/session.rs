//! Session resolution.
//!
//! Turns request credentials into an authenticated actor address. Two
//! origins exist: a SIWE session validated upstream (we only receive the
//! address), and a server-issued one-time deploy-session token presented with
//! an HMAC signature and looked up by hash in the deploy-session store. The
//! store is created and mutated by an external collaborator; this module only
//! reads it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use alloy_primitives::{keccak256, Address, B256};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::error::{AuthFailure, DenyReason};

type HmacSha256 = Hmac<Sha256>;

/// Lifecycle step of a deploy session, as recorded by the orchestrating
/// collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStep {
    Pending,
    Active,
    Failed,
    Expired,
    Completed,
}

/// A server-orchestrated multi-transaction provisioning flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySession {
    /// The authenticated user behind the flow.
    pub actor: Address,
    /// The temporary owner key the flow adds to the account for automated
    /// follow-up calls.
    pub session_owner: Address,
    pub step: SessionStep,
    pub expires_at: SystemTime,
}

/// Where a session came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOrigin {
    Siwe,
    Deploy(DeploySession),
}

/// An authenticated actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub address: Address,
    pub origin: SessionOrigin,
}

impl Session {
    /// The deploy session behind this actor, if any.
    pub fn deploy(&self) -> Option<&DeploySession> {
        match &self.origin {
            SessionOrigin::Deploy(session) => Some(session),
            SessionOrigin::Siwe => None,
        }
    }

    /// An abandoned deploy flow may only unwind itself: the sole legal batch
    /// is the self-call removing the recorded session owner.
    pub fn cleanup_only(&self) -> bool {
        self.deploy()
            .is_some_and(|s| matches!(s.step, SessionStep::Failed | SessionStep::Expired))
    }
}

/// The deploy-session backing store failed.
#[derive(Debug, Clone, Error)]
#[error("session store unavailable: {0}")]
pub struct SessionStoreError(pub String);

/// Read-only view of the deploy-session store.
#[async_trait]
pub trait DeploySessionStore: Send + Sync {
    /// Looks up a session by the keccak hash of its one-time token.
    async fn find_by_token_hash(
        &self,
        token_hash: B256,
    ) -> Result<Option<DeploySession>, SessionStoreError>;
}

/// Shared in-memory deploy-session store keyed by token hash. The issuing
/// collaborator inserts sessions; the resolver only reads.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<B256, DeploySession>>,
}

impl InMemorySessionStore {
    pub fn insert(&self, token_hash: B256, session: DeploySession) {
        self.sessions.lock().unwrap().insert(token_hash, session);
    }
}

#[async_trait]
impl DeploySessionStore for InMemorySessionStore {
    async fn find_by_token_hash(
        &self,
        token_hash: B256,
    ) -> Result<Option<DeploySession>, SessionStoreError> {
        Ok(self.sessions.lock().unwrap().get(&token_hash).cloned())
    }
}

/// Raw credentials extracted from a request.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Address from an upstream-validated SIWE session.
    pub siwe_address: Option<Address>,
    /// One-time deploy-session token.
    pub deploy_token: Option<String>,
    /// Hex HMAC-SHA256 of the token under the server secret.
    pub deploy_signature: Option<String>,
}

/// Resolves credentials into an authenticated [`Session`].
pub struct SessionResolver {
    secret: Vec<u8>,
    store: Arc<dyn DeploySessionStore>,
}

impl std::fmt::Debug for SessionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionResolver")
            .field("secret", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl SessionResolver {
    pub fn new(secret: impl Into<Vec<u8>>, store: Arc<dyn DeploySessionStore>) -> Self {
        Self {
            secret: secret.into(),
            store,
        }
    }

    /// Resolves a session. Deploy-session credentials take precedence over a
    /// SIWE address when both are present.
    pub async fn resolve(&self, credentials: &Credentials) -> Result<Session, DenyReason> {
        if let Some(token) = credentials.deploy_token.as_deref() {
            return self.resolve_deploy(token, credentials.deploy_signature.as_deref()).await;
        }

        if let Some(address) = credentials.siwe_address {
            return Ok(Session {
                address,
                origin: SessionOrigin::Siwe,
            });
        }

        Err(AuthFailure::NoSession.into())
    }

    async fn resolve_deploy(
        &self,
        token: &str,
        signature: Option<&str>,
    ) -> Result<Session, DenyReason> {
        // A token without its signature header is incomplete credentials,
        // not a failed verification.
        let signature = signature.ok_or(AuthFailure::NoSession)?;
        self.verify_token_mac(token, signature)?;

        let mut session = self
            .store
            .find_by_token_hash(keccak256(token.as_bytes()))
            .await
            .map_err(|e| DenyReason::StateUnavailable(e.to_string()))?
            .ok_or(AuthFailure::NoSession)?;

        if session.step == SessionStep::Completed {
            // Terminal: a finished flow grants nothing, not even cleanup.
            return Err(AuthFailure::SessionInactive.into());
        }

        // The store is mutated by an external collaborator and may lag; a
        // session past its expiry instant is expired no matter what the
        // recorded step says.
        if SystemTime::now() > session.expires_at {
            session.step = SessionStep::Expired;
        }

        Ok(Session {
            address: session.actor,
            origin: SessionOrigin::Deploy(session),
        })
    }

    fn verify_token_mac(&self, token: &str, signature_hex: &str) -> Result<(), DenyReason> {
        let signature = hex::decode(signature_hex.trim_start_matches("0x"))
            .map_err(|_| AuthFailure::InvalidSignature)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| AuthFailure::InvalidSignature)?;
        mac.update(token.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthFailure::InvalidSignature.into())
    }
}

/// Hex HMAC-SHA256 of `token` under `secret`, as carried in the signature
/// header. Used by the token-issuing collaborator and by tests.
pub fn token_signature(secret: &[u8], token: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(token.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use std::time::Duration;

    const SECRET: &[u8] = b"test-secret";

    fn session(step: SessionStep) -> DeploySession {
        DeploySession {
            actor: address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
            session_owner: address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"),
            step,
            expires_at: SystemTime::now() + Duration::from_secs(600),
        }
    }

    fn resolver_with(token: &str, deploy: DeploySession) -> SessionResolver {
        let store = InMemorySessionStore::default();
        store.insert(keccak256(token.as_bytes()), deploy);
        SessionResolver::new(SECRET, Arc::new(store))
    }

    fn deploy_credentials(token: &str) -> Credentials {
        Credentials {
            siwe_address: None,
            deploy_token: Some(token.to_string()),
            deploy_signature: Some(token_signature(SECRET, token)),
        }
    }

    #[tokio::test]
    async fn resolves_siwe_address() {
        let resolver =
            SessionResolver::new(SECRET, Arc::new(InMemorySessionStore::default()));
        let address = address!("cccccccccccccccccccccccccccccccccccccccc");

        let session = resolver
            .resolve(&Credentials {
                siwe_address: Some(address),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(session.address, address);
        assert_eq!(session.origin, SessionOrigin::Siwe);
        assert!(!session.cleanup_only());
    }

    #[tokio::test]
    async fn missing_credentials_is_no_session() {
        let resolver =
            SessionResolver::new(SECRET, Arc::new(InMemorySessionStore::default()));

        let err = resolver.resolve(&Credentials::default()).await.unwrap_err();
        assert_eq!(err, DenyReason::Unauthenticated(AuthFailure::NoSession));
    }

    #[tokio::test]
    async fn resolves_active_deploy_session() {
        let resolver = resolver_with("tok-1", session(SessionStep::Active));

        let resolved = resolver.resolve(&deploy_credentials("tok-1")).await.unwrap();
        assert_eq!(
            resolved.address,
            address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
        );
        assert!(!resolved.cleanup_only());
    }

    #[tokio::test]
    async fn token_without_signature_is_no_session() {
        let resolver = resolver_with("tok-1", session(SessionStep::Active));

        let mut credentials = deploy_credentials("tok-1");
        credentials.deploy_signature = None;

        let err = resolver.resolve(&credentials).await.unwrap_err();
        assert_eq!(err, DenyReason::Unauthenticated(AuthFailure::NoSession));
    }

    #[tokio::test]
    async fn bad_signature_is_rejected() {
        let resolver = resolver_with("tok-1", session(SessionStep::Active));

        let mut credentials = deploy_credentials("tok-1");
        credentials.deploy_signature = Some(token_signature(b"other-secret", "tok-1"));

        let err = resolver.resolve(&credentials).await.unwrap_err();
        assert_eq!(err, DenyReason::Unauthenticated(AuthFailure::InvalidSignature));
    }

    #[tokio::test]
    async fn unknown_token_is_no_session() {
        let resolver = resolver_with("tok-1", session(SessionStep::Active));

        let err = resolver
            .resolve(&deploy_credentials("tok-2"))
            .await
            .unwrap_err();
        assert_eq!(err, DenyReason::Unauthenticated(AuthFailure::NoSession));
    }

    #[tokio::test]
    async fn completed_session_is_inactive() {
        let resolver = resolver_with("tok-1", session(SessionStep::Completed));

        let err = resolver
            .resolve(&deploy_credentials("tok-1"))
            .await
            .unwrap_err();
        assert_eq!(err, DenyReason::Unauthenticated(AuthFailure::SessionInactive));
    }

    #[tokio::test]
    async fn expired_session_resolves_cleanup_only() {
        let resolver = resolver_with("tok-1", session(SessionStep::Expired));

        let resolved = resolver.resolve(&deploy_credentials("tok-1")).await.unwrap();
        assert!(resolved.cleanup_only());
    }

    #[test]
    fn debug_output_redacts_the_secret() {
        let resolver =
            SessionResolver::new(SECRET, Arc::new(InMemorySessionStore::default()));

        let rendered = format!("{resolver:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("test-secret"));
    }

    #[tokio::test]
    async fn lapsed_expiry_overrides_recorded_step() {
        let mut deploy = session(SessionStep::Active);
        deploy.expires_at = SystemTime::now() - Duration::from_secs(1);
        let resolver = resolver_with("tok-1", deploy);

        let resolved = resolver.resolve(&deploy_credentials("tok-1")).await.unwrap();
        assert!(resolved.cleanup_only());
    }
}
