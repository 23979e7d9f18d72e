//! Gateway configuration.
//!
//! All configuration arrives via CLI flags (with env fallbacks) and is
//! validated once at startup into an immutable [`GatewayConfig`]. Contract
//! addresses, the pinned entry point, and the pinned chain id default to the
//! production deployment and are overridable for staging networks.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use alloy_primitives::{address, b256, Address, B256};
use thiserror::Error;
use url::Url;

use crate::rate_limit::RateLimitConfig;

/// ERC-4337 v0.6 entry point.
pub const DEFAULT_ENTRY_POINT: Address = address!("5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");

/// Base mainnet.
pub const DEFAULT_CHAIN_ID: u64 = 8453;

const DEFAULT_VAULT_BATCHER: Address = address!("3b1fCaa16D71b8e7ec8b4bbbd7C9b2DaedFffF4B");
const DEFAULT_ACTIVATION_BATCHER: Address = address!("9dD6Eb5E6a72Ba4287AaeCeAEe404373f2a9cF66");
const DEFAULT_PERMIT: Address = address!("000000000022D473030F116dDEE9F6B43aC78BA3");
const DEFAULT_CODE_STORE: Address = address!("1c7E5A8d3f1F5a6cD09e9B2a4E89F7b031C2Ae11");
const DEFAULT_PROTOCOL_TREASURY: Address = address!("7aF9aB2dD9f4C33E3dC1e2A6E4C9410bAA2e7755");
const DEFAULT_ACCOUNT_FACTORY: Address = address!("0BA5ED0c6AA8c49038F819E587E2633c4A9F428a");

const DEFAULT_VAULT_CODE_HASH: B256 =
    b256!("8f9a3c0d2be11a6a5a7ce2d1f4a9b83676c2e9b1d05f4c7ae8d90b341ce6aa02");
const DEFAULT_BURN_ROUTER_CODE_ID: B256 =
    b256!("b54a29e7c8e70f5cf2d4a1b7e93c88a05d2f6e11c49ab07318d5e6f2a0c41d9e");
const DEFAULT_PAYOUT_ROUTER_CODE_ID: B256 =
    b256!("27c3f0a9815dd4b6ae2f9c07d65e14b8fa30c2d791e85b6470a1d3c8e52f7b04");

/// Errors that can occur when validating config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config validation failed: {0}")]
    Validation(String),

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Pinned protocol addresses and identifiers the policy validates against.
#[derive(Debug, Clone)]
pub struct ProtocolAddresses {
    /// The only entry point sponsorship is extended to.
    pub entry_point: Address,
    /// The only chain id sponsorship is extended to.
    pub chain_id: u64,
    /// Orchestrator for the staged vault deployment flows.
    pub vault_batcher: Address,
    /// Orchestrator for vault activation.
    pub activation_batcher: Address,
    /// Permit-style delegated-transfer contract.
    pub permit: Address,
    /// Byte-code store backing deterministic deployments.
    pub code_store: Address,
    /// Fixed protocol fee recipient referenced by burn-router constructors.
    pub protocol_treasury: Address,
    /// Account factories accepted in counterfactual init code.
    pub account_factories: Vec<Address>,
    /// Expected keccak hash of the vault's runtime code.
    pub vault_code_hash: B256,
    /// Code-store id of the burn router.
    pub burn_router_code_id: B256,
    /// Code-store id of the payout router.
    pub payout_router_code_id: B256,
}

impl Default for ProtocolAddresses {
    fn default() -> Self {
        Self {
            entry_point: DEFAULT_ENTRY_POINT,
            chain_id: DEFAULT_CHAIN_ID,
            vault_batcher: DEFAULT_VAULT_BATCHER,
            activation_batcher: DEFAULT_ACTIVATION_BATCHER,
            permit: DEFAULT_PERMIT,
            code_store: DEFAULT_CODE_STORE,
            protocol_treasury: DEFAULT_PROTOCOL_TREASURY,
            account_factories: vec![DEFAULT_ACCOUNT_FACTORY],
            vault_code_hash: DEFAULT_VAULT_CODE_HASH,
            burn_router_code_id: DEFAULT_BURN_ROUTER_CODE_ID,
            payout_router_code_id: DEFAULT_PAYOUT_ROUTER_CODE_ID,
        }
    }
}

/// Gateway CLI arguments.
#[derive(Debug, Clone, clap::Args)]
#[command(next_help_heading = "Sponsorship Gateway")]
pub struct GatewayArgs {
    /// Address and port to listen on.
    #[arg(long, env = "SPONSOR_GATEWAY_LISTEN_ADDR", default_value = "0.0.0.0:8547")]
    pub listen_addr: SocketAddr,

    /// Read-only chain node URL.
    #[arg(long, env = "SPONSOR_GATEWAY_NODE_URL")]
    pub node_url: String,

    /// Sponsorship backend URL accepted requests are forwarded to.
    #[arg(long, env = "SPONSOR_GATEWAY_SPONSOR_URL")]
    pub sponsor_url: String,

    /// Secret for verifying deploy-session token signatures.
    #[arg(long, env = "SPONSOR_GATEWAY_SESSION_SECRET", hide_env_values = true)]
    pub session_secret: String,

    /// Creator allowlist file, one address per line.
    #[arg(long, env = "SPONSOR_GATEWAY_ALLOWLIST_FILE")]
    pub allowlist_file: Option<PathBuf>,

    /// Rate limit window in seconds.
    #[arg(long, default_value_t = 60)]
    pub rate_limit_window_secs: u64,

    /// Maximum validated operations per actor per window.
    #[arg(long, default_value_t = 50)]
    pub rate_limit_max_requests: u32,

    /// Port to serve Prometheus metrics on (disabled when unset).
    #[arg(long, env = "SPONSOR_GATEWAY_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Pinned entry point address.
    #[arg(long, default_value_t = DEFAULT_ENTRY_POINT)]
    pub entry_point: Address,

    /// Pinned chain id.
    #[arg(long, default_value_t = DEFAULT_CHAIN_ID)]
    pub chain_id: u64,

    /// Vault batcher orchestrator address.
    #[arg(long, default_value_t = DEFAULT_VAULT_BATCHER)]
    pub vault_batcher: Address,

    /// Activation batcher orchestrator address.
    #[arg(long, default_value_t = DEFAULT_ACTIVATION_BATCHER)]
    pub activation_batcher: Address,

    /// Permit-style delegated-transfer contract address.
    #[arg(long, default_value_t = DEFAULT_PERMIT)]
    pub permit: Address,

    /// Byte-code store contract address.
    #[arg(long, default_value_t = DEFAULT_CODE_STORE)]
    pub code_store: Address,

    /// Protocol treasury address.
    #[arg(long, default_value_t = DEFAULT_PROTOCOL_TREASURY)]
    pub protocol_treasury: Address,

    /// Accepted account factory. Can be specified multiple times.
    #[arg(long = "account-factory")]
    pub account_factories: Vec<Address>,

    /// Expected keccak hash of the vault runtime code.
    #[arg(long, default_value_t = DEFAULT_VAULT_CODE_HASH)]
    pub vault_code_hash: B256,
}

impl GatewayArgs {
    /// Validates the arguments into an immutable config.
    pub fn validate(&self) -> Result<GatewayConfig, ConfigError> {
        let node_url = Url::parse(&self.node_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.node_url.clone(),
            reason: e.to_string(),
        })?;

        let sponsor_url = Url::parse(&self.sponsor_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.sponsor_url.clone(),
            reason: e.to_string(),
        })?;

        if self.session_secret.trim().is_empty() {
            return Err(ConfigError::Validation(
                "--session-secret cannot be empty".to_string(),
            ));
        }

        if self.rate_limit_max_requests == 0 {
            return Err(ConfigError::Validation(
                "--rate-limit-max-requests must be at least 1".to_string(),
            ));
        }

        let account_factories = if self.account_factories.is_empty() {
            vec![DEFAULT_ACCOUNT_FACTORY]
        } else {
            self.account_factories.clone()
        };

        Ok(GatewayConfig {
            listen_addr: self.listen_addr,
            node_url,
            sponsor_url,
            session_secret: self.session_secret.clone().into_bytes(),
            allowlist_file: self.allowlist_file.clone(),
            rate_limit: RateLimitConfig {
                window: Duration::from_secs(self.rate_limit_window_secs),
                max_requests: self.rate_limit_max_requests,
            },
            metrics_port: self.metrics_port,
            contracts: ProtocolAddresses {
                entry_point: self.entry_point,
                chain_id: self.chain_id,
                vault_batcher: self.vault_batcher,
                activation_batcher: self.activation_batcher,
                permit: self.permit,
                code_store: self.code_store,
                protocol_treasury: self.protocol_treasury,
                account_factories,
                vault_code_hash: self.vault_code_hash,
                burn_router_code_id: DEFAULT_BURN_ROUTER_CODE_ID,
                payout_router_code_id: DEFAULT_PAYOUT_ROUTER_CODE_ID,
            },
        })
    }
}

/// Complete validated configuration for the gateway service.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    pub node_url: Url,
    pub sponsor_url: Url,
    pub session_secret: Vec<u8>,
    pub allowlist_file: Option<PathBuf>,
    pub rate_limit: RateLimitConfig,
    pub metrics_port: Option<u16>,
    pub contracts: ProtocolAddresses,
}
