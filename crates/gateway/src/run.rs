//! Service wiring and lifecycle.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::allowlist::{CreatorAllowlist, StaticAllowlist};
use crate::chain::NodeChainReader;
use crate::config::GatewayConfig;
use crate::engine::SponsorshipEngine;
use crate::metrics::Metrics;
use crate::ownership::OwnershipVerifier;
use crate::policy::PolicyValidator;
use crate::rate_limit::FixedWindowRateLimit;
use crate::server::Server;
use crate::session::{DeploySessionStore, InMemorySessionStore, SessionResolver};
use crate::upstream::SponsorClient;

/// Wrapper for the gateway entry point.
#[derive(Debug)]
pub struct GatewayRunner;

impl GatewayRunner {
    /// Runs the gateway with the given configuration.
    ///
    /// Sets up metrics, the chain reader, the authorization engine, and the
    /// HTTP server with graceful shutdown handling. Returns when the service
    /// terminates.
    ///
    /// The deploy-session store starts empty, so this wiring is SIWE-only:
    /// deploy-session tokens resolve only when the issuing collaborator
    /// shares a store handle via [`run_with_store`].
    ///
    /// [`run_with_store`]: GatewayRunner::run_with_store
    pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
        info!("no deploy-session store wired, deploy-session credentials will not resolve");
        Self::run_with_store(config, Arc::new(InMemorySessionStore::default())).await
    }

    /// Runs with an externally managed deploy-session store.
    pub async fn run_with_store(
        config: GatewayConfig,
        session_store: Arc<dyn DeploySessionStore>,
    ) -> anyhow::Result<()> {
        if let Some(port) = config.metrics_port {
            let metrics_addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

            info!(address = %metrics_addr, "starting metrics server");

            PrometheusBuilder::new()
                .with_http_listener(metrics_addr)
                .install()?;
        }

        let allowlist: Arc<dyn CreatorAllowlist> = match &config.allowlist_file {
            Some(path) => {
                let allowlist = StaticAllowlist::from_file(path)?;
                info!(path = %path.display(), entries = allowlist.len(), "loaded creator allowlist");
                Arc::new(allowlist)
            }
            None => {
                // No file means no approved creators; the gate fails closed.
                info!("no allowlist file configured, all creators denied");
                Arc::new(StaticAllowlist::default())
            }
        };

        let chain = Arc::new(NodeChainReader::new(config.node_url.clone()));
        let engine = Arc::new(SponsorshipEngine::new(
            PolicyValidator::new(config.contracts.clone()),
            OwnershipVerifier::new(config.contracts.account_factories.clone()),
            SessionResolver::new(config.session_secret.clone(), session_store),
            FixedWindowRateLimit::new(config.rate_limit),
            allowlist,
            chain,
        ));

        let server = Server::new(
            config.listen_addr,
            engine,
            SponsorClient::new(config.sponsor_url.clone()),
            Arc::new(Metrics::default()),
        );

        let token = CancellationToken::new();
        let server_token = token.clone();
        let server_task = tokio::spawn(async move { server.listen(server_token).await });

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        tokio::select! {
            result = server_task => {
                info!("server task terminated");
                token.cancel();
                result??;
            },
            _ = interrupt.recv() => {
                info!("process interrupted, shutting down");
                token.cancel();
            }
            _ = terminate.recv() => {
                info!("process terminated, shutting down");
                token.cancel();
            }
        }

        Ok(())
    }
}
