//! HTTP-level tests against an ephemeral gateway instance.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{address, bytes, Address, U256};
use alloy_sol_types::{SolCall, SolValue};
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};

use sponsor_gateway::contracts::{CreatorToken, SmartAccount, VaultBatcher};
use sponsor_gateway::policy::PolicyValidator;
use sponsor_gateway::rate_limit::{FixedWindowRateLimit, RateLimitConfig};
use sponsor_gateway::session::SessionResolver;
use sponsor_gateway::testing::{InMemorySessionStore, MockChainReader};
use sponsor_gateway::{
    Metrics, OwnershipVerifier, ProtocolAddresses, Server, SponsorClient, SponsorshipEngine,
    StaticAllowlist, SESSION_ADDRESS_HEADER,
};

const SESSION_ADDR: Address = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
const SENDER: Address = address!("cccccccccccccccccccccccccccccccccccccccc");
const TOKEN: Address = address!("9999999999999999999999999999999999999999");

async fn spawn_upstream() -> SocketAddr {
    let router = Router::new().route(
        "/",
        post(|| async { axum::Json(json!({"jsonrpc": "2.0", "id": 1, "result": {"sponsored": true}})) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn spawn_gateway(upstream: SocketAddr) -> (SocketAddr, Arc<MockChainReader>) {
    let contracts = ProtocolAddresses::default();
    let chain = Arc::new(MockChainReader::default());

    chain.set_code(SENDER, bytes!("60806040"));
    chain.set_call(
        SENDER,
        SmartAccount::isOwnerAddressCall {
            account: SESSION_ADDR,
        }
        .abi_encode(),
        true.abi_encode(),
    );

    let engine = Arc::new(SponsorshipEngine::new(
        PolicyValidator::new(contracts.clone()),
        OwnershipVerifier::new(contracts.account_factories.clone()),
        SessionResolver::new(
            b"server-test-secret".to_vec(),
            Arc::new(InMemorySessionStore::default()),
        ),
        FixedWindowRateLimit::new(RateLimitConfig {
            window: Duration::from_secs(60),
            max_requests: 50,
        }),
        Arc::new(StaticAllowlist::new([TOKEN])),
        chain.clone(),
    ));

    let server = Server::new(
        "127.0.0.1:0".parse().unwrap(),
        engine,
        SponsorClient::new(format!("http://{upstream}/").parse().unwrap()),
        Arc::new(Metrics::default()),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = server.router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (addr, chain)
}

fn phase1_body(contracts: &ProtocolAddresses) -> Value {
    let call_data = SmartAccount::executeBatchCall {
        calls: vec![
            SmartAccount::Call {
                target: contracts.vault_batcher,
                value: U256::ZERO,
                data: VaultBatcher::deployPhase1Call {
                    owner: SENDER,
                    creatorToken: TOKEN,
                }
                .abi_encode()
                .into(),
            },
            SmartAccount::Call {
                target: TOKEN,
                value: U256::ZERO,
                data: CreatorToken::approveCall {
                    spender: contracts.vault_batcher,
                    amount: U256::MAX,
                }
                .abi_encode()
                .into(),
            },
        ],
    }
    .abi_encode();

    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_sendUserOperation",
        "params": [
            {
                "sender": SENDER.to_string(),
                "callData": format!("0x{}", hex::encode(call_data)),
            },
            contracts.entry_point.to_string(),
        ],
    })
}

#[tokio::test]
async fn healthz_answers() {
    let upstream = spawn_upstream().await;
    let (gateway, _) = spawn_gateway(upstream).await;

    let response = reqwest::get(format!("http://{gateway}/healthz"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn unknown_method_is_refused_without_chain_reads() {
    let upstream = spawn_upstream().await;
    let (gateway, chain) = spawn_gateway(upstream).await;

    let response: Value = reqwest::Client::new()
        .post(format!("http://{gateway}/"))
        .json(&json!({"jsonrpc": "2.0", "id": 9, "method": "eth_call", "params": []}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(response["error"]["code"], -32601);
    assert_eq!(response["id"], 9);
    assert_eq!(chain.reads(), 0);
}

#[tokio::test]
async fn non_json_body_is_a_parse_error() {
    let upstream = spawn_upstream().await;
    let (gateway, _) = spawn_gateway(upstream).await;

    let response: Value = reqwest::Client::new()
        .post(format!("http://{gateway}/"))
        .body("not json at all")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(response["error"]["code"], -32700);
}

#[tokio::test]
async fn missing_session_is_denied() {
    let upstream = spawn_upstream().await;
    let (gateway, _) = spawn_gateway(upstream).await;

    let response: Value = reqwest::Client::new()
        .post(format!("http://{gateway}/"))
        .json(&phase1_body(&ProtocolAddresses::default()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(response["error"]["code"], -32001);
    assert_eq!(response["error"]["data"], "no_session");
}

#[tokio::test]
async fn authorized_request_is_forwarded() {
    let upstream = spawn_upstream().await;
    let (gateway, _) = spawn_gateway(upstream).await;

    let response = reqwest::Client::new()
        .post(format!("http://{gateway}/"))
        .header(SESSION_ADDRESS_HEADER, SESSION_ADDR.to_string())
        .json(&phase1_body(&ProtocolAddresses::default()))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["sponsored"], true);
}

#[tokio::test]
async fn pass_through_method_is_forwarded_without_session() {
    let upstream = spawn_upstream().await;
    let (gateway, chain) = spawn_gateway(upstream).await;

    let response: Value = reqwest::Client::new()
        .post(format!("http://{gateway}/"))
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "eth_getUserOperationReceipt",
            "params": ["0xabc123"],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(response["result"]["sponsored"], true);
    assert_eq!(chain.reads(), 0);
}

#[tokio::test]
async fn unreachable_upstream_is_a_bad_gateway() {
    // A bound-then-dropped listener leaves a port with nothing behind it.
    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let (gateway, _) = spawn_gateway(dead_addr).await;

    let response = reqwest::Client::new()
        .post(format!("http://{gateway}/"))
        .header(SESSION_ADDRESS_HEADER, SESSION_ADDR.to_string())
        .json(&phase1_body(&ProtocolAddresses::default()))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32010);
}
