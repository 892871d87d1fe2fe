//! HTTP API driven through the axum router in-process.

use std::time::Duration;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use recycle_chain::api::router;
use recycle_chain::{block_hash, valid_proof, Block, Ledger, Node, PowParams, Resolver, TokenConfig, TokenLedger};

fn test_node() -> Node {
    let tokens = TokenLedger::new(TokenConfig {
        pow: PowParams::with_difficulty(2),
        ..TokenConfig::default()
    });
    Node::new(
        Ledger::new(PowParams::with_difficulty(2)),
        tokens,
        Resolver::new(Duration::from_secs(1)).unwrap(),
    )
}

async fn call(node: &Node, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = router(node.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn test_genesis_chain_endpoint() {
    let node = test_node();
    let (status, body) = call(&node, "GET", "/chain", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["length"], 1);
    assert_eq!(body["chain"][0]["index"], 1);
    assert_eq!(body["chain"][0]["previous_hash"], "1");
    assert_eq!(body["chain"][0]["proof"], 100);
    assert_eq!(body["chain"][0]["transactions"], json!([]));

    let (status, body) = call(&node, "GET", "/chain/validate", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "is_valid": true, "chain_length": 1 }));
}

#[tokio::test]
async fn test_custody_flow_submit_mine_history() {
    let node = test_node();
    let tx = json!({
        "sender": "collector-7",
        "recipient": "dismantler-2",
        "transaction_type": "handover",
        "status": "collected",
        "ewaste_items": [{
            "item_id": "laptop-42",
            "type": "laptop",
            "weight": 100.0,
            "components": ["METALS"],
            "manufacturer": "Acme",
            "year": 2019
        }]
    });
    let (status, body) = call(&node, "POST", "/transactions/new", Some(tx)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["block_index"], 2);

    let (status, body) = call(&node, "GET", "/mine?miner_address=miner-1", None).await;
    assert_eq!(status, StatusCode::OK);
    let block: Block = serde_json::from_value(body["block"].clone()).unwrap();
    assert_eq!(block.index, 2);
    assert_eq!(block.transactions[0].reward, 100.0);
    let genesis = &node.ledger.chain()[0];
    assert!(valid_proof(100, block.proof, &block_hash(genesis), 2));

    let (status, body) = call(&node, "GET", "/ewaste/laptop-42/history", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["history"][0]["status"], "collected");
    assert_eq!(body["history"][0]["handler"], "collector-7");
    assert_eq!(body["history"][0]["facility"], "dismantler-2");

    let (status, _) = call(&node, "GET", "/ewaste/unknown/history", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_register_node_validation() {
    let node = test_node();
    let (status, body) = call(&node, "POST", "/nodes/register", Some(json!({ "address": "http://10.0.0.5:5000" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_nodes"], 1);
    assert_eq!(body["nodes"], json!(["10.0.0.5:5000"]));

    let (status, body) = call(&node, "POST", "/nodes/register", Some(json!({ "address": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("invalid node address"));
    assert_eq!(node.resolver.nodes().len(), 1);
}

#[tokio::test]
async fn test_rewards_endpoint() {
    let node = test_node();
    let items = json!({ "ewaste_items": [{
        "item_id": "c1", "type": "cable", "weight": 10.0,
        "components": ["Aluminum", "Copper"], "manufacturer": "", "year": 2020
    }]});
    let (status, body) = call(&node, "POST", "/rewards", Some(items)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reward"], 0.0);
    assert_eq!(body["environmental_impact"]["energy_saved"], 7.5);
    assert_eq!(body["environmental_impact"]["materials_recovered"]["Copper"], 5.0);
}

#[tokio::test]
async fn test_token_endpoints() {
    let node = test_node();
    let (status, body) = call(&node, "POST", "/tokens/credit", Some(json!({ "address": "alice", "amount": 40.0 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 40.0);

    let (status, body) = call(
        &node,
        "POST",
        "/tokens/transfer",
        Some(json!({ "sender": "alice", "recipient": "bob", "amount": 15.0, "memo": "dropoff" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recipient"], "bob");
    assert_eq!(body["memo"], "dropoff");
    assert_eq!(body["transaction_hash"].as_str().unwrap().len(), 64);

    let (status, body) = call(
        &node,
        "POST",
        "/tokens/transfer",
        Some(json!({ "sender": "alice", "recipient": "bob", "amount": 0.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("positive"));

    let (_, body) = call(&node, "GET", "/tokens/balance/bob", None).await;
    assert_eq!(body["balance"], 15.0);
    assert!(body["locked_until"].is_string());
    let (_, body) = call(&node, "GET", "/tokens/balance/nobody", None).await;
    assert_eq!(body["balance"], 0.0);

    let (status, body) = call(&node, "GET", "/tokens/transactions/alice?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}
