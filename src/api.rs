//! HTTP surface of a node (axum). `GET /chain` doubles as the peer
//! contract consumed by [`crate::consensus::Resolver`].

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::chain::LedgerError;
use crate::consensus::{ChainResponse, InvalidNodeAddress};
use crate::ewaste::{EWasteItem, EWasteStatus};
use crate::impact::{calculate_rewards, compute_environmental_impact};
use crate::node::Node;
use crate::pow::PowError;
use crate::token::{TokenError, TokenTransaction};

const DEFAULT_TX_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    InvalidNode(#[from] InvalidNodeAddress),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("{0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidNode(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Token(e) if e.is_domain_error() => StatusCode::BAD_REQUEST,
            ApiError::Token(TokenError::Pow(PowError::Cancelled))
            | ApiError::Ledger(LedgerError::Pow(PowError::Cancelled)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Token(_) | ApiError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[derive(Deserialize)]
struct NodeRegistration {
    address: String,
}

#[derive(Deserialize)]
struct TransactionRequest {
    sender: String,
    recipient: String,
    #[serde(default)]
    ewaste_items: Vec<EWasteItem>,
    #[serde(alias = "type")]
    transaction_type: String,
    status: EWasteStatus,
}

#[derive(Deserialize)]
struct MineParams {
    miner_address: String,
}

#[derive(Deserialize)]
struct RewardsRequest {
    ewaste_items: Vec<EWasteItem>,
}

#[derive(Deserialize)]
struct TransferRequest {
    sender: String,
    recipient: String,
    amount: f64,
    memo: Option<String>,
}

#[derive(Deserialize)]
struct CreditRequest {
    address: String,
    amount: f64,
}

#[derive(Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

async fn full_chain(State(node): State<Node>) -> Json<ChainResponse> {
    Json(ChainResponse::new(node.ledger.chain()))
}

async fn validate_chain(State(node): State<Node>) -> Json<Value> {
    let chain = node.ledger.chain();
    Json(json!({
        "is_valid": node.ledger.valid_chain(&chain),
        "chain_length": chain.len(),
    }))
}

async fn register_node(
    State(node): State<Node>,
    Json(req): Json<NodeRegistration>,
) -> Result<Json<Value>, ApiError> {
    node.resolver.register_node(&req.address)?;
    let nodes = node.resolver.nodes();
    Ok(Json(json!({
        "message": "Node registered successfully",
        "total_nodes": nodes.len(),
        "nodes": nodes,
    })))
}

async fn resolve_nodes(State(node): State<Node>) -> Json<Value> {
    let replaced = node.resolver.resolve_conflicts(&node.ledger).await;
    let chain = node.ledger.chain();
    let message = if replaced {
        "Our chain was replaced"
    } else {
        "Our chain is authoritative"
    };
    Json(json!({
        "message": message,
        "replaced": replaced,
        "length": chain.len(),
        "chain": chain,
    }))
}

async fn new_transaction(
    State(node): State<Node>,
    Json(req): Json<TransactionRequest>,
) -> (StatusCode, Json<Value>) {
    let index = node.ledger.add_transaction(
        &req.sender,
        &req.recipient,
        req.ewaste_items,
        &req.transaction_type,
        req.status,
    );
    (
        StatusCode::CREATED,
        Json(json!({
            "message": format!("Transaction will be added to block {index}"),
            "block_index": index,
        })),
    )
}

async fn mine(
    State(node): State<Node>,
    Query(params): Query<MineParams>,
) -> Result<Json<Value>, ApiError> {
    let block = node.ledger.mine_block(&params.miner_address).await?;
    Ok(Json(json!({ "message": "New block mined", "block": block })))
}

async fn item_history(
    State(node): State<Node>,
    Path(item_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let history = node.ledger.get_ewaste_history(&item_id);
    if history.is_empty() {
        return Err(ApiError::NotFound(format!("no history for item {item_id}")));
    }
    Ok(Json(json!({ "item_id": item_id, "history": history })))
}

async fn rewards(Json(req): Json<RewardsRequest>) -> Json<Value> {
    Json(json!({
        "reward": calculate_rewards(&req.ewaste_items),
        "environmental_impact": compute_environmental_impact(&req.ewaste_items),
    }))
}

async fn transfer(
    State(node): State<Node>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<TokenTransaction>, ApiError> {
    let tx = node
        .tokens
        .transfer(&req.sender, &req.recipient, req.amount, req.memo)
        .await?;
    Ok(Json(tx))
}

async fn credit(
    State(node): State<Node>,
    Json(req): Json<CreditRequest>,
) -> Result<Json<Value>, ApiError> {
    let balance = node.tokens.credit(&req.address, req.amount)?;
    Ok(Json(json!({ "address": req.address, "balance": balance })))
}

async fn balance(State(node): State<Node>, Path(address): Path<String>) -> Json<Value> {
    let balance = node.tokens.balance(&address).unwrap_or(0.0);
    Json(json!({
        "address": address,
        "balance": balance,
        "locked_until": node.tokens.locked_until(&address),
    }))
}

async fn token_transactions(
    State(node): State<Node>,
    Path(address): Path<String>,
    Query(params): Query<LimitParams>,
) -> Json<Vec<TokenTransaction>> {
    let limit = params.limit.unwrap_or(DEFAULT_TX_LIMIT);
    Json(node.tokens.transactions_for(&address, limit))
}

pub fn router(node: Node) -> Router {
    Router::new()
        .route("/chain", get(full_chain))
        .route("/chain/validate", get(validate_chain))
        .route("/nodes/register", post(register_node))
        .route("/nodes/resolve", get(resolve_nodes))
        .route("/transactions/new", post(new_transaction))
        .route("/mine", get(mine))
        .route("/ewaste/:item_id/history", get(item_history))
        .route("/rewards", post(rewards))
        .route("/tokens/transfer", post(transfer))
        .route("/tokens/credit", post(credit))
        .route("/tokens/balance/:address", get(balance))
        .route("/tokens/transactions/:address", get(token_transactions))
        .with_state(node)
}

/// Serve `node` on an already bound listener until the task is dropped.
pub async fn serve(node: Node, listener: TcpListener) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP API listening");
    }
    axum::serve(listener, router(node)).await
}
