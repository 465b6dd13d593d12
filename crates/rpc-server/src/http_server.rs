//! HTTP JSON-RPC Server
//!
//! Provides HTTP endpoint for JSON-RPC methods.

use crate::methods::{
    handle_get_allowance, handle_get_balance, handle_get_confirmations, handle_get_health,
    handle_get_managers, handle_get_reward_per_tick, handle_get_stake, handle_get_tick,
    handle_get_total_staked, handle_send_request, RpcContext, RpcError, SendRequestRequest,
};
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// JSON-RPC request
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC response
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

/// HTTP RPC Server
pub struct HttpRpcServer {
    context: Arc<RpcContext>,
}

impl HttpRpcServer {
    /// Create a new HTTP RPC server
    pub fn new(context: Arc<RpcContext>) -> Self {
        Self { context }
    }

    /// Create the Axum router
    pub fn router(self) -> Router {
        // CORS layer to allow browser clients
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

        Router::new()
            .route("/", post(handle_rpc))
            .layer(cors)
            .with_state(self.context)
    }

    /// Run the server
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("HTTP RPC server listening on {}", addr);

        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

/// Handle JSON-RPC request
async fn handle_rpc(
    State(context): State<Arc<RpcContext>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let result = dispatch_method(&context, &request.method, request.params);

    let response = match result {
        Ok(value) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: Some(value),
            error: None,
        },
        Err(e) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: None,
            error: Some(JsonRpcError {
                code: error_code(&e),
                message: e.to_string(),
            }),
        },
    };

    (StatusCode::OK, Json(response))
}

/// Positional string parameter `index`
fn string_param<'a>(params: &'a [Value], index: usize, name: &str) -> Result<&'a str, RpcError> {
    params
        .get(index)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::InvalidParams(format!("Missing {}", name)))
}

fn to_value<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::InternalError(e.to_string()))
}

/// Dispatch to appropriate method handler
pub(crate) fn dispatch_method(ctx: &RpcContext, method: &str, params: Value) -> Result<Value, RpcError> {
    tracing::debug!("RPC method called: {}", method);
    let params: Vec<Value> = serde_json::from_value(params).unwrap_or_default();

    match method {
        "sendRequest" => {
            let request = SendRequestRequest {
                request: string_param(&params, 0, "request")?.to_string(),
            };
            to_value(handle_send_request(ctx, request)?)
        }

        "getStake" => to_value(handle_get_stake(ctx, string_param(&params, 0, "participant")?)?),

        "getTotalStaked" => Ok(json!(handle_get_total_staked(ctx)?)),

        "getRewardPerTick" => Ok(json!(handle_get_reward_per_tick(ctx)?)),

        "getBalance" => Ok(json!(handle_get_balance(ctx, string_param(&params, 0, "owner")?)?)),

        "getAllowance" => {
            let owner = string_param(&params, 0, "owner")?;
            let spender = string_param(&params, 1, "spender")?;
            Ok(json!(handle_get_allowance(ctx, owner, spender)?))
        }

        "getConfirmations" => to_value(handle_get_confirmations(ctx)?),

        "getManagers" => Ok(json!(handle_get_managers(ctx)?)),

        "getTick" => to_value(handle_get_tick(ctx)?),

        "getHealth" => Ok(json!(handle_get_health()?)),

        "getVersion" => Ok(json!({
            "tick-stake": env!("CARGO_PKG_VERSION"),
            "program-id": staking_program::id().to_string(),
        })),

        _ => Err(RpcError::MethodNotFound(method.to_string())),
    }
}

/// Map error to JSON-RPC error code
fn error_code(error: &RpcError) -> i32 {
    match error {
        RpcError::InvalidParams(_) => -32602,
        RpcError::MethodNotFound(_) => -32601,
        RpcError::InternalError(_) => -32603,
        // Application errors live in the server-defined range
        RpcError::Staking(e) => -32000 - e.code() as i32,
    }
}
