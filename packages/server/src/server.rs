//! Line-delimited JSON-RPC loop.
//!
//! Requests are read one per line. `tools/call` runs on its own task so a
//! slow remote call does not hold up the others; every response goes
//! through one channel to a single writer, so output lines never
//! interleave. Responses to concurrent calls may arrive out of order and
//! are matched by id.

use std::str::FromStr as _;
use std::sync::Arc;

use azubiheft_server_models::{
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, InitializeResult, JsonRpcRequest, JsonRpcResponse,
    METHOD_NOT_FOUND, PARSE_ERROR, PROTOCOL_VERSION, ServerCapabilities, ServerInfo,
    ToolCallParams, ToolList, ToolName, tool_definitions,
};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt as _, AsyncRead, AsyncWrite, AsyncWriteExt as _, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::service::AzubiheftService;

/// Name announced in the `initialize` response.
pub const SERVER_NAME: &str = "azubiheft-mcp";

/// Serves requests from `reader` until EOF, writing responses to `writer`.
///
/// On EOF, calls still in flight are awaited and their responses written
/// before returning. Reading stops early once the writer has failed.
///
/// # Errors
///
/// Returns an I/O error if reading the input or writing the output fails.
pub async fn serve<R, W>(
    service: Arc<AzubiheftService>,
    reader: R,
    writer: W,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
    let writer_task = tokio::spawn(write_responses(writer, rx));

    let mut calls = JoinSet::new();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let next = tokio::select! {
            next = lines.next_line() => next?,
            () = tx.closed() => {
                log::warn!("Output closed, no longer reading input");
                break;
            }
        };
        let Some(line) = next else {
            break;
        };
        reap_finished(&mut calls);

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match decode(line) {
            Ok(request) if request.method == "tools/call" => {
                let service = service.clone();
                let tx = tx.clone();
                calls.spawn(async move {
                    let Some(response) = call_tool(&service, request.id, request.params).await
                    else {
                        return;
                    };
                    if tx.send(response).is_err() {
                        log::warn!("Output closed, dropping tool call response");
                    }
                });
                continue;
            }
            Ok(request) => handle(&request),
            Err(response) => Some(response),
        };

        let Some(response) = response else {
            continue;
        };
        if tx.send(response).is_err() {
            log::warn!("Output closed, no longer reading input");
            break;
        }
    }

    log::debug!("Waiting for {} in-flight calls", calls.len());
    while let Some(joined) = calls.join_next().await {
        log_join_failure(joined);
    }

    drop(tx);
    writer_task
        .await
        .map_err(|e| std::io::Error::other(format!("writer task failed: {e}")))?
}

/// Joins every call that has already finished without waiting for the
/// rest. Returns how many were joined.
fn reap_finished(calls: &mut JoinSet<()>) -> usize {
    let mut joined = 0;
    while let Some(result) = calls.try_join_next() {
        log_join_failure(result);
        joined += 1;
    }
    joined
}

fn log_join_failure(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        log::error!("Tool call task failed: {e}");
    }
}

/// Parses one line. Malformed input yields the error response to send.
fn decode(line: &str) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let value: Value = serde_json::from_str(line).map_err(|e| {
        log::warn!("Unparseable input line: {e}");
        JsonRpcResponse::failure(Value::Null, PARSE_ERROR, format!("Parse error: {e}"))
    })?;

    let id = value.get("id").cloned();
    serde_json::from_value::<JsonRpcRequest>(value).map_err(|e| {
        JsonRpcResponse::failure(
            id.unwrap_or(Value::Null),
            INVALID_REQUEST,
            format!("Invalid request: {e}"),
        )
    })
}

/// Handles every method except `tools/call`. Notifications get no
/// response.
fn handle(request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
    if request.is_notification() {
        log::debug!("Notification {}", request.method);
        return None;
    }
    let id = request.id.clone().unwrap_or(Value::Null);

    let response = match request.method.as_str() {
        "initialize" => to_response(
            id,
            &InitializeResult {
                protocol_version: PROTOCOL_VERSION.to_string(),
                capabilities: ServerCapabilities::default(),
                server_info: ServerInfo {
                    name: SERVER_NAME.to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
            },
        ),
        "tools/list" => to_response(
            id,
            &ToolList {
                tools: tool_definitions(),
            },
        ),
        "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
        other => JsonRpcResponse::failure(
            id,
            METHOD_NOT_FOUND,
            format!("Method not found: {other}"),
        ),
    };
    Some(response)
}

async fn call_tool(
    service: &AzubiheftService,
    id: Option<Value>,
    params: Option<Value>,
) -> Option<JsonRpcResponse> {
    let params: ToolCallParams = match serde_json::from_value(params.unwrap_or(Value::Null)) {
        Ok(params) => params,
        Err(e) => {
            return id.map(|id| {
                JsonRpcResponse::failure(id, INVALID_PARAMS, format!("Invalid params: {e}"))
            });
        }
    };

    let Ok(tool) = ToolName::from_str(&params.name) else {
        return id.map(|id| {
            JsonRpcResponse::failure(
                id,
                METHOD_NOT_FOUND,
                format!("Tool not found: {}", params.name),
            )
        });
    };

    let result = service.call(tool, params.arguments).await;
    id.map(|id| to_response(id, &result))
}

fn to_response(id: Value, result: &impl serde::Serialize) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::failure(id, INTERNAL_ERROR, format!("Internal error: {e}")),
    }
}

async fn write_responses<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_string(&response)?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
