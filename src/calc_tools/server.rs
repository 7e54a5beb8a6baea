// =============================================================================
// Calc Tools Server — stdio JSON-RPC event loop
// =============================================================================
//
// One request decoded, one response written, per line. Logging is wired to
// stderr exclusively (see `main` in `bin/calc_tools.rs`) so nothing but
// protocol frames ever touches stdout.
// =============================================================================

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::calc_tools::rpc::{
    RpcRequest, RpcResponse, ToolError, INVALID_PARAMS, METHOD_NOT_FOUND,
};
use crate::calc_tools::tools;

/// Reads newline-delimited JSON-RPC requests from `input`, dispatches them,
/// and writes one response line per request to `output`. Returns once
/// `input` reaches EOF.
pub async fn run<R, W>(input: R, mut output: W) -> std::io::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(input).lines();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(trimmed) {
            Ok(request) => handle(request),
            Err(_) => RpcResponse::parse_error(),
        };

        let mut serialized = serde_json::to_string(&response).unwrap_or_else(|_| {
            serde_json::to_string(&RpcResponse::err(Value::Null, -32603, "failed to serialize response")).unwrap()
        });
        serialized.push('\n');
        output.write_all(serialized.as_bytes()).await?;
        output.flush().await?;
    }

    Ok(())
}

fn handle(request: RpcRequest) -> RpcResponse {
    let id = request.id;
    match request.method.as_str() {
        "tools/list" => RpcResponse::ok(id, json!({ "tools": tools::catalog() })),
        "tools/call" => match dispatch_call(&request.params) {
            Ok(result) => RpcResponse::ok(id, result),
            Err(err) => RpcResponse::err(id, err.code, err.message),
        },
        other => RpcResponse::err(id, METHOD_NOT_FOUND, format!("method not found: {other}")),
    }
}

fn dispatch_call(params: &Value) -> Result<Value, ToolError> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError { code: INVALID_PARAMS, message: "missing required field: name".to_string() })?;
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
    tools::dispatch(name, &arguments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_method_returns_method_not_found_and_preserves_id() {
        let input = b"{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"nope\",\"params\":{}}\n".as_slice();
        let mut output = Vec::new();
        run(input, &mut output).await.unwrap();
        let response: Value = serde_json::from_slice(
            &output[..output.iter().position(|&b| b == b'\n').unwrap()],
        )
        .unwrap();
        assert_eq!(response["error"]["code"], -32601);
        assert_eq!(response["id"], 7);
    }

    #[tokio::test]
    async fn tools_call_dispatches_to_known_tool() {
        let input = br#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"calculate_position_size","arguments":{"win_rate":0.6,"avg_win":100,"avg_loss":50,"capital":10000,"kelly_fraction":0.5}}}
"#
        .as_slice();
        let mut output = Vec::new();
        run(input, &mut output).await.unwrap();
        let response: Value = serde_json::from_slice(
            &output[..output.iter().position(|&b| b == b'\n').unwrap()],
        )
        .unwrap();
        assert!((response["result"]["position_size"].as_f64().unwrap() - 1000.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn malformed_json_yields_parse_error() {
        let input = b"{not json\n".as_slice();
        let mut output = Vec::new();
        run(input, &mut output).await.unwrap();
        let response: Value = serde_json::from_slice(
            &output[..output.iter().position(|&b| b == b'\n').unwrap()],
        )
        .unwrap();
        assert_eq!(response["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn tools_list_returns_five_tools() {
        let input = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\"}\n".as_slice();
        let mut output = Vec::new();
        run(input, &mut output).await.unwrap();
        let response: Value = serde_json::from_slice(
            &output[..output.iter().position(|&b| b == b'\n').unwrap()],
        )
        .unwrap();
        assert_eq!(response["result"]["tools"].as_array().unwrap().len(), 5);
    }
}
