pub mod drawdown;
pub mod kelly;
pub mod limits;
pub mod sharpe;
pub mod var;

use serde_json::Value;

use crate::calc_tools::rpc::{ToolError, ToolResult, INVALID_PARAMS};

pub fn catalog() -> Vec<Value> {
    vec![
        kelly::schema(),
        var::schema(),
        limits::schema(),
        sharpe::schema(),
        drawdown::schema(),
    ]
}

pub fn dispatch(name: &str, arguments: &Value) -> ToolResult {
    match name {
        "calculate_position_size" => kelly::call(arguments),
        "calculate_var" => var::call(arguments),
        "check_portfolio_limits" => limits::call(arguments),
        "calculate_sharpe" => sharpe::call(arguments),
        "calculate_drawdown" => drawdown::call(arguments),
        other => Err(ToolError { code: INVALID_PARAMS, message: format!("unknown tool: {other}") }),
    }
}
