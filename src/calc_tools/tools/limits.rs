// =============================================================================
// check_portfolio_limits — exposure, concentration, drawdown checks
// =============================================================================

use serde_json::{json, Value};

use crate::calc_tools::rpc::{coerce_f64_opt, require_str, ToolError, ToolResult};

pub fn schema() -> Value {
    json!({
        "name": "check_portfolio_limits",
        "description": "Checks a proposed trade against portfolio exposure and concentration limits.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "current_positions": {"type": "array", "items": {"type": "object"}},
                "new_trade": {"type": "object"},
                "limits": {"type": "object"}
            },
            "required": ["current_positions", "new_trade", "limits"]
        }
    })
}

struct PositionEntry {
    symbol: String,
    value: f64,
}

pub fn call(params: &Value) -> ToolResult {
    let positions_raw = params
        .get("current_positions")
        .and_then(Value::as_array)
        .ok_or_else(|| ToolError::invalid_params("current_positions must be an array"))?;

    let mut positions = Vec::with_capacity(positions_raw.len());
    for (i, p) in positions_raw.iter().enumerate() {
        let symbol = require_str(p, "symbol")
            .map_err(|_| ToolError::invalid_params(format!("current_positions[{i}].symbol is required")))?
            .to_string();
        let value = coerce_f64_opt(p, "value")?
            .ok_or_else(|| ToolError::invalid_params(format!("current_positions[{i}].value is required")))?;
        positions.push(PositionEntry { symbol, value });
    }

    let trade = params
        .get("new_trade")
        .ok_or_else(|| ToolError::invalid_params("new_trade is required"))?;
    let trade_symbol = require_str(trade, "symbol")?.to_string();
    let side = require_str(trade, "side")?;
    let quantity = coerce_f64_opt(trade, "quantity")?
        .ok_or_else(|| ToolError::invalid_params("new_trade.quantity is required"))?;
    let price = coerce_f64_opt(trade, "price")?
        .ok_or_else(|| ToolError::invalid_params("new_trade.price is required"))?;

    if quantity <= 0.0 {
        return Err(ToolError::invalid_params("new_trade.quantity must be > 0"));
    }
    if price <= 0.0 {
        return Err(ToolError::invalid_params("new_trade.price must be > 0"));
    }

    let signed_value = match side {
        "buy" => quantity * price,
        "sell" => -(quantity * price),
        other => return Err(ToolError::invalid_params(format!("new_trade.side must be buy or sell, got {other}"))),
    };

    let limits = params
        .get("limits")
        .ok_or_else(|| ToolError::invalid_params("limits is required"))?;
    let max_exposure = coerce_f64_opt(limits, "max_exposure")?;
    let max_concentration = coerce_f64_opt(limits, "max_concentration")?;
    if let Some(c) = max_concentration {
        if !(c > 0.0 && c <= 1.0) {
            return Err(ToolError::invalid_params("limits.max_concentration must be in (0,1]"));
        }
    }
    let max_drawdown = coerce_f64_opt(limits, "max_drawdown")?;

    let total_before: f64 = positions.iter().map(|p| p.value).sum();
    let projected_total = total_before + signed_value;

    let mut found = false;
    let mut projected_symbol_aggregate = 0.0;
    for p in &positions {
        if p.symbol == trade_symbol {
            found = true;
            projected_symbol_aggregate = p.value + signed_value;
        }
    }
    if !found {
        projected_symbol_aggregate = signed_value;
    }

    let mut violations: Vec<Value> = Vec::new();

    if let Some(max_exposure) = max_exposure {
        if projected_total.abs() > max_exposure {
            violations.push(json!({
                "rule": "max_exposure",
                "limit": max_exposure,
                "projected": projected_total,
            }));
        }
    }

    if let Some(max_concentration) = max_concentration {
        let largest = positions
            .iter()
            .map(|p| if p.symbol == trade_symbol { projected_symbol_aggregate.abs() } else { p.value.abs() })
            .fold(projected_symbol_aggregate.abs(), f64::max);
        if projected_total.abs() > 0.0 {
            let concentration = largest / projected_total.abs();
            if concentration > max_concentration {
                violations.push(json!({
                    "rule": "max_concentration",
                    "limit": max_concentration,
                    "projected": concentration,
                }));
            }
        }
    }

    if max_drawdown.is_some() {
        violations.push(json!({
            "rule": "max_drawdown",
            "violated": false,
            "note": "drawdown check requires historical equity data; not evaluated here",
        }));
    }

    let hard_violations = violations.iter().filter(|v| v["violated"] != json!(false)).count();

    Ok(json!({
        "approved": hard_violations == 0,
        "projected_total_exposure": projected_total,
        "projected_symbol_exposure": projected_symbol_aggregate,
        "violations": violations,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn approves_trade_within_limits() {
        let params = json!({
            "current_positions": [{"symbol": "BTCUSDT", "value": 1000.0}],
            "new_trade": {"symbol": "ETHUSDT", "side": "buy", "quantity": 1.0, "price": 500.0},
            "limits": {"max_exposure": 5000.0, "max_concentration": 0.9}
        });
        let result = call(&params).unwrap();
        assert_eq!(result["approved"], true);
    }

    #[test]
    fn flags_exposure_violation() {
        let params = json!({
            "current_positions": [{"symbol": "BTCUSDT", "value": 4000.0}],
            "new_trade": {"symbol": "ETHUSDT", "side": "buy", "quantity": 10.0, "price": 500.0},
            "limits": {"max_exposure": 5000.0}
        });
        let result = call(&params).unwrap();
        assert_eq!(result["approved"], false);
    }

    #[test]
    fn rejects_non_positive_quantity() {
        let params = json!({
            "current_positions": [],
            "new_trade": {"symbol": "ETHUSDT", "side": "buy", "quantity": 0.0, "price": 500.0},
            "limits": {}
        });
        assert!(call(&params).is_err());
    }
}
