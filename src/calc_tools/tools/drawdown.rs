// =============================================================================
// calculate_drawdown — running peak/trough, recovery, underwater periods
// =============================================================================

use serde_json::{json, Value};

use crate::calc_tools::rpc::{coerce_f64_array, require_array, ToolError, ToolResult};

pub fn schema() -> Value {
    json!({
        "name": "calculate_drawdown",
        "description": "Computes maximum drawdown, recovery, and underwater statistics for an equity curve.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "equity_curve": {"type": "array", "items": {"type": "number"}, "description": "Non-empty series of equity values, all >= 0"}
            },
            "required": ["equity_curve"]
        }
    })
}

fn severity_band(max_drawdown: f64) -> &'static str {
    if max_drawdown < 0.05 {
        "low"
    } else if max_drawdown < 0.10 {
        "moderate"
    } else if max_drawdown < 0.20 {
        "high"
    } else {
        "severe"
    }
}

pub fn call(params: &Value) -> ToolResult {
    let raw_curve = require_array(params, "equity_curve")?;
    let curve = coerce_f64_array(raw_curve, "equity_curve")?;

    if curve.iter().any(|v| *v < 0.0) {
        return Err(ToolError::invalid_params("equity_curve values must be >= 0"));
    }

    let n = curve.len();
    let mut peak = curve[0];
    let mut peak_index = 0usize;
    let mut drawdowns = vec![0.0; n];
    let mut peak_at_index = vec![0usize; n];

    for (i, &equity) in curve.iter().enumerate() {
        if equity > peak {
            peak = equity;
            peak_index = i;
        }
        drawdowns[i] = if peak > 0.0 { (peak - equity) / peak } else { 0.0 };
        peak_at_index[i] = peak_index;
    }

    let (trough_index, &max_drawdown) = drawdowns
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .unwrap();
    let max_dd_peak_index = peak_at_index[trough_index];
    let duration = trough_index - max_dd_peak_index;

    let peak_value = curve[max_dd_peak_index];
    let recovery_index = curve[trough_index + 1..]
        .iter()
        .position(|&v| v >= peak_value)
        .map(|offset| trough_index + 1 + offset);
    let recovered = recovery_index.is_some();
    let recovery_duration = recovery_index.map(|r| r - trough_index);

    let current_drawdown = *drawdowns.last().unwrap();

    let underwater_count = drawdowns.iter().filter(|&&d| d > 0.0).count();
    let underwater_ratio = underwater_count as f64 / n as f64;
    let non_zero: Vec<f64> = drawdowns.iter().copied().filter(|&d| d > 0.0).collect();
    let avg_non_zero_drawdown = if non_zero.is_empty() {
        0.0
    } else {
        non_zero.iter().sum::<f64>() / non_zero.len() as f64
    };

    Ok(json!({
        "max_drawdown": max_drawdown,
        "peak_index": max_dd_peak_index,
        "trough_index": trough_index,
        "duration": duration,
        "recovered": recovered,
        "recovery_index": recovery_index,
        "recovery_duration": recovery_duration,
        "current_drawdown": current_drawdown,
        "underwater_periods": underwater_count,
        "underwater_ratio": underwater_ratio,
        "avg_non_zero_drawdown": avg_non_zero_drawdown,
        "severity": severity_band(max_drawdown),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn matches_known_scenario() {
        let params = json!({"equity_curve": [10000.0, 10500.0, 10200.0, 11000.0, 10800.0, 11500.0]});
        let result = call(&params).unwrap();
        assert!((result["max_drawdown"].as_f64().unwrap() - 0.0285714).abs() < 1e-5);
        assert_eq!(result["peak_index"], 1);
        assert_eq!(result["trough_index"], 2);
        assert_eq!(result["recovered"], true);
    }

    #[test]
    fn monotone_increasing_curve_has_zero_drawdown() {
        let params = json!({"equity_curve": [100.0, 110.0, 120.0, 130.0]});
        let result = call(&params).unwrap();
        assert_eq!(result["max_drawdown"], 0.0);
        assert_eq!(result["underwater_periods"], 0);
    }

    #[test]
    fn rejects_negative_equity() {
        let params = json!({"equity_curve": [100.0, -5.0]});
        assert!(call(&params).is_err());
    }
}
