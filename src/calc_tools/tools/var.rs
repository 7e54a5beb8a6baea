// =============================================================================
// calculate_var — historical value-at-risk
// =============================================================================

use serde_json::{json, Value};

use crate::calc_tools::rpc::{coerce_f64, coerce_f64_array, require_array, ToolError, ToolResult};

pub fn schema() -> Value {
    json!({
        "name": "calculate_var",
        "description": "Computes historical value-at-risk from a sample of returns.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "returns": {"type": "array", "items": {"type": "number"}, "description": "Non-empty sample of period returns"},
                "confidence_level": {"type": "number", "description": "Confidence level in (0,1)"}
            },
            "required": ["returns", "confidence_level"]
        }
    })
}

pub fn call(params: &Value) -> ToolResult {
    let raw_returns = require_array(params, "returns")?;
    let confidence_level = coerce_f64(params, "confidence_level")?;

    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(ToolError::invalid_params("confidence_level must be in (0,1)"));
    }

    let mut returns = coerce_f64_array(raw_returns, "returns")?;
    let n = returns.len();

    returns.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let mean = returns.iter().sum::<f64>() / n as f64;
    let variance = if n > 1 {
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0)
    } else {
        0.0
    };
    let std_dev = variance.sqrt();

    let index = (((1.0 - confidence_level) * n as f64).floor() as usize).min(n - 1);
    let var = -returns[index];

    let exceedance_count = returns.iter().filter(|r| -**r >= var).count();
    let exceedance_rate = exceedance_count as f64 / n as f64;

    Ok(json!({
        "var": var,
        "mean": mean,
        "std_dev": std_dev,
        "sample_size": n,
        "exceedance_count": exceedance_count,
        "exceedance_rate": exceedance_rate,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constant_returns_yield_var_equal_to_negated_return_and_full_exceedance() {
        let params = json!({"returns": [-0.02, -0.02, -0.02, -0.02, -0.02], "confidence_level": 0.95});
        let result = call(&params).unwrap();
        assert!((result["var"].as_f64().unwrap() - 0.02).abs() < 1e-9);
        assert!((result["exceedance_rate"].as_f64().unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_empty_returns() {
        let params = json!({"returns": [], "confidence_level": 0.95});
        assert!(call(&params).is_err());
    }

    #[test]
    fn rejects_confidence_out_of_range() {
        let params = json!({"returns": [0.01, -0.01], "confidence_level": 1.5});
        assert!(call(&params).is_err());
    }
}
