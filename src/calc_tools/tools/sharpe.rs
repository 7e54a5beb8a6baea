// =============================================================================
// calculate_sharpe — period and annualized Sharpe ratio
// =============================================================================

use serde_json::{json, Value};

use crate::calc_tools::rpc::{coerce_f64, require_array, coerce_f64_array, ToolError, ToolResult};

pub fn schema() -> Value {
    json!({
        "name": "calculate_sharpe",
        "description": "Computes the period and annualized Sharpe ratio for a return series.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "returns": {"type": "array", "items": {"type": "number"}},
                "risk_free_rate": {"type": "number", "description": "Annual risk-free rate"},
                "periods_per_year": {"type": "number", "description": "Number of return periods per year, e.g. 252"}
            },
            "required": ["returns", "risk_free_rate", "periods_per_year"]
        }
    })
}

/// Serializes a possibly-infinite ratio; JSON has no literal for infinity so
/// non-finite values are reported as strings, matching how the RPC clients
/// for this server already parse "Infinity"/"-Infinity" sentinels.
fn ratio_value(x: f64) -> Value {
    if x.is_infinite() {
        json!(if x > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        json!(x)
    }
}

pub fn call(params: &Value) -> ToolResult {
    let raw_returns = require_array(params, "returns")?;
    let risk_free_rate = coerce_f64(params, "risk_free_rate")?;
    let periods_per_year = coerce_f64(params, "periods_per_year")?;

    if periods_per_year <= 0.0 {
        return Err(ToolError::invalid_params("periods_per_year must be > 0"));
    }

    let returns = coerce_f64_array(raw_returns, "returns")?;
    let n = returns.len();

    let mean = returns.iter().sum::<f64>() / n as f64;
    let variance = if n > 1 {
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0)
    } else {
        0.0
    };
    let std_dev = variance.sqrt();

    let rf_period = risk_free_rate / periods_per_year;

    let sharpe_period = if std_dev > 0.0 {
        (mean - rf_period) / std_dev
    } else if mean > rf_period {
        f64::INFINITY
    } else if mean < rf_period {
        f64::NEG_INFINITY
    } else {
        0.0
    };

    let annualized = sharpe_period * periods_per_year.sqrt();

    let interpretation = if !annualized.is_finite() {
        if annualized > 0.0 { "Excellent" } else { "Poor" }
    } else if annualized < 0.0 {
        "Poor"
    } else if annualized < 1.0 {
        "Sub-optimal"
    } else if annualized < 2.0 {
        "Good"
    } else if annualized < 3.0 {
        "Very Good"
    } else {
        "Excellent"
    };

    Ok(json!({
        "mean_return": mean,
        "std_dev": std_dev,
        "sharpe_period": ratio_value(sharpe_period),
        "sharpe_annualized": ratio_value(annualized),
        "interpretation": interpretation,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constant_returns_equal_to_rf_yield_zero_sharpe() {
        let params = json!({"returns": [0.01, 0.01, 0.01], "risk_free_rate": 3.65, "periods_per_year": 365.0});
        let result = call(&params).unwrap();
        assert_eq!(result["sharpe_period"], 0.0);
    }

    #[test]
    fn zero_std_dev_above_rf_yields_positive_infinity() {
        let params = json!({"returns": [0.02, 0.02, 0.02], "risk_free_rate": 3.65, "periods_per_year": 365.0});
        let result = call(&params).unwrap();
        assert_eq!(result["sharpe_period"], "Infinity");
        assert_eq!(result["interpretation"], "Excellent");
    }

    #[test]
    fn zero_std_dev_below_rf_yields_negative_infinity() {
        let params = json!({"returns": [0.0, 0.0, 0.0], "risk_free_rate": 3.65, "periods_per_year": 365.0});
        let result = call(&params).unwrap();
        assert_eq!(result["sharpe_period"], "-Infinity");
        assert_eq!(result["interpretation"], "Poor");
    }
}
