// =============================================================================
// calculate_position_size — half-Kelly position sizing
// =============================================================================

use serde_json::{json, Value};

use crate::calc_tools::rpc::{coerce_f64, ToolError, ToolResult};

pub fn schema() -> Value {
    json!({
        "name": "calculate_position_size",
        "description": "Recommends a position size using a fractional-Kelly criterion.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "win_rate": {"type": "number", "description": "Historical win rate in [0,1]"},
                "avg_win": {"type": "number", "description": "Average winning trade size, > 0"},
                "avg_loss": {"type": "number", "description": "Average losing trade size, > 0"},
                "capital": {"type": "number", "description": "Capital available to allocate, > 0"},
                "kelly_fraction": {"type": "number", "description": "Fraction of full Kelly to apply, in (0,1]"}
            },
            "required": ["win_rate", "avg_win", "avg_loss", "capital", "kelly_fraction"]
        }
    })
}

pub fn call(params: &Value) -> ToolResult {
    let win_rate = coerce_f64(params, "win_rate")?;
    let avg_win = coerce_f64(params, "avg_win")?;
    let avg_loss = coerce_f64(params, "avg_loss")?;
    let capital = coerce_f64(params, "capital")?;
    let kelly_fraction = coerce_f64(params, "kelly_fraction")?;

    if !(0.0..=1.0).contains(&win_rate) {
        return Err(ToolError::invalid_params("win_rate must be in [0,1]"));
    }
    if avg_win <= 0.0 {
        return Err(ToolError::invalid_params("avg_win must be > 0"));
    }
    if avg_loss <= 0.0 {
        return Err(ToolError::invalid_params("avg_loss must be > 0"));
    }
    if capital <= 0.0 {
        return Err(ToolError::invalid_params("capital must be > 0"));
    }
    if !(kelly_fraction > 0.0 && kelly_fraction <= 1.0) {
        return Err(ToolError::invalid_params("kelly_fraction must be in (0,1]"));
    }

    let b = avg_win / avg_loss;
    let kelly = (b * win_rate - (1.0 - win_rate)) / b;

    let (adjusted, recommendation) = if kelly < 0.0 {
        (0.0, "no edge")
    } else if kelly > 1.0 {
        (kelly_fraction, "capped")
    } else {
        (kelly * kelly_fraction, "sized")
    };

    let position_size = adjusted * capital;

    Ok(json!({
        "kelly_fraction_raw": kelly,
        "adjusted_fraction": adjusted,
        "position_size": position_size,
        "recommendation": recommendation,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn position_size_for_winning_edge() {
        let params = json!({
            "win_rate": 0.6, "avg_win": 100.0, "avg_loss": 50.0,
            "capital": 10000.0, "kelly_fraction": 0.5
        });
        let result = call(&params).unwrap();
        assert!((result["kelly_fraction_raw"].as_f64().unwrap() - 0.2).abs() < 1e-9);
        assert!((result["adjusted_fraction"].as_f64().unwrap() - 0.1).abs() < 1e-9);
        assert!((result["position_size"].as_f64().unwrap() - 1000.0).abs() < 1e-6);
        assert_eq!(result["recommendation"], "sized");
    }

    #[test]
    fn negative_edge_yields_no_edge() {
        let params = json!({
            "win_rate": 0.2, "avg_win": 50.0, "avg_loss": 100.0,
            "capital": 10000.0, "kelly_fraction": 0.5
        });
        let result = call(&params).unwrap();
        assert_eq!(result["adjusted_fraction"], 0.0);
        assert_eq!(result["position_size"], 0.0);
        assert_eq!(result["recommendation"], "no edge");
    }

    #[test]
    fn kelly_over_one_is_capped_to_fraction() {
        let params = json!({
            "win_rate": 0.95, "avg_win": 100.0, "avg_loss": 5.0,
            "capital": 1000.0, "kelly_fraction": 0.3
        });
        let result = call(&params).unwrap();
        assert!((result["adjusted_fraction"].as_f64().unwrap() - 0.3).abs() < 1e-9);
        assert_eq!(result["recommendation"], "capped");
    }

    #[test]
    fn rejects_out_of_range_win_rate() {
        let params = json!({
            "win_rate": 1.5, "avg_win": 100.0, "avg_loss": 50.0,
            "capital": 10000.0, "kelly_fraction": 0.5
        });
        assert!(call(&params).is_err());
    }
}
