use crate::errors::ServiceError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Column appended to uploaded tables
pub const PREDICTED_REVENUE_COLUMN: &str = "Predicted Revenue";

/// Non-negative, finite revenue estimate produced by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct RevenuePrediction(f64);

impl RevenuePrediction {
    /// Accepts a raw model output. Negative values clamp to zero;
    /// NaN and infinities are rejected.
    pub fn from_raw(raw: f64) -> Result<Self, ServiceError> {
        if !raw.is_finite() {
            return Err(ServiceError::TransformError(format!(
                "model produced a non-finite prediction ({raw})"
            )));
        }
        Ok(Self(raw.max(0.0)))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Revenue rounded to cents. Rounds the exact binary value half to even,
    /// so `2.675` (stored just below the midpoint) becomes `2.67`.
    pub fn to_decimal(self) -> Decimal {
        Decimal::from_f64_retain(self.0)
            .unwrap_or(Decimal::MAX)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
    }

    /// User-facing text, e.g. `Predicted Revenue: 1,234.56 $`
    pub fn display_message(self) -> String {
        format!("Predicted Revenue: {} $", format_thousands(self.to_decimal()))
    }
}

impl fmt::Display for RevenuePrediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Formats with two decimals and comma thousands separators
pub fn format_thousands(value: Decimal) -> String {
    let fixed = format!("{:.2}", value);
    let (sign, unsigned) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}{grouped}.{frac_part}")
}

/// Response for a single-record prediction
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PredictionResponse {
    #[schema(value_type = String, example = "1234.56")]
    pub predicted_revenue: Decimal,
    #[schema(example = "Predicted Revenue: 1,234.56 $")]
    pub message: String,
}

impl From<RevenuePrediction> for PredictionResponse {
    fn from(prediction: RevenuePrediction) -> Self {
        Self {
            predicted_revenue: prediction.to_decimal(),
            message: prediction.display_message(),
        }
    }
}

/// Response for a batch of records, in input order
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchPredictionResponse {
    pub count: usize,
    #[schema(value_type = Vec<String>)]
    pub predictions: Vec<Decimal>,
}

impl BatchPredictionResponse {
    pub fn from_predictions(predictions: &[RevenuePrediction]) -> Self {
        Self {
            count: predictions.len(),
            predictions: predictions.iter().map(|p| p.to_decimal()).collect(),
        }
    }
}

/// One line of the per-product summary shown after an upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProductPrediction {
    #[serde(rename = "Product Name")]
    pub product_name: String,
    #[serde(rename = "Predicted Revenue")]
    #[schema(value_type = String)]
    pub predicted_revenue: Decimal,
}
