// Input records and their field schema
pub mod sales_record;

// Prediction values and response bodies
pub mod prediction;

pub use prediction::{
    format_thousands, BatchPredictionResponse, PredictionResponse, ProductPrediction,
    RevenuePrediction, PREDICTED_REVENUE_COLUMN,
};
pub use sales_record::{
    field_schema, parse_date, parse_decimal, FieldKind, FieldSource, FieldSpec, FieldValue,
    SalesField, SalesRecord,
};
