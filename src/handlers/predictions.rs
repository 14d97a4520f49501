use super::common::json_rejection;
use crate::{
    errors::ErrorResponse,
    models::{
        field_schema, BatchPredictionResponse, FieldSpec, PredictionResponse, SalesRecord,
    },
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::{Map, Value};
use tracing::info;

pub fn prediction_routes() -> Router<AppState> {
    Router::new()
        .route("/schema", get(input_schema))
        .route("/predictions", post(predict_revenue))
        .route("/predictions/batch", post(predict_batch))
}

/// Fields a prediction request must carry
#[utoipa::path(
    get,
    path = "/api/v1/schema",
    responses(
        (status = 200, description = "Input field schema", body = [FieldSpec])
    ),
    tag = "Predictions"
)]
pub async fn input_schema() -> ApiResult<Vec<FieldSpec>> {
    Ok(Json(ApiResponse::success(field_schema())))
}

/// Predict revenue for one record
#[utoipa::path(
    post,
    path = "/api/v1/predictions",
    request_body = SalesRecord,
    responses(
        (status = 200, description = "Predicted revenue", body = PredictionResponse),
        (status = 400, description = "Body is not a JSON object", body = ErrorResponse),
        (status = 422, description = "Missing or invalid field", body = ErrorResponse)
    ),
    tag = "Predictions"
)]
pub async fn predict_revenue(
    State(state): State<AppState>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> ApiResult<PredictionResponse> {
    let Json(form) = payload.map_err(json_rejection)?;
    let record = SalesRecord::from_source(&form)?;
    let prediction = state.predictor.predict_one(&record)?;

    info!(
        product_id = %record.product_id,
        predicted_revenue = prediction.value(),
        "Predicted revenue"
    );

    Ok(Json(ApiResponse::success(PredictionResponse::from(
        prediction,
    ))))
}

/// Predict revenue for several records at once. Any invalid record fails the
/// whole batch; an empty array yields an empty result.
#[utoipa::path(
    post,
    path = "/api/v1/predictions/batch",
    request_body = [SalesRecord],
    responses(
        (status = 200, description = "One prediction per record, in order", body = BatchPredictionResponse),
        (status = 400, description = "Body is not a JSON array of objects", body = ErrorResponse),
        (status = 422, description = "At least one record is invalid", body = ErrorResponse)
    ),
    tag = "Predictions"
)]
pub async fn predict_batch(
    State(state): State<AppState>,
    payload: Result<Json<Vec<Map<String, Value>>>, JsonRejection>,
) -> ApiResult<BatchPredictionResponse> {
    let Json(forms) = payload.map_err(json_rejection)?;
    let records = SalesRecord::parse_all(forms.iter())?;
    let predictions = state.predictor.predict_batch(&records)?;
    info!(rows = predictions.len(), "Predicted revenue batch");

    Ok(Json(ApiResponse::success(
        BatchPredictionResponse::from_predictions(&predictions),
    )))
}
