use super::common::{query_rejection, read_csv_upload, UploadForm};
use crate::{
    errors::ErrorResponse,
    models::ProductPrediction,
    tabular::{build_series, ChartKind, ChartSeries, TablePreview, DOWNLOAD_FILE_NAME},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{rejection::QueryRejection, Multipart, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/uploads/preview", post(preview_upload))
        .route("/uploads/predictions", post(predict_upload))
        .route("/uploads/predictions/csv", post(download_predictions))
        .route("/uploads/chart", post(chart_upload))
}

/// Per-product predictions for an uploaded table
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadPredictionResponse {
    pub count: usize,
    pub rows: Vec<ProductPrediction>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ChartQuery {
    /// `line` or `bar`
    pub kind: ChartKind,
    /// Column grouped on the x axis
    pub x: String,
    /// Numeric column averaged on the y axis
    pub y: String,
}

/// First rows of an uploaded CSV
#[utoipa::path(
    post,
    path = "/api/v1/uploads/preview",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Column names and leading rows", body = TablePreview),
        (status = 400, description = "File could not be loaded", body = ErrorResponse)
    ),
    tag = "Uploads"
)]
pub async fn preview_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<TablePreview> {
    let table = read_csv_upload(multipart).await?;
    Ok(Json(ApiResponse::success(
        table.preview(state.config.preview_rows),
    )))
}

/// Predict revenue for every row of an uploaded CSV
#[utoipa::path(
    post,
    path = "/api/v1/uploads/predictions",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Product name and predicted revenue per row", body = UploadPredictionResponse),
        (status = 400, description = "File could not be loaded", body = ErrorResponse),
        (status = 422, description = "A row is missing or has an invalid field", body = ErrorResponse)
    ),
    tag = "Uploads"
)]
pub async fn predict_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<UploadPredictionResponse> {
    let table = read_csv_upload(multipart).await?;
    let predictions = state.predictor.predict_table(&table)?;
    let rows = table.prediction_rows(&predictions)?;
    info!(rows = rows.len(), "Predicted revenue for upload");

    Ok(Json(ApiResponse::success(UploadPredictionResponse {
        count: rows.len(),
        rows,
    })))
}

/// Uploaded CSV with a `Predicted Revenue` column, as a download
#[utoipa::path(
    post,
    path = "/api/v1/uploads/predictions/csv",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "predicted_revenues.csv", content_type = "text/csv", body = String),
        (status = 400, description = "File could not be loaded", body = ErrorResponse),
        (status = 422, description = "A row is missing or has an invalid field", body = ErrorResponse)
    ),
    tag = "Uploads"
)]
pub async fn download_predictions(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, crate::errors::ServiceError> {
    let table = read_csv_upload(multipart).await?;
    let predictions = state.predictor.predict_table(&table)?;
    let body = table.with_predictions(&predictions)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", DOWNLOAD_FILE_NAME),
            ),
        ],
        body,
    )
        .into_response())
}

/// Aggregated chart series over two columns of an uploaded CSV
#[utoipa::path(
    post,
    path = "/api/v1/uploads/chart",
    params(ChartQuery),
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Mean y per distinct x", body = ChartSeries),
        (status = 400, description = "File could not be loaded or columns cannot be plotted", body = ErrorResponse)
    ),
    tag = "Uploads"
)]
pub async fn chart_upload(
    query: Result<Query<ChartQuery>, QueryRejection>,
    multipart: Multipart,
) -> ApiResult<ChartSeries> {
    let Query(params) = query.map_err(query_rejection)?;
    let table = read_csv_upload(multipart).await?;
    let series = build_series(&table, params.kind, &params.x, &params.y)?;
    Ok(Json(ApiResponse::success(series)))
}
