use crate::AppState;
use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sales Revenue API",
        version = "0.1.0",
        description = r#"
# Sales Revenue Prediction API

Predicts sales revenue from product, pricing, and marketing attributes using a
fitted preprocessing pipeline and a gradient-boosted regression model.

## Features

- **Single predictions**: one record in, one non-negative revenue estimate out
- **Batch predictions**: a JSON array of records, scored together
- **CSV uploads**: preview a file, score every row, or download it with a `Predicted Revenue` column
- **Charts**: mean of a numeric column per distinct value of another column

## Input fields

Every record needs `Date`, `Product ID`, `Product Name`, `Category`, `Price`,
`Units Sold`, `Units Returned`, `Discount`, `Location`, `Platform`,
`Marketing Spend` and `Promotions`. snake_case aliases (`units_sold`) are
accepted. `GET /api/v1/schema` lists them with their constraints.

## Error Handling

Errors share one body shape and carry the request id echoed in `x-request-id`:

```json
{
  "error": "Unprocessable Entity",
  "message": "Prediction error: missing required field 'Date'",
  "request_id": "9f1c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Predictions", description = "Revenue prediction endpoints"),
        (name = "Uploads", description = "CSV upload endpoints"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::predictions::input_schema,
        crate::handlers::predictions::predict_revenue,
        crate::handlers::predictions::predict_batch,
        crate::handlers::uploads::preview_upload,
        crate::handlers::uploads::predict_upload,
        crate::handlers::uploads::download_predictions,
        crate::handlers::uploads::chart_upload,
        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::models::SalesRecord,
            crate::models::FieldSpec,
            crate::models::FieldKind,
            crate::models::PredictionResponse,
            crate::models::BatchPredictionResponse,
            crate::models::ProductPrediction,
            crate::tabular::TablePreview,
            crate::tabular::ChartKind,
            crate::tabular::ChartPoint,
            crate::tabular::ChartSeries,
            crate::handlers::uploads::UploadPredictionResponse,
            crate::handlers::common::UploadForm,
            crate::handlers::health::HealthResponse,
            crate::handlers::health::ComponentStatus,
            crate::services::PipelineSummary,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document at `/api-docs/openapi.json`
pub fn openapi_routes() -> Router<AppState> {
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDocV1::openapi()) }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_endpoint() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        assert!(json.contains("Sales Revenue API"));
        for path in [
            "/api/v1/predictions",
            "/api/v1/predictions/batch",
            "/api/v1/schema",
            "/api/v1/uploads/preview",
            "/api/v1/uploads/predictions/csv",
            "/api/v1/uploads/chart",
            "/api/v1/health",
        ] {
            assert!(json.contains(path), "missing {path}");
        }
    }
}
