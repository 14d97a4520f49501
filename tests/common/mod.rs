#![allow(dead_code)]

use std::path::PathBuf;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use sales_revenue_api::{build_router, config::AppConfig, services::PredictionService, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const MULTIPART_BOUNDARY: &str = "----sales-revenue-test-boundary";

pub const SAMPLE_CSV: &str = "\
Date,Product ID,Product Name,Category,Price,Units Sold,Units Returned,Discount,Location,Platform,Marketing Spend,Promotions
2024-01-15,P001,Whey Protein,Protein,39.99,150,2,0.10,USA,Amazon,5.5,1
2024-02-20,P002,Vitamin C,Vitamin,12.49,180,1,0.05,UK,Walmart,3.2,0
2024-03-05,P003,Fish Oil,Omega,24.99,140,0,0.15,Canada,iHerb,6.1,1
";

/// Router over the bundled artifacts with default configuration.
pub struct TestApp {
    router: Router,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        let cfg = AppConfig {
            preprocessor_path: root.join("artifacts/preprocessor.json"),
            model_path: root.join("artifacts/revenue_model.json"),
            ..AppConfig::default()
        };

        let predictor =
            PredictionService::from_config(&cfg).expect("bundled artifacts should load");
        let state = AppState::new(cfg, predictor);

        Self {
            router: build_router(state.clone()),
            state,
        }
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(Request::builder().method(Method::GET).uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
    }

    /// Uploads `contents` in the `file` field of a multipart form.
    pub async fn upload(&self, uri: &str, file_name: &str, contents: &str) -> Response {
        self.upload_field(uri, "file", file_name, contents).await
    }

    pub async fn upload_field(
        &self,
        uri: &str,
        field: &str,
        file_name: &str,
        contents: &str,
    ) -> Response {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
                )
                .body(Body::from(multipart_body(field, file_name, contents)))
                .unwrap(),
        )
        .await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub fn multipart_body(field: &str, file_name: &str, contents: &str) -> String {
    format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: text/csv\r\n\r\n{contents}\r\n--{b}--\r\n",
        b = MULTIPART_BOUNDARY,
    )
}

pub async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

pub async fn expect_status(response: Response, status: StatusCode) -> Value {
    assert_eq!(response.status(), status);
    body_json(response).await
}

/// A complete record keyed by display names
pub fn sample_record() -> Value {
    json!({
        "Date": "2024-03-15",
        "Product ID": "P001",
        "Product Name": "Whey Protein",
        "Category": "Protein",
        "Price": 39.99,
        "Units Sold": 150,
        "Units Returned": 2,
        "Discount": 0.1,
        "Location": "USA",
        "Platform": "Amazon",
        "Marketing Spend": 5.5,
        "Promotions": 1
    })
}
