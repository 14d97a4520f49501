use crate::errors::ServiceError;
use crate::metrics::PREDICTION_METRICS;
use crate::tabular::SalesTable;
use axum::extract::{
    multipart::Multipart,
    rejection::{JsonRejection, QueryRejection},
};
use tracing::debug;
use utoipa::ToSchema;

/// Multipart field carrying the uploaded CSV
pub const UPLOAD_FIELD: &str = "file";

/// Multipart form accepted by the upload endpoints
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// CSV file with a header row
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

/// Reads the `file` field of a multipart body and parses it as a sales table.
///
/// A missing field, a non-`.csv` file name, or an unparseable file are all
/// [`ServiceError::FileLoadError`].
pub async fn read_csv_upload(mut multipart: Multipart) -> Result<SalesTable, ServiceError> {
    let result = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ServiceError::FileLoadError(e.body_text()))?
        {
            if field.name() != Some(UPLOAD_FIELD) {
                continue;
            }

            if let Some(file_name) = field.file_name() {
                if !file_name.to_ascii_lowercase().ends_with(".csv") {
                    return Err(ServiceError::FileLoadError(format!(
                        "'{}' is not a .csv file",
                        file_name
                    )));
                }
            }

            let bytes = field
                .bytes()
                .await
                .map_err(|e| ServiceError::FileLoadError(e.body_text()))?;
            debug!(bytes = bytes.len(), "Received CSV upload");
            return SalesTable::from_csv_bytes(&bytes);
        }

        Err(ServiceError::FileLoadError(format!(
            "no file uploaded; send it in the multipart field '{}'",
            UPLOAD_FIELD
        )))
    }
    .await;

    PREDICTION_METRICS.record_upload(result.is_ok());
    result
}

pub fn json_rejection(rejection: JsonRejection) -> ServiceError {
    ServiceError::BadRequest(rejection.body_text())
}

pub fn query_rejection(rejection: QueryRejection) -> ServiceError {
    ServiceError::BadRequest(rejection.body_text())
}
