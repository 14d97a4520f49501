use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::metrics::PREDICTION_METRICS;
use crate::ml::{self, Preprocessor, RevenueModel};
use crate::models::{RevenuePrediction, SalesRecord};
use crate::tabular::SalesTable;
use crate::tracing::log_slow_operation;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{instrument, warn};
use utoipa::ToSchema;

const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(500);

/// Shape of the loaded pipeline, reported by health and status endpoints
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PipelineSummary {
    pub model_kind: String,
    pub preprocessor_features: usize,
    pub model_features: usize,
    pub compatible: bool,
}

/// Runs records through the fitted preprocessor and model.
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Clone)]
pub struct PredictionService {
    preprocessor: Arc<dyn Preprocessor>,
    model: Arc<dyn RevenueModel>,
    slow_threshold: Duration,
}

impl std::fmt::Debug for PredictionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionService")
            .field("summary", &self.summary())
            .finish()
    }
}

impl PredictionService {
    pub fn new(preprocessor: Arc<dyn Preprocessor>, model: Arc<dyn RevenueModel>) -> Self {
        let service = Self {
            preprocessor,
            model,
            slow_threshold: DEFAULT_SLOW_THRESHOLD,
        };

        let summary = service.summary();
        if !summary.compatible {
            warn!(
                preprocessor_features = summary.preprocessor_features,
                model_features = summary.model_features,
                "Preprocessor output width does not match the model; every prediction will fail"
            );
        }
        service
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Loads both artifacts. Any missing, unreadable or invalid file is an
    /// [`ServiceError::ArtifactNotFound`].
    pub fn from_artifacts(preprocessor_path: &Path, model_path: &Path) -> Result<Self, ServiceError> {
        let preprocessor = ml::load_preprocessor(preprocessor_path)?;
        let model = ml::load_model(model_path)?;
        Ok(Self::new(Arc::new(preprocessor), Arc::new(model)))
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        Ok(Self::from_artifacts(&config.preprocessor_path, &config.model_path)?
            .with_slow_threshold(config.slow_inference_threshold()))
    }

    pub fn summary(&self) -> PipelineSummary {
        let preprocessor_features = self.preprocessor.n_features_out();
        let model_features = self.model.n_features();
        PipelineSummary {
            model_kind: self.model.kind().to_string(),
            preprocessor_features,
            model_features,
            compatible: preprocessor_features == model_features,
        }
    }

    pub fn predict_one(&self, record: &SalesRecord) -> Result<RevenuePrediction, ServiceError> {
        let mut predictions = self.predict_batch(std::slice::from_ref(record))?;
        predictions.pop().ok_or_else(|| {
            ServiceError::TransformError("model returned no prediction".to_string())
        })
    }

    /// One prediction per record, in input order. Fails as a whole if any
    /// record cannot be transformed or scored.
    #[instrument(skip_all, fields(rows = records.len()))]
    pub fn predict_batch(
        &self,
        records: &[SalesRecord],
    ) -> Result<Vec<RevenuePrediction>, ServiceError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let result = self.run(records);
        let elapsed = started.elapsed();

        match &result {
            Ok(_) => PREDICTION_METRICS.record_inference(records.len(), elapsed),
            Err(err) => {
                PREDICTION_METRICS.record_failure();
                warn!(error = %err, "Prediction failed");
            }
        }
        log_slow_operation("predict_batch", records.len(), elapsed, self.slow_threshold);

        result
    }

    /// Parses every row of `table` and scores them together
    pub fn predict_table(&self, table: &SalesTable) -> Result<Vec<RevenuePrediction>, ServiceError> {
        let records = table.records()?;
        self.predict_batch(&records)
    }

    fn run(&self, records: &[SalesRecord]) -> Result<Vec<RevenuePrediction>, ServiceError> {
        let features = self.preprocessor.transform(records)?;

        if features.n_rows() != records.len() {
            return Err(ServiceError::TransformError(format!(
                "preprocessor returned {} rows for {} records",
                features.n_rows(),
                records.len()
            )));
        }
        if features.n_cols() != self.model.n_features() {
            return Err(ServiceError::TransformError(format!(
                "preprocessor produced {} features but the model expects {}",
                features.n_cols(),
                self.model.n_features()
            )));
        }

        let raw = self.model.predict(&features)?;
        if raw.len() != records.len() {
            return Err(ServiceError::TransformError(format!(
                "model returned {} predictions for {} records",
                raw.len(),
                records.len()
            )));
        }

        raw.into_iter()
            .enumerate()
            .map(|(idx, value)| RevenuePrediction::from_raw(value).map_err(|e| e.at_row(idx + 1)))
            .collect()
    }
}
