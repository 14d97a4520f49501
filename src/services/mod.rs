/// Revenue prediction pipeline
pub mod prediction;

pub use prediction::{PipelineSummary, PredictionService};
