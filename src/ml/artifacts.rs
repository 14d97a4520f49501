use super::gradient_boosting::{TreeEnsembleArtifact, TreeEnsembleModel};
use super::preprocessor::{ColumnPreprocessor, PreprocessorArtifact};
use super::{Preprocessor, RevenueModel};
use crate::errors::ServiceError;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::Path;
use tracing::info;

/// Loads the fitted preprocessor from a JSON artifact.
pub fn load_preprocessor(path: &Path) -> Result<ColumnPreprocessor, ServiceError> {
    let artifact: PreprocessorArtifact = read_artifact(path, "preprocessor")?;
    let preprocessor = ColumnPreprocessor::from_artifact(artifact)?;
    info!(
        path = %path.display(),
        n_features_out = preprocessor.n_features_out(),
        "Loaded preprocessor"
    );
    Ok(preprocessor)
}

/// Loads the fitted tree ensemble from a JSON artifact.
pub fn load_model(path: &Path) -> Result<TreeEnsembleModel, ServiceError> {
    let artifact: TreeEnsembleArtifact = read_artifact(path, "model")?;
    let model = TreeEnsembleModel::from_artifact(artifact)?;
    info!(
        path = %path.display(),
        trees = model.tree_count(),
        n_features = model.n_features(),
        "Loaded model"
    );
    Ok(model)
}

fn read_artifact<T: DeserializeOwned>(path: &Path, label: &str) -> Result<T, ServiceError> {
    let bytes = std::fs::read(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => ServiceError::ArtifactNotFound(format!(
            "{} file '{}' does not exist",
            label,
            path.display()
        )),
        _ => ServiceError::ArtifactNotFound(format!(
            "{} file '{}' is unreadable: {}",
            label,
            path.display(),
            err
        )),
    })?;

    serde_json::from_slice(&bytes).map_err(|err| {
        ServiceError::ArtifactNotFound(format!(
            "{} file '{}' is not a valid artifact: {}",
            label,
            path.display(),
            err
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_json(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_is_artifact_not_found() {
        let err = load_model(Path::new("/nonexistent/revenue_model.json")).unwrap_err();
        assert_matches!(err, ServiceError::ArtifactNotFound(msg) if msg.contains("does not exist"));
    }

    #[test]
    fn malformed_json_is_artifact_not_found() {
        let file = temp_json("{ not json");
        let err = load_preprocessor(file.path()).unwrap_err();
        assert_matches!(err, ServiceError::ArtifactNotFound(msg) if msg.contains("not a valid artifact"));
    }

    #[test]
    fn loads_valid_artifacts() {
        let pre = temp_json(
            r#"{"transformers": [{"kind": "passthrough", "columns": ["Price", "Discount"]}]}"#,
        );
        let model = temp_json(r#"{"num_features": 2, "trees": [{"nodes": [{"leaf": 3.0}]}]}"#);

        assert_eq!(load_preprocessor(pre.path()).unwrap().n_features_out(), 2);
        assert_eq!(load_model(model.path()).unwrap().tree_count(), 1);
    }

    #[test]
    fn bundled_artifacts_agree_on_width() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR"));
        let pre = load_preprocessor(&root.join("artifacts/preprocessor.json")).unwrap();
        let model = load_model(&root.join("artifacts/revenue_model.json")).unwrap();
        assert_eq!(pre.n_features_out(), model.n_features());
    }
}
