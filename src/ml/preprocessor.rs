use super::{FeatureMatrix, Preprocessor};
use crate::errors::ServiceError;
use crate::models::{FieldKind, FieldValue, SalesField, SalesRecord};
use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const PREPROCESSOR_FORMAT_VERSION: u32 = 1;

fn default_format_version() -> u32 {
    PREPROCESSOR_FORMAT_VERSION
}

/// Calendar features derived from the `Date` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePart {
    Year,
    Quarter,
    Month,
    Day,
    DayOfWeek,
    DayOfYear,
    WeekOfYear,
    IsWeekend,
}

impl DatePart {
    /// Column name the part is referenced by inside transformer blocks
    pub fn column(self) -> &'static str {
        match self {
            Self::Year => "Year",
            Self::Quarter => "Quarter",
            Self::Month => "Month",
            Self::Day => "Day",
            Self::DayOfWeek => "Day of Week",
            Self::DayOfYear => "Day of Year",
            Self::WeekOfYear => "Week of Year",
            Self::IsWeekend => "Is Weekend",
        }
    }

    /// Day of week counts from Monday = 0.
    pub fn extract(self, date: NaiveDate) -> i64 {
        match self {
            Self::Year => i64::from(date.year()),
            Self::Quarter => i64::from((date.month() - 1) / 3 + 1),
            Self::Month => i64::from(date.month()),
            Self::Day => i64::from(date.day()),
            Self::DayOfWeek => i64::from(date.weekday().num_days_from_monday()),
            Self::DayOfYear => i64::from(date.ordinal()),
            Self::WeekOfYear => i64::from(date.iso_week().week()),
            Self::IsWeekend => i64::from(matches!(date.weekday(), Weekday::Sat | Weekday::Sun)),
        }
    }
}

/// On-disk description of a fitted column transformer.
///
/// Blocks are applied in order and their outputs concatenated; input columns
/// no block mentions are dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessorArtifact {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    #[serde(default)]
    pub date_features: Vec<DatePart>,
    pub transformers: Vec<TransformerSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_features_out: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformerSpec {
    /// `(x - mean) / scale` per column
    StandardScaler {
        columns: Vec<String>,
        mean: Vec<f64>,
        scale: Vec<f64>,
    },
    /// One indicator per known category; unknown categories encode as all zeros
    OneHot {
        columns: Vec<String>,
        categories: Vec<Vec<String>>,
    },
    Passthrough { columns: Vec<String> },
}

/// Resolved input column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Field(SalesField),
    Date(DatePart),
}

impl Column {
    fn numeric(self, record: &SalesRecord) -> Result<f64, ServiceError> {
        match self {
            Column::Date(part) => Ok(part.extract(record.date) as f64),
            Column::Field(field) => match record.value(field) {
                FieldValue::Decimal(value) => value.to_f64().ok_or_else(|| {
                    ServiceError::TransformError(format!(
                        "field '{}' cannot be represented as a number",
                        field.column()
                    ))
                }),
                _ => Err(ServiceError::TransformError(format!(
                    "field '{}' is not numeric",
                    field.column()
                ))),
            },
        }
    }

    fn category(self, record: &SalesRecord) -> String {
        match self {
            Column::Date(part) => part.extract(record.date).to_string(),
            Column::Field(field) => match record.value(field) {
                FieldValue::Text(text) => text.to_string(),
                FieldValue::Decimal(value) => value.normalize().to_string(),
                FieldValue::Date(date) => date.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
enum Block {
    Scale {
        columns: Vec<Column>,
        mean: Vec<f64>,
        scale: Vec<f64>,
    },
    OneHot {
        columns: Vec<Column>,
        lookup: Vec<HashMap<String, usize>>,
        widths: Vec<usize>,
    },
    Passthrough {
        columns: Vec<Column>,
    },
}

impl Block {
    fn width(&self) -> usize {
        match self {
            Block::Scale { columns, .. } | Block::Passthrough { columns } => columns.len(),
            Block::OneHot { widths, .. } => widths.iter().sum(),
        }
    }

    fn encode(&self, record: &SalesRecord, row: &mut Vec<f64>) -> Result<(), ServiceError> {
        match self {
            Block::Scale {
                columns,
                mean,
                scale,
            } => {
                for ((column, mean), scale) in columns.iter().zip(mean).zip(scale) {
                    row.push((column.numeric(record)? - mean) / scale);
                }
            }
            Block::Passthrough { columns } => {
                for column in columns {
                    row.push(column.numeric(record)?);
                }
            }
            Block::OneHot {
                columns,
                lookup,
                widths,
            } => {
                for ((column, lookup), width) in columns.iter().zip(lookup).zip(widths) {
                    let start = row.len();
                    row.resize(start + width, 0.0);
                    if let Some(&hot) = lookup.get(&column.category(record)) {
                        row[start + hot] = 1.0;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Fitted column transformer built from a [`PreprocessorArtifact`].
#[derive(Debug, Clone)]
pub struct ColumnPreprocessor {
    blocks: Vec<Block>,
    n_features_out: usize,
}

impl ColumnPreprocessor {
    /// Resolves column names and checks parameter shapes.
    /// Every failure is reported as an unusable artifact.
    pub fn from_artifact(artifact: PreprocessorArtifact) -> Result<Self, ServiceError> {
        if artifact.format_version != PREPROCESSOR_FORMAT_VERSION {
            return Err(invalid(format!(
                "unsupported format_version {}",
                artifact.format_version
            )));
        }
        if artifact.transformers.is_empty() {
            return Err(invalid("no transformers defined"));
        }

        let resolver = ColumnResolver {
            date_features: &artifact.date_features,
        };

        let blocks = artifact
            .transformers
            .into_iter()
            .enumerate()
            .map(|(idx, spec)| {
                resolver
                    .block(spec)
                    .map_err(|msg| invalid(format!("transformer {}: {}", idx, msg)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let n_features_out = blocks.iter().map(Block::width).sum();
        if n_features_out == 0 {
            return Err(invalid("transformers produce no features"));
        }
        if let Some(declared) = artifact.n_features_out {
            if declared != n_features_out {
                return Err(invalid(format!(
                    "declares {} output features but its transformers produce {}",
                    declared, n_features_out
                )));
            }
        }

        Ok(Self {
            blocks,
            n_features_out,
        })
    }
}

impl Preprocessor for ColumnPreprocessor {
    fn transform(&self, records: &[SalesRecord]) -> Result<FeatureMatrix, ServiceError> {
        let mut matrix = FeatureMatrix::with_capacity(records.len(), self.n_features_out);
        let mut row = Vec::with_capacity(self.n_features_out);

        for (idx, record) in records.iter().enumerate() {
            row.clear();
            for block in &self.blocks {
                block
                    .encode(record, &mut row)
                    .map_err(|err| err.at_row(idx + 1))?;
            }
            matrix.push_row(&row)?;
        }

        Ok(matrix)
    }

    fn n_features_out(&self) -> usize {
        self.n_features_out
    }
}

struct ColumnResolver<'a> {
    date_features: &'a [DatePart],
}

impl ColumnResolver<'_> {
    fn column(&self, name: &str) -> Result<Column, String> {
        if let Some(field) = SalesField::lookup(name) {
            return Ok(Column::Field(field));
        }
        self.date_features
            .iter()
            .find(|part| part.column() == name)
            .map(|part| Column::Date(*part))
            .ok_or_else(|| format!("unknown column '{}'", name))
    }

    fn numeric_columns(&self, names: &[String]) -> Result<Vec<Column>, String> {
        names
            .iter()
            .map(|name| {
                let column = self.column(name)?;
                match column {
                    Column::Field(field) if field.kind() != FieldKind::Decimal => {
                        Err(format!("column '{}' is not numeric", name))
                    }
                    _ => Ok(column),
                }
            })
            .collect()
    }

    fn categorical_columns(&self, names: &[String]) -> Result<Vec<Column>, String> {
        names
            .iter()
            .map(|name| {
                let column = self.column(name)?;
                match column {
                    Column::Field(SalesField::Date) => {
                        Err("raw 'Date' cannot be one-hot encoded; use a date feature".to_string())
                    }
                    _ => Ok(column),
                }
            })
            .collect()
    }

    fn block(&self, spec: TransformerSpec) -> Result<Block, String> {
        match spec {
            TransformerSpec::StandardScaler {
                columns,
                mean,
                scale,
            } => {
                if mean.len() != columns.len() || scale.len() != columns.len() {
                    return Err(format!(
                        "standard_scaler has {} columns, {} means and {} scales",
                        columns.len(),
                        mean.len(),
                        scale.len()
                    ));
                }
                if mean.iter().any(|m| !m.is_finite()) {
                    return Err("standard_scaler mean must be finite".to_string());
                }
                if scale.iter().any(|s| !s.is_finite() || *s == 0.0) {
                    return Err("standard_scaler scale must be finite and non-zero".to_string());
                }
                Ok(Block::Scale {
                    columns: self.numeric_columns(&columns)?,
                    mean,
                    scale,
                })
            }
            TransformerSpec::OneHot {
                columns,
                categories,
            } => {
                if categories.len() != columns.len() {
                    return Err(format!(
                        "one_hot has {} columns but {} category lists",
                        columns.len(),
                        categories.len()
                    ));
                }
                let mut lookup = Vec::with_capacity(categories.len());
                let mut widths = Vec::with_capacity(categories.len());
                for (name, values) in columns.iter().zip(&categories) {
                    let mut index = HashMap::with_capacity(values.len());
                    for (pos, value) in values.iter().enumerate() {
                        if index.insert(value.clone(), pos).is_some() {
                            return Err(format!(
                                "one_hot column '{}' lists category '{}' twice",
                                name, value
                            ));
                        }
                    }
                    widths.push(values.len());
                    lookup.push(index);
                }
                Ok(Block::OneHot {
                    columns: self.categorical_columns(&columns)?,
                    lookup,
                    widths,
                })
            }
            TransformerSpec::Passthrough { columns } => Ok(Block::Passthrough {
                columns: self.numeric_columns(&columns)?,
            }),
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> ServiceError {
    ServiceError::ArtifactNotFound(format!("invalid preprocessor: {}", msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn record() -> SalesRecord {
        SalesRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, 6).unwrap(),
            product_id: "P-1".into(),
            product_name: "Whey Protein".into(),
            category: "Protein".into(),
            price: dec!(10),
            units_sold: dec!(5),
            units_returned: dec!(0),
            discount: dec!(0.1),
            location: "USA".into(),
            platform: "Amazon".into(),
            marketing_spend: dec!(2),
            promotions: dec!(0),
        }
    }

    fn artifact(value: serde_json::Value) -> PreprocessorArtifact {
        serde_json::from_value(value).unwrap()
    }

    fn sample() -> ColumnPreprocessor {
        ColumnPreprocessor::from_artifact(artifact(json!({
            "date_features": ["month", "day_of_week"],
            "transformers": [
                {"kind": "standard_scaler", "columns": ["Price", "Units Sold"], "mean": [20.0, 5.0], "scale": [5.0, 2.5]},
                {"kind": "one_hot", "columns": ["Platform"], "categories": [["Amazon", "Walmart"]]},
                {"kind": "passthrough", "columns": ["Month", "Day of Week"]}
            ]
        })))
        .unwrap()
    }

    #[test]
    fn date_parts() {
        let saturday = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
        assert_eq!(DatePart::Month.extract(saturday), 1);
        assert_eq!(DatePart::DayOfWeek.extract(saturday), 5);
        assert_eq!(DatePart::IsWeekend.extract(saturday), 1);
        assert_eq!(DatePart::Quarter.extract(NaiveDate::from_ymd_opt(2024, 8, 1).unwrap()), 3);
        assert_eq!(DatePart::DayOfYear.extract(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()), 32);
    }

    #[test]
    fn blocks_are_concatenated_in_order() {
        let pre = sample();
        assert_eq!(pre.n_features_out(), 6);

        let matrix = pre.transform(&[record()]).unwrap();
        assert_eq!(matrix.row(0).unwrap(), &[-2.0, 0.0, 1.0, 0.0, 1.0, 5.0]);
    }

    #[test]
    fn unknown_category_encodes_as_zeros() {
        let mut rec = record();
        rec.platform = "Etsy".into();
        let matrix = sample().transform(&[rec]).unwrap();
        assert_eq!(&matrix.row(0).unwrap()[2..4], &[0.0, 0.0]);
    }

    #[test]
    fn one_row_per_record() {
        let matrix = sample().transform(&[record(), record(), record()]).unwrap();
        assert_eq!(matrix.n_rows(), 3);
        assert!(sample().transform(&[]).unwrap().n_rows() == 0);
    }

    #[test]
    fn mismatched_scaler_lengths_are_invalid() {
        let err = ColumnPreprocessor::from_artifact(artifact(json!({
            "transformers": [
                {"kind": "standard_scaler", "columns": ["Price"], "mean": [1.0, 2.0], "scale": [1.0]}
            ]
        })))
        .unwrap_err();
        assert_matches!(err, ServiceError::ArtifactNotFound(msg) if msg.contains("transformer 0"));
    }

    #[test]
    fn zero_scale_is_invalid() {
        assert!(ColumnPreprocessor::from_artifact(artifact(json!({
            "transformers": [
                {"kind": "standard_scaler", "columns": ["Price"], "mean": [1.0], "scale": [0.0]}
            ]
        })))
        .is_err());
    }

    #[test]
    fn date_part_must_be_declared() {
        let err = ColumnPreprocessor::from_artifact(artifact(json!({
            "transformers": [{"kind": "passthrough", "columns": ["Month"]}]
        })))
        .unwrap_err();
        assert!(err.to_string().contains("unknown column 'Month'"));
    }

    #[test]
    fn text_columns_cannot_be_scaled() {
        let err = ColumnPreprocessor::from_artifact(artifact(json!({
            "transformers": [{"kind": "passthrough", "columns": ["Category"]}]
        })))
        .unwrap_err();
        assert!(err.to_string().contains("not numeric"));
    }

    #[test]
    fn declared_width_must_match() {
        let err = ColumnPreprocessor::from_artifact(artifact(json!({
            "n_features_out": 3,
            "transformers": [{"kind": "passthrough", "columns": ["Price"]}]
        })))
        .unwrap_err();
        assert!(err.to_string().contains("declares 3"));
    }

    #[test]
    fn duplicate_categories_are_invalid() {
        assert!(ColumnPreprocessor::from_artifact(artifact(json!({
            "transformers": [
                {"kind": "one_hot", "columns": ["Location"], "categories": [["USA", "USA"]]}
            ]
        })))
        .is_err());
    }

    #[test]
    fn unsupported_version_is_invalid() {
        assert!(ColumnPreprocessor::from_artifact(artifact(json!({
            "format_version": 9,
            "transformers": [{"kind": "passthrough", "columns": ["Price"]}]
        })))
        .is_err());
    }
}
