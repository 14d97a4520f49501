use crate::errors::ServiceError;
use crate::models::{
    FieldSource, ProductPrediction, RevenuePrediction, SalesField, SalesRecord,
    PREDICTED_REVENUE_COLUMN,
};
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;
use strum::IntoEnumIterator;
use utoipa::ToSchema;

/// File name suggested for downloaded predictions
pub const DOWNLOAD_FILE_NAME: &str = "predicted_revenues.csv";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// First rows of an uploaded table
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TablePreview {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub total_rows: usize,
}

/// An uploaded CSV file held in memory. Every row has one cell per header;
/// columns beyond the sales schema are kept untouched.
#[derive(Debug, Clone)]
pub struct SalesTable {
    headers: StringRecord,
    index: HashMap<String, usize>,
    rows: Vec<StringRecord>,
}

impl SalesTable {
    /// Parses CSV text with a header row.
    ///
    /// Fails with [`ServiceError::FileLoadError`] for non-UTF-8 content, an
    /// empty file, blank or duplicate headers, and rows whose cell count
    /// differs from the header.
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self, ServiceError> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        let text = std::str::from_utf8(bytes).map_err(|e| {
            ServiceError::FileLoadError(format!("file is not valid UTF-8: {}", e))
        })?;
        if text.trim().is_empty() {
            return Err(ServiceError::FileLoadError("file is empty".to_string()));
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::Headers)
            .from_reader(text.as_bytes());

        let headers = reader.headers()?.clone();
        let mut index = HashMap::with_capacity(headers.len());
        for (pos, name) in headers.iter().enumerate() {
            if name.is_empty() {
                return Err(ServiceError::FileLoadError(format!(
                    "header {} is blank",
                    pos + 1
                )));
            }
            if index.insert(name.to_string(), pos).is_some() {
                return Err(ServiceError::FileLoadError(format!(
                    "duplicate column '{}'",
                    name
                )));
            }
        }

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result.map_err(|e| {
                ServiceError::FileLoadError(format!("row {}: {}", idx + 1, e))
            })?;
            rows.push(record);
        }

        Ok(Self {
            headers,
            index,
            rows,
        })
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.headers.iter()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cells of `column`, in row order
    pub fn column_values<'a>(
        &'a self,
        column: &str,
    ) -> Option<impl Iterator<Item = &'a str> + 'a> {
        let pos = *self.index.get(column)?;
        Some(self.rows.iter().map(move |row| row.get(pos).unwrap_or("")))
    }

    pub fn preview(&self, n: usize) -> TablePreview {
        TablePreview {
            columns: self.headers.iter().map(str::to_string).collect(),
            rows: self
                .rows
                .iter()
                .take(n)
                .map(|row| row.iter().map(str::to_string).collect())
                .collect(),
            total_rows: self.rows.len(),
        }
    }

    fn row(&self, idx: usize) -> CsvRow<'_> {
        CsvRow {
            table: self,
            record: &self.rows[idx],
        }
    }

    /// Sales schema fields with no matching header, by display name
    pub fn missing_fields(&self) -> Vec<&'static str> {
        SalesField::iter()
            .filter(|field| !self.has_column(field.column()) && !self.has_column(field.alias()))
            .map(SalesField::column)
            .collect()
    }

    /// Converts every row into a [`SalesRecord`].
    ///
    /// All or nothing: any bad row fails the whole table with a message that
    /// names the first failing row and how many rows failed.
    pub fn records(&self) -> Result<Vec<SalesRecord>, ServiceError> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(ServiceError::TransformError(format!(
                "file is missing required columns: {}",
                missing.join(", ")
            )));
        }

        SalesRecord::parse_all((0..self.rows.len()).map(|idx| self.row(idx)))
    }

    /// Serializes the table with a `Predicted Revenue` column, one value per
    /// row. An existing column of that name is overwritten in place.
    pub fn with_predictions(
        &self,
        predictions: &[RevenuePrediction],
    ) -> Result<Vec<u8>, ServiceError> {
        self.ensure_aligned(predictions)?;

        let existing = self.index.get(PREDICTED_REVENUE_COLUMN).copied();
        let mut writer = WriterBuilder::new().from_writer(Vec::new());

        let mut header: Vec<&str> = self.headers.iter().collect();
        if existing.is_none() {
            header.push(PREDICTED_REVENUE_COLUMN);
        }
        writer.write_record(&header)?;

        let mut line: Vec<String> = Vec::with_capacity(header.len());
        for (row, prediction) in self.rows.iter().zip(predictions) {
            line.clear();
            line.extend(row.iter().map(str::to_string));
            let value = prediction.to_string();
            match existing {
                Some(pos) => line[pos] = value,
                None => line.push(value),
            }
            writer.write_record(&line)?;
        }

        writer
            .into_inner()
            .map_err(|e| ServiceError::InternalError(format!("failed to flush CSV: {}", e)))
    }

    /// `(Product Name, Predicted Revenue)` pairs in row order
    pub fn prediction_rows(
        &self,
        predictions: &[RevenuePrediction],
    ) -> Result<Vec<ProductPrediction>, ServiceError> {
        self.ensure_aligned(predictions)?;

        Ok((0..self.rows.len())
            .zip(predictions)
            .map(|(idx, prediction)| ProductPrediction {
                product_name: self
                    .row(idx)
                    .field(SalesField::ProductName)
                    .map(|name| name.trim().to_string())
                    .unwrap_or_default(),
                predicted_revenue: prediction.to_decimal(),
            })
            .collect())
    }

    fn ensure_aligned(&self, predictions: &[RevenuePrediction]) -> Result<(), ServiceError> {
        if predictions.len() != self.rows.len() {
            return Err(ServiceError::InternalError(format!(
                "{} predictions for {} rows",
                predictions.len(),
                self.rows.len()
            )));
        }
        Ok(())
    }
}

/// One data row viewed through its table's headers
struct CsvRow<'a> {
    table: &'a SalesTable,
    record: &'a StringRecord,
}

impl FieldSource for CsvRow<'_> {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        let pos = *self.table.index.get(name)?;
        self.record.get(pos).map(Cow::Borrowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const HEADER: &str = "Date,Product ID,Product Name,Category,Price,Units Sold,Units Returned,Discount,Location,Platform,Marketing Spend,Promotions";

    fn csv(rows: &[&str]) -> String {
        let mut text = String::from(HEADER);
        for row in rows {
            text.push('\n');
            text.push_str(row);
        }
        text
    }

    const ROW_A: &str = "2024-01-01,P1,Whey Protein,Protein,30,100,2,0.1,USA,Amazon,5,1";
    const ROW_B: &str = "2024-01-08,P2,Fish Oil,Omega,20,80,1,0.0,UK,Walmart,3,0";

    #[test]
    fn parses_headers_and_rows() {
        let table = SalesTable::from_csv_bytes(csv(&[ROW_A, ROW_B]).as_bytes()).unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.columns().count(), 12);
        assert!(table.has_column("Units Sold"));
    }

    #[test]
    fn strips_bom_and_trims_headers() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(b" Date , Price \n2024-01-01,3\n");
        let table = SalesTable::from_csv_bytes(&bytes).unwrap();
        assert_eq!(table.columns().collect::<Vec<_>>(), vec!["Date", "Price"]);
    }

    #[test]
    fn ragged_rows_are_file_load_errors() {
        let err = SalesTable::from_csv_bytes(b"a,b\n1,2\n3\n").unwrap_err();
        assert_matches!(err, ServiceError::FileLoadError(msg) if msg.starts_with("row 2"));
    }

    #[test]
    fn duplicate_and_blank_headers_are_rejected() {
        assert_matches!(
            SalesTable::from_csv_bytes(b"a,a\n1,2\n"),
            Err(ServiceError::FileLoadError(_))
        );
        assert_matches!(
            SalesTable::from_csv_bytes(b"a,,c\n1,2,3\n"),
            Err(ServiceError::FileLoadError(_))
        );
    }

    #[test]
    fn empty_and_binary_files_are_rejected() {
        assert_matches!(
            SalesTable::from_csv_bytes(b"  \n"),
            Err(ServiceError::FileLoadError(_))
        );
        assert_matches!(
            SalesTable::from_csv_bytes(&[0xff, 0xfe, 0x00, 0x41]),
            Err(ServiceError::FileLoadError(_))
        );
    }

    #[test]
    fn header_only_table_has_no_records() {
        let table = SalesTable::from_csv_bytes(HEADER.as_bytes()).unwrap();
        assert_eq!(table.row_count(), 0);
        assert!(table.records().unwrap().is_empty());
        assert_eq!(table.preview(5).total_rows, 0);
    }

    #[test]
    fn preview_caps_rows_and_reports_total() {
        let table = SalesTable::from_csv_bytes(csv(&[ROW_A, ROW_B, ROW_A]).as_bytes()).unwrap();
        let preview = table.preview(2);
        assert_eq!(preview.rows.len(), 2);
        assert_eq!(preview.total_rows, 3);
        assert_eq!(preview.rows[1][2], "Fish Oil");
    }

    #[test]
    fn records_parse_every_row() {
        let table = SalesTable::from_csv_bytes(csv(&[ROW_A, ROW_B]).as_bytes()).unwrap();
        let records = table.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].product_name, "Fish Oil");
    }

    #[test]
    fn missing_columns_are_listed() {
        let table =
            SalesTable::from_csv_bytes(b"Product Name,Price\nWhey,10\n").unwrap();
        let err = table.records().unwrap_err();
        assert_matches!(err, ServiceError::TransformError(msg)
            if msg.contains("Date") && msg.contains("Promotions") && !msg.contains("Price"));
    }

    #[test]
    fn bad_rows_fail_the_whole_table() {
        let bad_date = ROW_B.replacen("2024-01-08", "someday", 1);
        let bad_price = ROW_B.replacen(",20,", ",-5,", 1);
        let table =
            SalesTable::from_csv_bytes(csv(&[ROW_A, &bad_date, &bad_price]).as_bytes()).unwrap();

        let err = table.records().unwrap_err();
        assert_matches!(err, ServiceError::TransformError(msg)
            if msg.starts_with("2 of 3 rows failed; row 2:") && msg.contains("'Date'"));
    }

    #[test]
    fn single_bad_row_is_reported_directly() {
        let empty_category = ROW_B.replacen("Omega", "", 1);
        let table =
            SalesTable::from_csv_bytes(csv(&[ROW_A, &empty_category]).as_bytes()).unwrap();
        let err = table.records().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Prediction error: row 2: missing required field 'Category'"
        );
    }

    #[test]
    fn appends_prediction_column() {
        let table = SalesTable::from_csv_bytes(csv(&[ROW_A, ROW_B]).as_bytes()).unwrap();
        let predictions = vec![
            RevenuePrediction::from_raw(1500.25).unwrap(),
            RevenuePrediction::from_raw(-3.0).unwrap(),
        ];
        let out = String::from_utf8(table.with_predictions(&predictions).unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], format!("{},Predicted Revenue", HEADER));
        assert_eq!(lines[1], format!("{},1500.25", ROW_A));
        assert_eq!(lines[2], format!("{},0", ROW_B));
    }

    #[test]
    fn existing_prediction_column_is_overwritten() {
        let table =
            SalesTable::from_csv_bytes(b"Product Name,Predicted Revenue,Note\nWhey,old,x\n")
                .unwrap();
        let out = table
            .with_predictions(&[RevenuePrediction::from_raw(7.5).unwrap()])
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Product Name,Predicted Revenue,Note\nWhey,7.5,x\n"
        );
    }

    #[test]
    fn prediction_count_must_match_rows() {
        let table = SalesTable::from_csv_bytes(csv(&[ROW_A]).as_bytes()).unwrap();
        assert_matches!(
            table.with_predictions(&[]),
            Err(ServiceError::InternalError(_))
        );
    }

    #[test]
    fn prediction_rows_pair_product_names() {
        let table = SalesTable::from_csv_bytes(csv(&[ROW_A, ROW_B]).as_bytes()).unwrap();
        let rows = table
            .prediction_rows(&[
                RevenuePrediction::from_raw(1.005).unwrap(),
                RevenuePrediction::from_raw(2.0).unwrap(),
            ])
            .unwrap();
        assert_eq!(rows[0].product_name, "Whey Protein");
        assert_eq!(rows[1].product_name, "Fish Oil");
    }

    #[test]
    fn snake_case_headers_are_accepted() {
        let header = HEADER
            .split(',')
            .map(|h| SalesField::lookup(h).unwrap().alias())
            .collect::<Vec<_>>()
            .join(",");
        let table = SalesTable::from_csv_bytes(format!("{}\n{}", header, ROW_A).as_bytes())
            .unwrap();
        assert!(table.missing_fields().is_empty());
        assert_eq!(table.records().unwrap()[0].units_sold.to_string(), "100");
    }
}
