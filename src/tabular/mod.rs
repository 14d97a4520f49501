//! Uploaded CSV tables and the chart series derived from them.

pub mod chart;
pub mod table;

pub use chart::{build_series, ChartKind, ChartPoint, ChartSeries};
pub use table::{SalesTable, TablePreview, DOWNLOAD_FILE_NAME};
