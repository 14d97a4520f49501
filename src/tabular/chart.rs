use super::SalesTable;
use crate::errors::ServiceError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use strum::{Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ChartKind {
    Line,
    Bar,
}

/// Mean of y over every row sharing this x
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChartPoint {
    pub x: String,
    pub y: f64,
    pub count: usize,
}

/// Aggregated series ready for rendering by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChartSeries {
    pub kind: ChartKind,
    pub x: String,
    pub y: String,
    pub points: Vec<ChartPoint>,
}

/// Groups rows by the `x` column and averages the numeric `y` column.
///
/// Rows with an empty x or y cell, or a non-finite y (NaN, `inf`), are skipped. Line charts are
/// ordered by x (numerically when every x is a number); bar charts keep
/// first-appearance order.
pub fn build_series(
    table: &SalesTable,
    kind: ChartKind,
    x: &str,
    y: &str,
) -> Result<ChartSeries, ServiceError> {
    let xs = table
        .column_values(x)
        .ok_or_else(|| ServiceError::PlotError(format!("unknown column '{}'", x)))?;
    let ys = table
        .column_values(y)
        .ok_or_else(|| ServiceError::PlotError(format!("unknown column '{}'", y)))?;

    let mut points: Vec<(String, f64, usize)> = Vec::new();
    let mut slots: HashMap<&str, usize> = HashMap::new();

    for (row, (x_cell, y_cell)) in xs.zip(ys).enumerate() {
        let (x_cell, y_cell) = (x_cell.trim(), y_cell.trim());
        if x_cell.is_empty() || y_cell.is_empty() {
            continue;
        }
        let value: f64 = y_cell.parse().map_err(|_| {
            ServiceError::PlotError(format!(
                "column '{}' is not numeric (row {}: '{}')",
                y,
                row + 1,
                y_cell
            ))
        })?;
        if !value.is_finite() {
            continue;
        }

        let slot = *slots.entry(x_cell).or_insert_with(|| {
            points.push((x_cell.to_string(), 0.0, 0));
            points.len() - 1
        });
        points[slot].1 += value;
        points[slot].2 += 1;
    }

    let mut points: Vec<ChartPoint> = points
        .into_iter()
        .map(|(x, sum, count)| ChartPoint {
            x,
            y: sum / count as f64,
            count,
        })
        .collect();

    if kind == ChartKind::Line {
        sort_by_x(&mut points);
    }

    Ok(ChartSeries {
        kind,
        x: x.to_string(),
        y: y.to_string(),
        points,
    })
}

fn sort_by_x(points: &mut [ChartPoint]) {
    let numeric_key = |p: &ChartPoint| p.x.parse::<f64>().ok().filter(|v| !v.is_nan());
    if points.iter().all(|p| numeric_key(p).is_some()) {
        points.sort_by(|a, b| {
            numeric_key(a)
                .partial_cmp(&numeric_key(b))
                .unwrap_or(Ordering::Equal)
        });
    } else {
        points.sort_by(|a, b| a.x.cmp(&b.x));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::str::FromStr;

    fn table(text: &str) -> SalesTable {
        SalesTable::from_csv_bytes(text.as_bytes()).unwrap()
    }

    #[test]
    fn bar_chart_averages_in_first_appearance_order() {
        let t = table("Platform,Units Sold\nWalmart,10\nAmazon,4\nWalmart,20\niHerb,\n");
        let series = build_series(&t, ChartKind::Bar, "Platform", "Units Sold").unwrap();
        assert_eq!(
            series.points,
            vec![
                ChartPoint { x: "Walmart".into(), y: 15.0, count: 2 },
                ChartPoint { x: "Amazon".into(), y: 4.0, count: 1 },
            ]
        );
    }

    #[test]
    fn line_chart_sorts_numeric_x() {
        let t = table("Month,Revenue\n10,1\n2,2\n1,3\n2,4\n");
        let series = build_series(&t, ChartKind::Line, "Month", "Revenue").unwrap();
        let xs: Vec<&str> = series.points.iter().map(|p| p.x.as_str()).collect();
        assert_eq!(xs, vec!["1", "2", "10"]);
        assert_eq!(series.points[1].y, 3.0);
    }

    #[test]
    fn line_chart_sorts_dates_lexically() {
        let t = table("Date,Price\n2024-02-01,1\n2024-01-15,2\n");
        let series = build_series(&t, ChartKind::Line, "Date", "Price").unwrap();
        assert_eq!(series.points[0].x, "2024-01-15");
    }

    #[test]
    fn unknown_column_is_a_plot_error() {
        let t = table("a,b\n1,2\n");
        assert_matches!(
            build_series(&t, ChartKind::Bar, "a", "zzz"),
            Err(ServiceError::PlotError(msg)) if msg.contains("'zzz'")
        );
    }

    #[test]
    fn non_numeric_y_is_a_plot_error() {
        let t = table("Platform,Category\nAmazon,Protein\n");
        assert_matches!(
            build_series(&t, ChartKind::Line, "Platform", "Category"),
            Err(ServiceError::PlotError(_))
        );
    }

    #[test]
    fn non_finite_y_values_are_skipped() {
        let t = table("Category,Price\nA,inf\nA,4\nB,-infinity\nB,NaN\n");
        let series = build_series(&t, ChartKind::Bar, "Category", "Price").unwrap();
        assert_eq!(
            series.points,
            vec![ChartPoint { x: "A".into(), y: 4.0, count: 1 }]
        );
    }

    #[test]
    fn same_column_on_both_axes_is_allowed() {
        let t = table("Price\n3\n3\n5\n");
        let series = build_series(&t, ChartKind::Bar, "Price", "Price").unwrap();
        assert_eq!(series.points.len(), 2);
    }

    #[test]
    fn chart_kind_parses_case_insensitively() {
        assert_eq!(ChartKind::from_str("Line").unwrap(), ChartKind::Line);
        assert_eq!(ChartKind::from_str("bar").unwrap(), ChartKind::Bar);
        assert!(ChartKind::from_str("pie").is_err());
        assert_eq!(ChartKind::Bar.to_string(), "bar");
    }
}
