//! Property-based tests for the prediction pipeline.
//!
//! Records are generated over the full input space, including categories the
//! preprocessor has never seen, to check invariants that hold for every row.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use proptest::prelude::*;
use rust_decimal::Decimal;
use sales_revenue_api::{
    models::{format_thousands, RevenuePrediction, SalesRecord},
    services::PredictionService,
    tabular::SalesTable,
};

fn service() -> &'static PredictionService {
    static SERVICE: OnceLock<PredictionService> = OnceLock::new();
    SERVICE.get_or_init(|| {
        let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        PredictionService::from_artifacts(
            &root.join("artifacts/preprocessor.json"),
            &root.join("artifacts/revenue_model.json"),
        )
        .expect("bundled artifacts should load")
    })
}

// Strategies for generating test data
fn date_strategy() -> impl Strategy<Value = String> {
    (2015i32..2030, 1u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| format!("{:04}-{:02}-{:02}", y, m, d))
}

fn amount_strategy(max: u64) -> impl Strategy<Value = String> {
    (0u64..max, 0u8..100).prop_map(|(whole, cents)| format!("{}.{:02}", whole, cents))
}

fn category_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Protein".to_string()),
        Just("Vitamin".to_string()),
        Just("Omega".to_string()),
        "[A-Z][a-z]{2,10}",
    ]
}

fn record_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    (
        date_strategy(),
        "[A-Z][0-9]{3}",
        "[A-Za-z ]{1,20}[a-z]",
        category_strategy(),
        amount_strategy(500),
        0u32..1000,
        0u32..50,
        (0u8..=100).prop_map(|pct| format!("{:.2}", f64::from(pct) / 100.0)),
        prop_oneof![Just("USA"), Just("UK"), Just("Canada"), Just("Mars")],
        prop_oneof![Just("Amazon"), Just("Walmart"), Just("iHerb"), Just("eBay")],
        amount_strategy(50),
        0u32..=1,
    )
        .prop_map(
            |(
                date,
                product_id,
                product_name,
                category,
                price,
                units_sold,
                units_returned,
                discount,
                location,
                platform,
                marketing_spend,
                promotions,
            )| {
                BTreeMap::from([
                    ("Date".to_string(), date),
                    ("Product ID".to_string(), product_id),
                    ("Product Name".to_string(), product_name),
                    ("Category".to_string(), category),
                    ("Price".to_string(), price),
                    ("Units Sold".to_string(), units_sold.to_string()),
                    ("Units Returned".to_string(), units_returned.to_string()),
                    ("Discount".to_string(), discount),
                    ("Location".to_string(), location.to_string()),
                    ("Platform".to_string(), platform.to_string()),
                    ("Marketing Spend".to_string(), marketing_spend),
                    ("Promotions".to_string(), promotions.to_string()),
                ])
            },
        )
}

fn to_csv(records: &[BTreeMap<String, String>]) -> String {
    let headers: Vec<&str> = records[0].keys().map(String::as_str).collect();
    let mut out = headers.join(",");
    out.push('\n');
    for record in records {
        let row: Vec<&str> = record.values().map(String::as_str).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn predictions_are_never_negative(fields in record_strategy()) {
        let record = SalesRecord::from_source(&fields).unwrap();
        let prediction = service().predict_one(&record).unwrap();
        prop_assert!(prediction.value() >= 0.0);
        prop_assert!(prediction.value().is_finite());
    }

    #[test]
    fn batch_returns_one_prediction_per_record(
        rows in prop::collection::vec(record_strategy(), 1..20)
    ) {
        let records = SalesRecord::parse_all(rows.iter()).unwrap();
        let predictions = service().predict_batch(&records).unwrap();
        prop_assert_eq!(predictions.len(), rows.len());

        for (record, batched) in records.iter().zip(&predictions) {
            let single = service().predict_one(record).unwrap();
            prop_assert_eq!(single.value(), batched.value());
        }
    }

    #[test]
    fn scored_csv_keeps_every_row(rows in prop::collection::vec(record_strategy(), 1..15)) {
        let table = SalesTable::from_csv_bytes(to_csv(&rows).as_bytes()).unwrap();
        let predictions = service().predict_table(&table).unwrap();
        let scored = table.with_predictions(&predictions).unwrap();

        let reread = SalesTable::from_csv_bytes(&scored).unwrap();
        prop_assert_eq!(reread.row_count(), rows.len());
        prop_assert!(reread.has_column("Predicted Revenue"));
    }

    #[test]
    fn negative_raw_scores_clamp_to_zero(raw in -1.0e9f64..0.0) {
        let prediction = RevenuePrediction::from_raw(raw).unwrap();
        prop_assert_eq!(prediction.value(), 0.0);
    }

    #[test]
    fn thousands_grouping_round_trips(cents in 0i64..1_000_000_000_000) {
        let value = Decimal::new(cents, 2);
        let formatted = format_thousands(value);

        let (int_part, frac_part) = formatted.split_once('.').unwrap();
        prop_assert_eq!(frac_part.len(), 2);
        for group in int_part.split(',').skip(1) {
            prop_assert_eq!(group.len(), 3);
        }
        let parsed: Decimal = formatted.replace(',', "").parse().unwrap();
        prop_assert_eq!(parsed, value);
    }
}
