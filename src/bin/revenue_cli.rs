use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use sales_revenue_api::{
    config,
    models::{field_schema, PredictionResponse, SalesField, SalesRecord},
    services::PredictionService,
    tabular::{build_series, ChartKind, SalesTable, DOWNLOAD_FILE_NAME},
};
use serde::Serialize;
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "revenue-cli",
    about = "Predict sales revenue from the command line",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Emit JSON instead of human-readable output"
    )]
    json: bool,
    #[arg(long, global = true, help = "Override the preprocessor artifact path")]
    preprocessor: Option<PathBuf>,
    #[arg(long, global = true, help = "Override the model artifact path")]
    model: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict revenue for one record given as flags
    Predict(PredictArgs),
    /// Predict revenue for every row of a CSV file and write the result
    Batch(BatchArgs),
    /// Print the columns and first rows of a CSV file
    Preview(PreviewArgs),
    /// Aggregate two columns of a CSV file into a chart series
    Chart(ChartArgs),
    /// List the input fields a record needs
    Schema,
}

#[derive(Args, Default)]
struct PredictArgs {
    #[arg(long, help = "Sale date, e.g. 2024-03-15")]
    date: Option<String>,
    #[arg(long, help = "Product identifier")]
    product_id: Option<String>,
    #[arg(long, help = "Product name")]
    product_name: Option<String>,
    #[arg(long, help = "Product category")]
    category: Option<String>,
    #[arg(long, help = "Unit price")]
    price: Option<String>,
    #[arg(long, help = "Units sold")]
    units_sold: Option<String>,
    #[arg(long, help = "Units returned")]
    units_returned: Option<String>,
    #[arg(long, help = "Discount rate")]
    discount: Option<String>,
    #[arg(long, help = "Sales location")]
    location: Option<String>,
    #[arg(long, help = "Sales platform")]
    platform: Option<String>,
    #[arg(long, help = "Marketing spend")]
    marketing_spend: Option<String>,
    #[arg(long, help = "Promotion in effect")]
    promotions: Option<String>,
}

impl PredictArgs {
    /// Flags keyed by column name; absent flags are left out so the record
    /// parser reports them as missing.
    fn into_fields(self) -> BTreeMap<String, String> {
        [
            (SalesField::Date, self.date),
            (SalesField::ProductId, self.product_id),
            (SalesField::ProductName, self.product_name),
            (SalesField::Category, self.category),
            (SalesField::Price, self.price),
            (SalesField::UnitsSold, self.units_sold),
            (SalesField::UnitsReturned, self.units_returned),
            (SalesField::Discount, self.discount),
            (SalesField::Location, self.location),
            (SalesField::Platform, self.platform),
            (SalesField::MarketingSpend, self.marketing_spend),
            (SalesField::Promotions, self.promotions),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| (field.column().to_string(), v)))
        .collect()
    }
}

#[derive(Args)]
struct BatchArgs {
    #[arg(long, help = "CSV file with a header row")]
    input: PathBuf,
    #[arg(long, default_value = DOWNLOAD_FILE_NAME, help = "Where to write the scored CSV")]
    output: PathBuf,
}

#[derive(Args)]
struct PreviewArgs {
    #[arg(long, help = "CSV file with a header row")]
    input: PathBuf,
    #[arg(long, default_value_t = 5, help = "Number of rows to show")]
    rows: usize,
}

#[derive(Args)]
struct ChartArgs {
    #[arg(long, help = "CSV file with a header row")]
    input: PathBuf,
    #[arg(long, default_value_t = ChartKind::Line, help = "line or bar")]
    kind: ChartKind,
    #[arg(long, help = "Column grouped on the x axis")]
    x: String,
    #[arg(long, help = "Numeric column averaged on the y axis")]
    y: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config().context("failed to load configuration")?;
    init_stderr_tracing(cfg.log_level());

    match cli.command {
        Commands::Predict(args) => {
            let service = load_service(&cfg, cli.preprocessor, cli.model)?;
            handle_predict(&service, args, cli.json)
        }
        Commands::Batch(args) => {
            let service = load_service(&cfg, cli.preprocessor, cli.model)?;
            handle_batch(&service, args, cli.json)
        }
        Commands::Preview(args) => handle_preview(args, cli.json),
        Commands::Chart(args) => handle_chart(args),
        Commands::Schema => handle_schema(cli.json),
    }
}

/// Logs go to stderr so stdout stays parseable.
fn init_stderr_tracing(level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = std::env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("sales_revenue_api={},revenue_cli={}", level, level));
    let _ = fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_service(
    cfg: &config::AppConfig,
    preprocessor: Option<PathBuf>,
    model: Option<PathBuf>,
) -> Result<PredictionService> {
    let preprocessor = preprocessor.unwrap_or_else(|| cfg.preprocessor_path.clone());
    let model = model.unwrap_or_else(|| cfg.model_path.clone());
    debug!(preprocessor = %preprocessor.display(), model = %model.display(), "Loading artifacts");

    let service = PredictionService::from_artifacts(&preprocessor, &model)
        .context("failed to load prediction pipeline")?;
    Ok(service.with_slow_threshold(cfg.slow_inference_threshold()))
}

fn handle_predict(service: &PredictionService, args: PredictArgs, json: bool) -> Result<()> {
    let record = SalesRecord::from_source(&args.into_fields())?;
    let prediction = service.predict_one(&record)?;

    if json {
        print_json(&PredictionResponse::from(prediction))
    } else {
        println!("{}", prediction.display_message());
        Ok(())
    }
}

fn handle_batch(service: &PredictionService, args: BatchArgs, json: bool) -> Result<()> {
    let table = read_table(&args.input)?;
    let predictions = service.predict_table(&table)?;
    let rows = table.prediction_rows(&predictions)?;
    let scored = table.with_predictions(&predictions)?;

    fs::write(&args.output, scored)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    if json {
        return print_json(&rows);
    }

    println!("{:<40} {:>18}", "Product Name", "Predicted Revenue");
    for row in &rows {
        println!("{:<40} {:>18}", row.product_name, row.predicted_revenue);
    }
    println!("\nWrote {} rows to {}", rows.len(), args.output.display());
    Ok(())
}

fn handle_preview(args: PreviewArgs, json: bool) -> Result<()> {
    let table = read_table(&args.input)?;
    let preview = table.preview(args.rows);

    if json {
        return print_json(&preview);
    }

    println!("{}", preview.columns.join(" | "));
    for row in &preview.rows {
        println!("{}", row.join(" | "));
    }
    println!("({} of {} rows)", preview.rows.len(), preview.total_rows);
    Ok(())
}

fn handle_chart(args: ChartArgs) -> Result<()> {
    let table = read_table(&args.input)?;
    let series = build_series(&table, args.kind, &args.x, &args.y)?;
    print_json(&series)
}

fn handle_schema(json: bool) -> Result<()> {
    let schema = field_schema();
    if json {
        return print_json(&schema);
    }

    for spec in &schema {
        println!("- {} ({}): {}", spec.name, spec.alias, spec.constraint);
    }
    Ok(())
}

fn read_table(path: &Path) -> Result<SalesTable> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(SalesTable::from_csv_bytes(&bytes)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
