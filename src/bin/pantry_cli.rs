use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use pantry_api::{
    config::{self, AppConfig},
    db::{self, DbPool},
    events::EventSender,
    services::{
        forecasting::forecaster_from_config,
        items::{CreateItemRequest, ItemService},
        neighbors::{LegacyNeighbor, NeighborService},
        reports::{ReportService, ReportSettings},
    },
};
use serde::Serialize;
use tracing::debug;

/// name, category, unit, quantity
const SAMPLE_ITEMS: &[(&str, &str, &str, i32)] = &[
    ("Rice", "Grains", "lb", 40),
    ("Black Beans", "Canned", "can", 60),
    ("Peanut Butter", "Protein", "jar", 25),
    ("Pasta", "Grains", "box", 50),
    ("Canned Tuna", "Protein", "can", 30),
    ("Oatmeal", "Breakfast", "canister", 20),
    ("Tomato Sauce", "Canned", "can", 45),
    ("Apples", "Produce", "lb", 35),
];

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Seed(args) => handle_seed(&context, args, cli.json).await?,
        Commands::ImportLegacyNeighbors(args) => {
            handle_import_legacy(&context, args, cli.json).await?
        }
        Commands::Forecast(args) => handle_forecast(&context, args, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "pantry", about = "Pantry administration CLI", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert a set of sample inventory items
    Seed(SeedArgs),
    /// Import neighbors stored in the legacy {Gender, Age, Zipcode, History} shape
    ImportLegacyNeighbors(ImportLegacyArgs),
    /// Print next month's demand predictions
    Forecast(ForecastArgs),
}

#[derive(Args)]
struct SeedArgs {
    #[arg(long, default_value_t = 1, help = "Multiply sample quantities by this factor")]
    scale: i32,
}

#[derive(Args)]
struct ImportLegacyArgs {
    #[arg(help = "Path to a JSON array of legacy neighbor records")]
    file: PathBuf,
}

#[derive(Args)]
struct ForecastArgs {
    #[arg(long, help = "Show at most this many predictions")]
    limit: Option<usize>,
}

struct CliContext {
    config: AppConfig,
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        if config.auto_migrate {
            db::run_migrations(&db_pool)
                .await
                .context("failed to run migrations")?;
        }
        let db = Arc::new(db_pool);

        let (event_sender, mut event_rx) = EventSender::channel(32);
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                debug!(target: "pantry_cli", event = event.name(), "received event");
            }
        });

        Ok(Self {
            config,
            db,
            event_sender,
        })
    }

    fn item_service(&self) -> ItemService {
        ItemService::new(self.db.clone(), self.event_sender.clone())
    }

    fn neighbor_service(&self) -> NeighborService {
        NeighborService::new(self.db.clone(), self.event_sender.clone())
    }

    fn report_service(&self) -> ReportService {
        ReportService::new(
            self.db.clone(),
            forecaster_from_config(&self.config),
            ReportSettings::from(&self.config),
        )
    }
}

async fn handle_seed(context: &CliContext, args: SeedArgs, json: bool) -> Result<()> {
    let service = context.item_service();
    let scale = args.scale.max(1);
    let mut created = Vec::with_capacity(SAMPLE_ITEMS.len());

    for (name, category, unit, quantity) in SAMPLE_ITEMS {
        let quantity = quantity.saturating_mul(scale);
        let item = service
            .create(CreateItemRequest {
                item_no: None,
                name: name.to_string(),
                unit: Some(unit.to_string()),
                gross_unit_weight: None,
                category: category.to_string(),
                current_quantity: quantity,
                last_restock_quantity: Some(quantity),
                last_restock_date: None,
            })
            .await
            .with_context(|| format!("failed to create sample item {}", name))?;
        created.push(item);
    }

    if json {
        print_json(&created)?;
    } else {
        println!("Seeded {} items:", created.len());
        for detail in &created {
            println!(
                "- {} • {} • {} {}",
                detail.item.id, detail.item.name, detail.item.current_quantity, detail.item.unit
            );
        }
    }
    Ok(())
}

async fn handle_import_legacy(
    context: &CliContext,
    args: ImportLegacyArgs,
    json: bool,
) -> Result<()> {
    let raw = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let records: Vec<LegacyNeighbor> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of legacy neighbors", args.file.display()))?;

    let report = context
        .neighbor_service()
        .import_legacy(records)
        .await
        .context("import failed; no neighbors were written")?;

    if json {
        print_json(&report)?;
    } else {
        println!(
            "Imported {} neighbors, linked {} purchases, skipped {} unknown history entries",
            report.imported, report.linked_purchases, report.skipped_history
        );
    }
    Ok(())
}

async fn handle_forecast(context: &CliContext, args: ForecastArgs, json: bool) -> Result<()> {
    let mut report = context
        .report_service()
        .forecast()
        .await
        .context("forecast failed")?;
    if let Some(limit) = args.limit {
        report.predictions.truncate(limit);
    }

    if json {
        print_json(&report)?;
    } else if report.predictions.is_empty() {
        println!("No purchase history to forecast from");
    } else {
        for prediction in &report.predictions {
            println!("- {} • {}", prediction.item_code, prediction.predicted_qty);
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
