use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use kobo_core::config::{find_config_root, load_settings, Settings};
use kobo_core::events::{derive_events_now, pending_events, ProductionEvent};
use kobo_core::fingerprint::split_hashes;
use kobo_core::inventory::{apply_production_signals, reconcile_table, sales_gap, InventoryRecord};
use kobo_core::ledger::{
    cancel_confirmation, confirm_production, ActionOutcome, ConfirmedHashes, Ledger,
};
use kobo_core::log::rows_from_table;
use kobo_core::table::{read_csv_table, Table};

#[derive(Parser)]
#[command(
    name = "kobo",
    version,
    about = "Workshop production ledger and inventory"
)]
struct Cli {
    /// Project root (defaults to the nearest directory with .kobo.toml, else cwd)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Confirmation ledger CSV (overrides config)
    #[arg(long, global = true, env = "KOBO_LEDGER")]
    ledger: Option<PathBuf>,
    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Production events derived from the processing log
    Events {
        #[arg(long)]
        log: Option<PathBuf>,
        #[arg(long)]
        lookback_days: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Events not yet confirmed in the ledger
    Pending {
        #[arg(long)]
        log: Option<PathBuf>,
        #[arg(long)]
        lookback_days: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Record a PRODUCED entry
    Confirm {
        project: String,
        #[arg(long)]
        part: Option<String>,
        /// Comma-separated row fingerprints backing this confirmation
        #[arg(long, default_value = "")]
        hashes: String,
        /// Processing timestamp the confirmation refers to
        #[arg(long, default_value = "")]
        at: String,
        #[arg(long)]
        json: bool,
    },
    /// Record a compensating CANCEL entry
    Cancel {
        project: String,
        #[arg(long)]
        part: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Reconciled inventory: baseline + confirmed - sold
    Inventory {
        #[arg(long)]
        master: Option<PathBuf>,
        #[arg(long)]
        sales: Option<PathBuf>,
        /// Processing log; marks out-of-stock items with pending production
        #[arg(long)]
        log: Option<PathBuf>,
        #[arg(long)]
        lookback_days: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Ledger entries in append order
    Ledger {
        #[arg(long)]
        json: bool,
    },
    /// Print version information
    Version,
}

struct Workspace {
    settings: Settings,
    ledger: Ledger,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let root = resolve_root(cli.root.as_deref())?;
    let settings = load_settings(&root);
    let ledger = Ledger::new(
        cli.ledger
            .clone()
            .unwrap_or_else(|| settings.ledger_path.clone()),
    );
    debug!(root = %root.display(), ledger = %ledger.path().display(), "resolved settings");
    let ctx = Workspace { settings, ledger };

    match cli.command {
        Some(Command::Events {
            log,
            lookback_days,
            json,
        }) => {
            let events = load_events(&ctx, log.as_deref(), lookback_days)?;
            if json {
                let calendar = events
                    .iter()
                    .map(ProductionEvent::to_calendar)
                    .collect::<Vec<_>>();
                print_json(&calendar)?;
            } else if events.is_empty() {
                println!("No production events.");
            } else {
                for event in &events {
                    println!("{}", event_line(event));
                }
            }
        }
        Some(Command::Pending {
            log,
            lookback_days,
            json,
        }) => {
            let events = load_events(&ctx, log.as_deref(), lookback_days)?;
            let entries = ctx.ledger.read_all().context("read ledger")?;
            let queue = pending_events(&events, &entries);
            if json {
                let ready = queue
                    .ready
                    .iter()
                    .map(ProductionEvent::to_calendar)
                    .collect::<Vec<_>>();
                let review = queue
                    .review
                    .iter()
                    .map(ProductionEvent::to_calendar)
                    .collect::<Vec<_>>();
                print_json(&json!({ "ready": ready, "review": review }))?;
            } else if queue.is_empty() {
                println!("All production events are confirmed.");
            } else {
                println!("Ready to confirm ({}):", queue.ready.len());
                for event in &queue.ready {
                    println!("  {}", event_line(event));
                }
                println!("Needs review ({}):", queue.review.len());
                for event in &queue.review {
                    println!("  {}", event_line(event));
                }
            }
        }
        Some(Command::Confirm {
            project,
            part,
            hashes,
            at,
            json,
        }) => {
            let entries = ctx.ledger.read_all().context("read ledger")?;
            let confirmed = ConfirmedHashes::from_entries(&entries);
            let outcome = if confirmed.covers_any(split_hashes(&hashes)) {
                ActionOutcome {
                    success: false,
                    message: format!("{} is already confirmed for these log rows", project.trim()),
                }
            } else {
                confirm_production(&ctx.ledger, &project, part.as_deref(), &hashes, &at)
            };
            return report_outcome(&outcome, json);
        }
        Some(Command::Cancel {
            project,
            part,
            json,
        }) => {
            let outcome = cancel_confirmation(&ctx.ledger, &project, part.as_deref());
            return report_outcome(&outcome, json);
        }
        Some(Command::Inventory {
            master,
            sales,
            log,
            lookback_days,
            json,
        }) => {
            let master_path = master
                .or_else(|| ctx.settings.master_path.clone())
                .ok_or_else(|| anyhow!("no master data; pass --master or set master_path"))?;
            let master = read_table(&master_path)?;
            let log_path = log.or_else(|| ctx.settings.log_path.clone());
            let sales = match sales
                .or_else(|| ctx.settings.sales_path.clone())
                .or_else(|| log_path.clone())
            {
                Some(path) => read_table(&path)?,
                None => Table::default(),
            };
            let entries = ctx.ledger.read_all().context("read ledger")?;
            let mut records = reconcile_table(&master, &sales, &entries);
            if let Some(log_path) = log_path {
                let events = load_events(&ctx, Some(log_path.as_path()), lookback_days)?;
                apply_production_signals(&mut records, &pending_events(&events, &entries));
            }
            let gap = sales_gap(&records);
            if json {
                print_json(&json!({ "records": records, "sales_gap": gap }))?;
            } else if records.is_empty() {
                println!("No inventory data.");
            } else {
                for record in &records {
                    println!("{}", inventory_line(record));
                }
                if gap.target_revenue > 0 {
                    println!(
                        "Sales gap: {} of {} ({:.0}%)",
                        gap.current_revenue,
                        gap.target_revenue,
                        gap.progress_ratio * 100.0
                    );
                }
            }
        }
        Some(Command::Ledger { json }) => {
            let entries = ctx.ledger.read_all().context("read ledger")?;
            if json {
                print_json(&entries)?;
            } else if entries.is_empty() {
                println!("Ledger is empty.");
            } else {
                for entry in &entries {
                    println!(
                        "{}  {:<8}  {} ({})  {}",
                        entry.recorded_at,
                        entry.action.as_str(),
                        entry.project,
                        entry.part,
                        entry.reference_timestamp
                    );
                }
            }
        }
        Some(Command::Version) => {
            println!("kobo {} (core {})", env!("CARGO_PKG_VERSION"), kobo_core::version());
        }
        None => {
            Cli::command().print_help()?;
            println!();
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("KOBO_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn resolve_root(root: Option<&Path>) -> Result<PathBuf> {
    if let Some(root) = root {
        return Ok(root.to_path_buf());
    }
    let cwd = std::env::current_dir().context("resolve current directory")?;
    Ok(find_config_root(&cwd).unwrap_or(cwd))
}

fn read_table(path: &Path) -> Result<Table> {
    read_csv_table(path).with_context(|| format!("read {}", path.display()))
}

fn load_events(
    ctx: &Workspace,
    log: Option<&Path>,
    lookback_days: Option<u32>,
) -> Result<Vec<ProductionEvent>> {
    let path = log
        .map(Path::to_path_buf)
        .or_else(|| ctx.settings.log_path.clone())
        .ok_or_else(|| anyhow!("no processing log; pass --log or set log_path"))?;
    let rows = rows_from_table(&read_table(&path)?);
    let lookback = lookback_days.unwrap_or(ctx.settings.lookback_days);
    Ok(derive_events_now(&rows, lookback))
}

fn report_outcome(outcome: &ActionOutcome, json: bool) -> Result<ExitCode> {
    if json {
        print_json(outcome)?;
    } else if outcome.success {
        println!("{}", outcome.message);
    } else {
        eprintln!("{}", outcome.message);
    }
    Ok(if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn event_line(event: &ProductionEvent) -> String {
    format!(
        "{}  {:<4}  {}  [{}]  {} row(s)",
        event.date,
        event.confidence.as_str(),
        event.title,
        event.details(),
        event.constituent_hashes.len()
    )
}

fn inventory_line(record: &InventoryRecord) -> String {
    let sheath = if record.has_sheath {
        format!("  sheath {}", record.sheath_remaining)
    } else {
        String::new()
    };
    format!(
        "{}  body {}{}  confirmed {:+}  sold {}  {}",
        record.display_name,
        record.body_remaining,
        sheath,
        record.net_confirmed,
        record.sales_observed,
        record.status.as_str()
    )
}
