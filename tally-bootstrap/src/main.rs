use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDateTime, Utc};
use clap::{Args, Parser, Subcommand};
use prettytable::{row, Table};
use tally_connector::{
    error::SourceError,
    exchange::binance::source::BinanceSource,
    source::{FetchFailure, TradeSource},
    spreadsheet::SpreadsheetSource,
};
use tally_core::{
    accounting::recompute::RecomputeSummary,
    config::TallyConfig,
    journal::{
        repository::{sqlite::SqliteRepository, TradeFilter},
        ImportReport, Journal,
    },
    statistic::{
        currency::{ledger_table, trade_table},
        summary::{PortfolioFilter, TableBuilder},
    },
};
use tally_model::{deserialization::parse_timestamp, enums::Side};
use tracing::{info, warn};

/// Trading journal: ingest fills, replay weighted-average cost, report realized PnL.
#[derive(Debug, Parser)]
#[command(name = "tally", version)]
struct Cli {
    /// JSON configuration file; a missing file means defaults
    #[arg(long, short, global = true, default_value = "config.json")]
    config: PathBuf,

    /// Override the configured SQLite database path
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import a spreadsheet export (CSV, XLSX or XLS) of trade history
    Import {
        file: PathBuf,
    },
    /// Pull fills from Binance since the last sync
    Sync(SyncArgs),
    /// Replay every symbol and rewrite cached PnL
    Recompute,
    /// Portfolio summary over a time window
    Report(ReportArgs),
    /// Detailed report for one base currency
    Currency {
        currency: String,

        /// Also print every trade with the running position
        #[arg(long)]
        ledger: bool,
    },
    /// Every traded base currency ranked by realized PnL
    Currencies,
    /// List stored trades
    Trades(TradesArgs),
    /// List every stored (normalised) symbol
    Symbols,
    /// Check the configured Binance credentials with a signed account request
    ApiTest,
}

#[derive(Debug, Args)]
struct SyncArgs {
    /// Symbols to fetch; defaults to the configured list, then to every stored symbol
    #[arg(long, value_delimiter = ',')]
    symbols: Vec<String>,

    /// Look back this many days when no previous sync is recorded
    #[arg(long)]
    days: Option<u32>,

    /// Ignore the stored watermark and use the look back window
    #[arg(long)]
    full: bool,
}

#[derive(Debug, Args)]
struct ReportArgs {
    /// Only trades of the last N days
    #[arg(long)]
    days: Option<u32>,

    /// Only trades at or after this time (YYYY-MM-DD [HH:MM:SS])
    #[arg(long, value_parser = parse_time)]
    since: Option<NaiveDateTime>,

    #[arg(long)]
    symbol: Option<String>,
}

#[derive(Debug, Args)]
struct TradesArgs {
    #[arg(long)]
    symbol: Option<String>,

    /// BUY or SELL
    #[arg(long)]
    side: Option<Side>,

    /// Only trades at or after this time (YYYY-MM-DD [HH:MM:SS])
    #[arg(long, value_parser = parse_time)]
    since: Option<NaiveDateTime>,

    #[arg(long)]
    limit: Option<usize>,
}

fn parse_time(input: &str) -> Result<NaiveDateTime, String> {
    parse_timestamp(input).ok_or_else(|| format!("unrecognised timestamp: {input}"))
}

// Initialise an INFO `Subscriber` for `Tracing` Json logs and install it as the global default.
fn init_logging() {
    tracing_subscriber::fmt()
        // Filter messages based on the INFO
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        // Keep stdout for reports
        .with_writer(std::io::stderr)
        // Disable colours on release builds
        .with_ansi(cfg!(debug_assertions))
        // Enable Json formatting
        .json()
        // Install this Tracing subscriber as global default
        .init()
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = TallyConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?
        .with_env_credentials();
    if let Some(database) = cli.database.clone() {
        config.database_path = database;
    }

    let repository = SqliteRepository::open(&config.database_path)
        .with_context(|| format!("opening trade database {}", config.database_path.display()))?;
    let journal = Journal::builder()
        .repository(repository)
        .normalizer(config.normalizer())
        .rejection_threshold(config.rejection_threshold)
        .build()?;

    match cli.command {
        Command::Import { file } => {
            let source = SpreadsheetSource::new(&file);
            let (report, failures) = ingest(&journal, &source, None)
                .await
                .with_context(|| format!("importing {}", file.display()))?;
            print_import(&report, &failures, cli.json)?;
        }
        Command::Sync(args) => sync(&journal, &config, args, cli.json).await?,
        Command::Recompute => {
            let summary = journal.recompute_all().context("recomputing PnL")?;
            print_recompute(&summary, cli.json)?;
        }
        Command::Report(args) => {
            let filter = PortfolioFilter {
                since: args.since,
                symbol: args.symbol,
                days: args.days,
            };
            let summary = journal.portfolio_report(&filter).context("building portfolio report")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                summary.table("Portfolio").printstd();
            }
        }
        Command::Currency { currency, ledger } => {
            let report = journal.currency_report(&currency).context("building currency report")?;
            if report.is_empty() {
                bail!("no trades found for {}", currency.to_uppercase());
            }
            let steps = if ledger {
                journal.currency_ledger(&currency).context("replaying currency ledger")?
            } else {
                Vec::new()
            };

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                report.table(&report.currency).printstd();
                if ledger {
                    ledger_table(&steps).printstd();
                }
            }
        }
        Command::Currencies => {
            let listing = journal.list_currencies().context("listing currencies")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                listing.table().printstd();
            }
        }
        Command::Trades(args) => {
            let filter = TradeFilter {
                since: args.since,
                symbol: args.symbol,
                side: args.side,
                limit: args.limit,
            };
            let trades = journal.trades(&filter).context("querying trades")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&trades)?);
            } else {
                trade_table(&trades).printstd();
            }
        }
        Command::Symbols => {
            let symbols = journal.symbols().context("listing symbols")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&symbols)?);
            } else {
                let mut table = Table::new();
                table.set_titles(row!["Symbol"]);
                for symbol in &symbols {
                    table.add_row(row![symbol]);
                }
                table.printstd();
            }
        }
        Command::ApiTest => {
            let source = binance_source(&config, Vec::new(), config.sync_days)?;
            let account = source.check_connection().await.map_err(|error| {
                let message = error.user_message();
                anyhow::Error::new(error).context(message)
            })?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&account)?);
            } else {
                let mut table = Table::new();
                table.set_titles(row!["Account", "Can Trade", "Updated"]);
                table.add_row(row![account.account_type, account.can_trade, account.update_time]);
                table.printstd();
            }
        }
    }

    Ok(())
}

/// Fetch and import whatever `source` could deliver, handing back the symbols it gave up on.
async fn ingest<Source>(
    journal: &Journal<SqliteRepository>,
    source: &Source,
    since: Option<NaiveDateTime>,
) -> Result<(ImportReport, Vec<FetchFailure>)>
where
    Source: TradeSource + Sync,
{
    let outcome = source.fetch_trades(since).await.map_err(|error| {
        let message = error.user_message();
        anyhow::Error::new(error).context(message)
    })?;
    info!(
        data_source = %source.data_source(),
        records = outcome.trades.len(),
        failures = outcome.failures.len(),
        "fetched trade records"
    );

    let report = journal.import(&outcome.trades).map_err(|error| {
        let message = error.user_message();
        anyhow::Error::new(error).context(message)
    })?;
    Ok((report, outcome.failures))
}

fn binance_source(config: &TallyConfig, symbols: Vec<String>, lookback_days: u32) -> Result<BinanceSource> {
    let (api_key, api_secret) = config
        .binance
        .credentials()
        .ok_or(SourceError::MissingCredentials)
        .context("set BINANCE_API_KEY and BINANCE_API_SECRET or add them to the config file")?;

    Ok(BinanceSource::builder()
        .base_url(config.binance.base_url.as_str())
        .credentials(api_key, api_secret)
        .recv_window(config.binance.recv_window)
        .symbols(&symbols)
        .lookback_days(lookback_days)
        .build()?)
}

async fn sync(journal: &Journal<SqliteRepository>, config: &TallyConfig, args: SyncArgs, json: bool) -> Result<()> {
    let symbols = if !args.symbols.is_empty() {
        args.symbols
    } else if !config.binance.symbols.is_empty() {
        config.binance.symbols.clone()
    } else {
        journal.symbols()?
    };
    if symbols.is_empty() {
        bail!("no symbols to sync: pass --symbols or configure binance.symbols");
    }

    let source = binance_source(config, symbols, args.days.unwrap_or(config.sync_days))?;

    let since = if args.full { None } else { journal.last_sync()? };
    let started = Utc::now().naive_utc();
    info!(?since, symbols = ?source.symbols(), "syncing Binance fills");

    let (report, failures) = ingest(journal, &source, since).await.context("syncing from Binance")?;
    print_import(&report, &failures, json)?;

    // A partial sync keeps the old watermark so the failed symbols are retried from it
    if !failures.is_empty() {
        bail!("{} of {} symbols failed to sync; the sync watermark was not advanced", failures.len(), source.symbols().len());
    }
    journal.record_sync(started)?;
    Ok(())
}

fn print_import(report: &ImportReport, failures: &[FetchFailure], json: bool) -> Result<()> {
    for failure in failures {
        warn!(symbol = %failure.symbol, error = %failure.error, "symbol not fetched");
    }
    for rejected in &report.rejected {
        warn!(row = rejected.index + 1, error = %rejected.error, "record rejected");
    }
    if !report.recompute.is_clean() {
        warn!(failures = report.recompute.failures.len(), "some symbols failed to recompute");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_titles(row!["Records", "Inserted", "Duplicates", "Rejected", "Symbols Replayed"]);
    table.add_row(row![
        report.total,
        report.inserted,
        report.ignored,
        report.rejected.len(),
        report.recompute.symbols
    ]);
    table.printstd();

    for rejected in &report.rejected {
        println!("row {}: {}", rejected.index + 1, rejected.error.user_message());
    }
    for failure in failures {
        println!("{}: {}", failure.symbol, failure.error.user_message());
    }
    Ok(())
}

fn print_recompute(summary: &RecomputeSummary, json: bool) -> Result<()> {
    for failure in &summary.failures {
        warn!(symbol = failure.symbol(), error = %failure, "recompute failed");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        let mut table = Table::new();
        table.set_titles(row!["Symbols", "Trades", "Failed"]);
        table.add_row(row![summary.symbols, summary.trades, summary.failures.len()]);
        table.printstd();
    }
    Ok(())
}
