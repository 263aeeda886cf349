use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kflat::config::Config;
use kflat::kube::{self, KubeClient};
use kflat::resource::{get_catalog, get_table, Listing, TableSchema};
use kflat::row::ContextId;
use kflat::sink::MemorySink;
use kflat::sync::{CancelToken, Multiplexer, PassReport, PassStatus};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Flatten Kubernetes-style resources into relational tables
#[derive(Parser, Debug)]
#[command(name = "kflat", version = kflat::VERSION, about, long_about = None)]
struct Args {
    /// Config file (JSON, or YAML by extension)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Log to stderr instead of the log file
    #[arg(long, global = true)]
    log_stderr: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one sync pass
    Sync {
        /// Root table to sync (repeatable, default: config or all)
        #[arg(short, long = "table")]
        tables: Vec<String>,

        /// Context to sync (repeatable, default: all configured)
        #[arg(short = 'x', long = "context")]
        contexts: Vec<String>,

        /// Row snapshot file
        #[arg(long)]
        state: Option<PathBuf>,

        /// Maximum (table, context) units synced at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Print the pass report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the table tree
    Tables {
        /// Print one table name per line instead of the tree
        #[arg(long)]
        names: bool,
    },
    /// Show the columns of a table
    Describe { table: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(
    level: LogLevel,
    to_stderr: bool,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    if to_stderr {
        let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());
        tracing_subscriber::fmt()
            .with_max_level(tracing_level)
            .with_writer(non_blocking.with_max_level(tracing_level))
            .with_target(true)
            .init();
        return Ok(Some(guard));
    }

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| anyhow!("Failed to open log file {:?}: {}", log_path, e))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("kflat {} started with log level: {:?}", kflat::VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = Config::config_dir() {
        return config_dir.join("kflat.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".kflat").join("kflat.log");
    }
    PathBuf::from("kflat.log")
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = match setup_logging(args.log_level, args.log_stderr) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = Config::load(args.config.as_deref())?;

    match args.command {
        Command::Sync {
            tables,
            contexts,
            state,
            concurrency,
            json,
        } => {
            let report = sync(&config, &tables, &contexts, state, concurrency).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            Ok(match report.status() {
                PassStatus::Success => ExitCode::SUCCESS,
                PassStatus::Partial => ExitCode::from(2),
                PassStatus::Failed => ExitCode::FAILURE,
            })
        }
        Command::Tables { names } => {
            let catalog = get_catalog()?;
            if names {
                for name in catalog.all_names() {
                    println!("{}", name);
                }
            } else {
                for table in catalog.tables() {
                    print_tree(table, 0);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Describe { table } => {
            let Some(table) = get_table(&table) else {
                return Err(anyhow!("Unknown table: {}", table));
            };
            describe(table);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn sync(
    config: &Config,
    tables: &[String],
    contexts: &[String],
    state: Option<PathBuf>,
    concurrency: Option<usize>,
) -> Result<PassReport> {
    let catalog = get_catalog()?;
    let roots: Vec<&str> = catalog.tables().iter().map(|t| t.name.as_str()).collect();

    let selected = config
        .effective_tables(tables, &roots)
        .iter()
        .map(|name| {
            catalog.root(name).ok_or_else(|| {
                if catalog.get(name).is_some() {
                    anyhow!("{} is a relation; sync its root table instead", name)
                } else {
                    anyhow!("Unknown table: {}", name)
                }
            })
        })
        .collect::<Result<Vec<&TableSchema>>>()?;

    let contexts = kube::resolve_contexts(config, contexts)?;

    let sink = match config.effective_state_path(state.as_deref()) {
        Some(path) => Arc::new(MemorySink::open(&path)?),
        None => Arc::new(MemorySink::new()),
    };
    let upstream = Arc::new(KubeClient::new(config.effective_page_size())?);

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, stopping after in-flight requests...");
            on_signal.cancel();
        }
    });

    let multiplexer = Multiplexer::new(upstream, sink.clone(), contexts)
        .with_default_context(config.default_context.as_deref().map(ContextId::new))
        .with_max_concurrency(config.effective_max_concurrency(concurrency))
        .with_retry(config.retry)
        .with_cancel(cancel);

    let report = multiplexer.run_all(&selected).await?;
    sink.save()?;

    let stored = sink.table_names();
    tracing::info!(
        "Sink holds {} rows across {} tables",
        stored.iter().map(|table| sink.count(table)).sum::<usize>(),
        stored.len()
    );
    Ok(report)
}

fn print_report(report: &PassReport) {
    println!(
        "Pass {} finished in {}ms: {:?}",
        report.pass,
        report.duration().num_milliseconds(),
        report.status()
    );
    for scope in &report.scopes {
        println!(
            "  {:<32} {:<16} written {:>6}  deleted {:>6}  warnings {:>4}  failures {:>4}",
            scope.table,
            scope.context,
            scope.total_written(),
            scope.total_deleted(),
            scope.warnings.len(),
            scope.failures.len()
        );
    }
    for failure in report.failures() {
        println!("  ! {}", failure);
    }
}

fn print_tree(table: &TableSchema, depth: usize) {
    let listing = match &table.listing {
        Listing::Api { path, .. } => path.to_string(),
        Listing::Parent { path } => format!("<parent>.{}", path),
    };
    println!("{}{:<40} {}", "  ".repeat(depth), table.name, listing);
    for relation in &table.relations {
        print_tree(relation, depth + 1);
    }
}

fn describe(table: &TableSchema) {
    println!("{}", table.name);
    if !table.description.is_empty() {
        println!("  {}", table.description);
    }
    if !table.primary_key.is_empty() {
        println!("  primary key: {}", table.primary_key.join(", "));
    }
    for column in &table.columns {
        println!("  {:<28} {:<12} {:?}", column.name, column.kind, column.extractor);
    }
    for relation in &table.relations {
        println!("  -> {}", relation.name);
    }
}
