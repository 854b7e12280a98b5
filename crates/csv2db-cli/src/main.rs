//! csv2db CLI - load delimited text files into a database table.

use clap::{Args, Parser, Subcommand};
use csv2db::generate::{generate_table_sql, DEFAULT_COLUMN_TYPE};
use csv2db::{source, Backend, Config, LoadError, Loader, RunSummary, EXIT_GENERIC_ERROR, EXIT_SUCCESS};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "csv2db")]
#[command(about = "The CSV to database command line loader")]
#[command(version)]
struct Cli {
    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the data from the file(s) into the database
    #[command(visible_alias = "lo")]
    Load(LoadArgs),

    /// Print a CREATE TABLE statement built from the header row of the file(s)
    #[command(visible_alias = "gen")]
    Generate(GenerateArgs),
}

/// Options shared by both commands.
#[derive(Args)]
struct CommonArgs {
    /// File, directory or glob pattern to read [default: *.csv.zip]
    #[arg(short, long)]
    file: Option<String>,

    /// Encoding of the files (utf-8, latin1, windows-1252, utf-16le, ...) [default: utf-8]
    #[arg(short, long)]
    encoding: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Debug output (implies verbose, replays failed batches row by row)
    #[arg(long)]
    debug: bool,

    /// The table name to use
    #[arg(short, long)]
    table: Option<String>,

    /// The database type: oracle, mysql, postgres, sqlserver, db2 [default: oracle]
    #[arg(short = 'o', long, value_parser = parse_backend)]
    dbtype: Option<Backend>,

    /// The column separator character [default: ,]
    #[arg(short, long)]
    separator: Option<String>,

    /// The quote character within which a separator does not split [default: "]
    #[arg(short, long)]
    quote: Option<String>,

    /// Upper-case all identifiers
    #[arg(long)]
    case_insensitive_identifiers: bool,

    /// Quote all table and column identifiers
    #[arg(long)]
    quote_identifiers: bool,

    /// Path to a YAML configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct LoadArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// The database user to load data as
    #[arg(short, long)]
    user: Option<String>,

    /// The database password; prompted for when missing
    #[arg(short, long)]
    password: Option<String>,

    /// The host the database is running on [default: localhost]
    #[arg(short = 'm', long)]
    host: Option<String>,

    /// The port the database listens on [default: the database type's default port]
    #[arg(short = 'n', long)]
    port: Option<u16>,

    /// The name of the database [default: ORCLPDB1]
    #[arg(short = 'd', long)]
    dbname: Option<String>,

    /// How many rows are loaded at once [default: 10000]
    #[arg(short, long)]
    batch: Option<usize>,

    /// Direct path INSERT load (Oracle only)
    #[arg(short = 'a', long)]
    directpath: bool,

    /// Truncate the table before loading
    #[arg(long)]
    truncate: bool,

    /// Ignore rejected rows and continue the load
    #[arg(short, long)]
    ignore: bool,

    /// Write rejected rows to a .bad file next to the input file (implies --ignore)
    #[arg(short, long)]
    log: bool,
}

#[derive(Args)]
struct GenerateArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// The column type used for every column
    #[arg(short = 'c', long, default_value = DEFAULT_COLUMN_TYPE)]
    column_type: String,
}

fn parse_backend(s: &str) -> Result<Backend, String> {
    s.parse::<Backend>().map_err(|e| e.to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Load(ref args) => run_load(&cli, args).await,
        Commands::Generate(ref args) => match run_generate(&cli, args) {
            Ok(code) => Ok(code),
            Err(e) => {
                // Every generate failure is a generic error.
                eprintln!("Error generating statement: {}", e);
                return ExitCode::from(EXIT_GENERIC_ERROR);
            }
        },
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

impl CommonArgs {
    fn verbosity(&self) -> Level {
        if self.debug {
            Level::DEBUG
        } else if self.verbose {
            Level::INFO
        } else {
            Level::WARN
        }
    }

    /// Read the configuration file, if any, and apply the flags on top.
    fn config(&self) -> Result<Config, LoadError> {
        let mut config = match self.config {
            Some(ref path) => {
                let config = Config::load(path)?;
                info!("Loaded configuration from {:?}", path);
                config
            }
            None => Config::default(),
        };

        if let Some(ref table) = self.table {
            config.table = Some(table.clone());
        }
        if let Some(backend) = self.dbtype {
            config.load.backend = backend;
        }
        if let Some(ref pattern) = self.file {
            config.source.pattern = pattern.clone();
        }
        if let Some(ref encoding) = self.encoding {
            config.source.encoding = encoding.clone();
        }
        if let Some(ref separator) = self.separator {
            config.source.separator = separator.clone();
        }
        if let Some(ref quote) = self.quote {
            config.source.quote = quote.clone();
        }
        if self.case_insensitive_identifiers {
            config.identifiers.case_insensitive = true;
        }
        if self.quote_identifiers {
            config.identifiers.quote = true;
        }
        if self.debug {
            config.load.diagnostic = true;
        }
        Ok(config)
    }
}

impl LoadArgs {
    fn config(&self) -> Result<Config, LoadError> {
        let mut config = self.common.config()?;

        if let Some(ref user) = self.user {
            config.connection.user = user.clone();
        }
        if let Some(ref password) = self.password {
            config.connection.password = Some(password.clone());
        }
        if let Some(ref host) = self.host {
            config.connection.host = host.clone();
        }
        if let Some(port) = self.port {
            config.connection.port = Some(port);
        }
        if let Some(ref dbname) = self.dbname {
            config.connection.database = dbname.clone();
        }
        if let Some(batch) = self.batch {
            config.load.batch_size = batch;
        }
        if self.directpath {
            config.load.direct_path = true;
        }
        if self.truncate {
            config.load.truncate_before_load = true;
        }
        if self.ignore {
            config.load.ignore_errors = true;
        }
        if self.log {
            config.load.log_bad_records = true;
        }

        config.resolve()
    }
}

async fn run_load(cli: &Cli, args: &LoadArgs) -> Result<u8, LoadError> {
    setup_logging(args.common.verbosity(), &cli.log_format);

    let mut config = args.config()?;
    debug!(?config, "Resolved configuration");

    info!("Finding file(s)");
    let files = source::find_files(&config.source.pattern)?;
    info!("Found {} file(s)", files.len());
    if files.is_empty() {
        return Ok(EXIT_SUCCESS);
    }

    if config.connection.password.is_none() {
        config.connection.password = Some(prompt_password()?);
    }

    // The handler goes in after the prompt: the prompt blocks the runtime
    // and Ctrl-C there must still end the process.
    let cancel_token = setup_signal_handler().await;
    let loader = Loader::connect(&config, &cancel_token).await?;
    let summary = loader.run(&files, cancel_token).await?;

    if cli.output_json {
        println!("{}", summary.to_json()?);
    } else {
        print_summary(&summary);
    }

    Ok(summary.exit_code())
}

fn run_generate(cli: &Cli, args: &GenerateArgs) -> Result<u8, LoadError> {
    setup_logging(args.common.verbosity(), &cli.log_format);

    let config = args.common.config()?;

    info!("Finding file(s)");
    let files = source::find_files(&config.source.pattern)?;
    info!("Found {} file(s)", files.len());
    if files.is_empty() {
        return Ok(EXIT_SUCCESS);
    }

    info!("Generating CREATE TABLE statement");
    let sql = generate_table_sql(
        &files,
        config.table.as_deref(),
        &args.column_type,
        &config.source,
        &config.identifier_policy(),
    )?;
    print!("{}", sql);
    Ok(EXIT_SUCCESS)
}

fn prompt_password() -> Result<String, LoadError> {
    dialoguer::Password::new()
        .with_prompt("Password")
        .allow_empty_password(true)
        .interact()
        .map_err(|e| LoadError::Config(format!("Cannot read password: {}", e)))
}

fn print_summary(summary: &RunSummary) {
    for file in &summary.files {
        let result = &file.result;
        match result.error {
            Some(ref err) => println!(
                "  {}: FAILED after {} rows: {}",
                file.path.display(),
                result.rows_loaded,
                err
            ),
            None => println!(
                "  {}: {} rows loaded, {} ignored",
                file.path.display(),
                result.rows_loaded,
                result.rows_ignored
            ),
        }
        if let Some(ref bad) = result.bad_records {
            println!("    rejected rows: {}", bad.display());
        }
    }

    println!("\nLoad {}!", summary.status);
    println!("  Run ID: {}", summary.run_id);
    println!("  Duration: {:.2}s", summary.duration_seconds);
    println!(
        "  Files: {}/{}",
        summary.files_total - summary.files_failed,
        summary.files_total
    );
    println!("  Rows loaded: {}", summary.rows_loaded);
    println!("  Rows ignored: {}", summary.rows_ignored);
    if !summary.failed_files.is_empty() {
        println!("  Failed files: {:?}", summary.failed_files);
    }
}

/// Logs go to stderr so that stdout carries only results.
fn setup_logging(level: Level, format: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_ansi(std::env::var_os("NO_COLOR").is_none())
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
async fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Rolling back and shutting down...", name);
                    token.cancel();
                });
            }
            Err(e) => warn!("Failed to setup {} handler: {}", name, e),
        }
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
async fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Rolling back and shutting down...");
            token.cancel();
        }
    });

    cancel_token
}
