//! ybv CLI - Command-line interface for Yieldbird Viewability
//!
//! Commands:
//! - replay: Replay a recorded page-event log and print the beacon it produces
//! - cookies: Show the contents of a persisted cookie jar
//! - config: Print the effective reporter configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use yieldbird_viewability::cookie::{format_expires, MemoryCookieJar, SharedCookieJar};
use yieldbird_viewability::replay::{parse_array, parse_ndjson, replay_session, ReplayOutcome};
use yieldbird_viewability::transport::RecordingTransport;
use yieldbird_viewability::{PageEnvironment, ReporterConfig, TimedPageEvent, ViewabilityError, VERSION};

/// ybv - page-engagement beacons from recorded page views
#[derive(Parser)]
#[command(name = "ybv")]
#[command(author = "Yieldbird")]
#[command(version = VERSION)]
#[command(about = "Replay page-engagement event logs into viewability beacons", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a page-event log through a reporter
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,

        /// Page URL
        #[arg(long)]
        url: String,

        /// Browser language
        #[arg(long, default_value = "en-US")]
        language: String,

        /// Navigation start in epoch milliseconds (defaults to the first event)
        #[arg(long)]
        navigation_start: Option<i64>,

        /// Reporter config JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Cookie jar file, loaded before and saved after the replay
        #[arg(long)]
        cookie_jar: Option<PathBuf>,

        /// Include reporter internals in the output
        #[arg(long)]
        debug: bool,

        /// POST the beacon to the configured endpoint
        #[arg(long)]
        send: bool,
    },

    /// Show the cookies in a persisted jar
    Cookies {
        /// Cookie jar file
        #[arg(long)]
        cookie_jar: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective reporter configuration
    Config {
        /// Reporter config JSON file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Replay outcome as compact JSON
    Json,
    /// Replay outcome as pretty-printed JSON
    JsonPretty,
    /// The URL-encoded beacon body only
    Form,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), YbvCliError> {
    match cli.command {
        Commands::Replay {
            input,
            input_format,
            output_format,
            url,
            language,
            navigation_start,
            config,
            cookie_jar,
            debug,
            send,
        } => cmd_replay(ReplayArgs {
            input,
            input_format,
            output_format,
            url,
            language,
            navigation_start,
            config,
            cookie_jar,
            debug,
            send,
        }),

        Commands::Cookies { cookie_jar, json } => cmd_cookies(&cookie_jar, json),

        Commands::Config { config } => cmd_config(config.as_deref()),
    }
}

struct ReplayArgs {
    input: PathBuf,
    input_format: InputFormat,
    output_format: OutputFormat,
    url: String,
    language: String,
    navigation_start: Option<i64>,
    config: Option<PathBuf>,
    cookie_jar: Option<PathBuf>,
    debug: bool,
    send: bool,
}

fn cmd_replay(args: ReplayArgs) -> Result<(), YbvCliError> {
    let input_data = read_input(&args.input)?;

    let events = match args.input_format {
        InputFormat::Ndjson => parse_ndjson(&input_data)?,
        InputFormat::Json => parse_array(&input_data)?,
    };

    let navigation_start = args
        .navigation_start
        .or_else(|| events.iter().map(|e| e.at).min())
        .ok_or(YbvCliError::NoEvents)?;

    let debug = args.debug || ReporterConfig::debug_requested(&args.url);
    let config = load_config(args.config.as_deref())?.with_debug(debug);
    let environment = PageEnvironment::new(args.url, args.language, navigation_start);

    let jar = match &args.cookie_jar {
        Some(path) => MemoryCookieJar::load(path)?,
        None => MemoryCookieJar::new(),
    };
    let shared_jar = SharedCookieJar::new(jar);

    let outcome = if args.send {
        replay_and_send(config, environment, &events, shared_jar.clone())?
    } else {
        replay_session(
            config,
            environment,
            &events,
            Box::new(shared_jar.clone()),
            Box::new(RecordingTransport::new()),
        )?
    };

    if let Some(path) = &args.cookie_jar {
        shared_jar.snapshot().save(path)?;
        info!(path = %path.display(), "cookie jar saved");
    }

    let output = match args.output_format {
        OutputFormat::Json => serde_json::to_string(&outcome)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(&outcome)?,
        OutputFormat::Form => outcome.payload.to_form_body(),
    };
    println!("{}", output);

    Ok(())
}

#[cfg(feature = "http")]
fn replay_and_send(
    config: ReporterConfig,
    environment: PageEnvironment,
    events: &[TimedPageEvent],
    jar: SharedCookieJar,
) -> Result<ReplayOutcome, YbvCliError> {
    use std::sync::Arc;
    use std::time::Duration;
    use yieldbird_viewability::transport::BeaconTransport;
    use yieldbird_viewability::HttpBeaconTransport;

    let transport = Arc::new(HttpBeaconTransport::new(Duration::from_secs(10))?);
    let boxed: Box<dyn BeaconTransport> = Box::new(Arc::clone(&transport));
    let outcome = replay_session(config, environment, events, Box::new(jar), boxed)?;
    transport.flush();
    Ok(outcome)
}

#[cfg(not(feature = "http"))]
fn replay_and_send(
    _config: ReporterConfig,
    _environment: PageEnvironment,
    _events: &[TimedPageEvent],
    _jar: SharedCookieJar,
) -> Result<ReplayOutcome, YbvCliError> {
    Err(YbvCliError::SendUnavailable)
}

fn cmd_cookies(cookie_jar: &Path, json: bool) -> Result<(), YbvCliError> {
    if !cookie_jar.exists() {
        return Err(YbvCliError::MissingFile(cookie_jar.to_path_buf()));
    }
    let jar = MemoryCookieJar::load(cookie_jar)?;
    let now = Utc::now().timestamp_millis();

    if json {
        println!("{}", serde_json::to_string_pretty(&jar)?);
        return Ok(());
    }

    println!("Cookie Jar");
    println!("==========");
    if jar.cookies().is_empty() {
        println!("(empty)");
    }
    for cookie in jar.cookies() {
        let expiry = match cookie.expires_ms {
            Some(expires) if expires <= now => format!("expired {}", format_expires(expires)),
            Some(expires) => format!("expires {}", format_expires(expires)),
            None => "session".to_string(),
        };
        println!("  {}={} ({})", cookie.name, cookie.value, expiry);
    }

    Ok(())
}

fn cmd_config(config: Option<&Path>) -> Result<(), YbvCliError> {
    let config = load_config(config)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

// Helper functions

fn read_input(input: &Path) -> Result<String, YbvCliError> {
    if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            warn!("reading page events from a terminal; end input with Ctrl-D");
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn load_config(path: Option<&Path>) -> Result<ReporterConfig, YbvCliError> {
    match path {
        Some(path) => Ok(ReporterConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(ReporterConfig::default()),
    }
}

// Error types

#[derive(Debug)]
enum YbvCliError {
    Io(io::Error),
    Viewability(ViewabilityError),
    Json(serde_json::Error),
    MissingFile(PathBuf),
    NoEvents,
    SendUnavailable,
}

impl From<io::Error> for YbvCliError {
    fn from(e: io::Error) -> Self {
        YbvCliError::Io(e)
    }
}

impl From<ViewabilityError> for YbvCliError {
    fn from(e: ViewabilityError) -> Self {
        match e {
            ViewabilityError::NoEvents => YbvCliError::NoEvents,
            other => YbvCliError::Viewability(other),
        }
    }
}

impl From<serde_json::Error> for YbvCliError {
    fn from(e: serde_json::Error) -> Self {
        YbvCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<YbvCliError> for CliError {
    fn from(e: YbvCliError) -> Self {
        match e {
            YbvCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            YbvCliError::Viewability(e @ ViewabilityError::InvalidConfig(_))
            | YbvCliError::Viewability(e @ ViewabilityError::InvalidUrl(_)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'ybv config' to see the defaults".to_string()),
            },
            YbvCliError::Viewability(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Each event needs an 'at' timestamp and a 'type'".to_string()),
            },
            YbvCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            YbvCliError::MissingFile(path) => CliError {
                code: "MISSING_FILE".to_string(),
                message: format!("{} does not exist", path.display()),
                hint: Some("Create a jar with 'ybv replay --cookie-jar'".to_string()),
            },
            YbvCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            YbvCliError::SendUnavailable => CliError {
                code: "SEND_UNAVAILABLE".to_string(),
                message: "This build cannot send beacons".to_string(),
                hint: Some("Rebuild with --features http".to_string()),
            },
        }
    }
}
