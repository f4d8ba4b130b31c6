//! CLI entry point for meshlogic, a client for the MeshLogic telemetry API.
//!
//! Every subcommand prints its result as pretty JSON on stdout. Logs go to
//! stderr, filtered by `--log-level` or `RUST_LOG` (default `warn`).
//!
//! Exit codes:
//! - 0: success
//! - 1: runtime error (missing key, API error, network failure, etc.)
//! - 2: argument validation error (clap handles this automatically)

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use meshlogic::config::API_KEY_ENV;
use meshlogic::devices::{DeviceStatus, DevicesListParams, Platform};
use meshlogic::events::{EventsListParams, ExportFormat, ExportParams};
use meshlogic::patterns::{MatchesParams, PatternsListParams};
use meshlogic::{ClientConfig, EventType, MeshLogicClient, MeshLogicError, StreamSubscription};

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "meshlogic", version, about, long_about = None)]
struct Cli {
    /// API key. Prefer the MESHLOGIC_API_KEY environment variable to keep
    /// the key out of process listings and shell history.
    #[arg(long, env = API_KEY_ENV, hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Region whose endpoint to use (ap-southeast-2, us-east-1, eu-west-1).
    #[arg(long, global = true)]
    region: Option<String>,

    /// Explicit API base URL; overrides --region.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// TOML config file. Command-line flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `meshlogic=trace`. Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Query, export and stream events.
    #[command(subcommand)]
    Events(EventsCommand),
    /// Inspect monitored devices.
    #[command(subcommand)]
    Devices(DevicesCommand),
    /// Inspect detection patterns and matches.
    #[command(subcommand)]
    Patterns(PatternsCommand),
}

#[derive(Subcommand)]
enum EventsCommand {
    /// List events, newest first.
    List {
        /// Only events of this type (process, file, network).
        #[arg(long = "type")]
        event_type: Option<EventType>,
        #[arg(long)]
        device_id: Option<String>,
        /// ISO-8601 instant or relative window such as `1h`.
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        until: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Fetch one event by id.
    Get { id: String },
    /// Export events as JSON, CSV or Parquet.
    Export {
        #[arg(long, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        #[arg(long = "type")]
        event_type: Option<EventType>,
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        until: Option<String>,
        /// Write the export here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print live events, one JSON object per line, until Ctrl-C.
    Stream {
        /// Event type to subscribe to. Repeatable; default is all.
        #[arg(long = "type")]
        event_types: Vec<EventType>,
        /// Device to subscribe to. Repeatable; default is all.
        #[arg(long = "device-id")]
        device_ids: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DevicesCommand {
    /// List devices.
    List {
        /// online, offline or degraded.
        #[arg(long)]
        status: Option<DeviceStatus>,
        /// linux, macos or windows.
        #[arg(long)]
        platform: Option<Platform>,
        #[arg(long, default_value_t = 100)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Fetch one device by id.
    Get { id: String },
    /// Show fleet-wide device counts.
    Status,
}

#[derive(Subcommand)]
enum PatternsCommand {
    /// List detection patterns.
    List {
        #[arg(long)]
        category: Option<String>,
        /// `true` for enabled patterns only, `false` for disabled only.
        #[arg(long)]
        enabled: Option<bool>,
    },
    /// List recent pattern matches.
    Matches {
        #[arg(long)]
        pattern_id: Option<String>,
        #[arg(long)]
        device_id: Option<String>,
        #[arg(long)]
        since: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: Option<&str>) {
    use tracing_subscriber::EnvFilter;

    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Merges the config file (if any) with command-line overrides.
fn build_config(cli: &Cli) -> Result<ClientConfig, MeshLogicError> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(key) = &cli.api_key {
        config = config.with_api_key(key.as_str());
    }
    if let Some(region) = &cli.region {
        config = config.with_region(region.as_str());
    }
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url.as_str());
    }
    if let Some(secs) = cli.timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    Ok(config)
}

async fn run(cli: Cli) -> CliResult {
    let client = MeshLogicClient::new(build_config(&cli)?)?;

    match cli.command {
        Command::Events(command) => run_events(&client, command).await,
        Command::Devices(command) => run_devices(&client, command).await,
        Command::Patterns(command) => run_patterns(&client, command).await,
    }
}

async fn run_events(client: &MeshLogicClient, command: EventsCommand) -> CliResult {
    let events = client.events();
    match command {
        EventsCommand::List {
            event_type,
            device_id,
            since,
            until,
            limit,
            offset,
        } => {
            let params = EventsListParams {
                event_type,
                device_id,
                since,
                until,
                limit: Some(limit),
                offset: Some(offset),
            };
            print_json(&events.list(&params).await?)
        }
        EventsCommand::Get { id } => print_json(&events.get(&id).await?),
        EventsCommand::Export {
            format,
            event_type,
            since,
            until,
            output,
        } => {
            let params = ExportParams {
                format,
                event_type,
                since,
                until,
            };
            let data = events.export(&params).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &data)?;
                    eprintln!("Wrote {} bytes to {}", data.len(), path.display());
                }
                None => std::io::stdout().lock().write_all(&data)?,
            }
            Ok(())
        }
        EventsCommand::Stream {
            event_types,
            device_ids,
        } => {
            let subscription = StreamSubscription::default()
                .event_types(event_types)
                .device_ids(device_ids);
            let mut stream = events.stream(&subscription).await?;

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            let interrupted = loop {
                tokio::select! {
                    _ = &mut ctrl_c => break true,
                    next = stream.next_event() => match next {
                        Some(Ok(event)) => println!("{}", serde_json::to_string(&event)?),
                        Some(Err(e @ MeshLogicError::WebSocket(_))) => return Err(e.into()),
                        // A single undecodable frame does not end the stream.
                        Some(Err(e)) => tracing::warn!(error = %e, "skipping stream frame"),
                        None => break false,
                    },
                }
            };
            if interrupted {
                stream.close().await?;
            }
            Ok(())
        }
    }
}

async fn run_devices(client: &MeshLogicClient, command: DevicesCommand) -> CliResult {
    let devices = client.devices();
    match command {
        DevicesCommand::List {
            status,
            platform,
            limit,
            offset,
        } => {
            let params = DevicesListParams {
                status,
                platform,
                limit: Some(limit),
                offset: Some(offset),
            };
            print_json(&devices.list(&params).await?)
        }
        DevicesCommand::Get { id } => print_json(&devices.get(&id).await?),
        DevicesCommand::Status => print_json(&devices.status().await?),
    }
}

async fn run_patterns(client: &MeshLogicClient, command: PatternsCommand) -> CliResult {
    let patterns = client.patterns();
    match command {
        PatternsCommand::List { category, enabled } => {
            let params = PatternsListParams { category, enabled };
            print_json(&patterns.list(&params).await?)
        }
        PatternsCommand::Matches {
            pattern_id,
            device_id,
            since,
            limit,
        } => {
            let params = MatchesParams {
                pattern_id,
                device_id,
                since,
                limit: Some(limit),
            };
            print_json(&patterns.matches(&params).await?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_subcommand_is_rejected() {
        let result = Cli::try_parse_from(["meshlogic"]);
        assert!(result.is_err(), "parsing should fail without a subcommand");
    }

    #[test]
    fn events_list_defaults_paging() {
        let cli = Cli::try_parse_from(["meshlogic", "events", "list"])
            .expect("events list should parse with no filters");
        let Command::Events(EventsCommand::List {
            event_type,
            limit,
            offset,
            ..
        }) = cli.command
        else {
            panic!("expected events list");
        };
        assert!(event_type.is_none());
        assert_eq!(limit, 100);
        assert_eq!(offset, 0);
    }

    #[test]
    fn events_list_parses_typed_filter() {
        let cli = Cli::try_parse_from([
            "meshlogic", "events", "list", "--type", "network", "--since", "1h", "--limit", "5",
        ])
        .expect("should parse typed filters");
        let Command::Events(EventsCommand::List {
            event_type,
            since,
            limit,
            ..
        }) = cli.command
        else {
            panic!("expected events list");
        };
        assert_eq!(event_type, Some(EventType::Network));
        assert_eq!(since.as_deref(), Some("1h"));
        assert_eq!(limit, 5);
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let result = Cli::try_parse_from(["meshlogic", "events", "list", "--type", "registry"]);
        assert!(result.is_err(), "unknown event type should fail at parse time");
    }

    #[test]
    fn stream_accepts_repeated_filters() {
        let cli = Cli::try_parse_from([
            "meshlogic",
            "events",
            "stream",
            "--type",
            "network",
            "--type",
            "file",
            "--device-id",
            "d1",
        ])
        .expect("should parse repeated stream filters");
        let Command::Events(EventsCommand::Stream {
            event_types,
            device_ids,
        }) = cli.command
        else {
            panic!("expected events stream");
        };
        assert_eq!(event_types, vec![EventType::Network, EventType::File]);
        assert_eq!(device_ids, vec!["d1".to_string()]);
    }

    #[test]
    fn export_defaults_to_json() {
        let cli = Cli::try_parse_from(["meshlogic", "events", "export"]).expect("should parse");
        let Command::Events(EventsCommand::Export { format, output, .. }) = cli.command else {
            panic!("expected events export");
        };
        assert_eq!(format, ExportFormat::Json);
        assert!(output.is_none());
    }

    #[test]
    fn global_flags_are_accepted_after_subcommand() {
        let cli = Cli::try_parse_from([
            "meshlogic",
            "devices",
            "status",
            "--region",
            "eu-west-1",
            "--timeout",
            "5",
            "--api-key",
            "k",
        ])
        .expect("global flags should parse after the subcommand");
        assert_eq!(cli.region.as_deref(), Some("eu-west-1"));
        assert_eq!(cli.timeout, Some(5));
        assert!(matches!(cli.command, Command::Devices(DevicesCommand::Status)));
    }

    #[test]
    fn patterns_enabled_takes_a_value() {
        let cli = Cli::try_parse_from(["meshlogic", "patterns", "list", "--enabled", "false"])
            .expect("should parse --enabled false");
        let Command::Patterns(PatternsCommand::List { enabled, .. }) = cli.command else {
            panic!("expected patterns list");
        };
        assert_eq!(enabled, Some(false));
    }

    #[test]
    fn command_line_overrides_config_file_values() {
        let cli = Cli::try_parse_from([
            "meshlogic",
            "devices",
            "status",
            "--api-key",
            "from-flag",
            "--base-url",
            "http://127.0.0.1:9000",
            "--timeout",
            "7",
        ])
        .unwrap();
        let config = build_config(&cli).unwrap();
        assert_eq!(config.resolved_base_url(), "http://127.0.0.1:9000");
        assert_eq!(config.timeout, Duration::from_secs(7));
    }
}
