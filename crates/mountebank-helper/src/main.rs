//! mb-helper - command line front-end for the Mountebank helper library
//!
//! # Usage
//!
//! ```bash
//! # Start Mountebank and keep it running until Ctrl-C
//! mb-helper start --port 2525
//!
//! # Post the imposter described in a YAML/JSON file
//! mb-helper post pets.yaml
//!
//! # Change one response and repost
//! mb-helper update pets.yaml --uri /pets/123 --verb GET --status 404
//!
//! # Inspect and clean up
//! mb-helper get 3000
//! mb-helper delete
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args as ClapArgs, Parser, Subcommand};
use mountebank_helper::{
    Imposter, ImposterFile, MbServer, MbServerOptions, MountebankClient, MountebankConfig,
    RouteKey,
};
use tracing_subscriber::EnvFilter;

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

#[derive(Parser, Debug)]
#[command(name = "mb-helper")]
#[command(author, version, about = "Build, post and update Mountebank imposters")]
struct Args {
    /// Mountebank host
    #[arg(long, global = true, default_value = "localhost", env = "MB_HOST")]
    host: String,

    /// Mountebank admin port
    #[arg(long, global = true, default_value = "2525", env = "MB_PORT")]
    mb_port: u16,

    /// Request timeout in seconds
    #[arg(short, long, global = true, default_value = "10")]
    timeout: u64,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start Mountebank and wait for Ctrl-C
    Start {
        /// Port for the Mountebank admin API (defaults to --mb-port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Mountebank executable
        #[arg(long, default_value = "mb", env = "MB_COMMAND")]
        command: String,

        /// Extra arguments passed to `mb start`
        #[arg(last = true)]
        extra: Vec<String>,
    },
    /// Post the imposter described in FILE
    Post {
        file: PathBuf,
    },
    /// Print an imposter as JSON
    Get {
        port: u16,
    },
    /// List imposters
    List,
    /// Delete one imposter, or all of them
    Delete {
        port: Option<u16>,
    },
    /// Update one route's response from FILE and repost the imposter
    Update(UpdateArgs),
}

#[derive(ClapArgs, Debug)]
struct UpdateArgs {
    file: PathBuf,

    /// Route uri as written in the file
    #[arg(long)]
    uri: String,

    /// Route verb
    #[arg(long)]
    verb: String,

    /// New response body
    #[arg(long, conflicts_with_all = ["status", "header"])]
    body: Option<String>,

    /// New status code
    #[arg(long, conflicts_with = "header")]
    status: Option<u16>,

    /// New headers as NAME=VALUE (replaces all headers)
    #[arg(long = "header", value_parser = parse_header)]
    header: Vec<(String, String)>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = MountebankConfig {
        host: args.host.clone(),
        port: args.mb_port,
        timeout_secs: args.timeout,
    };

    match args.command {
        Command::Start {
            port,
            command,
            extra,
        } => start(port.unwrap_or(config.port), command, extra).await,
        Command::Post { file } => post(&file, config).await,
        Command::Get { port } => {
            let client = MountebankClient::new(&config)?;
            let raw = client.get_imposter_raw(port).await?;
            print_json(&raw)
        }
        Command::List => list(&config).await,
        Command::Delete { port } => delete(&config, port).await,
        Command::Update(update_args) => update(update_args, config).await,
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("mountebank_helper={default_level},{default_level}"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn start(port: u16, command: String, extra: Vec<String>) -> anyhow::Result<()> {
    let options = MbServerOptions {
        port,
        command,
        args: extra,
        ..Default::default()
    };
    let mut server = MbServer::start(options).await?;

    if !server.is_owned() {
        println!("{BOLD}Mountebank{RESET} is already running on port {CYAN}{port}{RESET}");
        return Ok(());
    }

    println!("{GREEN}Mountebank started{RESET} on port {CYAN}{port}{RESET} (Ctrl-C to stop)");
    tokio::signal::ctrl_c().await?;
    server.stop().await?;
    Ok(())
}

fn load_imposter(file: &Path, config: MountebankConfig) -> anyhow::Result<Imposter> {
    let imposter_file = ImposterFile::from_file(file)
        .with_context(|| format!("failed to load {}", file.display()))?;

    let mut imposter = Imposter::new(imposter_file.options(config))?;
    for route in imposter_file.routes {
        imposter.add_route(route)?;
    }
    Ok(imposter)
}

async fn post(file: &Path, config: MountebankConfig) -> anyhow::Result<()> {
    let imposter = load_imposter(file, config)?;
    let response = imposter.post_to_mountebank().await?;
    println!(
        "{GREEN}Posted{RESET} imposter on port {CYAN}{}{RESET} {DIM}({} route(s), status {}){RESET}",
        imposter.port(),
        imposter.routes().len(),
        response.status
    );
    Ok(())
}

async fn list(config: &MountebankConfig) -> anyhow::Result<()> {
    let client = MountebankClient::new(config)?;
    let imposters = client.list_imposters().await?;

    if imposters.is_empty() {
        println!("{DIM}No imposters{RESET}");
        return Ok(());
    }

    println!("{BOLD}{:<8}{:<10}{:>10}{RESET}", "PORT", "PROTOCOL", "REQUESTS");
    for imposter in imposters {
        println!(
            "{:<8}{:<10}{:>10}",
            imposter.port,
            imposter.protocol.as_str(),
            imposter.number_of_requests
        );
    }
    Ok(())
}

async fn delete(config: &MountebankConfig, port: Option<u16>) -> anyhow::Result<()> {
    let client = MountebankClient::new(config)?;
    match port {
        Some(port) => {
            client.delete_imposter(port).await?;
            println!("{GREEN}Deleted{RESET} imposter on port {CYAN}{port}{RESET}");
        }
        None => {
            let deleted = client.delete_imposters().await?;
            println!(
                "{GREEN}Deleted{RESET} {} imposter(s) {DIM}{:?}{RESET}",
                deleted.imposters.len(),
                deleted.ports()
            );
        }
    }
    Ok(())
}

async fn update(args: UpdateArgs, config: MountebankConfig) -> anyhow::Result<()> {
    let mut imposter = load_imposter(&args.file, config)?;
    let key = RouteKey::new(args.uri, args.verb);

    let detail = if let Some(body) = args.body {
        imposter.update_response_body(body, &key).await?
    } else if let Some(status) = args.status {
        imposter.update_response_code(status, &key).await?
    } else if !args.header.is_empty() {
        let headers: HashMap<String, String> = args.header.into_iter().collect();
        imposter.update_response_headers(headers, &key).await?
    } else {
        bail!("nothing to update: pass --body, --status or --header");
    };

    println!("{}", serde_json::to_string_pretty(&detail)?);
    Ok(())
}

fn print_json(raw: &str) -> anyhow::Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{s}'")),
    }
}
