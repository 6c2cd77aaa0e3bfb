use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use parcell_core::config::AppConfig;
use parcell_core::event::StatusBus;
use parcell_core::types::{QueryArgs, QueryValue, StatusDisplay};
use parcell_net::{
    build_url, FanoutSurface, HttpTransport, LogSurface, RequestScheduler, StatusAggregator,
};

#[derive(Parser)]
#[command(name = "parcell", version, about = "Debounced request runner with live status")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "parcell.toml")]
    config: PathBuf,

    /// Override the dispatch delay in milliseconds
    #[arg(long, env = "PARCELL_DELAY_MS")]
    delay_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// GET a JSON resource and print it
    Get {
        /// Request slot name
        name: String,
        /// Path (relative to net.base_url) or absolute URL
        url: String,
        /// Query argument as key=value; a bare key is left out of the URL
        #[arg(short = 'a', long = "arg", value_parser = parse_query_arg)]
        args: Vec<(String, QueryValue)>,
    },
    /// GET a resource and print the raw body
    GetPlain {
        name: String,
        url: String,
        #[arg(short = 'a', long = "arg", value_parser = parse_query_arg)]
        args: Vec<(String, QueryValue)>,
    },
    /// POST a JSON payload and print the JSON response
    Post {
        name: String,
        url: String,
        #[arg(short = 'a', long = "arg", value_parser = parse_query_arg)]
        args: Vec<(String, QueryValue)>,
        /// JSON request body
        #[arg(short, long, default_value = "{}", value_parser = parse_json)]
        data: serde_json::Value,
    },
    /// Print the URL a request would be sent to
    Url {
        url: String,
        #[arg(short = 'a', long = "arg", value_parser = parse_query_arg)]
        args: Vec<(String, QueryValue)>,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn parse_query_arg(raw: &str) -> Result<(String, QueryValue), String> {
    let (key, value) = match raw.split_once('=') {
        Some((key, value)) => (key, QueryValue::from(value)),
        None => (raw, QueryValue::Absent),
    };
    if key.is_empty() {
        return Err(format!("missing key in '{raw}'"));
    }
    Ok((key.to_string(), value))
}

fn parse_json(raw: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("parcell=info,parcell_net=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(
            *shell,
            &mut Cli::command(),
            "parcell",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    let mut config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(delay_ms) = cli.delay_ms {
        config.net.dispatch_delay_ms = delay_ms;
    }

    match cli.command {
        Commands::Get { name, url, args } => {
            run_request(&config, name, url, args.into_iter().collect(), Body::Json).await
        }
        Commands::GetPlain { name, url, args } => {
            run_request(&config, name, url, args.into_iter().collect(), Body::Text).await
        }
        Commands::Post {
            name,
            url,
            args,
            data,
        } => {
            run_request(
                &config,
                name,
                url,
                args.into_iter().collect(),
                Body::Post(data),
            )
            .await
        }
        Commands::Url { url, args } => {
            let args: QueryArgs = args.into_iter().collect();
            println!("{}", build_url(&url, &args));
            Ok(())
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

enum Body {
    Json,
    Text,
    Post(serde_json::Value),
}

/// Send one request through the scheduler and print the response once its
/// callback runs. Fails if the status surface goes to error first.
async fn run_request(
    config: &AppConfig,
    name: String,
    url: String,
    args: QueryArgs,
    body: Body,
) -> anyhow::Result<()> {
    let bus = Arc::new(StatusBus::new(config.status.bus_capacity));
    let mut surface = FanoutSurface::new().with(bus.clone());
    if config.status.log_transitions {
        surface = surface.with(Arc::new(LogSurface));
    }
    let status = Arc::new(StatusAggregator::new(Arc::new(surface)));
    let transport = Arc::new(HttpTransport::new(&config.net)?);
    let scheduler = RequestScheduler::from_config(&config.net, transport, status);

    let mut status_rx = bus.subscribe();
    let (tx, rx) = oneshot::channel::<String>();

    match body {
        Body::Json => scheduler.get(name, &url, &args, move |value| {
            let _ = tx.send(serde_json::to_string_pretty(&value)?);
            Ok(())
        }),
        Body::Text => scheduler.get_plain(name, &url, &args, move |text| {
            let _ = tx.send(text);
            Ok(())
        }),
        Body::Post(data) => scheduler.post(name, &url, &args, &data, move |value| {
            let _ = tx.send(serde_json::to_string_pretty(&value)?);
            Ok(())
        })?,
    }
    debug!(url = %build_url(&url, &args), "Request submitted");

    let response = tokio::select! {
        response = rx => response.ok(),
        _ = wait_for_error(&mut status_rx) => None,
    };
    scheduler.shutdown();

    match response {
        Some(body) => {
            println!("{body}");
            Ok(())
        }
        None => {
            error!(url = %url, "Request failed");
            bail!("request to {url} failed")
        }
    }
}

async fn wait_for_error(rx: &mut broadcast::Receiver<StatusDisplay>) {
    loop {
        match rx.recv().await {
            Ok(StatusDisplay::Error) | Err(broadcast::error::RecvError::Closed) => return,
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
        }
    }
}
