//! Assay CLI
//!
//! Lists, describes and runs analysis plugins.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use assay::app::{describe_schema, App};
use assay::config::{AssayConfig, CONFIG_FILE, DEFAULT_LOG_FILTER};
use assay_runtime::{RunEventKind, RunState};

/// Analysis plugin host
#[derive(Parser, Debug)]
#[command(name = "assay")]
#[command(about = "Discover and run analysis plugins", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Plugin directory (overrides the configuration file)
    #[arg(short, long, global = true)]
    plugins: Option<PathBuf>,

    /// Number of worker threads (overrides the configuration file)
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List discovered plugins
    List,

    /// Show the parameters of a plugin
    Describe {
        id: String,

        /// Print the capability schema as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a plugin against a data directory
    Run {
        id: String,

        /// Data root passed to the plugin
        #[arg(short, long, default_value = ".")]
        data: PathBuf,

        /// Parameter override, repeatable
        #[arg(short, long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Config loading logs through a bootstrap subscriber until the
    // configured filter is known
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .finish();
    let mut config = AssayConfig::load_with_subscriber(&args.config, bootstrap)?;
    if let Some(plugins) = args.plugins {
        config.plugins.directory = plugins;
    }
    if let Some(workers) = args.workers {
        config.bridge.workers = workers;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_filter())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting assay v{}", env!("CARGO_PKG_VERSION"));

    let app = App::start(&config).with_context(|| {
        format!(
            "Failed to load plugins from {}",
            config.plugins.directory.display()
        )
    })?;

    let code = match args.command {
        Command::List => {
            list(&app);
            ExitCode::SUCCESS
        }
        Command::Describe { id, json } => {
            let descriptor = app.plugin(&id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&descriptor.schema)?);
            } else {
                print!("{}", describe_schema(&descriptor));
            }
            ExitCode::SUCCESS
        }
        Command::Run { id, data, set } => run(&app, &id, data, &set).await?,
    };

    // Workers may still be blocked in a plugin that ignores cancellation
    tokio::task::spawn_blocking(move || app.shutdown()).await?;
    Ok(code)
}

fn list(app: &App) {
    let snapshot = app.plugins();
    if snapshot.is_empty() {
        println!(
            "No plugins found in {}",
            app.registry().location().display()
        );
        return;
    }
    for plugin in snapshot.iter() {
        match &plugin.description {
            Some(description) => {
                println!("{:<24} {}  - {}", plugin.id, plugin.display_name, description)
            }
            None => println!("{:<24} {}", plugin.id, plugin.display_name),
        }
    }
}

async fn run(app: &App, id: &str, data: PathBuf, set: &[String]) -> Result<ExitCode> {
    let request = app.request(id, data, set)?;
    let mut handle = app.submit(request)?;
    let run_id = handle.id();
    info!(%run_id, plugin = %id, "Submitted");

    let mut interrupted = false;
    loop {
        tokio::select! {
            event = handle.next_event() => {
                let Some(event) = event else { break };
                match event.kind {
                    RunEventKind::Progress(pct) => eprintln!("[{:>3}%] {}", pct, id),
                    RunEventKind::Succeeded(message) => println!("{}", message),
                    RunEventKind::Failed(detail) => eprintln!("error: {}", detail),
                    RunEventKind::Cancelled => eprintln!("cancelled"),
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                info!("Received Ctrl+C, cancelling run...");
                interrupted = true;
                app.bridge().cancel(run_id);
            }
        }
    }

    Ok(match handle.record().state {
        RunState::Succeeded => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}
