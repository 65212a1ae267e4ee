//! MOSAIC CLI
//!
//! Runs render passes and prints render plans for scenario documents.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod scenario;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use mosaic_core::{Container, Event, Protocol, RenderRequest};
use mosaic_runtime::{EngineConfig, Orchestrator};
use scenario::ScenarioDocument;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mosaic")]
#[command(about = "MOSAIC - server-driven UI render orchestration", long_about = None)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a render pass and print the resulting protocol snapshot
    Render {
        #[command(flatten)]
        request: RequestArgs,
        /// Maximum components rendering at once
        #[arg(long)]
        max_parallel: Option<usize>,
        /// Fail when the plan is empty
        #[arg(long)]
        reject_empty_plan: bool,
        /// Write the snapshot here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the full response (metrics and lifecycle reports)
        #[arg(long)]
        verbose: bool,
    },
    /// Print the render plan and dependency edges without rendering
    Plan {
        #[command(flatten)]
        request: RequestArgs,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct RequestArgs {
    /// Path to the scenario document
    #[arg(short, long)]
    scenario: PathBuf,
    /// Protocol snapshot from a previous pass
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Triggering event as `component.operation`
    #[arg(short, long)]
    event: Option<String>,
    /// Event payload as a JSON object
    #[arg(long)]
    payload: Option<String>,
    /// Caller parameter as `key=value`; values are parsed as JSON when possible
    #[arg(short, long = "param")]
    params: Vec<String>,
    /// Render only this component
    #[arg(long)]
    debug_component: Option<String>,
    /// Request locale
    #[arg(long)]
    locale: Option<String>,
}

impl RequestArgs {
    fn load(&self) -> Result<(ScenarioDocument, RenderRequest)> {
        let document = ScenarioDocument::load(&self.scenario)?;
        let mut request = RenderRequest::new(document.scenario());

        if let Some(path) = &self.snapshot {
            let text = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("reading snapshot {}", path.display()))?;
            request = request.with_protocol(Protocol::from_json(&text)?);
        }
        if let Some(target) = &self.event {
            request = request.with_event(parse_event(target, self.payload.as_deref())?);
        }
        for param in &self.params {
            let (key, value) = parse_param(param)?;
            request = request.with_param(&key, value);
        }
        if let Some(component) = &self.debug_component {
            request = request.with_debug_component(component.clone());
        }
        if let Some(locale) = &self.locale {
            request = request.with_locale(locale.clone());
        }
        Ok((document, request))
    }
}

fn parse_event(target: &str, payload: Option<&str>) -> Result<Event> {
    let (component, operation) = target
        .split_once('.')
        .filter(|(c, o)| !c.is_empty() && !o.is_empty())
        .ok_or_else(|| eyre!("event must look like component.operation, got `{target}`"))?;
    let payload: Container = match payload {
        Some(text) => serde_json::from_str(text).wrap_err("event payload must be a JSON object")?,
        None => Container::new(),
    };
    Ok(Event::new(component, operation).with_payload(payload))
}

fn parse_param(param: &str) -> Result<(String, Value)> {
    let (key, raw) = param
        .split_once('=')
        .ok_or_else(|| eyre!("parameter must look like key=value, got `{param}`"))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mosaic=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    match cli.command {
        Commands::Render {
            request,
            max_parallel,
            reject_empty_plan,
            output,
            verbose,
        } => {
            let (document, request) = request.load()?;
            let registry = Arc::new(document.into_registry()?);
            let mut config = EngineConfig::default().with_reject_empty_plan(reject_empty_plan);
            if let Some(max) = max_parallel {
                config = config.with_max_parallel_units(max);
            }
            let response = Orchestrator::new(registry)
                .with_config(config)
                .render(request)
                .await?;

            let text = if verbose {
                serde_json::to_string_pretty(&response)?
            } else {
                response.protocol.to_json()?
            };
            match output {
                Some(path) => std::fs::write(&path, text)
                    .wrap_err_with(|| format!("writing snapshot {}", path.display()))?,
                None => println!("{text}"),
            }
            Ok(())
        }
        Commands::Plan { request, json } => {
            let (document, request) = request.load()?;
            let registry = Arc::new(document.into_registry()?);
            let preview = Orchestrator::new(registry).plan(&request)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&preview)?);
            } else {
                for line in preview.describe() {
                    println!("{line}");
                }
            }
            Ok(())
        }
    }
}
