use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use nfproxy_config::NfproxyConfig;
use nfproxy_engine::{Engine, Trace};
use nfproxy_protocols::BuiltinProtocols;
use nfproxy_script::Script;
use nfproxy_telemetry::metrics::MetricsRecorder;
use tracing::info;

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Engine configuration file; `config/nfproxy.yaml` when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a filter script and print its pipeline
    Check(CheckArgs),
    /// Run a recorded packet trace through a filter script
    Replay(ReplayArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    #[arg(short, long)]
    pub script: PathBuf,
    /// Overrides the protocol declared by the script
    #[arg(short, long)]
    pub protocol: Option<String>,
    /// Comma separated filter names, in priority order
    #[arg(short, long, value_delimiter = ',')]
    pub enable: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    #[arg(short, long)]
    pub script: PathBuf,
    #[arg(short, long)]
    pub trace: PathBuf,
    #[arg(short, long)]
    pub protocol: Option<String>,
    /// Print Prometheus metrics after the replay
    #[arg(long)]
    pub metrics: bool,
}

fn engine(config: &NfproxyConfig) -> anyhow::Result<Engine> {
    let metrics = MetricsRecorder::new().context("failed to register metrics")?;
    Ok(Engine::new(
        Arc::new(BuiltinProtocols::new()),
        config.engine.clone(),
        metrics,
    ))
}

fn read_script(path: &Path) -> anyhow::Result<Script> {
    Script::from_path(path).with_context(|| format!("failed to load {}", path.display()))
}

pub fn check(args: CheckArgs, config: &NfproxyConfig) -> anyhow::Result<()> {
    let script = read_script(&args.script)?;
    let engine = engine(config)?;
    let protocol = args
        .protocol
        .as_deref()
        .or(script.protocol())
        .unwrap_or(config.engine.protocol.as_str())
        .to_string();
    let enabled = if args.enable.is_empty() {
        script.enabled()
    } else {
        args.enable
    };

    let compiled = engine.load(&script.load(), &enabled, &protocol)?;
    let limits = compiled.limits();
    println!(
        "protocol {} | stream_max_size {} | full_stream_action {}",
        compiled.pipeline().protocol(),
        limits.stream_max_size,
        limits.full_stream_action
    );
    for (position, handler) in compiled.pipeline().handlers().iter().enumerate() {
        let params: Vec<String> = handler
            .params()
            .iter()
            .map(|p| format!("{}: {}", p.name, p.tag))
            .collect();
        println!("{:>3}. {}({})", position + 1, handler.name(), params.join(", "));
    }
    Ok(())
}

pub async fn replay(args: ReplayArgs, config: &NfproxyConfig) -> anyhow::Result<()> {
    let script = read_script(&args.script)?;
    let trace = Trace::from_path(&args.trace)
        .with_context(|| format!("failed to load {}", args.trace.display()))?;

    let engine = Arc::new(engine(config)?);
    engine.load_script(&script, args.protocol.as_deref())?;
    info!(trace = %args.trace.display(), "starting replay");

    for record in nfproxy_engine::replay(engine.clone(), trace).await? {
        match record.outcome {
            Ok(decision) => println!("#{:<4} {}  {}", record.index, record.connection, decision),
            Err(err) => println!("#{:<4} {}  error: {}", record.index, record.connection, err),
        }
    }

    if args.metrics {
        print!("{}", engine.metrics().gather_metrics()?);
    }
    Ok(())
}
