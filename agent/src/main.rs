//! V2X Agent - one car on the shared road
//!
//! Runs the vehicle agent loop at `--fps` over a Zenoh session:
//! - Publishes its own car (and the ambulance, if it summoned it) every tick
//! - Merges every other car heard on the topic
//! - Reads driver commands from stdin and prints a dashboard line
//!
//! Without a reachable session (or with `--offline`) it keeps driving alone.

mod console;
mod transport;

use anyhow::{Context, Result};
use clap::Parser;
use console::{parse_line, ConsoleInput, HELP};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use transport::{zenoh_config, AgentTransport, ZenohTransport};
use v2x_core::{AgentConfig, RoadConfig, UserCommand, VehicleAgent, DEFAULT_TOPIC};
use v2x_env::{MailboxSender, OfflineTransport, TokioContext, V2xContext};

/// V2X vehicle agent
#[derive(Parser, Debug)]
#[command(name = "v2x-agent")]
#[command(about = "Drive one car on the shared V2X road", long_about = None)]
struct Args {
    /// Vehicle id (uppercased)
    #[arg(long, default_value = "CAR1")]
    id: String,

    /// Pub/sub topic carrying vehicle state
    #[arg(long, default_value = DEFAULT_TOPIC)]
    topic: String,

    /// Tick rate in Hz
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Road configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Zenoh session configuration file
    #[arg(long)]
    zenoh_config: Option<PathBuf>,

    /// Skip the network and drive alone
    #[arg(long)]
    offline: bool,

    /// Seconds between dashboard lines
    #[arg(long, default_value_t = 1.0)]
    status_interval: f64,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let road = match &args.config {
        Some(path) => RoadConfig::from_json_file(path)
            .with_context(|| format!("loading road config {}", path.display()))?,
        None => RoadConfig::default(),
    };
    let cruise_step = road.cruise_step;
    let config = AgentConfig {
        topic: args.topic.clone(),
        tick_rate_hz: args.fps.max(1),
        ..AgentConfig::default()
    }
    .with_vehicle_id(args.id.to_uppercase())
    .with_road(road);

    let context = TokioContext::shared();
    let transport = connect(&args, &context, &config).await;
    let mut agent = VehicleAgent::spawn(context.clone(), Arc::new(transport), config, &mut rand::thread_rng());

    let stop = Arc::new(AtomicBool::new(false));
    spawn_console(&context, agent.command_sender(), Arc::clone(&stop), cruise_step);
    spawn_ctrl_c(&context, Arc::clone(&stop));
    println!("{}", HELP);

    let interval = args.status_interval.max(0.05);
    let mut next_status = 0.0;
    agent
        .run_with(&stop, |agent, _| {
            let now = agent.now_secs();
            if now >= next_status {
                println!("{}", agent.dashboard());
                next_status = now + interval;
            }
        })
        .await;

    info!(stats = ?agent.stats(), tasks = context.live_tasks(), "agent shut down");
    Ok(())
}

/// Opens the Zenoh session, or falls back to driving alone.
async fn connect(args: &Args, context: &TokioContext, config: &AgentConfig) -> AgentTransport {
    if args.offline {
        info!("offline mode");
        return AgentTransport::Offline(OfflineTransport::new("offline mode"));
    }

    let session = match zenoh_config(args.zenoh_config.as_deref()) {
        Ok(zenoh) => ZenohTransport::connect(context, zenoh, &config.topic, config.mailbox_capacity).await,
        Err(e) => Err(e),
    };
    match session {
        Ok(transport) => AgentTransport::Zenoh(transport),
        Err(e) => {
            warn!(error = %e, "network unavailable, driving offline");
            AgentTransport::Offline(OfflineTransport::new(e.to_string()))
        }
    }
}

fn spawn_console(context: &TokioContext, commands: MailboxSender<UserCommand>, stop: Arc<AtomicBool>, cruise_step: f64) {
    context.spawn("console", async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_line(&line, cruise_step) {
                Some(ConsoleInput::Command(command)) => {
                    if let Err(e) = commands.push(command) {
                        warn!(error = %e, "command dropped");
                    }
                }
                Some(ConsoleInput::Help) => println!("{}", HELP),
                Some(ConsoleInput::Quit) => {
                    stop.store(true, Ordering::Relaxed);
                    break;
                }
                None => println!("unknown command, {}", HELP),
            }
        }
    });
}

fn spawn_ctrl_c(context: &TokioContext, stop: Arc<AtomicBool>) {
    context.spawn("ctrl-c", async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.store(true, Ordering::Relaxed);
        }
    });
}
