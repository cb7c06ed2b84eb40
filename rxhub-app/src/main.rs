//! rxhub: application-core runtime for the dual-core receiver.
//!
//! Supports:
//! - Running the event dispatcher with a terminal display and console input
//! - Replaying a packet script on the baseband side while running
//! - Headless replay of a script, printing the final recent-entries tables
//! - Showing and writing the configuration file

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rxhub_app::session::{build_screen, replay_headless};
use rxhub_app::{AppError, Console, Protocol, TerminalDisplay};
use rxhub_baseband::{BasebandLink, PacketScript, Replayer};
use rxhub_core::config::{self, Config};
use rxhub_core::{
    BasebandPort, DispatcherContext, EventDispatcher, IrqBridge, SharedInput, SleepHandle,
    StopHandle,
};

#[derive(Parser)]
#[command(name = "rxhub", version, about = "Receiver application core")]
struct Cli {
    /// Config file (default: ~/.rxhub/config.yaml)
    #[arg(long, global = true, env = "RXHUB_CONFIG")]
    config: Option<PathBuf>,

    /// Log level, overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Entries kept per protocol, overrides the config file
    #[arg(long, global = true)]
    max_entries: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatcher; commands are read from stdin
    Run {
        /// Packet script replayed on the baseband side
        #[arg(long)]
        script: Option<PathBuf>,

        /// Protocol views to show (default: all)
        #[arg(long, value_enum)]
        protocol: Vec<Protocol>,

        /// Replay speed multiplier
        #[arg(long, default_value = "1.0")]
        speed: f64,
    },

    /// Replay a script headlessly and print the final tables
    Replay {
        /// Path to a JSON-lines packet script
        script: PathBuf,

        /// Protocol views to fill (default: all)
        #[arg(long, value_enum)]
        protocol: Vec<Protocol>,

        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Also write it to the config file
        #[arg(long)]
        write: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(max) = cli.max_entries.filter(|&n| n > 0) {
        config.recent.max_entries = max;
    }
    config.normalize();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run {
            script,
            protocol,
            speed,
        } => cmd_run(config, script, protocols_or_all(protocol), speed),
        Commands::Replay {
            script,
            protocol,
            json,
        } => cmd_replay(&config, script, protocols_or_all(protocol), json),
        Commands::Config { write } => cmd_config(&config, cli.config, write),
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

fn protocols_or_all(protocols: Vec<Protocol>) -> Vec<Protocol> {
    if protocols.is_empty() {
        Protocol::ALL.to_vec()
    } else {
        protocols
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Handles the dispatcher thread hands back once it is live.
struct Handles {
    port: BasebandPort,
    input: SharedInput,
    irq: IrqBridge,
    stop: StopHandle,
    sleep: SleepHandle,
}

fn cmd_run(
    config: Config,
    script: Option<PathBuf>,
    protocols: Vec<Protocol>,
    speed: f64,
) -> rxhub_app::Result<()> {
    let script = script.map(PacketScript::load).transpose()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_session(config, script, protocols, speed))
}

async fn run_session(
    config: Config,
    script: Option<PacketScript>,
    protocols: Vec<Protocol>,
    speed: f64,
) -> rxhub_app::Result<()> {
    let rtc_period = Duration::from_millis(config.dispatcher.rtc_tick_ms.max(1));
    let frame_period = Duration::from_millis(config.dispatcher.frame_sync_ms.max(1));

    // The registry and views are single-threaded, so everything the
    // dispatcher owns is built on its own thread.
    let (tx, rx) = oneshot::channel();
    let dispatcher = tokio::task::spawn_blocking(move || {
        let (context, port) = DispatcherContext::new(&config.dispatcher);
        let screen = build_screen(&protocols, &context, &config);
        let input = SharedInput::new();
        let handles = Handles {
            port,
            input: input.clone(),
            irq: context.irq(),
            stop: context.stop_handle(),
            sleep: context.sleep_handle(),
        };

        let mut dispatcher = EventDispatcher::new(
            context,
            screen.tree,
            screen.focus,
            input,
            TerminalDisplay::stdout(),
        );
        if tx.send(handles).is_err() {
            return Vec::new();
        }
        dispatcher.run();

        screen
            .views
            .iter()
            .map(|v| (v.protocol(), v.summary().to_string()))
            .collect::<Vec<_>>()
    });

    let handles = rx
        .await
        .map_err(|_| AppError::Dispatcher("exited during startup".into()))?;

    let rtc = {
        let irq = handles.irq.clone();
        spawn_timer(rtc_period, move || irq.event_isr_rtc_tick())
    };
    let frame_sync = {
        let irq = handles.irq.clone();
        spawn_timer(frame_period, move || irq.event_isr_lcd_frame_sync())
    };

    let console = Console {
        input: handles.input,
        irq: handles.irq,
        sleep: handles.sleep,
        stop: handles.stop.clone(),
    };
    // Not joined: a blocked stdin read must not hold up shutdown.
    thread::Builder::new()
        .name("console".into())
        .spawn(move || console.run(io::stdin().lock()))?;

    let replay_stop = Arc::new(AtomicBool::new(false));
    let link = BasebandLink::new(handles.port);
    let replay = match script {
        Some(script) => {
            info!(records = script.len(), speed, "replaying script");
            let replayer = Replayer::new(script).with_time_scale(1.0 / speed.max(0.001));
            Some(replayer.spawn(link, Arc::clone(&replay_stop))?)
        }
        None => None,
    };

    {
        let stop = handles.stop;
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted, stopping");
                stop.request_stop();
            }
        });
    }

    let summaries = dispatcher
        .await
        .map_err(|e| AppError::Dispatcher(e.to_string()))?;
    rtc.abort();
    frame_sync.abort();

    if let Some(handle) = replay {
        replay_stop.store(true, Ordering::Release);
        match tokio::task::spawn_blocking(move || handle.join()).await {
            Ok(Ok(stats)) => info!(sent = stats.sent, dropped = stats.dropped, "baseband stopped"),
            _ => warn!("baseband thread did not finish cleanly"),
        }
    }

    for (protocol, table) in summaries {
        println!("{}", protocol.title());
        println!("{table}");
    }
    Ok(())
}

/// Periodic task standing in for a hardware timer interrupt.
fn spawn_timer(period: Duration, mut isr: impl FnMut() + Send + 'static) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            isr();
        }
    })
}

// ---------------------------------------------------------------------------
// replay
// ---------------------------------------------------------------------------

fn cmd_replay(
    config: &Config,
    path: PathBuf,
    protocols: Vec<Protocol>,
    json: bool,
) -> rxhub_app::Result<()> {
    let script = PacketScript::load(&path)?;
    eprintln!("Replaying {} ({} messages)", path.display(), script.len());

    let report = replay_headless(&script, &protocols, config);

    if json {
        let text = serde_json::to_string_pretty(&report.to_json()).unwrap_or_default();
        println!("{text}");
        return Ok(());
    }

    for view in &report.views {
        println!("{} ({})", view.protocol().title(), view.len());
        println!("{}", view.summary());
    }
    eprintln!(
        "{} sent, {} dropped, {} ticks",
        report.sent, report.dropped, report.ticks
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config(config: &Config, path: Option<PathBuf>, write: bool) -> rxhub_app::Result<()> {
    print!("{}", config::serialize_config(config));
    if write {
        let written = match path {
            Some(path) => {
                config::save_config_to(config, &path)?;
                path
            }
            None => config::save_config(config)?,
        };
        eprintln!("Wrote {}", written.display());
    }
    Ok(())
}
