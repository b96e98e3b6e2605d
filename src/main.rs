//! Survivor core entry point
//!
//! `serve` runs the coordinating process; `play` runs a headless participant
//! at 60 frames per second, driven by the autopilot when `--idle` is set.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tokio::time::{MissedTickBehavior, interval};

use survivor_core::net::{NetClient, Server};
use survivor_core::sim::{CharacterKind, TickInput};
use survivor_core::{Session, Settings};

/// Simulation core of a top-down survival game
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (JSON)
    #[arg(short, long, default_value = "settings.json")]
    config: PathBuf,

    /// World seed (overrides the settings file)
    #[arg(long)]
    seed: Option<u64>,

    /// Character kind: adventurer or female
    #[arg(long)]
    character: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the coordinating process
    Serve {
        /// Address to listen on
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run a headless participant
    Play {
        /// Coordinator address; omit to play offline
        #[arg(long)]
        connect: Option<String>,

        /// Stop after this many frames (0 = run forever)
        #[arg(long, default_value_t = 0)]
        frames: u64,

        /// Let the autopilot drive the player
        #[arg(long)]
        idle: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut settings = Settings::load(&args.config);
    if let Some(seed) = args.seed {
        settings.seed = seed;
    }
    if let Some(character) = &args.character {
        settings.character = CharacterKind::from_id(character);
    }

    match args.command {
        Command::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| settings.server_addr.clone());
            let server = Server::bind(&addr, settings.snapshot_hz).await?;
            server.run().await?;
        }
        Command::Play {
            connect,
            frames,
            idle,
        } => play(settings, connect, frames, idle).await,
    }
    Ok(())
}

async fn play(settings: Settings, connect: Option<String>, frames: u64, idle: bool) {
    let config = settings.sim_config();
    let mut session = match connect {
        Some(addr) => match NetClient::connect(&addr).await {
            Ok(link) => Session::networked(config, link),
            Err(e) => {
                log::warn!("Could not join {}: {}, playing offline", addr, e);
                Session::offline(config)
            }
        },
        None => Session::offline(config),
    };
    log::info!("Playing with seed {}", settings.seed);

    let input = TickInput {
        idle_mode: idle,
        ..Default::default()
    };
    let mut ticker = interval(Duration::from_secs_f64(1.0 / 60.0));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = Instant::now();
    let mut frame: u64 = 0;

    loop {
        ticker.tick().await;
        let now = Instant::now();
        session.frame((now - last).as_secs_f32(), &input);
        last = now;
        frame += 1;

        if frame % (60 * 10) == 0 {
            let state = &session.state;
            log::info!(
                "Survived {:.0}s: {} enemies, {} peers, {} chunks, health {:.0}, difficulty {:.2}",
                state.survival_ms() / 1000.0,
                state.enemies.len(),
                state.remote_players.len(),
                state.world.active_count(),
                state.player.health,
                state.difficulty.multiplier
            );
        }
        if frames > 0 && frame >= frames {
            break;
        }
    }
    log::info!("Stopped after {} frames", frame);
}
