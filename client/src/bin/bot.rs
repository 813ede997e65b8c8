//! Headless client that connects to a server and wanders around with random
//! mouse input. Useful for load testing and for watching remote players.

use clap::Parser;
use client::game::{ClientGame, InputSource};
use client::network::connect;
use log::{error, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{ImpairedChannel, ImpairmentConfig, InputsUnit, LogSink};
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Number of bots to run
    #[arg(short = 'n', long, default_value = "1")]
    count: usize,

    /// Seconds to stay connected (0 runs until the server drops us)
    #[arg(short = 'd', long, default_value = "0")]
    duration_secs: u64,

    /// Fraction of outgoing packets to drop
    #[arg(long, default_value = "0")]
    loss: f64,

    /// Simulated latency added to outgoing packets, in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    latency_ms: u64,

    /// Random extra delay in milliseconds added on top of the latency
    #[arg(short = 'j', long, default_value = "0")]
    jitter_ms: u64,
}

/// Random walk over mouse deltas with occasional clicks.
struct RandomInput {
    rng: StdRng,
    heading: (f64, f64),
    clicking: bool,
}

impl RandomInput {
    fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            heading: (0.0, 0.0),
            clicking: false,
        }
    }
}

impl InputSource for RandomInput {
    fn consume_accumulated_inputs(&mut self) -> InputsUnit {
        self.heading.0 = (self.heading.0 + self.rng.gen_range(-2.0..2.0)).clamp(-12.0, 12.0);
        self.heading.1 = (self.heading.1 + self.rng.gen_range(-2.0..2.0)).clamp(-12.0, 12.0);
        if self.rng.gen_bool(0.02) {
            self.clicking = !self.clicking;
        }
        InputsUnit::new(self.heading.0, self.heading.1, self.clicking)
    }
}

async fn run_bot(
    index: usize,
    server: String,
    impairment: ImpairmentConfig,
    duration: Option<Duration>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (player_id, channel) = connect(&server, 5, Duration::from_secs(1)).await?;
    info!("Bot {} playing as player {}", index, player_id);

    let mut channel = ImpairedChannel::new(channel, impairment);
    let mut game = ClientGame::new(player_id);
    let mut input = RandomInput::new();
    let mut trace = LogSink::new(format!("bot{}", index));

    let started = Instant::now();
    let mut last_frame = started;
    let mut frames = interval(Duration::from_millis(5));
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        frames.tick().await;
        let now = Instant::now();
        let delta_ms = now.duration_since(last_frame).as_secs_f64() * 1000.0;
        last_frame = now;

        game.frame(delta_ms, &mut channel, &mut input, &mut trace);

        if channel.inner().is_closed() {
            info!("Bot {} was disconnected by the server", index);
            return Ok(());
        }
        if duration.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
    }

    info!(
        "Bot {} leaving after {} corrections, {} resets",
        index,
        game.corrections(),
        game.resets()
    );
    channel.inner_mut().disconnect();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let impairment = ImpairmentConfig {
        loss: args.loss,
        latency_ms: args.latency_ms,
        jitter_ms: args.jitter_ms,
        ..Default::default()
    };
    let duration = (args.duration_secs > 0).then(|| Duration::from_secs(args.duration_secs));

    info!("Starting {} bot(s) against {}", args.count, args.server);

    let mut handles = Vec::with_capacity(args.count);
    for index in 0..args.count {
        let server = args.server.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = run_bot(index, server, impairment, duration).await {
                error!("Bot {} failed: {}", index, e);
            }
        }));
    }

    for handle in handles {
        handle.await?;
    }

    Ok(())
}
