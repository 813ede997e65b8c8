use clap::Parser;
use client::game::ClientGame;
use client::input::MouseInput;
use client::network::{connect, UdpChannel};
use client::overlay::Overlay;
use client::rendering::Renderer;
use log::info;
use macroquad::prelude::*;
use shared::{ImpairedChannel, ImpairmentConfig, MemorySink, PlayerId};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Window width
    #[arg(short = 'w', long, default_value = "1024")]
    width: i32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "768")]
    height: i32,

    /// Fraction of outgoing packets to drop
    #[arg(long, default_value = "0")]
    loss: f64,

    /// Fraction of outgoing packets to deliver twice
    #[arg(long, default_value = "0")]
    duplicate: f64,

    /// Simulated latency added to outgoing packets, in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    latency_ms: u64,

    /// Random extra delay in milliseconds added on top of the latency
    #[arg(short = 'j', long, default_value = "0")]
    jitter_ms: u64,

    /// Handshake attempts before giving up
    #[arg(long, default_value = "5")]
    attempts: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let runtime = tokio::runtime::Runtime::new()?;
    let (player_id, channel) =
        runtime.block_on(connect(&args.server, args.attempts, Duration::from_secs(1)))?;
    drop(runtime);

    let impairment = ImpairmentConfig {
        loss: args.loss,
        duplicate: args.duplicate,
        latency_ms: args.latency_ms,
        jitter_ms: args.jitter_ms,
    };
    if !impairment.is_clean() {
        info!("Simulating network conditions: {:?}", impairment);
    }
    info!("Controls: click to capture the mouse, Escape to release, G to toggle the buffer graph");

    let conf = Conf {
        window_title: format!("Rollback Netcode - Player {}", player_id),
        window_width: args.width,
        window_height: args.height,
        ..Default::default()
    };
    let channel = ImpairedChannel::new(channel, impairment);
    macroquad::Window::from_config(conf, run(player_id, channel));

    Ok(())
}

async fn run(player_id: PlayerId, mut channel: ImpairedChannel<UdpChannel>) {
    let mut game = ClientGame::new(player_id);
    let mut input = MouseInput::new();
    let mut renderer = Renderer::new();
    let mut overlay = Overlay::new();
    let mut trace = MemorySink::new();

    prevent_quit();

    while !is_quit_requested() {
        let delta_ms = f64::from(get_frame_time()) * 1000.0;

        if input.update() {
            overlay.toggle_graph();
        }

        match game.frame(delta_ms, &mut channel, &mut input, &mut trace) {
            Some(frame) => renderer.render(&frame),
            None if channel.inner().is_closed() => {
                renderer.render_waiting("Disconnected from server")
            }
            None => renderer.render_waiting("Waiting for server state..."),
        }

        overlay.sample(&trace);
        overlay.render(&trace);

        next_frame().await;
    }

    info!("Disconnecting player {}", player_id);
    channel.inner_mut().disconnect();
}
