use clap::Parser;
use client::balance::SharedWallet;
use client::config::ArenaConfig;
use client::input::{InputAction, InputManager};
use client::network_graph::LatencyGraph;
use client::rendering::Renderer;
use client::session::{dispatch, ArenaSession, SessionHost};
use client::transport::WsTransport;
use log::{error, info, warn};
use macroquad::prelude::*;
use ::rand::Rng;
use shared::{PlayerState, WireFormat, WorldBounds};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Session authority WebSocket URL
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:3001")]
    server: String,

    /// Session (game) id to join
    #[arg(long, default_value = "1")]
    session: String,

    /// Participant id; random when omitted
    #[arg(short = 'p', long)]
    participant: Option<String>,

    /// Participants expected in the session, local player included
    #[arg(long, default_value = "2")]
    players: usize,

    /// Starting balance of the local wallet
    #[arg(short = 'b', long, default_value = "500")]
    balance: u64,

    /// Send bincode frames instead of JSON
    #[arg(long)]
    binary: bool,

    /// Arena width
    #[arg(short = 'w', long, default_value = "900")]
    width: u32,

    /// Arena height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "700")]
    height: u32,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Purge Arena".to_string(),
        window_width: args.width as i32,
        window_height: args.height as i32,
        window_resizable: true,
        ..Default::default()
    }
}

/// Logs session callbacks; the window shows the rest.
struct LoggingHost;

impl SessionHost for LoggingHost {
    fn on_remote_eliminated(&mut self, id: &str) {
        info!("{} is out", id);
    }

    fn on_remote_left(&mut self, id: &str) {
        info!("{} left", id);
    }

    fn on_remote_ready(&mut self, id: &str) {
        info!("{} is ready", id);
    }

    fn on_countdown_started(&mut self, duration: Duration) {
        info!("Match starts in {}s", duration.as_secs());
    }

    fn on_match_started(&mut self) {
        info!("Match started");
    }

    fn on_winner_declared(&mut self, id: &str) {
        info!("Winner: {}", id);
    }

    fn on_local_eliminated(&mut self) {
        info!("You were eliminated");
    }

    fn on_connection_changed(&mut self, connected: bool) {
        if connected {
            info!("Connected to session authority");
        } else {
            warn!("Lost connection to session authority");
        }
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    if let Err(e) = run(Args::parse()).await {
        error!("Client stopped: {}", e);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    let mut rng = ::rand::thread_rng();
    let participant = args
        .participant
        .unwrap_or_else(|| format!("player-{:04}", rng.gen_range(0..10_000)));

    let mut config = ArenaConfig::new(args.session, participant);
    config.expected_participants = args.players;
    config.network.server_url = args.server;
    if args.binary {
        config.network.wire_format = WireFormat::Binary;
    }
    let bounds = WorldBounds::new(args.width as f32, args.height as f32);
    config.simulation.bounds = bounds;

    // Spawn somewhere inside the starting zone
    let center = bounds.center();
    let spread = (config.zone.initial_radius * 0.6).min(center.x.min(center.y) * 0.8);
    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    let distance = rng.gen_range(0.0..spread.max(1.0));
    let spawn = shared::Vec2::new(
        center.x + angle.cos() * distance,
        center.y + angle.sin() * distance,
    );
    let mut local = PlayerState::new(config.participant_id.clone(), spawn);
    local.color = rng.gen_range(0x40_40_40..0xff_ff_ff);

    info!("Joining session {} as {}", config.session_id, config.participant_id);
    info!("Connecting to: {}", config.connection_url());
    info!("Controls: move the mouse to steer");
    info!("Press 1/2/3 to buy Speed/Shield/Health, G for the latency graph");

    let wallet = SharedWallet::new(args.balance);
    let transport = WsTransport::new(runtime.handle().clone());
    let mut session = ArenaSession::new(config, local, transport, wallet.clone());
    let mut input = InputManager::new(bounds);
    let renderer = Renderer::new(bounds);
    let mut graph = LatencyGraph::new();
    let mut host = LoggingHost;

    session.start(Instant::now());

    loop {
        let now = Instant::now();
        let (control, actions) = input.update();

        for action in actions {
            match action {
                InputAction::Buy(kind) => match session.purchase(kind, now) {
                    Ok(receipt) => {
                        wallet.settle(receipt.cost);
                        info!("Bought {} for {}", receipt.kind, receipt.cost);
                    }
                    Err(e) => info!("Purchase rejected: {}", e),
                },
                InputAction::ToggleGraph => graph.toggle_visibility(),
            }
        }

        let events = session.tick(&control, now);
        dispatch(&mut host, &events);

        let snapshot = session.snapshot(now);
        if let Some(latency) = snapshot.latency {
            graph.record(latency, now);
        }
        renderer.render(&snapshot);
        graph.render();

        if is_key_pressed(KeyCode::Escape) {
            break;
        }
        next_frame().await;
    }

    session.teardown();
    runtime.shutdown_background();
    Ok(())
}
