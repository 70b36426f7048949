use clap::Parser;
use log::{error, info};
use server::network::RelayServer;
use server::room::LobbyRules;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "3001")]
    port: u16,

    /// Seconds of silence before a participant is dropped
    #[arg(short, long, default_value = "30")]
    timeout_secs: u64,

    /// Ready participants needed to start a match
    #[arg(short, long, default_value = "2")]
    min_players: usize,

    /// Countdown between the last ready and the match start
    #[arg(short, long, default_value = "3")]
    countdown_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    let rules = LobbyRules {
        min_players: args.min_players.max(1),
        countdown: Duration::from_secs(args.countdown_secs),
    };
    let server =
        RelayServer::bind(&address, Duration::from_secs(args.timeout_secs), rules).await?;
    info!("Clients should connect to ws://{}", server.local_addr()?);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Relay stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    Ok(())
}
