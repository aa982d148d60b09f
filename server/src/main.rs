use clap::Parser;
use log::{error, info};
use server::loader::load_world;
use server::mechanics;
use server::network::{Server, ServerConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, loads the world, then runs the server until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
        port: u16,
        /// Tick rate (steps per second)
        #[clap(short, long, default_value_t = shared::DEFAULT_TICK_RATE,
               value_parser = clap::value_parser!(u32).range(1..=240))]
        tick_rate: u32,
        /// World description to load
        #[clap(short, long, default_value = "worlds/demo.json")]
        world: PathBuf,
        /// Accept testPlayerJump and testPlayerNextMap requests
        #[clap(long)]
        test: bool,
        /// Seconds of silence before a player is removed
        #[clap(long, default_value_t = 60)]
        timeout_secs: u64,
    }

    env_logger::init();
    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    // Parse command line arguments
    let args = Args::parse();

    let world = load_world(&args.world, &mechanics::standard())?;

    let config = ServerConfig {
        addr: format!("{}:{}", args.host, args.port),
        tick_rate: args.tick_rate,
        test_mode: args.test,
        client_timeout: Duration::from_secs(args.timeout_secs),
    };
    let mut server = Server::new(config, world).await?;

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
