use clap::Parser;
use log::{error, info, warn};
use server::config::ServerConfig;
use server::game::GameState;
use server::listing::LogListing;
use server::map::{JsonMapProvider, MapProvider, MemoryMapProvider, TileMap};
use server::network::{Server, ServerMessage};
use std::path::PathBuf;
use std::time::Instant;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "28000")]
    port: u16,
    /// JSON config file
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Tick rate (updates per second), overrides the config file
    #[clap(short, long)]
    tick_rate: Option<u32>,
    /// Fixed random seed
    #[clap(long)]
    seed: Option<u64>,
    /// Skip the shutdown grace period on Ctrl+C
    #[clap(long)]
    immediate: bool,
}

fn map_provider(config: &ServerConfig) -> Box<dyn MapProvider> {
    if config.maps_dir.is_dir() {
        return Box::new(JsonMapProvider::new(&config.maps_dir));
    }

    warn!(
        "Map directory {} not found, serving generated arenas",
        config.maps_dir.display()
    );
    let provider = config
        .maps
        .iter()
        .fold(MemoryMapProvider::new(), |provider, name| {
            provider.with_map(TileMap::arena(name, 64, 48, 32.0))
        });
    Box::new(provider)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(tick_rate) = args.tick_rate {
        config.updates_per_sec = tick_rate;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let listing = Box::new(LogListing::new(config.register));
    let maps = map_provider(&config);
    let state = GameState::new(config, maps, Instant::now())?;

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, state, listing).await?;

    let control = server.control();
    let immediate = args.immediate;
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        info!("Received Ctrl+C, shutting down");
        let _ = control.send(ServerMessage::Shutdown { immediate });
    });

    server.run().await?;
    Ok(())
}
