use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use peerdrop_core::config::{AppConfig, get_config_dir};
use peerdrop_core::identity::FileStore;
use peerdrop_core::transfer::utils::{format_transfer_speed, save_received_file};
use peerdrop_core::{IdentityStore, TransferEvent, TransferRequest};
use peerdrop_net::{IrohNetwork, PeerEndpoint, Session};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "peerdrop", version, about = "Send a file straight to another peer")]
struct Cli {
    /// Log at debug level (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding the identity and config.json
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print this device's node id
    Id,

    /// Wait for incoming files and save them
    Listen {
        /// Where received files go (default: download_path from config)
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Send one file to a peer
    Send {
        /// Node id of the receiving peer
        peer_id: String,
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();

    // Everything runs on one thread; sessions interleave at await points.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir().unwrap_or_else(|| PathBuf::from(".")),
    };
    let config = AppConfig::load_from(&config_dir);
    let store = IdentityStore::new(FileStore::new(config_dir));

    match cli.command {
        Command::Id => {
            let (identity, _) = store.load_or_generate();
            println!("{}", identity.node_id());
            Ok(())
        }
        Command::Listen { out } => {
            let out = out.unwrap_or_else(|| config.download_path.clone());
            listen(&store, &config, &out).await
        }
        Command::Send { peer_id, file } => send(&store, &config, &peer_id, &file).await,
    }
}

async fn listen(store: &IdentityStore<FileStore>, config: &AppConfig, out: &Path) -> Result<()> {
    let endpoint = PeerEndpoint::<IrohNetwork>::bind(store, config.endpoint_config()).await?;
    let (event_tx, mut event_rx) = mpsc::channel(32);
    let session = Session::start(endpoint, event_tx)?;

    println!("Node ID: {}", session.node_id());
    println!("Saving received files to {}", out.display());

    session
        .run_scoped(async {
            while let Some(event) = event_rx.recv().await {
                match event {
                    TransferEvent::Ready { .. } => println!("Ready, waiting for peers (Ctrl-C to stop)"),
                    TransferEvent::Incoming { id, from } => info!("[{}] Incoming from {}", id, from),
                    TransferEvent::Received { id, from, file } => {
                        match save_received_file(out, &file).await {
                            Ok(path) => println!(
                                "✓ {} ({} bytes) from {} saved to {}",
                                file.file_name,
                                file.size(),
                                from,
                                path.display()
                            ),
                            Err(e) => error!("[{}] Failed to save {}: {}", id, file.file_name, e),
                        }
                    }
                    TransferEvent::Failed { peer, reason, .. } => {
                        eprintln!("✗ Transfer from {} failed: {}", peer, reason)
                    }
                    TransferEvent::Sent(_) => {}
                }
            }
        })
        .await;
    Ok(())
}

async fn send(
    store: &IdentityStore<FileStore>,
    config: &AppConfig,
    peer_id: &str,
    file: &Path,
) -> Result<()> {
    let request = TransferRequest::from_path(peer_id, file).await?;
    let endpoint = PeerEndpoint::<IrohNetwork>::bind(store, config.endpoint_config()).await?;
    // Outcome comes back from submit. Dropping the receiver makes every
    // event a no-op, so stray inbound dials cannot back up.
    let (event_tx, event_rx) = mpsc::channel(1);
    drop(event_rx);
    let session = Session::start(endpoint, event_tx)?;

    let start = Instant::now();
    let outcome = session
        .run_scoped(async {
            session.endpoint().ready().await?;
            let receipt = session.submit(request).await?;
            anyhow::Ok(receipt)
        })
        .await;

    match outcome {
        Some(Ok(receipt)) => {
            let elapsed = start.elapsed();
            println!(
                "✓ Sent {} ({} bytes) to {} in {:?} ({})",
                receipt.file_name,
                receipt.size,
                receipt.peer,
                elapsed,
                format_transfer_speed(receipt.size as u64, elapsed.as_secs_f64())
            );
            println!("blake3 {}", receipt.digest);
            Ok(())
        }
        Some(Err(e)) => Err(e.context("Transfer failed")),
        None => anyhow::bail!("Interrupted"),
    }
}
