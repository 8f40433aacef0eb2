use anyhow::{Context, bail};
use chrono::Local;
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use wheru::location::FixedLocation;
use wheru::loopback::LoopbackNetwork;
use wheru::media::{LoggingOutput, VirtualCapture};
use wheru::presentation::LogPresentation;
use wheru::store::{FileStore, MemoryStore};
use wheru::{LocationFix, PeerId, Session, SessionConfig, SessionHandle};

// Two sessions talking over the in-process rendezvous.
//
// Usage:
//   cargo run                                    # defaults
//   cargo run -- --phone 555-123-4567 --friend 555-987-6543 --talk 5
//   cargo run -- --store ./wheru-data            # keep our number and contacts

#[derive(Parser)]
#[command(name = "wheru")]
#[command(about = "Push-to-talk with location sharing between two local sessions")]
struct Cli {
    /// Our phone number.
    #[arg(short, long, default_value = "555-123-4567")]
    phone: String,

    /// The friend's phone number.
    #[arg(short, long, default_value = "555-987-6543")]
    friend: String,

    #[arg(short, long, default_value = "Alex")]
    name: String,

    /// Seconds to hold the talk button.
    #[arg(short, long, default_value_t = 3)]
    talk: u64,

    /// Directory for our saved number and contacts.
    #[arg(short, long)]
    store: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to build tokio runtime: {e}");
            return;
        }
    };

    rt.block_on(async {
        tokio::select! {
            result = run(cli) => {
                if let Err(e) = result {
                    error!("Demo failed: {e:#}");
                }
            }
            _ = tokio::signal::ctrl_c() => warn!("Interrupted"),
        }
    });
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let network = Arc::new(LoopbackNetwork::new());
    let capture = Arc::new(VirtualCapture::new());

    let mut me = Session::builder()
        .with_signaling(network.clone())
        .with_capture(capture.clone())
        .with_output(Arc::new(LoggingOutput))
        .with_location(Arc::new(FixedLocation::denied()));
    me = match &cli.store {
        Some(dir) => {
            let store = FileStore::new(dir)
                .await
                .with_context(|| format!("opening store at {}", dir.display()))?;
            me.with_store(Arc::new(store))
        }
        None => me.with_store(Arc::new(MemoryStore::new())),
    };
    let me = me.build().await?;

    let friend = Session::builder()
        .with_config(SessionConfig::default())
        .with_signaling(network.clone())
        .with_capture(capture)
        .with_location(Arc::new(FixedLocation::at(LocationFix::new(40.7128, -74.0060))))
        .with_presentation(Arc::new(LogPresentation::new(true)))
        .build()
        .await?;

    let my_id = me.handle().register(&cli.phone).await?;
    let friend_id = friend.handle().register(&cli.friend).await?;
    info!("Registered {my_id} and {friend_id}");

    let result = talk(&me.handle(), &friend.handle(), &cli, &friend_id).await;

    me.shutdown().await;
    friend.shutdown().await;
    result
}

async fn talk(
    me: &SessionHandle,
    friend: &SessionHandle,
    cli: &Cli,
    friend_id: &PeerId,
) -> anyhow::Result<()> {
    let contact = match me.add_contact(&cli.name, &cli.friend).await {
        Ok(contact) => contact,
        Err(e) => {
            info!("Using saved contact ({e})");
            me.snapshot()
                .await?
                .contacts
                .into_iter()
                .find(|c| &c.id == friend_id)
                .context("saved contact not found")?
        }
    };

    let here = me.request_location().await?;
    info!("Our location: {here:?}");

    me.connect_contact(&contact).await?;
    wait_until_open(me).await?;

    me.start_transmission().await?;
    tokio::time::sleep(Duration::from_secs(cli.talk)).await;
    me.stop_transmission().await?;

    let seen = friend.snapshot().await?;
    info!(
        "{} sees us at {:?}",
        cli.name,
        seen.peer_location.context("location was not shared")?
    );

    me.disconnect().await?;
    Ok(())
}

async fn wait_until_open(handle: &SessionHandle) -> anyhow::Result<()> {
    for _ in 0..50 {
        if handle.snapshot().await?.connection.is_open() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    bail!("connection did not open")
}
