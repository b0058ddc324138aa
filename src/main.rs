use anyhow::Context;
use clap::Parser;
use fvgbot::config::AppConfig;
use fvgbot::execution::{PaperBook, PaperVenue, PositionController, VenueEvent};
use fvgbot::feed::LiveFeed;
use fvgbot::models::SchemaKind;
use fvgbot::persistence::TradeLogWriter;
use fvgbot::signal::SignalStore;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval_at, Duration, Instant};

/// How often the live price file is checked, independent of the signal poll
const FEED_POLL_MILLIS: u64 = 500;

#[derive(Parser, Debug)]
#[command(name = "fvgbot", about = "File-driven bracket order execution bot")]
struct Cli {
    /// Path to a TOML config file (defaults to ./Fvgbot.toml if present)
    #[arg(long)]
    config: Option<String>,

    /// Override the configured signal schema (basic, single_target, dual_target)
    #[arg(long)]
    schema: Option<SchemaKind>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let mut config =
        AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(schema) = cli.schema {
        config.schema = schema;
    }

    tracing::info!("🚀 FVG Bot starting");
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Signals: {} ({:?} schema)", config.signals_file, config.schema);
    tracing::info!("  Trade log: {}", config.trades_log_file);
    tracing::info!("  Live feed: {}", config.live_feed_file);
    tracing::info!("  Poll interval: {}s", config.poll_interval_secs);
    tracing::info!("  Quantity: {} contracts", config.contract_quantity);
    tracing::info!(
        "  Fixed bracket: {:.1} pt target / {:.1} pt stop",
        config.profit_target_points,
        config.stop_loss_points
    );

    // Venue events flow from both the entry path and the paper book into
    // the single controller task
    let (event_tx, event_rx) = mpsc::unbounded_channel::<VenueEvent>();
    let (line_tx, line_rx) = mpsc::unbounded_channel::<String>();

    let book = Arc::new(Mutex::new(PaperBook::new()));
    let venue = PaperVenue::new(book.clone(), event_tx.clone());
    let trade_log = TradeLogWriter::new(&config.trades_log_file, config.schema);
    let store = SignalStore::new(&config.signals_file, config.schema);
    let feed = LiveFeed::new(&config.live_feed_file);

    let controller = PositionController::new(config.clone(), Box::new(venue), trade_log);

    tracing::info!("\n🔄 Spawning independent loops...");

    // Loop 1: signal file poll
    let poll_task = {
        let interval_secs = config.poll_interval_secs;
        tokio::spawn(async move {
            signal_poll_loop(store, line_tx, interval_secs).await;
        })
    };

    // Loop 2: live price feed driving the paper book
    let feed_task = {
        let book = book.clone();
        tokio::spawn(async move {
            price_feed_loop(feed, book, event_tx).await;
        })
    };

    // Loop 3: the controller, sole owner of position state
    let controller_task = tokio::spawn(async move {
        controller_loop(controller, line_rx, event_rx).await;
    });

    tracing::info!("✅ All loops spawned");
    tracing::info!("  📡 Signal poll: every {}s", config.poll_interval_secs);
    tracing::info!("  💹 Feed poll: every {}ms", FEED_POLL_MILLIS);
    tracing::info!("\nPress Ctrl+C to stop...\n");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
        }
        result = poll_task => {
            tracing::error!("Signal poll loop exited: {:?}", result);
        }
        result = feed_task => {
            tracing::error!("Feed loop exited: {:?}", result);
        }
        result = controller_task => {
            tracing::error!("Controller loop exited: {:?}", result);
        }
    }

    tracing::info!("👋 FVG Bot stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fvgbot=info".into()),
        )
        .init();
}

/// Poll the signal file and hand new lines to the controller
///
/// The file is truncated back to its header only after the line is safely
/// on the channel, so a crash between read and acknowledge re-delivers
/// rather than drops.
async fn signal_poll_loop(
    mut store: SignalStore,
    lines: UnboundedSender<String>,
    interval_secs: u64,
) {
    tracing::info!("📡 Signal poll loop starting ({})", store.path().display());

    let mut ticker = interval_at(Instant::now(), Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        match store.check_for_update() {
            Ok(Some(line)) => {
                tracing::info!("📡 [POLL] New signal line: {}", line);
                if lines.send(line).is_err() {
                    // Controller gone, nothing left to feed
                    return;
                }
                if let Err(e) = store.acknowledge() {
                    tracing::error!("Failed to acknowledge signal file: {:#}", e);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!("Signal file check failed: {:#}", e),
        }
    }
}

/// Tail the live price file and walk the paper book over each new print
async fn price_feed_loop(
    mut feed: LiveFeed,
    book: Arc<Mutex<PaperBook>>,
    events: UnboundedSender<VenueEvent>,
) {
    tracing::info!("💹 Feed loop starting ({})", feed.path().display());

    let mut ticker = interval_at(Instant::now(), Duration::from_millis(FEED_POLL_MILLIS));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        match feed.poll() {
            Ok(Some(price)) => {
                let fills = book.lock().unwrap().on_price(price);
                for event in fills {
                    if events.send(event).is_err() {
                        return;
                    }
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!("Feed poll failed: {:#}", e),
        }
    }
}

/// Drain both producers into the single state mutator
async fn controller_loop(
    mut controller: PositionController,
    mut lines: UnboundedReceiver<String>,
    mut events: UnboundedReceiver<VenueEvent>,
) {
    tracing::info!("🎛️  Controller loop starting");

    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Some(line) => controller.on_signal_line(&line),
                None => return,
            },
            event = events.recv() => match event {
                Some(event) => controller.on_venue_event(event),
                None => return,
            },
        }
    }
}
