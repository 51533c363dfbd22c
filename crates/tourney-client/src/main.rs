// Tournament client entry point.
//
// Startup sequence:
// 1. Load config (copying defaults on first run)
// 2. Initialize tracing (log to file; stdout carries status updates)
// 3. Create mpsc channels
// 4. Spawn the feed reader on stdin
// 5. Spawn the app event loop
// 6. Print status updates as JSON lines until the feed ends or Ctrl+C
// 7. Cleanup on exit

use tourney_client::app::{self, AppState, StatusUpdate, UserCommand};
use tourney_client::config::{self, LoggingConfig};
use tourney_client::feed;

use anyhow::Context;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let (config, seeded) = config::load_config().context("failed to load configuration")?;

    // 2. Initialize tracing
    init_tracing(&config.logging)?;
    info!("Tournament client starting up");
    for path in &seeded {
        info!("Copied default config to {}", path.display());
    }
    let login = config.login_identity();
    info!(
        "Config loaded: login={}, feed channel capacity {}",
        login.full_id(),
        config.feed.channel_capacity
    );

    // 3. Create mpsc channels
    let (feed_tx, feed_rx) = mpsc::channel(config.feed.channel_capacity);
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let (status_tx, mut status_rx) = mpsc::channel(64);

    // 4. Spawn the feed reader
    let feed_handle = tokio::spawn(async move {
        let stdin = BufReader::new(tokio::io::stdin());
        if let Err(e) = feed::run(stdin, feed_tx, "stdin").await {
            error!("Feed error: {}", e);
        }
    });

    // 5. Spawn app logic task
    let app_handle = tokio::spawn(app::run(feed_rx, cmd_rx, status_tx, AppState::new(login)));

    // 6. Print status updates until the app loop drops its sender
    loop {
        tokio::select! {
            update = status_rx.recv() => {
                match update {
                    Some(update) => print_update(&update)?,
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received");
                let _ = cmd_tx.send(UserCommand::Quit).await;
            }
        }
    }

    // 7. Cleanup: the feed reader may be blocked on stdin
    feed_handle.abort();
    let result = app_handle.await.context("app task panicked")?;
    match &result {
        Ok(()) => info!("Tournament client shut down cleanly"),
        Err(e) => error!("Application loop error: {e:#}"),
    }
    result
}

fn print_update(update: &StatusUpdate) -> anyhow::Result<()> {
    let line = serde_json::to_string(update).context("failed to encode status update")?;
    println!("{line}");
    Ok(())
}

/// Initialize tracing to log to a file (stdout is reserved for status
/// updates).
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join(&logging.dir);
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("tourney-client.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter)),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
