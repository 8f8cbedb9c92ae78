//! Entry point: connect, claim the root, run the event loop.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use slate::config::Config;
use slate::events::EventStream;
use slate::wm::Wm;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("slate {} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    let (conn, screen_num) =
        x11rb::connect(None).context("Failed to connect to the X server")?;
    let conn = Arc::new(conn);

    let mut wm = Wm::new(conn.clone(), screen_num, config)?;
    wm.startup(Instant::now())?;

    let stream = EventStream::new(conn)?;
    info!("Entering event loop");

    loop {
        stream.flush()?;

        let now = Instant::now();
        while let Some(event) = stream.poll_event()? {
            wm.handle_event(&event, now);
        }
        wm.tick_effects(now);
        wm.sync_and_present();

        // Sleep until the socket is readable, or until the next effect
        // frame is due.
        match wm.next_effect_deadline() {
            Some(deadline) => {
                tokio::select! {
                    _ = stream.readable() => {}
                    _ = tokio::time::sleep_until(deadline.into()) => {}
                }
            }
            None => stream.readable().await,
        }
    }
}
