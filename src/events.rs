//! Async X11 event delivery.
//!
//! The X connection's socket is watched by a small mio thread that pings a
//! [`Notify`] whenever the fd becomes readable; the main loop awaits the
//! notification and then drains the connection's event buffer without
//! blocking.

use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{oneshot, Notify};
use tracing::{info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

const X11_TOKEN: mio::Token = mio::Token(0);
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Wakes the event loop when the X socket has data.
pub struct EventStream {
    conn: Arc<RustConnection>,
    readable: Arc<Notify>,
    // Dropping the stream closes this half, which stops the poll thread.
    _shutdown: oneshot::Receiver<()>,
}

impl EventStream {
    pub fn new(conn: Arc<RustConnection>) -> Result<Self> {
        let fd = conn.stream().as_raw_fd();
        let readable = Arc::new(Notify::new());
        let notifier = readable.clone();
        let (alive, shutdown) = oneshot::channel::<()>();

        let mut poll = mio::Poll::new().context("Failed to create poll instance")?;
        poll.registry()
            .register(&mut mio::unix::SourceFd(&fd), X11_TOKEN, mio::Interest::READABLE)
            .context("Failed to watch the X11 socket")?;

        tokio::task::spawn_blocking(move || {
            let mut events = mio::Events::with_capacity(1);
            loop {
                if alive.is_closed() {
                    info!("X11 socket watcher shutting down");
                    return;
                }
                if let Err(e) = poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                    warn!("X11 socket poll failed: {}", e);
                    continue;
                }
                if events.iter().any(|e| e.token() == X11_TOKEN) {
                    notifier.notify_one();
                }
            }
        });

        Ok(Self { conn, readable, _shutdown: shutdown })
    }

    /// Next buffered event, without blocking.
    pub fn poll_event(&self) -> Result<Option<Event>> {
        Ok(self.conn.poll_for_event()?)
    }

    /// Wait until the socket watcher reports readable data.
    pub async fn readable(&self) {
        self.readable.notified().await;
    }

    /// Push any batched requests to the server.
    pub fn flush(&self) -> Result<()> {
        self.conn.flush()?;
        Ok(())
    }
}
