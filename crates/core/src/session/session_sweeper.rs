use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{select, Sender};

use crate::session::session_store::SessionStore;

/// Background thread that periodically removes abandoned sessions.
///
/// Sweeps once immediately on spawn, then every `interval`. Stops when
/// `stop` is called or the sweeper is dropped.
pub struct SessionSweeper {
    stop_tx: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SessionSweeper {
    pub fn spawn(store: Arc<SessionStore>, interval: Duration, max_age: Duration) -> Self {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("session-sweeper".into())
            .spawn(move || {
                store.sweep(max_age);
                let ticker = crossbeam_channel::tick(interval);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            store.sweep(max_age);
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
            });

        let handle = match handle {
            Ok(h) => Some(h),
            Err(e) => {
                log::error!("Failed to start session sweeper: {e}");
                None
            }
        };

        Self {
            stop_tx: Some(stop_tx),
            handle,
        }
    }

    pub fn stop(&mut self) {
        // Dropping the sender disconnects the stop channel, which also wakes the loop
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Session sweeper thread panicked");
            }
        }
    }
}

impl Drop for SessionSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
