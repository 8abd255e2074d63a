use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info};

use super::MeshNode;

/// Drives the tick loop for one node on a dedicated thread.
///
/// The loop never blocks on network I/O; all peer traffic happens elsewhere.
/// Shutdown is signalled over a channel, so the loop is bound to the
/// scheduler's lifetime rather than running unconditionally.
pub struct Scheduler {
    shutdown: mpsc::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Scheduler {
    /// Starts ticking `node` every `interval`.
    pub fn start(node: Arc<MeshNode>, interval: Duration) -> Self {
        let (shutdown, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            info!(
                "Scheduler started for node '{}' at {:?} intervals",
                node.name(),
                interval
            );
            loop {
                match rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => match node.tick() {
                        Ok(summary) => {
                            if !summary.failed.is_empty() {
                                error!(
                                    "Tick {} completed with failed entities: {:?}",
                                    summary.tick, summary.failed
                                );
                            }
                        }
                        Err(e) => error!("Tick failed: {}", e),
                    },
                    // Shutdown signal or sender dropped.
                    _ => break,
                }
            }
            info!("Scheduler stopped");
        });

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Stops the loop and waits for the thread to exit.
    pub fn stop(mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}
