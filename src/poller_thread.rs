//! A background poller thread that periodically reloads the manifest file and stores the
//! parsed document in a document store.
use std::{
    sync::{mpsc::RecvTimeoutError, Arc, Condvar, Mutex},
    time::{Duration, Instant},
};

use rand::{thread_rng, Rng};

use crate::document_store::DocumentStore;
use crate::manifest_loader::ManifestLoader;
use crate::{Error, Result};

/// Configuration for [`PollerThread`].
// Not implementing `Copy` as we may add non-copyable fields in the future.
#[derive(Debug, Clone)]
pub struct PollerThreadConfig {
    /// Interval to wait between checks of the manifest file.
    ///
    /// Defaults to [`PollerThreadConfig::DEFAULT_POLL_INTERVAL`].
    pub interval: Duration,
    /// Jitter applies a randomized duration to wait between checks. This helps to avoid
    /// multiple server instances synchronizing and producing spiky disk load.
    ///
    /// Defaults to [`PollerThreadConfig::DEFAULT_POLL_JITTER`].
    pub jitter: Duration,
}

impl PollerThreadConfig {
    /// Default value for [`PollerThreadConfig::interval`].
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
    /// Default value for [`PollerThreadConfig::jitter`].
    pub const DEFAULT_POLL_JITTER: Duration = Duration::from_secs(3);

    /// Create a new `PollerThreadConfig` using default configuration.
    pub fn new() -> PollerThreadConfig {
        PollerThreadConfig::default()
    }

    /// Update poll interval with `interval`.
    pub fn with_interval(mut self, interval: Duration) -> PollerThreadConfig {
        self.interval = interval;
        self
    }

    /// Update poll interval jitter with `jitter`.
    pub fn with_jitter(mut self, jitter: Duration) -> PollerThreadConfig {
        self.jitter = jitter;
        self
    }
}

impl Default for PollerThreadConfig {
    fn default() -> PollerThreadConfig {
        PollerThreadConfig {
            interval: PollerThreadConfig::DEFAULT_POLL_INTERVAL,
            jitter: PollerThreadConfig::DEFAULT_POLL_JITTER,
        }
    }
}

/// A manifest poller thread.
///
/// The poller thread re-reads the manifest file whenever it changes (using
/// [`ManifestLoader`]) and stores the parsed document in a [`DocumentStore`].
///
/// Load errors are retried on the next poll rather than aborting the thread: the manifest
/// path may simply not exist yet. The caller-supplied deadline passed to
/// [`wait_for_document_timeout`](PollerThread::wait_for_document_timeout) governs how long to
/// wait for the initial load.
pub struct PollerThread {
    join_handle: std::thread::JoinHandle<()>,

    /// Used to send a stop command to the poller thread.
    stop_sender: std::sync::mpsc::SyncSender<()>,

    /// Holds `None` until the first document has been loaded, `Some(Ok(()))` afterwards, and
    /// `Some(Err(...))` if the thread died before loading one.
    result: Arc<(Mutex<Option<Result<()>>>, Condvar)>,
}

impl PollerThread {
    /// Starts the manifest poller thread.
    ///
    /// # Errors
    ///
    /// Returns an IO Error if the poller thread failed to start.
    pub fn start(
        loader: ManifestLoader,
        store: Arc<DocumentStore>,
    ) -> std::io::Result<PollerThread> {
        PollerThread::start_with_config(loader, store, PollerThreadConfig::default())
    }

    /// Starts the manifest poller thread with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns an IO Error if the poller thread failed to start.
    pub fn start_with_config(
        mut loader: ManifestLoader,
        store: Arc<DocumentStore>,
        config: PollerThreadConfig,
    ) -> std::io::Result<PollerThread> {
        // Using `sync_channel` here as it makes `stop_sender` `Sync` (shareable between
        // threads). Buffer size of 1 should be enough for our use case as we're sending a stop
        // command, and we can simply `try_send()` and ignore if the buffer is full (another
        // thread has sent a stop command already).
        let (stop_sender, stop_receiver) = std::sync::mpsc::sync_channel::<()>(1);

        let result = Arc::new((Mutex::new(None), Condvar::new()));

        let join_handle = {
            // Cloning Arc for move into thread
            let result = Arc::clone(&result);
            let update_result = move |value| {
                *result.0.lock().unwrap() = Some(value);
                result.1.notify_all();
            };

            std::thread::Builder::new()
                .name("decider-manifest-poller".to_owned())
                .spawn(move || {
                    let panic_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        loop {
                            match loader.load_if_changed() {
                                Ok(Some(document)) => {
                                    store.set_document(Arc::new(document));
                                    update_result(Ok(()));
                                }
                                Ok(None) => {
                                    // Manifest unchanged.
                                }
                                Err(err) => {
                                    // Retried on the next poll; the file may not exist yet or
                                    // may have been caught mid-write.
                                    log::warn!(target: "decider",
                                        "error loading manifest: {err}");
                                }
                            }

                            let timeout = jitter(config.interval, config.jitter);
                            match stop_receiver.recv_timeout(timeout) {
                                Err(RecvTimeoutError::Timeout) => {
                                    // Timed out. Loop back to check the manifest again.
                                }
                                Ok(()) => {
                                    log::debug!(target: "decider", "poller thread received stop command");
                                    // Stop command received, break out of the loop to end the thread.
                                    return;
                                }
                                Err(RecvTimeoutError::Disconnected) => {
                                    // When the other end of channel disconnects, calls to
                                    // .recv_timeout() return immediately.
                                    // Stop the thread.
                                    log::debug!(target: "decider", "poller thread received disconnected");
                                    return;
                                }
                            }
                        }
                    }));

                    // If catch_unwind returns Err, it means a panic occurred.
                    if let Err(_panic_info) = panic_result {
                        // Handle the panic gracefully by updating the result with an error.
                        update_result(Err(Error::PollerThreadPanicked));
                    }
                })?
        };

        Ok(PollerThread {
            join_handle,
            stop_sender,
            result,
        })
    }

    /// Waits for the initial document to be loaded.
    ///
    /// This method blocks until the poller thread has loaded the first document. Prefer
    /// [`PollerThread::wait_for_document_timeout`] when the manifest path may never become
    /// ready.
    pub fn wait_for_document(&self) -> Result<()> {
        let mut lock = self
            .result
            .0
            .lock()
            .map_err(|_| Error::PollerThreadPanicked)?;
        loop {
            match &*lock {
                Some(result) => {
                    // The poller has already loaded a document. Return Ok(()) or a possible
                    // error.
                    return result.clone();
                }
                None => {
                    // Block waiting for a document to get loaded.
                    lock = self
                        .result
                        .1
                        .wait(lock)
                        .map_err(|_| Error::PollerThreadPanicked)?;
                }
            }
        }
    }

    /// Waits for the initial document to be loaded, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InitialLoadTimeout`] if no document was loaded within the deadline.
    pub fn wait_for_document_timeout(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut lock = self
            .result
            .0
            .lock()
            .map_err(|_| Error::PollerThreadPanicked)?;
        loop {
            match &*lock {
                Some(result) => return result.clone(),
                None => {
                    let Some(remaining) = deadline.checked_duration_since(Instant::now()).filter(|d| !d.is_zero()) else {
                        return Err(Error::InitialLoadTimeout);
                    };
                    let (guard, _timeout_result) = self
                        .result
                        .1
                        .wait_timeout(lock, remaining)
                        .map_err(|_| Error::PollerThreadPanicked)?;
                    lock = guard;
                }
            }
        }
    }

    /// Stop the poller thread.
    ///
    /// This function does not wait for the thread to actually stop.
    pub fn stop(&self) {
        // Error means that the receiver was dropped (thread exited) or the channel buffer is
        // full. First case can be ignored as there's nothing useful we can do: the thread is
        // already stopped. Second case can be ignored as it indicates that another thread
        // already sent a stop command and the thread will stop anyway.
        let _ = self.stop_sender.try_send(());
    }

    /// Stop the poller thread and block waiting for it to exit.
    ///
    /// If you don't need to wait for the thread to exit, use [`PollerThread::stop`] instead.
    pub fn shutdown(self) -> Result<()> {
        // Send stop signal in case it wasn't sent before.
        self.stop();

        // Error means that the thread has panicked and there's nothing useful we can do in
        // that case.
        self.join_handle
            .join()
            .map_err(|_| Error::PollerThreadPanicked)?;

        Ok(())
    }
}

/// Apply randomized `jitter` to `interval`.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        interval
    } else {
        Duration::saturating_sub(interval, thread_rng().gen_range(Duration::ZERO..=jitter))
    }
}
