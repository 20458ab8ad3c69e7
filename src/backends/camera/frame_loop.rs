// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for capture loops
//!
//! Video capture, audio capture and the viewer's audio pump all run as a
//! loop on a dedicated thread with a cooperative stop flag. This module owns
//! that lifecycle so every producer starts, stops and joins the same way.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Action returned by the capture loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// The loop thread could not be spawned or died during setup
#[derive(Debug, Clone)]
pub struct LoopSpawnError(pub String);

impl std::fmt::Display for LoopSpawnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owner of one producer thread
///
/// ```ignore
/// let controller = CaptureLoopController::start_with_init(
///     "video-capture",
///     move || V4l2Session::open(&device, width, height, fps, encoding, 4),
///     move |session| worker_step(session),
/// )?;
/// controller.stop();
/// ```
///
/// Dropping the controller stops and joins the thread.
pub struct CaptureLoopController {
    thread: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    name: String,
}

impl CaptureLoopController {
    /// Run `step` on a new thread until it returns [`LoopAction::Stop`] or
    /// [`stop`](Self::stop) is called
    pub fn start<F>(name: &str, mut step: F) -> Result<Self, LoopSpawnError>
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        Self::start_with_init(name, || Ok::<_, LoopSpawnError>(()), move |_| step())
    }

    /// Build the loop state on the new thread, then run `step` over it
    ///
    /// Blocks until `init` has finished. When it fails its error is
    /// returned and the thread has already been joined. The state never
    /// leaves the loop thread and is dropped there.
    pub fn start_with_init<S, E, I, F>(name: &str, init: I, mut step: F) -> Result<Self, E>
    where
        E: From<LoopSpawnError> + Send + 'static,
        I: FnOnce() -> Result<S, E> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), E>>();

        let thread = {
            let stop = Arc::clone(&stop);
            let name = name.to_string();
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    let mut state = match init() {
                        Ok(state) => state,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));
                    drop(ready_tx);

                    debug!(name = %name, "Loop running");
                    while !stop.load(Ordering::Acquire) {
                        if step(&mut state) == LoopAction::Stop {
                            debug!(name = %name, "Loop ended itself");
                            break;
                        }
                    }
                    drop(state);
                    debug!(name = %name, "Loop thread exiting");
                })
                .map_err(|e| E::from(LoopSpawnError(e.to_string())))?
        };

        // A closed channel without a message means init panicked
        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(E::from(LoopSpawnError(format!(
                "{} thread exited during initialization",
                name
            ))))
        });

        if let Err(e) = ready {
            if thread.join().is_err() {
                warn!(name = %name, "Loop thread panicked during initialization");
            }
            return Err(e);
        }

        info!(name = %name, "Loop started");
        Ok(Self {
            thread: Some(thread),
            stop,
            name: name.to_string(),
        })
    }

    /// True until the loop thread has returned
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Ask the loop to end after its current step; does not wait
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Ask the loop to end and wait for it; idempotent
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the loop to end on its own
    pub fn join(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        match thread.join() {
            Ok(()) => debug!(name = %self.name, "Loop thread joined"),
            Err(panic) => warn!(name = %self.name, ?panic, "Loop thread panicked"),
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        self.stop();
    }
}
