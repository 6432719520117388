//! The background sweeper that removes timed out flow entries.

use pipeline::events::DatapathRegistry;
use pipeline::Pipeline;

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Something whose expired flows can be collected
pub trait Sweep: Send + Sync {
    /// Removes everything expired at `now` and returns how many entries went.
    fn sweep(&self, now: Instant) -> usize;
}

impl Sweep for Pipeline {
    fn sweep(&self, now: Instant) -> usize {
        self.expire(now)
    }
}

impl Sweep for DatapathRegistry {
    fn sweep(&self, now: Instant) -> usize {
        self.pipelines().iter().map(|p| p.expire(now)).sum()
    }
}

/// Runs a sweep every `period` on its own thread until shut down or dropped.
pub struct TimeoutManager {
    period: Duration,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TimeoutManager {
    pub fn spawn<S: Sweep + 'static>(target: Arc<S>, period: Duration) -> io::Result<TimeoutManager> {
        let (stop, stopped) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("flow-timeouts".to_owned())
            .spawn(move || {
                debug!("Sweeping flow tables every {:?}", period);
                loop {
                    match stopped.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {
                            let expired = target.sweep(Instant::now());
                            if expired > 0 {
                                debug!("Sweep removed {} flow(s)", expired);
                            }
                        }
                        // a stop message or a dropped sender
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Timeout sweeper stopped");
            })?;
        Ok(TimeoutManager {
            period,
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stops the thread between two sweeps and waits for it.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            // the thread may be gone already
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Timeout sweeper panicked");
            }
        }
    }
}

impl Drop for TimeoutManager {
    fn drop(&mut self) {
        self.stop();
    }
}
