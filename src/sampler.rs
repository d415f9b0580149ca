//! Peak memory sampling.
//!
//! A `MemorySampler` polls the resident memory of the server process on a
//! fixed interval while a trial runs and keeps the largest reading. The
//! sampler moves through `Idle -> Sampling -> Stopped`; the transitions consume
//! the value so a sampler cannot be started twice or restarted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::process::{ProcessHandle, ProcessIdentity};

/// Default polling cadence.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(50);

/// A sampler that has not been started yet.
#[derive(Debug, Clone, Copy)]
pub struct MemorySampler {
    interval: Duration,
}

/// A running sampler. Call `stop` to retrieve the peak.
pub struct RunningSampler {
    peak: Arc<AtomicU64>,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<u64>,
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_INTERVAL)
    }
}

impl MemorySampler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Starts polling `identity` in a background task.
    pub fn start(self, handle: Arc<ProcessHandle>, identity: ProcessIdentity) -> RunningSampler {
        let peak = Arc::new(AtomicU64::new(0));
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let task_peak = peak.clone();
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut samples = 0u64;

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        match handle.read_memory(identity) {
                            Ok(mb) => {
                                task_peak.fetch_max(mb, Ordering::Relaxed);
                                samples += 1;
                            }
                            Err(e) if e.is_process_gone() => {
                                debug!("pid {} exited during sampling, keeping current peak", identity.pid);
                                break;
                            }
                            Err(e) => debug!("Memory sample for pid {} failed: {}", identity.pid, e),
                        }
                    }
                }
            }

            debug!("Memory sampler for pid {} took {} samples", identity.pid, samples);
            samples
        });

        RunningSampler {
            peak,
            stop_tx,
            task,
        }
    }
}

impl RunningSampler {
    /// Stops polling and returns the peak in MB, or 0 if no sample succeeded.
    pub async fn stop(self) -> u64 {
        // The task may already have finished after the process went away.
        let _ = self.stop_tx.send(());
        if let Err(e) = self.task.await {
            warn!("Memory sampler task failed: {}", e);
        }
        self.peak.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::FakeBackend;
    use crate::process::ServerLookup;

    fn handle_with(backend: Arc<FakeBackend>) -> (Arc<ProcessHandle>, ProcessIdentity) {
        let handle = Arc::new(ProcessHandle::new(backend, ServerLookup::Pid(9)));
        let id = handle.resolve_identity().unwrap();
        (handle, id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_returns_peak_not_last() {
        let backend = Arc::new(FakeBackend::with_pid(9));
        backend.push_memory(&[100, 150, 120, 90]);
        let (handle, id) = handle_with(backend.clone());

        let sampling = MemorySampler::new(Duration::from_millis(10)).start(handle, id);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(sampling.stop().await, 150);
        assert!(backend.memory_mb.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_samples_yields_zero() {
        let backend = Arc::new(FakeBackend::with_pid(9));
        let (handle, id) = handle_with(backend);

        let sampling = MemorySampler::new(Duration::from_millis(10)).start(handle, id);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(sampling.stop().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_process_exit() {
        let backend = Arc::new(FakeBackend::with_pid(9));
        backend.push_memory(&[300; 1000]);
        let (handle, id) = handle_with(backend.clone());

        let sampling = MemorySampler::new(Duration::from_millis(10)).start(handle, id);
        tokio::time::sleep(Duration::from_millis(45)).await;

        assert_eq!(sampling.stop().await, 300);
        // Polling stopped well before the queue ran dry.
        assert!(backend.memory_mb.lock().unwrap().len() > 900);
    }
}
