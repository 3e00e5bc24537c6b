//! Debounced saving: many schedules inside the quiet period collapse into one
//! save of the latest payload.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEFAULT_DELAY: Duration = Duration::from_millis(2000);

/// Where coalesced payloads end up.
#[async_trait]
pub trait SaveTarget: Send + Sync + 'static {
    type Payload: Send + 'static;

    async fn save(&self, payload: Self::Payload);
}

struct Slot<P> {
    generation: u64,
    pending: Option<P>,
    timer: Option<CancellationToken>,
}

struct Inner<T: SaveTarget> {
    target: T,
    delay: Duration,
    slot: Mutex<Slot<T::Payload>>,
    save_lock: tokio::sync::Mutex<()>,
}

impl<T: SaveTarget> Inner<T> {
    async fn fire(&self, generation: u64) {
        let _guard = self.save_lock.lock().await;
        let payload = {
            let mut slot = self.slot.lock();
            if slot.generation != generation {
                return;
            }
            slot.timer = None;
            slot.pending.take()
        };
        if let Some(payload) = payload {
            debug!(generation, "auto-save firing");
            self.target.save(payload).await;
        }
    }
}

pub struct AutoSaver<T: SaveTarget> {
    inner: Arc<Inner<T>>,
}

impl<T: SaveTarget> Clone for AutoSaver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: SaveTarget> AutoSaver<T> {
    pub fn new(target: T, delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                target,
                delay,
                slot: Mutex::new(Slot {
                    generation: 0,
                    pending: None,
                    timer: None,
                }),
                save_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn target(&self) -> &T {
        &self.inner.target
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Replace the pending payload and restart the quiet period.
    /// Must be called from within a Tokio runtime.
    pub fn schedule(&self, payload: T::Payload) {
        let (generation, token) = {
            let mut slot = self.inner.slot.lock();
            slot.generation += 1;
            slot.pending = Some(payload);
            if let Some(previous) = slot.timer.take() {
                previous.cancel();
            }
            let token = CancellationToken::new();
            slot.timer = Some(token.clone());
            (slot.generation, token)
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(inner.delay) => inner.fire(generation).await,
            }
        });
    }

    /// Save the pending payload now. Returns false when nothing was pending.
    pub async fn flush(&self) -> bool {
        let _guard = self.inner.save_lock.lock().await;
        let payload = {
            let mut slot = self.inner.slot.lock();
            if let Some(timer) = slot.timer.take() {
                timer.cancel();
            }
            slot.pending.take()
        };
        match payload {
            Some(payload) => {
                self.inner.target.save(payload).await;
                true
            }
            None => false,
        }
    }

    /// Drop the pending payload without saving it.
    pub fn cancel(&self) -> bool {
        let mut slot = self.inner.slot.lock();
        if let Some(timer) = slot.timer.take() {
            timer.cancel();
        }
        slot.pending.take().is_some()
    }

    /// Drop the pending payload and wait for a save already in progress to
    /// finish. Once this returns no save can still be running.
    pub async fn cancel_and_wait(&self) -> bool {
        let dropped = self.cancel();
        let _guard = self.inner.save_lock.lock().await;
        dropped
    }

    pub fn is_pending(&self) -> bool {
        self.inner.slot.lock().pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        saved: Mutex<Vec<u32>>,
        in_flight: AtomicUsize,
        overlapped: AtomicUsize,
    }

    #[async_trait]
    impl SaveTarget for Arc<Recorder> {
        type Payload = u32;

        async fn save(&self, payload: u32) {
            if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.fetch_add(1, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
            self.saved.lock().push(payload);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn saver() -> (AutoSaver<Arc<Recorder>>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (AutoSaver::new(recorder.clone(), DEFAULT_DELAY), recorder)
    }

    async fn wait(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test]
    async fn schedules_inside_quiet_period_coalesce() {
        tokio::time::pause();
        let (saver, recorder) = saver();

        saver.schedule(1);
        wait(500).await;
        saver.schedule(2);
        wait(1500).await;
        saver.schedule(3);
        assert!(recorder.saved.lock().is_empty());

        wait(2500).await;
        assert_eq!(*recorder.saved.lock(), vec![3]);
        assert!(!saver.is_pending());
    }

    #[tokio::test]
    async fn spaced_schedules_each_save() {
        tokio::time::pause();
        let (saver, recorder) = saver();

        saver.schedule(1);
        wait(2500).await;
        saver.schedule(2);
        wait(2500).await;
        assert_eq!(*recorder.saved.lock(), vec![1, 2]);
    }

    #[tokio::test]
    async fn saves_never_overlap() {
        tokio::time::pause();
        let recorder = Arc::new(Recorder::default());
        let saver = AutoSaver::new(recorder.clone(), Duration::from_millis(100));

        saver.schedule(1);
        wait(150).await;
        // The first save is still sleeping inside the target.
        saver.schedule(2);
        wait(1000).await;

        assert_eq!(*recorder.saved.lock(), vec![1, 2]);
        assert_eq!(recorder.overlapped.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn flush_saves_immediately_once() {
        tokio::time::pause();
        let (saver, recorder) = saver();

        saver.schedule(7);
        assert!(saver.flush().await);
        assert_eq!(*recorder.saved.lock(), vec![7]);

        wait(3000).await;
        assert_eq!(*recorder.saved.lock(), vec![7]);
        assert!(!saver.flush().await);
    }

    #[tokio::test]
    async fn cancel_drops_pending_payload() {
        tokio::time::pause();
        let (saver, recorder) = saver();

        saver.schedule(9);
        assert!(saver.cancel());
        wait(3000).await;
        assert!(recorder.saved.lock().is_empty());
        assert!(!saver.cancel());
    }

    #[tokio::test]
    async fn cancel_and_wait_outlasts_running_save() {
        tokio::time::pause();
        let recorder = Arc::new(Recorder::default());
        let saver = AutoSaver::new(recorder.clone(), Duration::from_millis(100));

        saver.schedule(1);
        wait(150).await;
        assert_eq!(recorder.in_flight.load(Ordering::SeqCst), 1);
        saver.schedule(2);

        assert!(saver.cancel_and_wait().await);
        assert_eq!(recorder.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(*recorder.saved.lock(), vec![1]);

        wait(1000).await;
        assert_eq!(*recorder.saved.lock(), vec![1]);
    }
}
