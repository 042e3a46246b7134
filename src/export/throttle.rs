//! Rate limiting for progress updates.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::Instant;

use super::service::CsvPhase;

/// Interval between two progress notifications
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Coalesces progress updates to at most one per interval
///
/// The first update is emitted immediately. Updates arriving before the
/// interval has elapsed replace a single pending value, which is emitted when
/// the interval ends. The trailing emit needs a tokio runtime; without one the
/// pending value waits for the next update or [`ProgressThrottle::flush`].
/// [`ProgressThrottle::discard`] drops it when the operation fails.
pub struct ProgressThrottle<F>
where
    F: Fn(u64, Option<CsvPhase>) + Send + Sync + 'static,
{
    inner: Arc<Inner<F>>,
}

struct Inner<F> {
    emit: F,
    interval: Duration,
    state: Mutex<ThrottleState>,
}

#[derive(Default)]
struct ThrottleState {
    last_emit: Option<Instant>,
    pending: Option<(u64, Option<CsvPhase>)>,
    timer_armed: bool,
}

impl<F> ProgressThrottle<F>
where
    F: Fn(u64, Option<CsvPhase>) + Send + Sync + 'static,
{
    pub fn new(interval: Duration, emit: F) -> Self {
        Self {
            inner: Arc::new(Inner {
                emit,
                interval,
                state: Mutex::new(ThrottleState::default()),
            }),
        }
    }

    /// Record a progress update, emitting it if the interval allows
    pub fn call(&self, docs_written: u64, phase: Option<CsvPhase>) {
        let mut timer = None;
        let due = {
            let mut state = self.inner.lock();
            let now = Instant::now();
            match state.last_emit {
                Some(last) if now.duration_since(last) < self.inner.interval => {
                    state.pending = Some((docs_written, phase));
                    if !state.timer_armed {
                        if let Ok(runtime) = Handle::try_current() {
                            state.timer_armed = true;
                            timer = Some((runtime, last + self.inner.interval));
                        }
                    }
                    false
                }
                _ => {
                    state.last_emit = Some(now);
                    state.pending = None;
                    true
                }
            }
        };

        if due {
            (self.inner.emit)(docs_written, phase);
        }

        if let Some((runtime, deadline)) = timer {
            let inner = Arc::clone(&self.inner);
            runtime.spawn(async move {
                tokio::time::sleep_until(deadline).await;
                inner.emit_trailing();
            });
        }
    }

    /// Emit the pending update, if any
    pub fn flush(&self) {
        let pending = {
            let mut state = self.inner.lock();
            let pending = state.pending.take();
            if pending.is_some() {
                state.last_emit = Some(Instant::now());
            }
            pending
        };

        if let Some((docs_written, phase)) = pending {
            (self.inner.emit)(docs_written, phase);
        }
    }

    /// Drop the pending update without emitting it
    pub fn discard(&self) {
        self.inner.lock().pending = None;
    }
}

impl<F> Inner<F>
where
    F: Fn(u64, Option<CsvPhase>) + Send + Sync,
{
    fn emit_trailing(&self) {
        let pending = {
            let mut state = self.lock();
            state.timer_armed = false;
            let pending = state.pending.take();
            if pending.is_some() {
                state.last_emit = Some(Instant::now());
            }
            pending
        };

        if let Some((docs_written, phase)) = pending {
            (self.emit)(docs_written, phase);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ThrottleState> {
        // The state is plain data; a panic in `emit` happens outside the lock.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
