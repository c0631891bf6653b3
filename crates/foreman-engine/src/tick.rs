use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

/// Opaque handle returned by `on_tick`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickHandlerId(u64);

type TickHandler = Arc<dyn Fn(u64) -> anyhow::Result<()> + Send + Sync>;

struct TickState {
    current: u64,
    handlers: Vec<(u64, TickHandler)>,
    next_handler: u64,
    stopped: bool,
}

/// Monotonic logical clock. All timeout semantics in the control plane are
/// tick-based, never wall-clock.
///
/// Handlers run synchronously in registration order, outside the state
/// lock. A handler must not call `advance` itself.
pub struct TickService {
    state: Mutex<TickState>,
    interval_task: Mutex<Option<JoinHandle<()>>>,
}

impl TickService {
    /// Manual mode: only `advance` moves the clock
    pub fn manual() -> Self {
        Self {
            state: Mutex::new(TickState {
                current: 0,
                handlers: Vec::new(),
                next_handler: 0,
                stopped: false,
            }),
            interval_task: Mutex::new(None),
        }
    }

    /// Interval mode: a background task advances one tick per period.
    /// Requires a tokio runtime.
    pub fn start_interval(self: &Arc<Self>, period: Duration) {
        let service = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if service.state.lock().unwrap().stopped {
                    break;
                }
                service.advance(1);
            }
        });
        *self.interval_task.lock().unwrap() = Some(task);
    }

    pub fn current_tick(&self) -> u64 {
        self.state.lock().unwrap().current
    }

    /// Advance the clock, invoking every handler once per step. Handler
    /// failures are logged and suppressed; they never rewind the tick or
    /// starve later handlers.
    pub fn advance(&self, steps: u64) {
        for _ in 0..steps {
            let (tick, handlers) = {
                let mut state = self.state.lock().unwrap();
                if state.stopped {
                    return;
                }
                state.current += 1;
                let handlers: Vec<TickHandler> = state
                    .handlers
                    .iter()
                    .map(|(_, h)| Arc::clone(h))
                    .collect();
                (state.current, handlers)
            };

            for handler in handlers {
                if let Err(err) = handler(tick) {
                    warn!(tick, error = %err, "tick handler failed; continuing");
                }
            }
        }
    }

    pub fn on_tick<F>(&self, handler: F) -> TickHandlerId
    where
        F: Fn(u64) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut state = self.state.lock().unwrap();
        let id = state.next_handler;
        state.next_handler += 1;
        state.handlers.push((id, Arc::new(handler)));
        TickHandlerId(id)
    }

    pub fn remove_on_tick(&self, id: TickHandlerId) {
        let mut state = self.state.lock().unwrap();
        state.handlers.retain(|(handler_id, _)| *handler_id != id.0);
    }

    /// Cancel the interval task and silence all further handler runs
    pub fn stop(&self) {
        self.state.lock().unwrap().stopped = true;
        if let Some(task) = self.interval_task.lock().unwrap().take() {
            task.abort();
        }
    }
}
