//! Shared gateway state: the duck, the conversation history and the context
//! store.

use dashmap::DashMap;
use devduck_hardware::{AnimationScheduler, EventReactor};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct AppState {
    pub scheduler: Arc<AnimationScheduler>,
    pub reactor: EventReactor,
    pub history: RwLock<Vec<Value>>,
    pub contexts: DashMap<String, Value>,
    listening: AtomicBool,
}

impl AppState {
    pub fn new(scheduler: Arc<AnimationScheduler>) -> Self {
        Self {
            reactor: EventReactor::new(Arc::clone(&scheduler)),
            scheduler,
            history: RwLock::new(Vec::new()),
            contexts: DashMap::new(),
            listening: AtomicBool::new(false),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Flip the listening flag and return the new value.
    pub fn toggle_listening(&self) -> bool {
        !self.listening.fetch_xor(true, Ordering::SeqCst)
    }

    /// Append a history entry, stamping it with the current time.
    pub async fn record(&self, mut entry: Value) {
        if let Some(fields) = entry.as_object_mut() {
            fields.insert("time".to_string(), json!(now_rfc3339()));
        }
        self.history.write().await.push(entry);
    }

    pub async fn history_len(&self) -> usize {
        self.history.read().await.len()
    }
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// A gateway over the simulated duck with test-speed timings.
#[cfg(test)]
pub(crate) fn test_state() -> (Arc<AppState>, Arc<devduck_hardware::SimulatedPorts>) {
    use devduck_hardware::{DuckConfig, Routine, RoutineBook, SimulatedPorts};
    use std::time::Duration;

    let mut config = DuckConfig::default();
    config.hardware.settle_delay_ms = 0;
    config.hardware.reconnect_cooldown_ms = 0;
    config.hardware.fallback_port = None;
    config.animation.jitter_delay_ms = 1;
    config.animation.step_wait_ms = 5;

    let quick = Duration::from_millis(1);
    let routines = RoutineBook {
        greeting: Routine::evenly_spaced("greeting", &Routine::greeting().commands(), quick),
        good_luck: Routine::evenly_spaced("good_luck", &Routine::good_luck().commands(), quick),
        acknowledgement: Routine::acknowledgement(),
    };

    let sim = Arc::new(SimulatedPorts::with_duck());
    let scheduler = AnimationScheduler::with_backend(&config, sim.clone(), routines).unwrap();
    (Arc::new(AppState::new(Arc::new(scheduler))), sim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_toggle_and_record() {
        let (state, _sim) = test_state();
        assert!(!state.is_listening());
        assert!(state.toggle_listening());
        assert!(state.is_listening());
        assert!(!state.toggle_listening());

        state.record(json!({"type": "system", "event": "listening"})).await;
        assert_eq!(state.history_len().await, 1);
        let history = state.history.read().await;
        assert!(history[0]["time"].as_str().unwrap().contains('T'));
    }
}
