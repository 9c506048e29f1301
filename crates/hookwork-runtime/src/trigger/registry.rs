use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::{debug, warn};

use super::event::{OperationType, TriggerEvent, TriggerOutput, TriggerSystem, TriggerTiming};

/// Default number of events kept in the rolling history
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Receives every valid trigger published on the registry
pub trait TriggerListener: Send + Sync {
    /// Listener name for logging
    fn name(&self) -> &str;

    /// Handle a trigger. Errors are logged and never reach other listeners.
    fn on_trigger(&self, event: &TriggerEvent) -> Result<()>;
}

/// Handle returned by `subscribe`, used to unsubscribe later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct FnListener<F> {
    name: String,
    f: F,
}

impl<F> TriggerListener for FnListener<F>
where
    F: Fn(&TriggerEvent) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_trigger(&self, event: &TriggerEvent) -> Result<()> {
        (self.f)(event)
    }
}

/// Publishes trigger events to listeners in registration order
pub struct TriggerRegistry {
    listeners: Mutex<Vec<(SubscriptionId, Arc<dyn TriggerListener>)>>,
    history: Mutex<VecDeque<TriggerEvent>>,
    history_capacity: usize,
    next_id: AtomicU64,
    disposed: AtomicBool,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(history_capacity: usize) -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            next_id: AtomicU64::new(1),
            disposed: AtomicBool::new(false),
        }
    }

    /// Register a listener; it receives events fired after this call
    pub fn subscribe(&self, listener: Arc<dyn TriggerListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if self.is_disposed() {
            warn!(listener = listener.name(), "Subscribe on disposed trigger registry ignored");
            return id;
        }
        lock(&self.listeners).push((id, listener));
        id
    }

    /// Register a closure as a listener
    pub fn subscribe_fn<F>(&self, name: &str, f: F) -> SubscriptionId
    where
        F: Fn(&TriggerEvent) -> Result<()> + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnListener {
            name: name.to_string(),
            f,
        }))
    }

    /// Remove a listener; returns false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(sub, _)| *sub != id);
        listeners.len() != before
    }

    /// Convenience publisher: parses system/operation names and stamps the event now.
    /// Returns true if the event was accepted and broadcast.
    pub fn fire_trigger(
        &self,
        system: &str,
        operation: &str,
        timing: Option<TriggerTiming>,
        output: Option<TriggerOutput>,
    ) -> bool {
        let system = match system.parse::<TriggerSystem>() {
            Ok(s) => s,
            Err(e) => {
                warn!(system, operation, error = %e, "Dropping invalid trigger");
                return false;
            }
        };
        let operation = match operation.parse::<OperationType>() {
            Ok(op) => op,
            Err(e) => {
                warn!(%system, operation, error = %e, "Dropping invalid trigger");
                return false;
            }
        };

        let mut event = TriggerEvent::new(system, operation);
        event.timing = timing;
        if let Some(output) = output {
            event = event.with_output(output);
        }
        self.fire_trigger_with_context(event)
    }

    /// Publish a fully formed event. Invalid events are logged and dropped.
    pub fn fire_trigger_with_context(&self, event: TriggerEvent) -> bool {
        if self.is_disposed() {
            warn!(system = %event.system, operation = %event.operation, "Trigger fired after dispose; ignored");
            return false;
        }

        if let Err(e) = event.validate() {
            warn!(system = %event.system, operation = %event.operation, error = %e, "Dropping invalid trigger");
            return false;
        }

        {
            let mut history = lock(&self.history);
            history.push_back(event.clone());
            while history.len() > self.history_capacity {
                history.pop_front();
            }
        }

        // Snapshot so listeners may (un)subscribe while being notified
        let listeners: Vec<Arc<dyn TriggerListener>> = lock(&self.listeners)
            .iter()
            .map(|(_, l)| l.clone())
            .collect();

        debug!(
            system = %event.system,
            operation = %event.operation,
            listeners = listeners.len(),
            "Broadcasting trigger"
        );

        for listener in listeners {
            if self.is_disposed() {
                break;
            }
            match catch_unwind(AssertUnwindSafe(|| listener.on_trigger(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(listener = listener.name(), error = %e, "Trigger listener failed");
                }
                Err(_) => {
                    warn!(listener = listener.name(), "Trigger listener panicked");
                }
            }
        }

        true
    }

    /// Events fired so far, oldest first
    pub fn history(&self) -> Vec<TriggerEvent> {
        lock(&self.history).iter().cloned().collect()
    }

    pub fn last_trigger(&self) -> Option<TriggerEvent> {
        lock(&self.history).back().cloned()
    }

    pub fn clear_history(&self) {
        lock(&self.history).clear();
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Stop delivering events and drop all listeners
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        lock(&self.listeners).clear();
        lock(&self.history).clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Default for TriggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// A panicking listener never holds these locks, so poisoning is recoverable
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::AtomicUsize;

    fn counting(registry: &TriggerRegistry, name: &str) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        registry.subscribe_fn(name, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        count
    }

    #[test]
    fn test_fire_trigger_reaches_listener() {
        let registry = TriggerRegistry::new();
        let count = counting(&registry, "counter");

        assert!(registry.fire_trigger("speckit", "specify", None, None));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let last = registry.last_trigger().unwrap();
        assert_eq!(last.system, TriggerSystem::Speckit);
        assert_eq!(last.operation, OperationType::Specify);
    }

    #[test]
    fn test_invalid_trigger_dropped() {
        let registry = TriggerRegistry::new();
        let count = counting(&registry, "counter");

        assert!(!registry.fire_trigger("jira", "specify", None, None));
        assert!(!registry.fire_trigger("speckit", "deploy", None, None));

        let mut event = TriggerEvent::new(TriggerSystem::Speckit, OperationType::Plan);
        event.timestamp = -5;
        assert!(!registry.fire_trigger_with_context(event));

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(registry.history().is_empty());
    }

    #[test]
    fn test_history_bounded_oldest_evicted() {
        let registry = TriggerRegistry::new();
        for i in 1..=51 {
            let mut event = TriggerEvent::new(TriggerSystem::Speckit, OperationType::Tasks);
            event.timestamp = i;
            registry.fire_trigger_with_context(event);
        }

        let history = registry.history();
        assert_eq!(history.len(), 50);
        assert_eq!(history.first().unwrap().timestamp, 2);
        assert_eq!(history.last().unwrap().timestamp, 51);
    }

    #[test]
    fn test_listener_error_isolation() {
        let registry = TriggerRegistry::new();
        registry.subscribe_fn("failing", |_| Err(anyhow!("listener error")));
        registry.subscribe_fn("panicking", |_| panic!("listener panic"));
        let count = counting(&registry, "after");

        assert!(registry.fire_trigger("speckit", "plan", None, None));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listeners_notified_in_registration_order() {
        let registry = TriggerRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let order = order.clone();
            registry.subscribe_fn(name, move |_| {
                order.lock().unwrap().push(name);
                Ok(())
            });
        }

        registry.fire_trigger("openspec", "plan", Some(TriggerTiming::After), None);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let registry = TriggerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let id = registry.subscribe_fn("counter", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        registry.fire_trigger("speckit", "plan", None, None);
        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        registry.fire_trigger("speckit", "plan", None, None);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispose_makes_fire_a_noop() {
        let registry = TriggerRegistry::new();
        let count = counting(&registry, "counter");

        registry.dispose();
        assert!(!registry.fire_trigger("speckit", "specify", None, None));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(registry.listener_count(), 0);

        counting(&registry, "late");
        assert_eq!(registry.listener_count(), 0);
    }
}
