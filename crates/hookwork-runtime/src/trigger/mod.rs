pub mod event;
pub mod registry;

pub use event::{OperationType, TriggerEvent, TriggerOutput, TriggerSystem, TriggerTiming};
pub use registry::{SubscriptionId, TriggerListener, TriggerRegistry, DEFAULT_HISTORY_CAPACITY};
