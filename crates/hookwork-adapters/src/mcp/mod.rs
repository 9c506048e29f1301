mod adapter;
pub mod pool;
pub mod resolver;

pub use adapter::{truncate_output, ToolServerAdapter, ToolServerSettings};
pub use pool::{ConcurrencyPool, DEFAULT_POOL_WIDTH};
pub use resolver::{coerce_literal, resolve_arguments};
