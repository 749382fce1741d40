// Transaction lifecycle common library - main library exports

pub mod engine;
pub mod events;
pub mod oracle;
pub mod types;

// Flattened re-exports
pub use self::engine::{LifecycleObserver, TrackingEngine};
pub use self::events::ChainEvent;
pub use self::oracle::{ChainQuery, OracleError};
pub use self::types::*;
