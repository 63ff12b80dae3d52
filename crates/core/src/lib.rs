pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod event_bus;
pub mod memory;
pub mod types;

pub use collaborators::{CartStore, Catalog, ConditionEvaluator, TokenVerifier};
pub use config::AppConfig;
pub use context::RequestContext;
pub use error::{ConditionError, FunnelError, FunnelResult, RecordKind};
