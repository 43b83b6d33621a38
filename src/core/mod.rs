

pub mod config;
pub mod entities;
pub mod error;
pub mod intent;

pub use config::{ContractMode, GraphBackendKind, IndexSpec, RetrievalMode, WayfinderConfig};
pub use entities::{EntityBag, EntityBagBuilder, EntityError, EntityKey, EntityValue, SlotKind};
pub use error::{Result, WayfinderError};
pub use intent::Intent;
