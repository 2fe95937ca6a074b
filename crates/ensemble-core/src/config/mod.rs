//! Configuration catalog and registry
//!
//! The catalog (agents, providers, models, flows, scene analyzers) is
//! loaded once from TOML, validated in full, and served to runs as an
//! immutable snapshot. The only runtime mutation is the single/multi
//! provider mode toggle, which swaps the whole snapshot atomically so a
//! concurrent reader never sees a torn state.
//!
//! # Module structure
//!
//! - `types`: catalog record definitions
//! - `loader`: TOML parsing and fail-fast validation
//! - `registry`: [`ConfigRegistry`] and [`ConfigSnapshot`]

mod loader;
mod registry;
mod types;


pub use registry::{ConfigRegistry, ConfigSnapshot};
pub use types::{
    AgentDef, Catalog, FlowDef, FlowStep, ModelDef, ProviderDef, SceneAnalyzerDef,
};
