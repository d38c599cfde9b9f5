//! Build metadata aggregation for buildtrail: module identity, dependency
//! collection, and cross-step partial build-info caching.

pub mod aggregate;
pub mod collect;
pub mod error;
pub mod model;
pub mod module;
pub mod remote;
pub mod store;

pub use aggregate::BuildInfoManager;
pub use collect::PatternQuery;
pub use error::EngineError;
pub use model::{
    Artifact, BuildInfo, BuildRunKey, Dependency, Module, ModuleIdentity, ModuleType, Partial,
};
pub use module::{ModuleResolver, Resolution, ResolveContext};
pub use store::{FsPartialStore, MemoryPartialStore, PartialStore};
