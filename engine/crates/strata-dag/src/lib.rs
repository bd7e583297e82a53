//! Strata 依赖图核心
//!
//! - [`Dag`]: 通用的有向无环图，`compile` 得到可并行的分层执行顺序
//! - [`ResourceVersionRegistry`]: 根据资源的读写声明推导 RAW / WAW / WAR 依赖
//!
//! render graph（GPU pass）和 system graph（ECS system）都建立在这两者之上。

pub mod dag;
pub mod error;
pub mod version_registry;

pub use dag::{Dag, DagLayers, NodeId};
pub use error::DagError;
pub use version_registry::{
    AccessMode, AccessOutcome, DependencyEdge, HazardKind, ResourceVersionRegistry, VersionRecord,
};
