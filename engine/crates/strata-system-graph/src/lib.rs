//! ECS System 调度
//!
//! system 在 `setup` 中声明读写哪些组件，[`SystemGraph`] 据此推导依赖并分层，
//! [`SystemExecutor`] 逐层执行：
//!
//! ```ignore
//! let mut graph = SystemGraph::<World>::new();
//! graph.add(FnSystem::new("physics", JobType::Parallel, physics).write::<Transform>());
//! graph.add(FnSystem::new("culling", JobType::Parallel, culling).read::<Transform>());
//!
//! let executor = SystemExecutor::new(&SystemGraphConfig::default())?;
//! executor.run(&mut graph, &world)?;
//! executor.run_render_thread(&graph, &world)?;
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod system;

pub use config::SystemGraphConfig;
pub use error::{SystemFailure, SystemGraphError};
pub use executor::{SystemExecutor, SystemRunStats};
pub use graph::{SystemGraph, SystemId, SystemLayer, SystemSchedule};
pub use strata_dag::{AccessMode, HazardKind};
pub use system::{ComponentId, FnSystem, JobType, System, SystemAccess, SystemAccessBuilder};
