use std::fmt;

use itertools::Itertools;
use thiserror::Error;

/// 单个 system 的执行失败
#[derive(Debug)]
pub struct SystemFailure {
    pub system: String,
    pub error: anyhow::Error,
}

impl fmt::Display for SystemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\": {:#}", self.system, self.error)
    }
}

#[derive(Error, Debug)]
pub enum SystemGraphError {
    #[error("cycle detected between systems \"{from}\" -> \"{to}\"")]
    CycleDetected { from: String, to: String },

    #[error("unknown system \"{0}\"")]
    UnknownSystem(String),

    /// 出错的层已经执行完，后续的层没有执行
    #[error("{} system(s) failed in layer {layer}: {}", .failures.len(), .failures.iter().join("; "))]
    SystemFailed { layer: usize, failures: Vec<SystemFailure> },

    #[error("failed to build worker thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
