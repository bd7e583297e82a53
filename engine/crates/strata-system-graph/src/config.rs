use serde::{Deserialize, Serialize};

/// System 执行器配置
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemGraphConfig {
    /// 工作线程数，0 表示由 rayon 根据 CPU 核数决定
    pub worker_threads: usize,
    pub thread_name_prefix: String,
}

impl Default for SystemGraphConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            thread_name_prefix: "System-Worker".to_string(),
        }
    }
}
