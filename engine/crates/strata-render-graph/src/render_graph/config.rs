use serde::{Deserialize, Serialize};

/// RenderGraph 编译选项
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RgConfig {
    /// 剔除结果没有被使用的 Pass
    pub cull_passes: bool,
    /// 生命周期不重叠的 transient 资源共享物理资源
    pub alias_transients: bool,
    /// async compute / transfer Pass 使用独立队列
    pub async_queues: bool,
    /// 每次编译后打印执行计划
    pub log_execution_plan: bool,
}

impl Default for RgConfig {
    fn default() -> Self {
        Self {
            cull_passes: true,
            alias_transients: true,
            async_queues: true,
            log_execution_plan: false,
        }
    }
}
