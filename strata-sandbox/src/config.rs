use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strata_render_graph::render_graph::RgConfig;
use strata_system_graph::SystemGraphConfig;

/// sandbox 配置，对应 `config/sandbox.toml`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// trace / debug / info / warn / error
    pub log_level: String,
    pub frames: u32,
    /// swapchain image 数量，每帧轮换导入
    pub swapchain_images: u32,
    pub width: u32,
    pub height: u32,
    /// 编译后把依赖图写成 DOT 文件
    pub dump_graphviz: Option<PathBuf>,
    pub render_graph: RgConfig,
    pub system_graph: SystemGraphConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            frames: 3,
            swapchain_images: 3,
            width: 1280,
            height: 720,
            dump_graphviz: None,
            render_graph: RgConfig::default(),
            system_graph: SystemGraphConfig::default(),
        }
    }
}
