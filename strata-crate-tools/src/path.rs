use std::path::{Path, PathBuf};

/// 统一路径管理
///
/// 所有路径基于工作区根目录（通过 `CARGO_MANIFEST_DIR` 推导）。
///
/// # 使用示例
/// ```ignore
/// let config = StrataPath::config_path("sandbox.toml"); // config/sandbox.toml
/// let dot = StrataPath::output_path("frame.dot");       // target/strata/frame.dot
/// ```
pub struct StrataPath {}

impl StrataPath {
    /// 获取工作区根目录
    pub fn workspace_path() -> PathBuf {
        let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
        manifest.parent().unwrap_or(manifest).to_path_buf()
    }

    pub fn target_path() -> PathBuf {
        Self::workspace_path().join("target")
    }

    /// 获取 `config/` 目录下的文件路径
    pub fn config_path(filename: &str) -> PathBuf {
        Self::workspace_path().join("config").join(filename)
    }

    /// 调试输出（graphviz 等）放在 `target/strata/` 下
    pub fn output_path(filename: &str) -> PathBuf {
        Self::target_path().join("strata").join(filename)
    }
}
