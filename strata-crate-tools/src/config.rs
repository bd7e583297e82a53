use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// 从 TOML 文件加载配置
///
/// 文件中缺失的字段由类型自己的 `#[serde(default)]` 补齐。
pub fn load_toml_config<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> anyhow::Result<T> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).with_context(|| format!("读取配置文件失败: {:?}", path))?;
    let config = toml::from_str(&content).with_context(|| format!("解析 TOML 配置失败: {:?}", path))?;
    log::info!("loaded config from {:?}", path);
    Ok(config)
}

/// 文件不存在时使用默认配置，文件存在但无法解析时仍然报错
pub fn load_toml_config_or_default<T: DeserializeOwned + Default, P: AsRef<Path>>(path: P) -> anyhow::Result<T> {
    let path = path.as_ref();
    if !path.exists() {
        log::info!("config {:?} not found, using defaults", path);
        return Ok(T::default());
    }
    load_toml_config(path)
}

pub fn save_toml_config<T: Serialize, P: AsRef<Path>>(config: &T, path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    let content = toml::to_string_pretty(config).context("序列化配置失败")?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("创建目录失败: {:?}", parent))?;
    }
    fs::write(path, content).with_context(|| format!("写入配置文件失败: {:?}", path))?;
    Ok(())
}
