//! 全局配置管理
//! Factory（编译配置）从文件加载一次；Lego 运行参数通过构建器组装

use opalego_engine::Factory;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LegoError, LegoResult};

/// 默认拉取间隔
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
/// 默认 HTTP 超时（秒）
pub const DEFAULT_HTTP_TIMEOUT: u64 = 30;

/// 从 JSON 文件加载 Factory
pub fn load_factory(path: impl AsRef<Path>) -> LegoResult<Factory> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
        LegoError::Configuration(format!("cannot read factory config `{}`: {}", path.display(), e))
    })?;
    Ok(Factory::from_json_slice(&bytes)?)
}

/// 远端 sidecar：查询地址 + bundle 安装路径
#[derive(Debug, Clone, Default)]
pub struct SidecarOptions {
    /// 例如 `http://127.0.0.1:8181`
    pub addr: String,
    /// sidecar 监听的 bundle 文件路径
    pub bundle_dst: PathBuf,
}

impl SidecarOptions {
    pub fn new(addr: impl Into<String>, bundle_dst: impl Into<PathBuf>) -> Self {
        Self {
            addr: addr.into(),
            bundle_dst: bundle_dst.into(),
        }
    }
}

/// 调试回调，参数为请求/响应的 JSON 描述
pub type DebugHook = Arc<dyn Fn(&Value) + Send + Sync>;

/// 调试选项
#[derive(Clone, Default)]
pub struct DebugOption {
    /// 编译后把 bundle 解包到该目录，便于检查生成结果
    pub untar_bundle_dir: Option<PathBuf>,
    pub on_request: Option<DebugHook>,
    pub on_response: Option<DebugHook>,
}

impl DebugOption {
    pub(crate) fn request(&self, value: &Value) {
        if let Some(hook) = &self.on_request {
            hook(value);
        }
    }

    pub(crate) fn response(&self, value: &Value) {
        if let Some(hook) = &self.on_response {
            hook(value);
        }
    }
}

impl fmt::Debug for DebugOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugOption")
            .field("untar_bundle_dir", &self.untar_bundle_dir)
            .field("on_request", &self.on_request.is_some())
            .field("on_response", &self.on_response.is_some())
            .finish()
    }
}

/// Lego 运行配置
#[derive(Debug, Clone)]
pub struct LegoConfig {
    /// None 表示进程内求值
    pub sidecar: Option<SidecarOptions>,
    pub debug: Option<DebugOption>,
    // 超时配置（单位：秒）
    pub http_timeout: u64,
}

impl Default for LegoConfig {
    fn default() -> Self {
        Self {
            sidecar: None,
            debug: None,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl LegoConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout)
    }
}

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 获取默认配置
    pub fn get_default() -> LegoConfig {
        LegoConfig::default()
    }

    /// 自定义配置
    pub fn custom() -> CustomConfigBuilder {
        CustomConfigBuilder::new()
    }
}

/// 配置构建器
#[derive(Debug, Clone, Default)]
pub struct CustomConfigBuilder {
    config: LegoConfig,
}

impl CustomConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: LegoConfig::default(),
        }
    }

    pub fn sidecar(mut self, sidecar: SidecarOptions) -> Self {
        self.config.sidecar = Some(sidecar);
        self
    }

    pub fn debug(mut self, debug: DebugOption) -> Self {
        self.config.debug = Some(debug);
        self
    }

    pub fn http_timeout(mut self, timeout: u64) -> Self {
        self.config.http_timeout = timeout;
        self
    }

    pub fn build(self) -> LegoConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opalego_engine::Mode;

    #[test]
    fn test_load_factory_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("factory.json");
        std::fs::write(&path, r#"{"regoPiece": {"read": "allow { true }"}, "mode": 2}"#).unwrap();

        let factory = load_factory(&path).unwrap();
        assert_eq!(factory.mode, Mode::Data);
        assert_eq!(factory.piece("read"), Some("allow { true }"));
    }

    #[test]
    fn test_load_factory_missing_file() {
        let err = load_factory("/nonexistent/factory.json").unwrap_err();
        assert!(matches!(err, LegoError::Configuration(_)));
    }

    #[test]
    fn test_builder() {
        let config = ConfigManager::custom()
            .sidecar(SidecarOptions::new("http://127.0.0.1:8181", "/tmp/bundle.tar.gz"))
            .http_timeout(5)
            .build();
        assert_eq!(config.http_timeout(), Duration::from_secs(5));
        assert_eq!(config.sidecar.unwrap().addr, "http://127.0.0.1:8181");
        assert!(ConfigManager::get_default().sidecar.is_none());
    }
}
