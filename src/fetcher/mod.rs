//! 声明式模型拉取源
//! `fs://<path>` 读本地 JSON，`http(s)://` 走 GET，其余 scheme 视为配置错误
pub mod fs_source;
pub mod http_source;

use async_trait::async_trait;
use opalego_engine::Service;
use std::sync::Arc;
use url::Url;

use crate::error::{LegoError, LegoResult};

pub use fs_source::FsFetcher;
pub use http_source::HttpFetcher;

/// 拉取当前的声明式模型
#[async_trait]
pub trait BundleFetcher: Send + Sync {
    async fn fetch(&self) -> LegoResult<Service>;
}

#[async_trait]
impl<T: BundleFetcher + ?Sized> BundleFetcher for Arc<T> {
    async fn fetch(&self) -> LegoResult<Service> {
        (**self).fetch().await
    }
}

/// 根据 URL scheme 选择拉取实现
pub fn fetcher_from_url(raw: &str) -> LegoResult<Arc<dyn BundleFetcher>> {
    if let Some(path) = raw.strip_prefix("fs://") {
        if path.is_empty() {
            return Err(LegoError::Configuration("fs:// source has an empty path".into()));
        }
        return Ok(Arc::new(FsFetcher::new(path)));
    }

    let url = Url::parse(raw)?;
    match url.scheme() {
        "http" | "https" => Ok(Arc::new(HttpFetcher::new(url))),
        other => Err(LegoError::Configuration(format!(
            "unsupported source scheme `{other}`, expected fs://, http:// or https://"
        ))),
    }
}

/// 解析模型 JSON，失败归为拉取错误
pub(crate) fn parse_service(bytes: &[u8], origin: &str) -> LegoResult<Service> {
    Service::from_json_slice(bytes)
        .map_err(|e| LegoError::Fetch(format!("`{origin}` is not a valid service document: {e}")))
}
