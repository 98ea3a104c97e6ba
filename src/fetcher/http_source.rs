use async_trait::async_trait;
use once_cell::sync::Lazy;
use opalego_engine::Service;
use reqwest::Client;
use std::time::Duration;
use url::Url;

use super::{parse_service, BundleFetcher};
use crate::config::DEFAULT_HTTP_TIMEOUT;
use crate::error::{LegoError, LegoResult};

/// 进程共享的默认客户端（连接池复用）
static DEFAULT_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT))
        .build()
        .unwrap_or_default()
});

/// HTTP(S) 源
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    url: Url,
    client: Client,
}

impl HttpFetcher {
    pub fn new(url: Url) -> Self {
        Self::with_client(url, DEFAULT_CLIENT.clone())
    }

    pub fn with_client(url: Url, client: Client) -> Self {
        Self { url, client }
    }
}

#[async_trait]
impl BundleFetcher for HttpFetcher {
    async fn fetch(&self) -> LegoResult<Service> {
        let response = self
            .client
            .get(self.url.clone())
            .header("User-Agent", concat!("opalego/", env!("CARGO_PKG_VERSION")))
            .send()
            .await
            .map_err(|e| LegoError::Fetch(format!("GET {}: {e}", self.url)))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| LegoError::Fetch(format!("read body of {}: {e}", self.url)))?;

        if !status.is_success() {
            return Err(LegoError::Fetch(format!(
                "remote err: {}: {}",
                status.as_u16(),
                String::from_utf8_lossy(&bytes)
            )));
        }

        parse_service(&bytes, self.url.as_str())
    }
}
