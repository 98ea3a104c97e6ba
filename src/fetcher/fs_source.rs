use async_trait::async_trait;
use opalego_engine::Service;
use std::path::PathBuf;

use super::{parse_service, BundleFetcher};
use crate::error::{LegoError, LegoResult};

/// 本地文件源
#[derive(Debug, Clone)]
pub struct FsFetcher {
    path: PathBuf,
}

impl FsFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BundleFetcher for FsFetcher {
    async fn fetch(&self) -> LegoResult<Service> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| LegoError::Fetch(format!("read `{}`: {e}", self.path.display())))?;
        parse_service(&bytes, &self.path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, r#"{"rego": "", "members": {"alice": {"roles": ["read"]}}}"#).unwrap();

        let service = FsFetcher::new(&path).fetch().await.unwrap();
        assert_eq!(service.members["alice"].roles, vec!["read"]);
    }

    #[tokio::test]
    async fn test_fetch_missing_or_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = FsFetcher::new(dir.path().join("nope.json")).fetch().await;
        assert!(matches!(missing, Err(LegoError::Fetch(_))));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(FsFetcher::new(&path).fetch().await, Err(LegoError::Fetch(_))));
    }
}
