//! 全局错误类型定义
use opalego_engine::EngineError;
use serde_json::Error as SerdeJsonError;
use std::io::Error as IoError;
use std::time::Duration;
use thiserror::Error;
use url::ParseError as UrlParseError;

#[derive(Error, Debug)]
pub enum LegoError {
    // 配置相关错误
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Engine(#[from] EngineError),

    // 拉取/编译/打包/安装，各自只影响当前周期
    #[error("Fetch failed: {0}")]
    Fetch(String),
    #[error("Package failed: {0}")]
    Package(String),
    #[error("Install failed: {0}")]
    Install(String),

    // 查询相关错误
    #[error("Evaluation failed: {0}")]
    Evaluation(String),
    #[error("opa error: {status}: {body}")]
    RemoteEvaluation { status: u16, body: String },
    #[error("No bundle installed yet")]
    BundleNotInstalled,
    #[error("Query deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    // 网络相关错误
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    // 序列化/反序列化错误
    #[error("JSON parse failed: {0}")]
    Json(#[from] SerdeJsonError),

    // 基础错误
    #[error("IO operation failed: {0}")]
    Io(#[from] IoError),
    #[error("URL parse failed: {0}")]
    Url(#[from] UrlParseError),
    #[error("Async task failed: {0}")]
    AsyncTask(String),
}

/// 错误大类，回调里按类别处理即可
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Fetch,
    Compile,
    Package,
    Install,
    Evaluation,
}

impl LegoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LegoError::Configuration(_) | LegoError::Url(_) => ErrorKind::Configuration,
            LegoError::Engine(EngineError::IdentifierCollision { .. })
            | LegoError::Engine(EngineError::InvalidMode(_))
            | LegoError::Engine(EngineError::InvalidFactory(_)) => ErrorKind::Configuration,
            LegoError::Engine(EngineError::Json(_)) => ErrorKind::Compile,
            LegoError::Fetch(_) | LegoError::Http(_) => ErrorKind::Fetch,
            LegoError::Package(_) | LegoError::Io(_) | LegoError::AsyncTask(_) => ErrorKind::Package,
            LegoError::Install(_) => ErrorKind::Install,
            LegoError::Json(_) => ErrorKind::Configuration,
            LegoError::Evaluation(_)
            | LegoError::RemoteEvaluation { .. }
            | LegoError::BundleNotInstalled
            | LegoError::DeadlineExceeded(_) => ErrorKind::Evaluation,
        }
    }
}

// 全局Result类型
pub type LegoResult<T> = Result<T, LegoError>;
