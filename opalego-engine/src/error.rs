//! opalego-engine 内核错误定义
//! 编译期/配置期错误，与运行时（拉取、打包、安装、查询）错误解耦
use thiserror::Error;

use crate::normalizer::Namespace;

/// 内核核心错误枚举
#[derive(Error, Debug)]
pub enum EngineError {
    /// 同一命名空间下两个不同的原始标识符规范化为同一个 token
    /// 编译直接失败，不允许后写覆盖先写
    #[error("Identifier collision in {namespace} namespace: `{first}` and `{second}` both normalize to `{token}`")]
    IdentifierCollision {
        namespace: Namespace,
        token: String,
        first: String,
        second: String,
    },

    /// 无法识别的编译模式
    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    /// Factory 配置校验失败
    #[error("Invalid factory: {0}")]
    InvalidFactory(String),

    /// JSON 序列化/反序列化失败
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 内核层全局Result类型别名
pub type EngineResult<T> = Result<T, EngineError>;
