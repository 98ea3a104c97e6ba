//! opalego-engine：声明式组织模型 -> Rego bundle 文件映射，以及对应布局的查询翻译
//! 纯计算，不做任何 I/O

// 模型与配置
pub mod core;
// 标识符规范化
pub mod normalizer;
// bundle 编译 + 布局策略
pub mod compiler;
// 查询翻译
pub mod translator;
// 内核错误
pub mod error;

// 顶层导出常用类型
pub use crate::core::{Base, Factory, FileMapping, Group, Manifest, Member, Mode, Service, DEFAULT_SERVICE};
pub use compiler::layout::Layout;
pub use compiler::{compile, BundleCompiler, NormalizedService, MANIFEST_FILE};
pub use error::{EngineError, EngineResult};
pub use normalizer::{normalize, NameTable, Namespace};
pub use translator::{translate, QueryOption, TranslatedQuery};
