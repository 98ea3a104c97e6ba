//! opalego - 把声明式组织模型编译为分层 OPA bundle，并与定时拉取的数据源保持同步

// 导出全局错误类型
pub use self::error::{ErrorKind, LegoError, LegoResult};

// 导出配置模块
pub use self::config::{
    load_factory, ConfigManager, CustomConfigBuilder, DebugHook, DebugOption, LegoConfig,
    SidecarOptions, DEFAULT_INTERVAL,
};

// 导出引擎核心接口
pub use opalego_engine::{
    compile, normalize, translate, Base, BundleCompiler, EngineError, EngineResult, Factory,
    FileMapping, Group, Manifest, Member, Mode, Namespace, QueryOption, Service, TranslatedQuery,
};

// 导出 bundle / 拉取 / 查询 / 管线接口
pub use self::bundle::{load_archive, load_directory, Destination, LoadedBundle, Packager};
pub use self::client::{query_with_deadline, Client, LocalClient, RemoteClient};
pub use self::fetcher::{fetcher_from_url, BundleFetcher, FsFetcher, HttpFetcher};
pub use self::lego::{Lego, PipelineState};

// 声明所有子模块
pub mod bundle;
pub mod client;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod lego;
