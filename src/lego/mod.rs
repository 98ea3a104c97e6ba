//! Fetch-Compile-Swap pipeline
//! 定时拉取声明式模型 -> 编译 -> 打包 -> 原子安装到当前目标
//! 目标为进程内引擎时替换共享快照；目标为 sidecar 时同文件系统内写临时文件再 rename

mod state;

use opalego_engine::{BundleCompiler, Factory, Service};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bundle::{load_archive, unpack_archive, Packager};
use crate::client::{Client, LocalClient, RemoteClient};
use crate::config::{DebugOption, LegoConfig, SidecarOptions};
use crate::error::{LegoError, LegoResult};
use crate::fetcher::BundleFetcher;

pub use state::PipelineState;
use state::StateCell;

/// 安装目标
enum Target {
    Local(Arc<LocalClient>),
    Sidecar(SidecarOptions),
}

pub struct Lego {
    factory: Arc<Factory>,
    target: Target,
    client: Arc<dyn Client>,
    debug: Option<DebugOption>,
    scheduled: AtomicBool,
    // 同一时刻只允许一个周期
    cycle: Mutex<()>,
    state: StateCell,
}

/// 阻塞 I/O 放到 blocking 线程池
async fn blocking<T, F>(f: F) -> LegoResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> LegoResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LegoError::AsyncTask(e.to_string()))?
}

impl Lego {
    pub fn new(factory: Factory, config: LegoConfig) -> LegoResult<Self> {
        factory.validate()?;
        let factory = Arc::new(factory);
        let LegoConfig {
            sidecar, debug, ..
        } = config.clone();

        let (target, client): (Target, Arc<dyn Client>) = match sidecar {
            None => {
                let local = Arc::new(LocalClient::new(factory.clone(), debug.clone()));
                (Target::Local(local.clone()), local)
            }
            Some(sidecar) => {
                let http = reqwest::Client::builder()
                    .timeout(config.http_timeout())
                    .build()?;
                let remote = RemoteClient::new(factory.clone(), sidecar.clone(), debug.clone(), http);
                (Target::Sidecar(sidecar), Arc::new(remote))
            }
        };

        Ok(Self {
            factory,
            target,
            client,
            debug,
            scheduled: AtomicBool::new(false),
            cycle: Mutex::new(()),
            state: StateCell::default(),
        })
    }

    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    /// 与安装目标匹配的查询客户端
    pub fn client(&self) -> Arc<dyn Client> {
        self.client.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    /// 启动后台定时任务，每个实例只会启动一次
    /// 失败交给 `on_error`，不立即重试，等待下一个周期
    pub fn schedule_set_bundle<F, E>(
        self: &Arc<Self>,
        fetcher: F,
        interval: Duration,
        on_error: E,
    ) -> Option<JoinHandle<()>>
    where
        F: BundleFetcher + 'static,
        E: Fn(LegoError) + Send + Sync + 'static,
    {
        if self
            .scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("bundle schedule already started, skip");
            return None;
        }

        let lego = Arc::clone(self);
        Some(tokio::spawn(async move {
            loop {
                if let Err(e) = lego.refresh(&fetcher).await {
                    warn!(kind = ?e.kind(), error = %e, "bundle refresh failed");
                    on_error(e);
                }
                tokio::time::sleep(interval).await;
            }
        }))
    }

    /// 手动执行一次完整周期：拉取 -> 编译 -> 安装
    /// 与定时周期、`set_bundle` 互斥，按调用顺序依次执行
    pub async fn refresh<F: BundleFetcher + ?Sized>(&self, fetcher: &F) -> LegoResult<()> {
        let _cycle = self.cycle.lock().await;
        self.state.set(PipelineState::Fetching);
        let service = match fetcher.fetch().await {
            Ok(service) => service,
            Err(e) => {
                self.state.set(PipelineState::Idle);
                return Err(e);
            }
        };
        self.install(service).await
    }

    /// 编译并安装给定模型，会等待正在进行的周期结束
    pub async fn set_bundle(&self, service: Service) -> LegoResult<()> {
        let _cycle = self.cycle.lock().await;
        self.install(service).await
    }

    async fn install(&self, service: Service) -> LegoResult<()> {
        self.state.set(PipelineState::Compiling);
        let result = self.compile_and_install(service).await;
        self.state.set(PipelineState::Idle);
        result
    }

    async fn compile_and_install(&self, service: Service) -> LegoResult<()> {
        let staging = self.staging_file()?;
        let factory = Arc::clone(&self.factory);
        let debug_dir = self.debug.as_ref().and_then(|d| d.untar_bundle_dir.clone());

        let (staging, file_count) = blocking(move || {
            let files = BundleCompiler::new(&factory).compile(&service)?;
            let mut staging = staging;
            Packager::write_archive_file(&files, staging.as_file_mut())?;

            if let Some(dir) = debug_dir {
                match unpack_archive(staging.path(), &dir) {
                    Ok(()) => debug!(dir = %dir.display(), "bundle unpacked for inspection"),
                    Err(e) => warn!(dir = %dir.display(), error = %e, "bundle unpack failed"),
                }
            }
            Ok((staging, files.len()))
        })
        .await?;

        self.state.set(PipelineState::Installing);
        match &self.target {
            Target::Local(client) => {
                let bundle = blocking(move || load_archive(staging.path())).await?;
                client.set_bundle(bundle);
            }
            Target::Sidecar(sidecar) => {
                let dst = sidecar.bundle_dst.clone();
                blocking(move || {
                    staging
                        .persist(&dst)
                        .map(|_| ())
                        .map_err(|e| LegoError::Install(format!("rename onto `{}`: {}", dst.display(), e.error)))
                })
                .await?;
            }
        }

        info!(files = file_count, mode = %self.factory.mode, "bundle installed");
        Ok(())
    }

    /// sidecar 目标的临时文件与目标文件同目录，保证 rename 原子
    fn staging_file(&self) -> LegoResult<NamedTempFile> {
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix(".bundle-").suffix(".tar.gz.tmp");
            builder
        };
        let file = match &self.target {
            Target::Local(_) => builder.tempfile(),
            Target::Sidecar(sidecar) => {
                let dir = sidecar
                    .bundle_dst
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or(Path::new("."));
                builder.tempfile_in(dir)
            }
        };
        file.map_err(|e| LegoError::Package(format!("create staging file: {e}")))
    }
}
