//! 进程内求值客户端
//! bundle 指针只在交换/读取时持锁，求值期间不持锁

use async_trait::async_trait;
use opalego_engine::{Factory, QueryOption};
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::Client;
use crate::bundle::LoadedBundle;
use crate::config::DebugOption;
use crate::error::{LegoError, LegoResult};

fn eval_err(e: impl std::fmt::Display) -> LegoError {
    LegoError::Evaluation(e.to_string())
}

pub struct LocalClient {
    factory: Arc<Factory>,
    debug: Option<DebugOption>,
    bundle: RwLock<Option<Arc<LoadedBundle>>>,
}

impl LocalClient {
    pub fn new(factory: Arc<Factory>, debug: Option<DebugOption>) -> Self {
        Self {
            factory,
            debug,
            bundle: RwLock::new(None),
        }
    }

    /// 原子替换：并发查询要么看到完整的旧快照，要么看到完整的新快照
    pub(crate) fn set_bundle(&self, bundle: LoadedBundle) {
        let bundle = Arc::new(bundle);
        *self.bundle.write() = Some(bundle);
    }

    /// 当前已安装的快照
    pub fn snapshot(&self) -> Option<Arc<LoadedBundle>> {
        self.bundle.read().clone()
    }
}

#[async_trait]
impl Client for LocalClient {
    async fn query(&self, option: QueryOption) -> LegoResult<Option<Value>> {
        let translated = option.translate(&self.factory);
        let bundle = self.snapshot().ok_or(LegoError::BundleNotInstalled)?;

        let tracing_enabled = self.debug.as_ref().is_some_and(|d| d.on_request.is_some());
        if let Some(debug) = &self.debug {
            debug.request(&json!({"query": translated.query, "input": translated.input}));
        }

        let query = translated.query.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            evaluate(&bundle, &query, &translated.input, tracing_enabled)
        })
        .await
        .map_err(|e| LegoError::AsyncTask(e.to_string()))?;

        if let Some(debug) = &self.debug {
            let (rs, err) = match &outcome {
                Ok(rs) => (rs.clone().unwrap_or(Value::Null), Value::Null),
                Err(e) => (Value::Null, Value::String(e.to_string())),
            };
            debug.response(&json!({"rs": rs, "err": err}));
        }

        outcome
    }
}

/// 对快照求值，返回查询绑定的 `x`
pub fn evaluate(
    bundle: &LoadedBundle,
    query: &str,
    input: &Map<String, Value>,
    enable_tracing: bool,
) -> LegoResult<Option<Value>> {
    let mut engine = bundle.engine();
    let input = serde_json::to_string(input)?;
    engine.set_input(regorus::Value::from_json_str(&input).map_err(eval_err)?);

    let results = engine
        .eval_query(query.to_string(), enable_tracing)
        .map_err(eval_err)?;

    let Some(first) = results.result.into_iter().next() else {
        return Ok(None);
    };
    let bindings: Value = serde_json::from_str(&first.bindings.to_json_str().map_err(eval_err)?)?;
    Ok(super::unwrap_binding(Some(&bindings)))
}
