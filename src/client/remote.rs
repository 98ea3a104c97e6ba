//! Sidecar 客户端
//! 并发度只受 reqwest 连接池限制

use async_trait::async_trait;
use opalego_engine::{Factory, QueryOption};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{unwrap_binding, Client};
use crate::config::{DebugOption, SidecarOptions};
use crate::error::{LegoError, LegoResult};

pub struct RemoteClient {
    factory: Arc<Factory>,
    sidecar: SidecarOptions,
    debug: Option<DebugOption>,
    http: reqwest::Client,
}

impl RemoteClient {
    pub fn new(
        factory: Arc<Factory>,
        sidecar: SidecarOptions,
        debug: Option<DebugOption>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            factory,
            sidecar,
            debug,
            http,
        }
    }

    fn endpoint(&self) -> String {
        let mut endpoint = format!("{}/v1/query", self.sidecar.addr.trim_end_matches('/'));
        if self.debug.is_some() {
            endpoint.push_str("?explain=full");
        }
        endpoint
    }
}

/// `/v1/query` 响应，`explanation` 只在 `?explain=full` 时出现
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    explanation: Option<Vec<Value>>,
}

#[async_trait]
impl Client for RemoteClient {
    async fn query(&self, option: QueryOption) -> LegoResult<Option<Value>> {
        let translated = option.translate(&self.factory);
        let body = serde_json::to_string(&translated)?;
        let endpoint = self.endpoint();

        if let Some(debug) = &self.debug {
            debug.request(&json!({"url": endpoint, "body": body}));
        }
        tracing::debug!(endpoint = %endpoint, query = %translated.query, "querying sidecar");

        let response = self
            .http
            .post(&endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                if let Some(debug) = &self.debug {
                    debug.response(&json!({"err": e.to_string()}));
                }
                return Err(e.into());
            }
        };

        let status = response.status();
        let bytes = response.bytes().await?;

        if let Some(debug) = &self.debug {
            debug.response(&json!({
                "status": status.as_u16(),
                "body": String::from_utf8_lossy(&bytes),
            }));
        }

        if status != StatusCode::OK {
            return Err(LegoError::RemoteEvaluation {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let envelope: QueryResponse = serde_json::from_slice(&bytes)?;
        if let Some(explanation) = &envelope.explanation {
            tracing::debug!(events = explanation.len(), "sidecar returned explanation");
        }
        Ok(unwrap_binding(envelope.result.as_ref()))
    }
}
