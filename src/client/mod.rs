//! 查询客户端
//! 本地：持有已安装 bundle 的快照，进程内求值
//! 远端：POST 到 sidecar 的 `/v1/query`
pub mod local;
pub mod remote;

use async_trait::async_trait;
use opalego_engine::compiler::layout::BINDING;
use opalego_engine::QueryOption;
use serde_json::Value;
use std::time::Duration;

use crate::error::{LegoError, LegoResult};

pub use local::LocalClient;
pub use remote::RemoteClient;

/// 统一的查询能力
/// 返回 `Ok(None)` 表示引擎没有给出结果（路径不存在/规则未定义），不是错误
/// 丢弃返回的 future 即可取消：远端会中断 HTTP 请求；
/// 本地求值已在 blocking 线程上开始的部分会在后台跑完，结果被丢弃，已安装的快照不受影响
#[async_trait]
pub trait Client: Send + Sync {
    async fn query(&self, option: QueryOption) -> LegoResult<Option<Value>>;
}

/// 带截止时间的查询，超时返回 DeadlineExceeded，已安装的 bundle 不受影响
/// 本地客户端超时后调用方立即返回，但不会打断已经开始的求值（见 [`Client::query`]）
pub async fn query_with_deadline(
    client: &dyn Client,
    option: QueryOption,
    timeout: Duration,
) -> LegoResult<Option<Value>> {
    tokio::time::timeout(timeout, client.query(option))
        .await
        .map_err(|_| LegoError::DeadlineExceeded(timeout))?
}

/// 从结果中取出绑定变量
/// 结果可能是单个绑定对象，也可能是只取第一个元素的绑定列表
pub(crate) fn unwrap_binding(result: Option<&Value>) -> Option<Value> {
    let result = match result? {
        Value::Array(items) => items.first()?,
        other => other,
    };
    result.as_object()?.get(BINDING).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_binding() {
        assert_eq!(unwrap_binding(Some(&json!({"x": true}))), Some(json!(true)));
        assert_eq!(unwrap_binding(Some(&json!([{"x": [1, 2]}]))), Some(json!([1, 2])));
        assert_eq!(unwrap_binding(Some(&json!([]))), None);
        assert_eq!(unwrap_binding(Some(&json!({"y": 1}))), None);
        assert_eq!(unwrap_binding(None), None);
    }

    struct SlowClient;

    #[async_trait]
    impl Client for SlowClient {
        async fn query(&self, _option: QueryOption) -> LegoResult<Option<Value>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Some(json!(true)))
        }
    }

    #[tokio::test]
    async fn test_query_with_deadline() {
        let err = query_with_deadline(&SlowClient, QueryOption::new("a", "allow"), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, LegoError::DeadlineExceeded(_)));
    }
}
