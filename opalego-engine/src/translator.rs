//! Query translator
//! 逻辑查询（主体 + 规则 + 输入）-> 针对当前布局有效的查询串与 input
//! 寻址规则完全由 [`Mode::layout`] 决定，与编译器共用一份实现

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::Factory;
use crate::normalizer::{normalize, Namespace};

/// 调用方的逻辑查询
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOption {
    /// 原始主体标识（未规范化）
    pub uid: String,
    /// 规则名，可为空（查询整个包）
    pub rule: String,
    #[serde(default)]
    pub input: Map<String, Value>,
}

impl QueryOption {
    pub fn new(uid: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            rule: rule.into(),
            input: Map::new(),
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.input.insert(key.into(), value.into());
        self
    }

    pub fn translate(&self, factory: &Factory) -> TranslatedQuery {
        translate(factory, &self.uid, &self.rule, &self.input)
    }
}

/// 翻译结果，序列化后即 sidecar `/v1/query` 的请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedQuery {
    pub query: String,
    pub input: Map<String, Value>,
}

/// input 为浅拷贝，调用方的 map 不会被修改
pub fn translate(factory: &Factory, uid: &str, rule: &str, input: &Map<String, Value>) -> TranslatedQuery {
    let mut input = input.clone();
    let token = normalize(uid, Namespace::Member);
    let query = factory
        .mode
        .layout()
        .address(&factory.service, &token, rule, &mut input);

    log::debug!("translated query for `{uid}`: {query}");
    TranslatedQuery { query, input }
}
