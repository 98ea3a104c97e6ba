use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// 编译产物：相对路径 -> 文件内容
/// BTreeMap 保证打包时条目顺序稳定
pub type FileMapping = BTreeMap<String, Vec<u8>>;

/// 可复用单元：一段 Rego 源码 + 可选的结构化附加数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Base {
    #[serde(default)]
    pub rego: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Map<String, Value>>,
}

impl Base {
    pub fn new(rego: impl Into<String>) -> Self {
        Self {
            rego: rego.into(),
            extra: None,
        }
    }

    /// 附加数据存在且非空
    pub fn has_extra(&self) -> bool {
        self.extra.as_ref().is_some_and(|m| !m.is_empty())
    }
}

/// 单个租户的策略模型根节点
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(flatten)]
    pub base: Base,
    #[serde(default)]
    pub members: BTreeMap<String, Member>,
    #[serde(default)]
    pub groups: BTreeMap<String, Group>,
}

impl Service {
    pub fn from_json_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// 单个主体（用户）
/// roles 只保存直接授予的角色，有效角色在编译时解析
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Member {
    #[serde(flatten)]
    pub base: Base,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// 共享一组角色片段的主体集合
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(flatten)]
    pub base: Base,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// bundle 根目录下的 `.manifest`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub roots: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_from_json() {
        let json = r#"{
            "rego": "default allow = false",
            "extra": {"region": "tw"},
            "members": {
                "alice": {"rego": "", "roles": ["read", "write"], "groups": ["admins"]},
                "bob": {"roles": ["read"]}
            },
            "groups": {
                "admins": {"roles": ["delete"], "extra": null}
            }
        }"#;

        let service = Service::from_json_slice(json.as_bytes()).unwrap();
        assert_eq!(service.base.rego, "default allow = false");
        assert!(service.base.has_extra());
        assert_eq!(service.members["alice"].groups, vec!["admins"]);
        assert!(service.members["bob"].groups.is_empty());
        assert!(!service.groups["admins"].base.has_extra());
    }

    #[test]
    fn test_empty_extra_is_not_extra() {
        let base = Base {
            rego: String::new(),
            extra: Some(Map::new()),
        };
        assert!(!base.has_extra());
    }
}
