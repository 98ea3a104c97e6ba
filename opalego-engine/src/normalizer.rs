//! Identifier normalizer
//! 将任意标识符映射为可作为路径段/包名段的 token：
//! 小写化，连续的非 [a-z0-9] 字符折叠为单个 `_`，再加命名空间前缀
//! 成员与组使用不同前缀，原始字符串相同也不会互相冲突

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use crate::error::{EngineError, EngineResult};

static NORMALIZER: Lazy<Regex> =
    Lazy::new(|| Regex::new("[^a-z0-9]+").expect("normalizer pattern is a valid regex"));

/// 标识符命名空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Member,
    Group,
}

impl Namespace {
    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::Member => "u",
            Namespace::Group => "g",
        }
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Namespace::Member => write!(f, "member"),
            Namespace::Group => write!(f, "group"),
        }
    }
}

/// 纯函数：同一输入 + 同一命名空间永远得到同一 token
pub fn normalize(raw: &str, namespace: Namespace) -> String {
    let lowered = raw.to_lowercase();
    let body = NORMALIZER.replace_all(&lowered, "_");
    format!("{}_{}", namespace.prefix(), body)
}

/// 单个命名空间内的 token 登记表，用于检测规范化冲突
#[derive(Debug)]
pub struct NameTable {
    namespace: Namespace,
    // token -> 首个登记的原始标识符
    tokens: BTreeMap<String, String>,
}

impl NameTable {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            tokens: BTreeMap::new(),
        }
    }

    /// 登记原始标识符并返回 token
    /// 不同原始标识符落到同一 token 时返回 IdentifierCollision
    pub fn register(&mut self, raw: &str) -> EngineResult<String> {
        let token = normalize(raw, self.namespace);
        match self.tokens.entry(token.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(raw.to_string());
                Ok(token)
            }
            Entry::Occupied(slot) if slot.get() == raw => Ok(token),
            Entry::Occupied(slot) => Err(EngineError::IdentifierCollision {
                namespace: self.namespace,
                token,
                first: slot.get().clone(),
                second: raw.to_string(),
            }),
        }
    }

    pub fn contains_token(&self, token: &str) -> bool {
        self.tokens.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_member() {
        assert_eq!(normalize("Alice O'Brien", Namespace::Member), "u_alice_o_brien");
        assert_eq!(normalize("a.b", Namespace::Member), "u_a_b");
        assert_eq!(normalize("a--__..b", Namespace::Member), "u_a_b");
        assert_eq!(normalize("bob42", Namespace::Member), "u_bob42");
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let first = normalize("Ops Team #1", Namespace::Group);
        let second = normalize("Ops Team #1", Namespace::Group);
        assert_eq!(first, second);
        assert_eq!(first, "g_ops_team_1");
    }

    #[test]
    fn test_namespaces_never_collide() {
        assert_ne!(
            normalize("admins", Namespace::Member),
            normalize("admins", Namespace::Group)
        );
    }

    #[test]
    fn test_non_ascii_collapses() {
        // 非 ASCII 字母同样被折叠
        assert_eq!(normalize("Zoë Ünal", Namespace::Member), "u_zo_nal");
    }

    #[test]
    fn test_name_table_detects_collision() {
        let mut table = NameTable::new(Namespace::Member);
        assert_eq!(table.register("a.b").unwrap(), "u_a_b");
        // 同一原始标识符重复登记不算冲突
        assert_eq!(table.register("a.b").unwrap(), "u_a_b");

        let err = table.register("a-b").unwrap_err();
        match err {
            EngineError::IdentifierCollision { namespace, token, first, second } => {
                assert_eq!(namespace, Namespace::Member);
                assert_eq!(token, "u_a_b");
                assert_eq!(first, "a.b");
                assert_eq!(second, "a-b");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_name_table_case_collision() {
        let mut table = NameTable::new(Namespace::Group);
        table.register("Admins").unwrap();
        assert!(table.register("admins").is_err());
        assert!(table.contains_token("g_admins"));
    }
}
