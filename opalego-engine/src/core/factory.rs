use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use super::model::Base;
use crate::compiler::layout::{DataLayout, FlattenLayout, GroupLayout, Layout};
use crate::error::{EngineError, EngineResult};

/// 默认服务根路径，同时是生成的包名前缀
pub const DEFAULT_SERVICE: &str = "svc";

static SERVICE_ROOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z_][a-z0-9_]*$").expect("service root pattern is a valid regex")
});

/// 服务根直接用作包名的第一段，必须是合法的 Rego 标识符
pub fn validate_root(root: &str) -> EngineResult<()> {
    if !SERVICE_ROOT.is_match(root) {
        return Err(EngineError::InvalidFactory(format!(
            "service root `{root}` must match [a-z_][a-z0-9_]*"
        )));
    }
    Ok(())
}

/// 编译/查询策略
/// 编译器与查询翻译器必须使用同一个值，见 [`Mode::layout`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// 每个成员一个包，角色片段平铺进成员包
    #[default]
    Flatten,
    /// 每个组一个包 + memberships 数据
    Group,
    /// 只生成 memberroles 数据，不生成成员/组包
    Data,
}

impl Mode {
    /// 取该模式的布局策略（渲染与查询寻址在同一个实现里）
    pub fn layout(self) -> &'static dyn Layout {
        match self {
            Mode::Flatten => &FlattenLayout,
            Mode::Group => &GroupLayout,
            Mode::Data => &DataLayout,
        }
    }

    /// 配置文件中使用的整数编码
    pub fn code(self) -> u8 {
        match self {
            Mode::Flatten => 0,
            Mode::Group => 1,
            Mode::Data => 2,
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Flatten => write!(f, "flatten"),
            Mode::Group => write!(f, "group"),
            Mode::Data => write!(f, "data"),
        }
    }
}

impl TryFrom<u64> for Mode {
    type Error = EngineError;

    fn try_from(code: u64) -> EngineResult<Self> {
        match code {
            0 => Ok(Mode::Flatten),
            1 => Ok(Mode::Group),
            2 => Ok(Mode::Data),
            other => Err(EngineError::InvalidMode(other.to_string())),
        }
    }
}

impl FromStr for Mode {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flatten" | "flattenmode" => Ok(Mode::Flatten),
            "group" | "groupmode" => Ok(Mode::Group),
            "data" | "datamode" => Ok(Mode::Data),
            other => other
                .parse::<u64>()
                .map_err(|_| EngineError::InvalidMode(s.to_string()))
                .and_then(Mode::try_from),
        }
    }
}

impl Serialize for Mode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum ModeRepr {
            Code(u64),
            Name(String),
        }

        let parsed = match ModeRepr::deserialize(deserializer)? {
            ModeRepr::Code(code) => Mode::try_from(code),
            ModeRepr::Name(name) => name.parse(),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}

fn default_service() -> String {
    DEFAULT_SERVICE.to_string()
}

/// 进程级编译配置
/// 启动时加载一次，之后只读，编译器与查询翻译器共享同一份
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factory {
    /// Factory 级公共片段，拼接在服务自身片段之前
    #[serde(flatten)]
    pub base: Base,
    /// 角色名 -> Rego 片段
    #[serde(rename = "regoPiece", default)]
    pub rego_piece: BTreeMap<String, String>,
    #[serde(default)]
    pub mode: Mode,
    /// 服务根路径（包名/数据路径的第一段）
    #[serde(default = "default_service")]
    pub service: String,
}

impl Default for Factory {
    fn default() -> Self {
        Self::new(Mode::default())
    }
}

impl Factory {
    pub fn new(mode: Mode) -> Self {
        Self {
            base: Base::default(),
            rego_piece: BTreeMap::new(),
            mode,
            service: default_service(),
        }
    }

    pub fn with_piece(mut self, role: impl Into<String>, rego: impl Into<String>) -> Self {
        self.rego_piece.insert(role.into(), rego.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// 解析并校验 JSON 配置
    pub fn from_json_slice(bytes: &[u8]) -> EngineResult<Self> {
        let factory: Factory = serde_json::from_slice(bytes)?;
        factory.validate()?;
        Ok(factory)
    }

    pub fn validate(&self) -> EngineResult<()> {
        validate_root(&self.service)
    }

    /// 角色对应的片段，未知角色返回 None（静默跳过）
    pub fn piece(&self, role: &str) -> Option<&str> {
        self.rego_piece.get(role).map(String::as_str)
    }
}
