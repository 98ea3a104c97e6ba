//! Bundle compiler
//! 声明式模型 -> 文件映射（相对路径 -> 内容）
//! 公共部分（服务根包、extra 数据、.manifest）在这里生成，
//! 按模式变化的部分交给 [`layout::Layout`] 实现

pub mod layout;

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::core::{validate_root, Base, Factory, FileMapping, Group, Manifest, Member, Service};
use crate::error::{EngineError, EngineResult};
use crate::normalizer::{normalize, NameTable, Namespace};

/// 策略源文件扩展名
pub const REGO_EXT: &str = "rego";
/// 结构化数据文件名
pub const DATA_FILE: &str = "data.json";
/// 清单文件路径（bundle 根目录）
pub const MANIFEST_FILE: &str = ".manifest";

/// 包目录下的策略文件路径
pub fn main_path(dir: &str) -> String {
    format!("{dir}/main.{REGO_EXT}")
}

/// 包目录下某个数据目录的 data.json 路径
pub fn data_path(dir: &str, name: &str) -> String {
    format!("{dir}/{name}/{DATA_FILE}")
}

/// 路径 -> 包名（`svc/members/u_a` -> `svc.members.u_a`）
pub fn package_name(dir: &str) -> String {
    dir.replace('/', ".")
}

/// 已规范化的成员
#[derive(Debug)]
pub struct NormalizedMember<'a> {
    pub raw_id: &'a str,
    pub member: &'a Member,
    /// 规范化后且在模型中仍然存在的组，保持声明顺序、去重
    pub groups: Vec<String>,
}

/// 已规范化的服务：成员/组以 token 为键
/// 两个命名空间内的冲突在构造时检测
#[derive(Debug)]
pub struct NormalizedService<'a> {
    pub base: &'a Base,
    pub members: BTreeMap<String, NormalizedMember<'a>>,
    pub groups: BTreeMap<String, &'a Group>,
}

impl<'a> NormalizedService<'a> {
    pub fn new(service: &'a Service) -> EngineResult<Self> {
        let mut group_names = NameTable::new(Namespace::Group);
        let mut groups = BTreeMap::new();
        for (raw_id, group) in &service.groups {
            let token = group_names.register(raw_id)?;
            groups.insert(token, group);
        }

        let mut member_names = NameTable::new(Namespace::Member);
        let mut members = BTreeMap::new();
        for (raw_id, member) in &service.members {
            let token = member_names.register(raw_id)?;

            let mut joined: Vec<String> = Vec::with_capacity(member.groups.len());
            for group_ref in &member.groups {
                let group_token = normalize(group_ref, Namespace::Group);
                if !group_names.contains_token(&group_token) {
                    log::debug!("member `{raw_id}` references missing group `{group_ref}`, ignored");
                    continue;
                }
                if !joined.contains(&group_token) {
                    joined.push(group_token);
                }
            }

            members.insert(
                token,
                NormalizedMember {
                    raw_id: raw_id.as_str(),
                    member,
                    groups: joined,
                },
            );
        }

        Ok(Self {
            base: &service.base,
            members,
            groups,
        })
    }

    /// 有效角色 = 自身角色 ∪ 所属且仍存在的组的角色
    pub fn effective_roles(&self, member: &NormalizedMember<'a>) -> BTreeSet<&'a str> {
        let mut roles: BTreeSet<&'a str> = member.member.roles.iter().map(String::as_str).collect();
        for group_token in &member.groups {
            if let Some(&group) = self.groups.get(group_token) {
                roles.extend(group.roles.iter().map(String::as_str));
            }
        }
        roles
    }
}

/// 渲染上下文：当前服务根 + 共享配置
pub struct RenderContext<'f> {
    pub root: &'f str,
    pub factory: &'f Factory,
}

impl RenderContext<'_> {
    /// 写入 `<dir>/main.rego`（包声明 + 片段）以及可选的 extra 数据，返回策略文件路径
    pub fn render_base(&self, out: &mut FileMapping, dir: &str, base: &Base) -> EngineResult<String> {
        let path = main_path(dir);
        let source = format!("package {}\n{}\n", package_name(dir), base.rego);
        out.insert(path.clone(), source.into_bytes());

        if let Some(extra) = base.extra.as_ref().filter(|m| !m.is_empty()) {
            out.insert(data_path(dir, "extra"), json_bytes(extra)?);
        }
        Ok(path)
    }

    /// 按角色名追加片段，未知角色静默跳过
    pub fn append_roles<'r>(
        &self,
        out: &mut FileMapping,
        path: &str,
        roles: impl IntoIterator<Item = &'r str>,
    ) {
        let Some(buf) = out.get_mut(path) else {
            return;
        };
        for role in roles {
            match self.factory.piece(role) {
                Some(piece) => {
                    buf.extend_from_slice(piece.as_bytes());
                    buf.push(b'\n');
                }
                None => log::debug!("role `{role}` has no rego piece, skipped"),
            }
        }
    }

    /// 写入 `<root>/<name>/data.json`
    pub fn write_data<T: Serialize>(&self, out: &mut FileMapping, name: &str, value: &T) -> EngineResult<()> {
        out.insert(data_path(self.root, name), json_bytes(value)?);
        Ok(())
    }
}

/// JSON 编码，末尾带换行
pub(crate) fn json_bytes<T: Serialize + ?Sized>(value: &T) -> EngineResult<Vec<u8>> {
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Bundle 编译器
pub struct BundleCompiler<'f> {
    factory: &'f Factory,
}

impl<'f> BundleCompiler<'f> {
    pub fn new(factory: &'f Factory) -> Self {
        Self { factory }
    }

    /// 单服务编译，根路径取 `factory.service`
    pub fn compile(&self, service: &Service) -> EngineResult<FileMapping> {
        self.compile_services([(self.factory.service.as_str(), service)])
    }

    /// 多服务编译到同一个 bundle，清单列出所有根
    pub fn compile_services<'s>(
        &self,
        services: impl IntoIterator<Item = (&'s str, &'s Service)>,
    ) -> EngineResult<FileMapping> {
        let mut out = FileMapping::new();
        let mut manifest = Manifest::default();

        for (root, service) in services {
            validate_root(root)?;
            if manifest.roots.iter().any(|r| r == root) {
                return Err(EngineError::InvalidFactory(format!("service root `{root}` listed twice")));
            }
            self.compile_one(&mut out, root, service)?;
            manifest.roots.push(root.to_string());
        }

        out.insert(MANIFEST_FILE.to_string(), json_bytes(&manifest)?);

        log::debug!(
            "bundle compiled: mode={}, roots={}, files={}",
            self.factory.mode,
            manifest.roots.len(),
            out.len()
        );
        Ok(out)
    }

    fn compile_one(&self, out: &mut FileMapping, root: &str, service: &Service) -> EngineResult<()> {
        let normalized = NormalizedService::new(service)?;
        let ctx = RenderContext {
            root,
            factory: self.factory,
        };

        let root_base = self.merged_root_base(service);
        ctx.render_base(out, root, &root_base)?;

        self.factory.mode.layout().render(&ctx, &normalized, out)
    }

    /// Factory 级片段与服务片段合并：Rego 前后拼接，extra 以服务为准覆盖
    fn merged_root_base(&self, service: &Service) -> Base {
        let shared = &self.factory.base;
        if shared.rego.is_empty() && !shared.has_extra() {
            return service.base.clone();
        }

        let rego = match (shared.rego.is_empty(), service.base.rego.is_empty()) {
            (true, _) => service.base.rego.clone(),
            (false, true) => shared.rego.clone(),
            (false, false) => format!("{}\n{}", shared.rego, service.base.rego),
        };

        let mut extra: Map<String, Value> = shared.extra.clone().unwrap_or_default();
        if let Some(own) = &service.base.extra {
            extra.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        Base {
            rego,
            extra: Some(extra),
        }
    }
}

/// 便捷入口
pub fn compile(service: &Service, factory: &Factory) -> EngineResult<FileMapping> {
    BundleCompiler::new(factory).compile(service)
}
