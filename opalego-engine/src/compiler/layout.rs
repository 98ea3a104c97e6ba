//! Layout strategies
//! 每种模式一个实现，同一个实现里既决定"编译器生成什么路径"，
//! 也决定"查询翻译器寻址什么路径"，两者只能一起改

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use super::{package_name, NormalizedService, RenderContext};
use crate::core::{FileMapping, Mode};
use crate::error::EngineResult;

/// 查询结果绑定的变量名
pub const BINDING: &str = "x";
/// DataMode 下注入到 input 的主体字段
pub const UID_INPUT: &str = "uid";

pub const MEMBERS_DIR: &str = "members";
pub const GROUPS_DIR: &str = "groups";
pub const MEMBERSHIPS: &str = "memberships";
pub const MEMBERROLES: &str = "memberroles";

/// `<root>/members/<token>`
pub fn member_dir(root: &str, token: &str) -> String {
    format!("{root}/{MEMBERS_DIR}/{token}")
}

/// `<root>/groups/<token>`
pub fn group_dir(root: &str, token: &str) -> String {
    format!("{root}/{GROUPS_DIR}/{token}")
}

/// 去掉 rule 为空时留下的尾部 `.`
fn trim_path(query: String) -> String {
    query.trim_end_matches('.').to_string()
}

/// 布局策略
pub trait Layout: Send + Sync {
    fn mode(&self) -> Mode;

    /// 渲染该模式特有的文件（服务根包与清单由编译器负责）
    fn render(
        &self,
        ctx: &RenderContext<'_>,
        service: &NormalizedService<'_>,
        out: &mut FileMapping,
    ) -> EngineResult<()>;

    /// 生成查询串；需要额外输入时写入 `input`
    /// `uid` 已经过成员命名空间规范化
    fn address(&self, root: &str, uid: &str, rule: &str, input: &mut Map<String, Value>) -> String;
}

/// 每个成员一个包，有效角色片段平铺进去
pub struct FlattenLayout;

impl Layout for FlattenLayout {
    fn mode(&self) -> Mode {
        Mode::Flatten
    }

    fn render(
        &self,
        ctx: &RenderContext<'_>,
        service: &NormalizedService<'_>,
        out: &mut FileMapping,
    ) -> EngineResult<()> {
        for (token, member) in &service.members {
            let path = ctx.render_base(out, &member_dir(ctx.root, token), &member.member.base)?;
            ctx.append_roles(out, &path, service.effective_roles(member));
        }
        Ok(())
    }

    fn address(&self, root: &str, uid: &str, rule: &str, _input: &mut Map<String, Value>) -> String {
        let package = package_name(&member_dir(root, uid));
        trim_path(format!("{BINDING} := data.{package}.{rule}"))
    }
}

/// 每个组一个包 + memberships 数据；成员可能属于多个组，查询聚合为列表
pub struct GroupLayout;

impl Layout for GroupLayout {
    fn mode(&self) -> Mode {
        Mode::Group
    }

    fn render(
        &self,
        ctx: &RenderContext<'_>,
        service: &NormalizedService<'_>,
        out: &mut FileMapping,
    ) -> EngineResult<()> {
        for (token, group) in &service.groups {
            let path = ctx.render_base(out, &group_dir(ctx.root, token), &group.base)?;
            let roles: BTreeSet<&str> = group.roles.iter().map(String::as_str).collect();
            ctx.append_roles(out, &path, roles);
        }

        let memberships: BTreeMap<&str, &[String]> = service
            .members
            .iter()
            .map(|(token, member)| (token.as_str(), member.groups.as_slice()))
            .collect();
        ctx.write_data(out, MEMBERSHIPS, &memberships)
    }

    fn address(&self, root: &str, uid: &str, rule: &str, _input: &mut Map<String, Value>) -> String {
        let groups = package_name(&format!("{root}/{GROUPS_DIR}"));
        let memberships = package_name(&format!("{root}/{MEMBERSHIPS}"));
        let each = trim_path(format!("y := data.{groups}[data.{memberships}.{uid}[_]].{rule}"));
        format!("{BINDING} := [y | {each}]")
    }
}

/// 只生成 memberroles 数据，规则由服务根包自己根据 input.uid 判断
pub struct DataLayout;

impl Layout for DataLayout {
    fn mode(&self) -> Mode {
        Mode::Data
    }

    fn render(
        &self,
        ctx: &RenderContext<'_>,
        service: &NormalizedService<'_>,
        out: &mut FileMapping,
    ) -> EngineResult<()> {
        let memberroles: BTreeMap<&str, Vec<&str>> = service
            .members
            .iter()
            .map(|(token, member)| (token.as_str(), service.effective_roles(member).into_iter().collect()))
            .collect();
        ctx.write_data(out, MEMBERROLES, &memberroles)
    }

    fn address(&self, root: &str, uid: &str, rule: &str, input: &mut Map<String, Value>) -> String {
        input.insert(UID_INPUT.to_string(), Value::String(uid.to_string()));
        trim_path(format!("{BINDING} := data.{}.{rule}", package_name(root)))
    }
}
