//! 编译 -> 翻译 -> 求值 的往返测试，覆盖所有模式

use opalego::{
    compile, translate, Base, EngineError, Factory, FileMapping, Group, LoadedBundle, Member, Mode,
    QueryOption, Service,
};
use opalego::client::local::evaluate;
use serde_json::{json, Map, Value};

fn member(roles: &[&str], groups: &[&str]) -> Member {
    Member {
        base: Base::default(),
        roles: roles.iter().map(|s| s.to_string()).collect(),
        groups: groups.iter().map(|s| s.to_string()).collect(),
    }
}

fn org() -> Service {
    let mut service = Service::default();
    service.base.rego = "default deny := false".into();
    service.members.insert("Alice O'Brien".into(), member(&["read"], &["Ops"]));
    service.members.insert("bob".into(), member(&[], &["Ops", "gone"]));
    service.members.insert("carol".into(), member(&["nope"], &[]));
    service.groups.insert(
        "Ops".into(),
        Group {
            base: Base::new("team := \"ops\""),
            roles: vec!["deploy".into()],
        },
    );
    service
}

fn factory(mode: Mode) -> Factory {
    let factory = Factory::new(mode)
        .with_piece("read", "can_read := true")
        .with_piece("deploy", "can_deploy := true");
    if mode == Mode::Data {
        // DataMode 的规则写在服务根包里，根据 input.uid 查 memberroles
        return Factory {
            base: Base::new(
                "can_read { data.svc.memberroles[input.uid][_] == \"read\" }\n\
                 can_deploy { data.svc.memberroles[input.uid][_] == \"deploy\" }",
            ),
            ..factory
        };
    }
    factory
}

/// 查询串中 `data.` 之后、规则名之前的包路径
fn addressed_packages(query: &str) -> Vec<String> {
    query
        .split("data.")
        .skip(1)
        .map(|rest| {
            rest.split(|c: char| c == '[' || c == ']' || c.is_whitespace())
                .next()
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

/// 包路径要么对应生成的目录，要么落在某个 data.json 的数据树里
fn path_exists(files: &FileMapping, data: &Value, package: &str) -> bool {
    let dir = package.replace('.', "/");
    files.keys().any(|path| path.starts_with(&format!("{dir}/")))
        || data.pointer(&format!("/{dir}")).is_some()
}

#[test]
fn test_translated_paths_exist_in_every_mode() {
    for mode in [Mode::Flatten, Mode::Group, Mode::Data] {
        let factory = factory(mode);
        let files = compile(&org(), &factory).unwrap();
        let bundle = LoadedBundle::from_mapping(files.clone()).unwrap();

        for uid in ["Alice O'Brien", "bob"] {
            let translated = translate(&factory, uid, "", &Map::new());
            let packages = addressed_packages(&translated.query);
            assert!(!packages.is_empty(), "{mode}: {}", translated.query);
            for package in packages {
                assert!(path_exists(&files, &bundle.data, &package), "{mode}: `{package}` missing from {:?}", files.keys());
            }
        }
    }
}

#[test]
fn test_mode_specific_data_files() {
    let data_files = |mode: Mode| -> Vec<String> {
        compile(&org(), &factory(mode))
            .unwrap()
            .into_keys()
            .filter(|p| p.ends_with("data.json"))
            .collect()
    };

    assert!(data_files(Mode::Flatten).is_empty());
    assert_eq!(data_files(Mode::Group), vec!["svc/memberships/data.json".to_string()]);
    assert_eq!(data_files(Mode::Data), vec!["svc/memberroles/data.json".to_string()]);
}

#[test]
fn test_alice_example() {
    let mut service = Service::default();
    service.members.insert("Alice O'Brien".into(), member(&["read"], &[]));
    let factory = Factory::new(Mode::Flatten).with_piece("read", "allow { true }");

    let files = compile(&service, &factory).unwrap();
    let main = String::from_utf8(files["svc/members/u_alice_o_brien/main.rego"].clone()).unwrap();
    assert!(main.contains("package svc.members.u_alice_o_brien"));
    assert!(main.contains("allow { true }"));

    let translated = QueryOption::new("Alice O'Brien", "allow").translate(&factory);
    assert!(translated.query.ends_with("members.u_alice_o_brien.allow"));
}

#[test]
fn test_colliding_members_fail_compile() {
    let mut service = Service::default();
    service.members.insert("a.b".into(), member(&["read"], &[]));
    service.members.insert("a-b".into(), member(&["read"], &[]));

    let err = compile(&service, &Factory::new(Mode::Flatten)).unwrap_err();
    assert!(matches!(err, EngineError::IdentifierCollision { ref token, .. } if token == "u_a_b"));
}

fn eval(mode: Mode, uid: &str, rule: &str) -> Option<Value> {
    let factory = factory(mode);
    let bundle = LoadedBundle::from_mapping(compile(&org(), &factory).unwrap()).unwrap();
    let translated = translate(&factory, uid, rule, &Map::new());
    evaluate(&bundle, &translated.query, &translated.input, false).unwrap()
}

#[test]
fn test_flatten_evaluation() {
    assert_eq!(eval(Mode::Flatten, "Alice O'Brien", "can_read"), Some(json!(true)));
    assert_eq!(eval(Mode::Flatten, "Alice O'Brien", "can_deploy"), Some(json!(true)));
    assert_eq!(eval(Mode::Flatten, "bob", "can_deploy"), Some(json!(true)));
    assert_eq!(eval(Mode::Flatten, "bob", "can_read"), None);
    // 未知角色被忽略
    assert_eq!(eval(Mode::Flatten, "carol", "can_read"), None);
}

#[test]
fn test_group_evaluation_aggregates() {
    assert_eq!(eval(Mode::Group, "bob", "can_deploy"), Some(json!([true])));
    assert_eq!(eval(Mode::Group, "bob", "team"), Some(json!(["ops"])));
    assert_eq!(eval(Mode::Group, "carol", "can_deploy"), Some(json!([])));
}

#[test]
fn test_data_evaluation_uses_input_uid() {
    assert_eq!(eval(Mode::Data, "Alice O'Brien", "can_read"), Some(json!(true)));
    assert_eq!(eval(Mode::Data, "bob", "can_deploy"), Some(json!(true)));
    assert_eq!(eval(Mode::Data, "bob", "can_read"), None);
    assert_eq!(eval(Mode::Data, "carol", "deny"), Some(json!(false)));
}
