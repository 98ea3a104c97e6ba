//! Bundle loader
//! 把打包产物读回内存，得到进程内求值用的 [`LoadedBundle`]
//! 与 OPA 的 bundle 加载规则一致：`.manifest` 必须存在，文件必须落在 roots 之内，
//! `*.rego` 为策略模块，`data.json` 按所在目录挂到数据树上

use flate2::read::GzDecoder;
use opalego_engine::{FileMapping, Manifest, MANIFEST_FILE};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use walkdir::WalkDir;

use crate::error::{LegoError, LegoResult};

const DATA_FILE: &str = "data.json";
const REGO_SUFFIX: &str = ".rego";

fn install_err(msg: impl Into<String>) -> LegoError {
    LegoError::Install(msg.into())
}

/// 已加载的 bundle 快照，安装后只读
pub struct LoadedBundle {
    pub roots: Vec<String>,
    /// 路径 -> Rego 源码
    pub modules: BTreeMap<String, String>,
    /// 合并后的数据树
    pub data: Value,
    // 模块与数据已载入的引擎；Engine 不保证 Sync，只在取副本时短暂加锁
    engine: Mutex<regorus::Engine>,
}

impl fmt::Debug for LoadedBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedBundle")
            .field("roots", &self.roots)
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LoadedBundle {
    /// 预加载引擎的副本，每次查询各用一份，互不影响
    pub fn engine(&self) -> regorus::Engine {
        self.engine.lock().clone()
    }

    /// 从文件映射构建并校验
    pub fn from_mapping(files: FileMapping) -> LegoResult<Self> {
        let manifest = files
            .get(MANIFEST_FILE)
            .ok_or_else(|| install_err("bundle has no .manifest"))?;
        let manifest: Manifest = serde_json::from_slice(manifest)
            .map_err(|e| install_err(format!("invalid .manifest: {e}")))?;

        let mut modules = BTreeMap::new();
        let mut data = Value::Object(Map::new());

        for (path, content) in files {
            if path == MANIFEST_FILE {
                continue;
            }
            if !within_roots(&path, &manifest.roots) {
                return Err(install_err(format!("`{path}` is outside of manifest roots {:?}", manifest.roots)));
            }

            if path.ends_with(REGO_SUFFIX) {
                let source = String::from_utf8(content)
                    .map_err(|_| install_err(format!("`{path}` is not valid UTF-8")))?;
                modules.insert(path, source);
            } else if path == DATA_FILE || path.ends_with(&format!("/{DATA_FILE}")) {
                let value: Value = serde_json::from_slice(&content)
                    .map_err(|e| install_err(format!("`{path}` is not valid JSON: {e}")))?;
                let dir = path.trim_end_matches(DATA_FILE).trim_end_matches('/');
                let segments: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
                merge_at(&mut data, &segments, value);
            } else {
                tracing::debug!(path = %path, "ignoring non-bundle file");
            }
        }

        let engine = prepare_engine(&modules, &data)?;
        Ok(Self {
            roots: manifest.roots,
            modules,
            data,
            engine: Mutex::new(engine),
        })
    }
}

/// 安装时一次性解析所有模块并载入数据，语法错误在安装阶段暴露
fn prepare_engine(modules: &BTreeMap<String, String>, data: &Value) -> LegoResult<regorus::Engine> {
    let mut engine = regorus::Engine::new();
    for (path, source) in modules {
        engine
            .add_policy(path.clone(), source.clone())
            .map_err(|e| install_err(format!("`{path}` rejected by policy engine: {e}")))?;
    }
    let data = regorus::Value::from_json_str(&serde_json::to_string(data)?)
        .map_err(|e| install_err(format!("data tree rejected by policy engine: {e}")))?;
    engine
        .add_data(data)
        .map_err(|e| install_err(format!("data tree rejected by policy engine: {e}")))?;
    Ok(engine)
}

fn within_roots(path: &str, roots: &[String]) -> bool {
    roots.iter().any(|root| {
        root.is_empty() || path == root.as_str() || path.starts_with(&format!("{root}/"))
    })
}

/// 在 `segments` 路径处合并 JSON 值，两侧都是对象时逐键合并
fn merge_at(target: &mut Value, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        merge_value(target, value);
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        let child = map
            .entry(head.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        merge_at(child, rest, value);
    }
}

fn merge_value(target: &mut Value, value: Value) {
    match (target, value) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(&key) {
                    Some(slot) => merge_value(slot, value),
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// 读取 `.tar.gz` bundle
pub fn load_archive(path: impl AsRef<Path>) -> LegoResult<LoadedBundle> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| install_err(format!("open `{}`: {e}", path.display())))?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));

    let mut files = FileMapping::new();
    let entries = archive
        .entries()
        .map_err(|e| install_err(format!("read `{}`: {e}", path.display())))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| install_err(format!("corrupted archive: {e}")))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry
            .path()
            .map_err(|e| install_err(format!("bad entry path: {e}")))?
            .to_string_lossy()
            .trim_start_matches("./")
            .trim_start_matches('/')
            .to_string();
        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|e| install_err(format!("read `{name}`: {e}")))?;
        files.insert(name, content);
    }

    LoadedBundle::from_mapping(files)
}

/// 读取目录形式的 bundle
pub fn load_directory(dir: impl AsRef<Path>) -> LegoResult<LoadedBundle> {
    let dir = dir.as_ref();
    let mut files = FileMapping::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| install_err(format!("walk `{}`: {e}", dir.display())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| install_err(e.to_string()))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        files.insert(relative, std::fs::read(entry.path())?);
    }
    LoadedBundle::from_mapping(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{Destination, Packager};

    fn mapping() -> FileMapping {
        let mut files = FileMapping::new();
        files.insert(".manifest".into(), br#"{"roots":["svc"]}"#.to_vec());
        files.insert("svc/main.rego".into(), b"package svc\ndefault allow = false\n".to_vec());
        files.insert("svc/extra/data.json".into(), br#"{"tier":"gold"}"#.to_vec());
        files.insert("svc/memberships/data.json".into(), br#"{"u_a":["g_ops"]}"#.to_vec());
        files
    }

    #[test]
    fn test_from_mapping_builds_data_tree() {
        let bundle = LoadedBundle::from_mapping(mapping()).unwrap();
        assert_eq!(bundle.roots, vec!["svc"]);
        assert_eq!(bundle.modules.len(), 1);
        assert_eq!(
            bundle.data,
            serde_json::json!({"svc": {"extra": {"tier": "gold"}, "memberships": {"u_a": ["g_ops"]}}})
        );

        // 预加载的引擎已包含数据，查询无需重新解析
        let mut engine = bundle.engine();
        let results = engine.eval_query("x := data.svc.extra.tier".to_string(), false).unwrap();
        let bindings: Value =
            serde_json::from_str(&results.result[0].bindings.to_json_str().unwrap()).unwrap();
        assert_eq!(bindings["x"], "gold");
    }

    #[test]
    fn test_missing_manifest_rejected() {
        let mut files = mapping();
        files.remove(".manifest");
        let err = LoadedBundle::from_mapping(files).unwrap_err();
        assert!(matches!(err, LegoError::Install(_)));
    }

    #[test]
    fn test_file_outside_roots_rejected() {
        let mut files = mapping();
        files.insert("other/main.rego".into(), b"package other\n".to_vec());
        assert!(LoadedBundle::from_mapping(files).is_err());
    }

    #[test]
    fn test_bad_policy_rejected() {
        let mut files = mapping();
        files.insert("svc/broken/main.rego".into(), b"package svc.broken\nallow {{{\n".to_vec());
        let err = LoadedBundle::from_mapping(files).unwrap_err();
        assert!(matches!(err, LegoError::Install(_)));
    }

    #[test]
    fn test_archive_and_directory_load_identically() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.tar.gz");
        let tree = dir.path().join("tree");
        Packager::package(&mapping(), &Destination::Archive(archive.clone())).unwrap();
        Packager::package(&mapping(), &Destination::Directory(tree.clone())).unwrap();

        let from_archive = load_archive(&archive).unwrap();
        let from_tree = load_directory(&tree).unwrap();
        assert_eq!(from_archive.modules, from_tree.modules);
        assert_eq!(from_archive.data, from_tree.data);
    }
}
