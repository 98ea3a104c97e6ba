//! Bundle packager
//! 文件映射 -> gzip 压缩的 tar 流，或普通目录树
//! 写入失败即当前周期失败，半成品不做清理，调用方必须丢弃

use flate2::write::GzEncoder;
use flate2::Compression;
use opalego_engine::FileMapping;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{LegoError, LegoResult};

/// 归档条目固定权限
pub const FILE_MODE: u32 = 0o600;

/// 打包目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// `.tar.gz` 文件
    Archive(PathBuf),
    /// 目录树，父目录按需创建，已有文件直接覆盖
    Directory(PathBuf),
}

impl Destination {
    /// 按扩展名推断：`.tar.gz`/`.tgz` 为归档，其余为目录
    pub fn infer(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Destination::Archive(path)
        } else {
            Destination::Directory(path)
        }
    }
}

fn package_err(path: &str, e: std::io::Error) -> LegoError {
    LegoError::Package(format!("write `{path}`: {e}"))
}

/// 打包器
pub struct Packager;

impl Packager {
    pub fn package(mapping: &FileMapping, destination: &Destination) -> LegoResult<()> {
        match destination {
            Destination::Archive(path) => {
                let mut file = File::create(path).map_err(|e| package_err(&path.display().to_string(), e))?;
                Self::write_archive_file(mapping, &mut file)
            }
            Destination::Directory(root) => Self::write_directory(mapping, root),
        }
    }

    /// 按映射顺序写入 tar 条目，返回底层 writer（gzip 已 finish）
    pub fn write_archive<W: Write>(mapping: &FileMapping, out: W) -> LegoResult<W> {
        let mut builder = tar::Builder::new(GzEncoder::new(out, Compression::default()));

        for (path, content) in mapping {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(FILE_MODE);
            header.set_size(content.len() as u64);
            builder
                .append_data(&mut header, path, content.as_slice())
                .map_err(|e| package_err(path, e))?;
        }

        let encoder = builder
            .into_inner()
            .map_err(|e| package_err("tar trailer", e))?;
        encoder.finish().map_err(|e| package_err("gzip trailer", e))
    }

    /// 写入已打开的文件并落盘
    pub fn write_archive_file(mapping: &FileMapping, file: &mut File) -> LegoResult<()> {
        let writer = Self::write_archive(mapping, BufWriter::new(&mut *file))?;
        writer
            .into_inner()
            .map_err(|e| package_err("archive", e.into_error()))?;
        file.sync_all().map_err(|e| package_err("archive", e))
    }

    pub fn write_directory(mapping: &FileMapping, root: &Path) -> LegoResult<()> {
        for (path, content) in mapping {
            let target = root.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| package_err(path, e))?;
            }
            fs::write(&target, content).map_err(|e| package_err(path, e))?;
        }
        Ok(())
    }
}
