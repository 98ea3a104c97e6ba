//! 调试用：把归档解包到检查目录，不参与安装路径
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use crate::error::LegoResult;

pub fn unpack_archive(archive: impl AsRef<Path>, dir: impl AsRef<Path>) -> LegoResult<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let file = File::open(archive.as_ref())?;
    tar::Archive::new(GzDecoder::new(BufReader::new(file))).unpack(dir)?;
    Ok(())
}
