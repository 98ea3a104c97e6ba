//! Bundle 产物：打包（归档/目录）、加载（供进程内求值）、调试解包
pub mod loader;
pub mod packager;
pub mod untar;

pub use loader::{load_archive, load_directory, LoadedBundle};
pub use packager::{Destination, Packager};
pub use untar::unpack_archive;
