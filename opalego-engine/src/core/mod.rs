mod factory;
mod model;

// 导出常用项
pub use factory::{validate_root, Factory, Mode, DEFAULT_SERVICE};
pub use model::{Base, FileMapping, Group, Manifest, Member, Service};
