pub mod common;
pub mod cost;
pub mod pagination;
pub mod subscription;

pub use common::*;
pub use cost::*;
pub use pagination::*;
pub use subscription::*;
