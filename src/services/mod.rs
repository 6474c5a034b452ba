pub mod cost;
pub mod lifecycle;
pub mod price_ledger;
pub mod subscription_service;
pub mod sync_service;

pub use subscription_service::*;
pub use sync_service::*;
