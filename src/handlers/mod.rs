pub mod subscription;

pub use subscription::subscription_config;
