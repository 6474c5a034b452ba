pub mod subscription_prices;
pub mod subscriptions;

pub use subscription_prices as subscription_price_entity;
pub use subscriptions as subscription_entity;
