pub mod core;
pub mod gateway;
pub mod routes;
pub mod utils;
pub mod weixin;

pub use gateway::WechatPay;
