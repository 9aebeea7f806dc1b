mod app;
mod jsapi;
mod notify;
pub mod v2api;

mod config {
    use serde::Deserialize;
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
    pub enum SignType {
        #[default]
        #[serde(rename = "MD5")]
        Md5,
        #[serde(rename = "HMAC-SHA256")]
        HmacSha256,
    }

    impl SignType {
        pub fn as_str(&self) -> &'static str {
            match self {
                SignType::Md5 => "MD5",
                SignType::HmacSha256 => "HMAC-SHA256",
            }
        }
    }

    impl FromStr for SignType {
        type Err = String;
        fn from_str(s: &str) -> Result<Self, Self::Err> {
            let val = serde_json::Value::String(s.to_string());
            let sign_type = serde_json::from_value::<SignType>(val)
                .map_err(|e| format!("error parsing SignType from string: {:?}", e))?;
            Ok(sign_type)
        }
    }

    /// 商户配置, 构造之后不再修改
    #[derive(Debug, Clone, Deserialize)]
    pub struct PayConfig {
        pub app_id: String,     // 公众号 / 开放平台 app id
        pub app_secret: String, // 换取 openid 用
        pub mch_id: String,     // 微信支付商户号
        pub key: String,        // 支付密钥
        pub notify_url: String, // 异步通知地址
        #[serde(default)]
        pub return_url: Option<String>, // 前端跳转地址
        #[serde(default)]
        pub sign_type: SignType,
    }

    impl PayConfig {
        pub fn validate(&self) -> Result<(), String> {
            let required = [
                ("app_id", &self.app_id),
                ("app_secret", &self.app_secret),
                ("mch_id", &self.mch_id),
                ("key", &self.key),
                ("notify_url", &self.notify_url),
            ];
            let missing = required
                .iter()
                .filter(|(_, v)| v.trim().is_empty())
                .map(|(k, _)| *k)
                .collect::<Vec<&str>>();
            if !missing.is_empty() {
                return Err(format!("empty pay config fields: {}", missing.join(", ")));
            }
            Ok(())
        }

        pub fn from_env() -> Result<Self, String> {
            fn var(name: &str) -> String {
                std::env::var(name).unwrap_or_default()
            }
            let sign_type = match std::env::var("WXPAY_SIGN_TYPE") {
                Ok(s) if !s.is_empty() => SignType::from_str(&s)?,
                _ => SignType::default(),
            };
            let config = Self {
                app_id: var("WXPAY_APP_ID"),
                app_secret: var("WXPAY_APP_SECRET"),
                mch_id: var("WXPAY_MCH_ID"),
                key: var("WXPAY_KEY"),
                notify_url: var("WXPAY_NOTIFY_URL"),
                return_url: std::env::var("WXPAY_RETURN_URL")
                    .ok()
                    .filter(|s| !s.is_empty()),
                sign_type,
            };
            config.validate()?;
            Ok(config)
        }
    }
}

mod error {
    use crate::core::PayError;
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum WeixinError {
        #[error("[Malformed Weixin Request] {0}")]
        MalformedRequest(String),
        #[error("[Failed Communicating Weixin API] {0}")]
        ApiError(String),
        #[error("[Invalid Weixin Channel Params] {0}")]
        InvalidConfig(String),
        #[error("[Unexpected Weixin Error] {0}")]
        Unexpected(String),
    }

    impl From<openssl::error::ErrorStack> for WeixinError {
        fn from(e: openssl::error::ErrorStack) -> Self {
            WeixinError::Unexpected(format!("[openssl] {:?}", e))
        }
    }

    impl From<reqwest::Error> for WeixinError {
        fn from(e: reqwest::Error) -> Self {
            WeixinError::ApiError(format!("[http] {}", e))
        }
    }

    impl From<WeixinError> for PayError {
        fn from(e: WeixinError) -> PayError {
            tracing::error!("{:?}", e);
            match e {
                WeixinError::MalformedRequest(e) => PayError::MalformedRequest(e),
                WeixinError::ApiError(e) => PayError::InternalError(e),
                WeixinError::InvalidConfig(e) => PayError::InvalidConfig(e),
                WeixinError::Unexpected(e) => PayError::InternalError(e),
            }
        }
    }
}

pub use app::AppPay;
pub use config::*;
pub use error::*;
pub use jsapi::JsApiPay;
pub use notify::{NotificationPayload, NotifyReply};
pub use v2api::{PayApi, V2Client};
