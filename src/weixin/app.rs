use super::{v2api::sign, PayConfig, WeixinError};
use crate::core::XmlMap;
use serde_json::json;

/// APP channel: 移动应用调起微信支付 SDK
pub struct AppPay<'a> {
    config: &'a PayConfig,
}

impl<'a> AppPay<'a> {
    pub fn new(config: &'a PayConfig) -> Self {
        Self { config }
    }

    /**
     * https://pay.weixin.qq.com/wiki/doc/api/app/app.php?chapter=9_12&index=2
     */
    pub fn parameters(&self, unified_order: &XmlMap) -> Result<serde_json::Value, WeixinError> {
        let (appid, prepay_id) = match (
            unified_order.get("appid").filter(|v| !v.is_empty()),
            unified_order.get("prepay_id").filter(|v| !v.is_empty()),
        ) {
            (Some(appid), Some(prepay_id)) => (appid, prepay_id),
            _ => {
                return Err(WeixinError::ApiError(
                    "unified order result missing appid or prepay_id".into(),
                ))
            }
        };
        let mut m = XmlMap::new();
        m.insert("appid".into(), appid.clone());
        m.insert("partnerid".into(), self.config.mch_id.clone());
        m.insert("prepayid".into(), prepay_id.clone());
        m.insert("package".into(), "Sign=WXPay".into());
        m.insert("noncestr".into(), crate::utils::nonce_str(32));
        m.insert("timestamp".into(), crate::utils::timestamp());
        let signature = sign::sign(&m, self.config.sign_type, &self.config.key)?;
        m.insert("sign".into(), signature);
        Ok(json!(m))
    }
}
