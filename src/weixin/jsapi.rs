use super::{v2api::sign, PayApi, PayConfig, WeixinError};
use crate::core::XmlMap;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde_json::json;

const OAUTH_AUTHORIZE_URL: &str = "https://open.weixin.qq.com/connect/oauth2/authorize";

/// JSAPI channel: 公众号 / 微信内网页支付
pub struct JsApiPay<'a> {
    config: &'a PayConfig,
}

impl<'a> JsApiPay<'a> {
    pub fn new(config: &'a PayConfig) -> Self {
        Self { config }
    }

    /**
     * 网页授权, snsapi_base 静默授权, 回调带上 code
     * https://developers.weixin.qq.com/doc/offiaccount/OA_Web_Apps/Wechat_webpage_authorization.html
     */
    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> String {
        format!(
            "{}?appid={}&redirect_uri={}&response_type=code&scope=snsapi_base&state={}#wechat_redirect",
            OAUTH_AUTHORIZE_URL,
            self.config.app_id,
            utf8_percent_encode(redirect_uri, NON_ALPHANUMERIC),
            utf8_percent_encode(state, NON_ALPHANUMERIC),
        )
    }

    pub async fn resolve_open_id(
        &self,
        api: &dyn PayApi,
        code: &str,
    ) -> Result<String, WeixinError> {
        if code.is_empty() {
            return Err(WeixinError::MalformedRequest("missing oauth code".into()));
        }
        api.exchange_open_id(self.config, code).await
    }

    /**
     * https://pay.weixin.qq.com/wiki/doc/api/jsapi.php?chapter=7_7&index=6
     * paySign 不是统一下单返回的 sign, 需要重新生成
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
        m.insert("appId".into(), appid.clone());
        m.insert("timeStamp".into(), crate::utils::timestamp());
        m.insert("nonceStr".into(), crate::utils::nonce_str(32));
        m.insert("package".into(), format!("prepay_id={}", prepay_id));
        m.insert("signType".into(), self.config.sign_type.as_str().to_string());
        let pay_sign = sign::sign(&m, self.config.sign_type, &self.config.key)?;
        let mut res_json = json!(m);
        res_json["paySign"] = serde_json::Value::String(pay_sign);
        Ok(res_json)
    }
}
