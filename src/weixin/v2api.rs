use super::{PayConfig, WeixinError};
use crate::core::{TradeType, UnifiedOrderRequest, XmlMap};
use async_trait::async_trait;
use quick_xml::events::Event;

pub const API_BASE: &str = "https://api.mch.weixin.qq.com";
pub const OAUTH_BASE: &str = "https://api.weixin.qq.com";

pub mod sign {
    use super::super::{SignType, WeixinError};
    use crate::core::XmlMap;
    use openssl::{hash::MessageDigest, pkey::PKey, sign::Signer};

    /**
     * https://pay.weixin.qq.com/wiki/doc/api/jsapi.php?chapter=4_3
     * 除 sign 以外的非空字段按 key 排序后拼接, 末尾加 &key=
     */
    pub fn sign(m: &XmlMap, sign_type: SignType, sign_key: &str) -> Result<String, WeixinError> {
        let query_list = m
            .iter()
            .filter(|(k, v)| k.as_str() != "sign" && !v.is_empty())
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<String>>();
        let sign_sorted_source = format!("{}&key={}", query_list.join("&"), sign_key);
        let signature = match sign_type {
            SignType::Md5 => {
                let digest = md5::compute(sign_sorted_source.as_bytes());
                format!("{:x}", digest).to_uppercase()
            }
            SignType::HmacSha256 => {
                let pkey = PKey::hmac(sign_key.as_bytes())?;
                let mut signer = Signer::new(MessageDigest::sha256(), &pkey)?;
                signer.update(sign_sorted_source.as_bytes())?;
                data_encoding::HEXUPPER.encode(&signer.sign_to_vec()?)
            }
        };
        Ok(signature)
    }

    pub fn verify(m: &XmlMap, sign_type: SignType, sign_key: &str) -> Result<bool, WeixinError> {
        let signature = m
            .get("sign")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| WeixinError::MalformedRequest("missing sign".into()))?;
        let expected = sign(m, sign_type, sign_key)?;
        Ok(expected.len() == signature.len()
            && openssl::memcmp::eq(expected.as_bytes(), signature.as_bytes()))
    }
}

/// Parses a flat `<xml><k>v</k>...</xml>` document. Both CDATA and escaped
/// text values are accepted; elements nested below the first level are ignored.
/// Field values are kept verbatim, whitespace included.
pub fn parse_xml(payload: &str) -> Result<XmlMap, WeixinError> {
    fn malformed(e: impl std::fmt::Display) -> WeixinError {
        WeixinError::MalformedRequest(format!("error parsing xml: {}", e))
    }

    let mut m = XmlMap::new();
    let mut parser = quick_xml::Reader::from_str(payload);
    let mut depth = 0usize;
    let mut seen_root = false;
    let mut current: Option<String> = None;
    loop {
        match parser.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                match depth {
                    1 => seen_root = true,
                    2 => {
                        let key = String::from_utf8(e.name().as_ref().to_vec()).map_err(malformed)?;
                        m.insert(key.clone(), String::new());
                        current = Some(key);
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => match depth {
                0 => seen_root = true,
                1 => {
                    let key = String::from_utf8(e.name().as_ref().to_vec()).map_err(malformed)?;
                    m.insert(key, String::new());
                }
                _ => {}
            },
            Ok(Event::End(_)) => {
                if depth == 2 {
                    current = None;
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Text(text)) if depth == 2 => {
                if let Some(value) = current.as_ref().and_then(|k| m.get_mut(k)) {
                    value.push_str(&text.unescape().map_err(malformed)?);
                }
            }
            Ok(Event::CData(cdata)) if depth == 2 => {
                if let Some(value) = current.as_ref().and_then(|k| m.get_mut(k)) {
                    let text = String::from_utf8(cdata.into_inner().into_owned()).map_err(malformed)?;
                    value.push_str(&text);
                }
            }
            // indentation between elements
            Ok(Event::Text(_)) => {}
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(e)),
            _ => {}
        }
    }
    if !seen_root {
        return Err(malformed("missing root element"));
    }
    if depth != 0 {
        return Err(malformed("unexpected end of document"));
    }
    Ok(m)
}

pub fn to_xml(m: &XmlMap) -> Result<String, WeixinError> {
    quick_xml::se::to_string_with_root("xml", m)
        .map_err(|e| WeixinError::Unexpected(format!("malformed xml payload: {}", e)))
}

/// Adds merchant identity, nonce and signature to a request map.
pub fn signed_payload(config: &PayConfig, mut m: XmlMap) -> Result<XmlMap, WeixinError> {
    m.insert("appid".into(), config.app_id.clone());
    m.insert("mch_id".into(), config.mch_id.clone());
    m.insert("nonce_str".into(), crate::utils::nonce_str(32));
    m.insert("sign_type".into(), config.sign_type.as_str().to_string());
    m.remove("sign");
    let signature = sign::sign(&m, config.sign_type, &config.key)?;
    m.insert("sign".into(), signature);
    Ok(m)
}

/**
 * https://pay.weixin.qq.com/wiki/doc/api/jsapi.php?chapter=9_1
 */
pub fn unified_order_payload(
    config: &PayConfig,
    order: &UnifiedOrderRequest,
) -> Result<XmlMap, WeixinError> {
    fn missing(field: &str) -> WeixinError {
        WeixinError::MalformedRequest(format!("missing unifiedorder param: {}", field))
    }

    if order.out_trade_no.is_empty() {
        return Err(missing("out_trade_no"));
    }
    if order.body.is_empty() {
        return Err(missing("body"));
    }
    if order.total_fee <= 0 {
        return Err(WeixinError::MalformedRequest(format!(
            "total_fee must be positive: {}",
            order.total_fee
        )));
    }
    match order.trade_type {
        None => return Err(missing("trade_type")),
        Some(TradeType::JsApi) if order.openid.as_deref().unwrap_or("").is_empty() => {
            return Err(missing("openid"))
        }
        Some(TradeType::Native) if order.extra_value("product_id").is_none() => {
            return Err(missing("product_id"))
        }
        _ => {}
    }

    let mut m = order.to_xml_map();
    if order.extra_value("notify_url").is_none() {
        m.insert("notify_url".into(), config.notify_url.clone());
    }
    if order.extra_value("spbill_create_ip").is_none() {
        m.insert("spbill_create_ip".into(), "127.0.0.1".into());
    }
    signed_payload(config, m)
}

fn is_success(m: &XmlMap, field: &str) -> bool {
    m.get(field).map(String::as_str) == Some("SUCCESS")
}

/// Calls into the WeChat Pay merchant API. Implementations own transport,
/// signing of outgoing requests and response signature checks.
#[async_trait]
pub trait PayApi: Send + Sync {
    async fn unified_order(
        &self,
        config: &PayConfig,
        order: &UnifiedOrderRequest,
    ) -> Result<XmlMap, WeixinError>;

    async fn order_query(
        &self,
        config: &PayConfig,
        transaction_id: &str,
    ) -> Result<XmlMap, WeixinError>;

    /// Exchanges an OAuth2 `code` for the payer's openid.
    async fn exchange_open_id(&self, config: &PayConfig, code: &str)
        -> Result<String, WeixinError>;
}

#[derive(Debug, Clone)]
pub struct V2Client {
    http: reqwest::Client,
    api_base: String,
    oauth_base: String,
}

impl Default for V2Client {
    fn default() -> Self {
        Self::with_base_urls(API_BASE, OAUTH_BASE)
    }
}

impl V2Client {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_urls(api_base: &str, oauth_base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            oauth_base: oauth_base.trim_end_matches('/').to_string(),
        }
    }

    async fn post_xml(&self, path: &str, m: &XmlMap) -> Result<XmlMap, WeixinError> {
        let xml_payload = to_xml(m)?;
        tracing::debug!("{} request: {}", path, xml_payload);
        let res = self
            .http
            .post(format!("{}{}", self.api_base, path))
            .body(xml_payload)
            .send()
            .await
            .map_err(|e| WeixinError::ApiError(format!("error request {} api: {}", path, e)))?;
        let res_text = res
            .text()
            .await
            .map_err(|e| WeixinError::ApiError(format!("error read {} response: {}", path, e)))?;
        tracing::debug!("{} response: {:?}", path, res_text);
        parse_xml(&res_text)
            .map_err(|e| WeixinError::ApiError(format!("error parse {} response: {}", path, e)))
    }
}

#[async_trait]
impl PayApi for V2Client {
    /**
     * https://pay.weixin.qq.com/wiki/doc/api/jsapi.php?chapter=9_1
     */
    async fn unified_order(
        &self,
        config: &PayConfig,
        order: &UnifiedOrderRequest,
    ) -> Result<XmlMap, WeixinError> {
        let payload = unified_order_payload(config, order)?;
        let res = self.post_xml("/pay/unifiedorder", &payload).await?;
        if !is_success(&res, "return_code") {
            return Err(WeixinError::ApiError(format!(
                "unifiedorder return_code != SUCCESS: {}",
                res.get("return_msg").map(String::as_str).unwrap_or("")
            )));
        }
        if !sign::verify(&res, config.sign_type, &config.key)? {
            return Err(WeixinError::ApiError(
                "unifiedorder response signature mismatch".into(),
            ));
        }
        if !is_success(&res, "result_code") {
            return Err(WeixinError::ApiError(format!(
                "unifiedorder result_code != SUCCESS: {}",
                res.get("err_code_des").map(String::as_str).unwrap_or("")
            )));
        }
        Ok(res)
    }

    /**
     * https://pay.weixin.qq.com/wiki/doc/api/jsapi.php?chapter=9_2
     */
    async fn order_query(
        &self,
        config: &PayConfig,
        transaction_id: &str,
    ) -> Result<XmlMap, WeixinError> {
        if transaction_id.is_empty() {
            return Err(WeixinError::MalformedRequest(
                "missing orderquery param: transaction_id".into(),
            ));
        }
        let mut m = XmlMap::new();
        m.insert("transaction_id".into(), transaction_id.to_string());
        let payload = signed_payload(config, m)?;
        let res = self.post_xml("/pay/orderquery", &payload).await?;
        if is_success(&res, "return_code") && !sign::verify(&res, config.sign_type, &config.key)? {
            return Err(WeixinError::ApiError(
                "orderquery response signature mismatch".into(),
            ));
        }
        Ok(res)
    }

    /**
     * https://developers.weixin.qq.com/doc/offiaccount/OA_Web_Apps/Wechat_webpage_authorization.html
     */
    async fn exchange_open_id(
        &self,
        config: &PayConfig,
        code: &str,
    ) -> Result<String, WeixinError> {
        let res: serde_json::Value = self
            .http
            .get(format!("{}/sns/oauth2/access_token", self.oauth_base))
            .query(&[
                ("appid", config.app_id.as_str()),
                ("secret", config.app_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?
            .json()
            .await?;
        tracing::debug!("oauth2 access_token response: {:?}", res);
        match res["openid"].as_str() {
            Some(openid) if !openid.is_empty() => Ok(openid.to_string()),
            _ => Err(WeixinError::ApiError(format!(
                "error exchanging openid: errcode={} errmsg={}",
                res["errcode"],
                res["errmsg"].as_str().unwrap_or("")
            ))),
        }
    }
}
