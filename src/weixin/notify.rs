use super::{v2api, PayConfig, WeixinError};
use crate::core::XmlMap;
use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use std::ops::ControlFlow;

/// Inbound payment notification, kept only while it is being verified.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPayload {
    pub origin: String,
    pub convert: XmlMap,
}

impl NotificationPayload {
    /**
     * https://pay.weixin.qq.com/wiki/doc/api/jsapi.php?chapter=9_7&index=8
     */
    pub fn parse(payload: &str) -> Result<Self, WeixinError> {
        let convert = v2api::parse_xml(payload)?;
        tracing::debug!("wx notify payload: {:?}", convert);
        Ok(Self {
            origin: payload.to_string(),
            convert,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.convert.get(key).map(String::as_str)
    }

    pub fn verify_sign(&self, config: &PayConfig) -> Result<bool, WeixinError> {
        v2api::sign::verify(&self.convert, config.sign_type, &config.key)
    }

    /// `{origin, convert}` as carried in every verification envelope.
    pub fn to_value(&self) -> serde_json::Value {
        json!({
            "origin": self.origin,
            "convert": self.convert,
        })
    }
}

#[derive(Debug, Serialize)]
struct NotifyReplyPayload<'a> {
    return_code: &'a str,
    return_msg: &'a str,
}

/// Synchronous answer to a notification. `halt` tells the caller's handler
/// that nothing else may be written after the reply.
#[derive(Debug, Clone, PartialEq)]
pub struct NotifyReply {
    pub return_code: String,
    pub return_msg: String,
    pub halt: bool,
}

impl NotifyReply {
    pub fn new(succeeded: bool, message: &str, halt: bool) -> Self {
        let (return_code, return_msg) = if succeeded {
            ("SUCCESS", "OK")
        } else {
            ("FAIL", message)
        };
        Self {
            return_code: return_code.to_string(),
            return_msg: return_msg.to_string(),
            halt,
        }
    }

    pub fn to_xml(&self) -> Result<String, WeixinError> {
        let payload = NotifyReplyPayload {
            return_code: &self.return_code,
            return_msg: &self.return_msg,
        };
        quick_xml::se::to_string_with_root("xml", &payload)
            .map_err(|e| WeixinError::Unexpected(format!("malformed xml reply: {}", e)))
    }

    /// Writes the reply and reports whether processing must stop here.
    pub fn write_to<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<ControlFlow<()>> {
        let xml = self
            .to_xml()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        writer.write_all(xml.as_bytes())?;
        writer.flush()?;
        if self.halt {
            Ok(ControlFlow::Break(()))
        } else {
            Ok(ControlFlow::Continue(()))
        }
    }
}

impl IntoResponse for NotifyReply {
    fn into_response(self) -> Response {
        match self.to_xml() {
            Ok(xml) => ([(header::CONTENT_TYPE, "text/xml; charset=utf-8")], xml).into_response(),
            Err(e) => crate::core::PayError::from(e).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::test_config;
    use super::super::SignType;
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_parse_keeps_origin() {
        let raw = "<xml><return_code><![CDATA[SUCCESS]]></return_code></xml>";
        let payload = NotificationPayload::parse(raw).unwrap();
        assert_eq!(payload.origin, raw);
        assert_eq!(payload.get("return_code"), Some("SUCCESS"));
        assert_eq!(payload.get("sign"), None);
        assert_eq!(
            payload.to_value(),
            json!({"origin": raw, "convert": {"return_code": "SUCCESS"}})
        );
    }

    #[test]
    fn test_verify_sign() {
        let config = test_config(SignType::Md5);
        let mut m = XmlMap::new();
        m.insert("return_code".into(), "SUCCESS".into());
        m.insert("out_trade_no".into(), "20261019001".into());
        let m = v2api::signed_payload(&config, m).unwrap();
        let raw = v2api::to_xml(&m).unwrap();

        let payload = NotificationPayload::parse(&raw).unwrap();
        assert!(payload.verify_sign(&config).unwrap());
        let other = test_config(SignType::HmacSha256);
        assert!(!payload.verify_sign(&other).unwrap());
    }

    #[test]
    fn test_reply_xml() {
        let reply = NotifyReply::new(true, "ignored", true);
        assert_eq!(
            reply.to_xml().unwrap(),
            "<xml><return_code>SUCCESS</return_code><return_msg>OK</return_msg></xml>"
        );
        let reply = NotifyReply::new(false, "bad sig", true);
        assert_eq!(
            reply.to_xml().unwrap(),
            "<xml><return_code>FAIL</return_code><return_msg>bad sig</return_msg></xml>"
        );
    }

    #[test]
    fn test_write_to_signals_halt() {
        let mut out = Vec::new();
        let flow = NotifyReply::new(false, "bad sig", true).write_to(&mut out).unwrap();
        assert_eq!(flow, ControlFlow::Break(()));
        let reply = v2api::parse_xml(std::str::from_utf8(&out).unwrap()).unwrap();
        assert_eq!(reply["return_code"], "FAIL");
        assert_eq!(reply["return_msg"], "bad sig");

        let mut out = Vec::new();
        let flow = NotifyReply::new(true, "", false).write_to(&mut out).unwrap();
        assert_eq!(flow, ControlFlow::Continue(()));
        assert!(!out.is_empty());
    }

    #[test]
    fn test_into_response() {
        let res = NotifyReply::new(true, "", true).into_response();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()[header::CONTENT_TYPE],
            "text/xml; charset=utf-8"
        );
    }
}
