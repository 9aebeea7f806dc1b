use super::PayError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Channel tag as it appears on the wire (`/pay/:channel`).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub enum ChannelTag {
    #[serde(rename = "js")]
    Js,
    #[serde(rename = "app")]
    App,
    #[serde(rename = "qrcode")]
    Qrcode,
}

impl FromStr for ChannelTag {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let val = serde_json::Value::String(s.to_string());
        let channel = serde_json::from_value::<ChannelTag>(val)
            .map_err(|_| format!("unsupported pay channel: {}", s))?;
        Ok(channel)
    }
}

/// Payment flow chosen by the caller. JSAPI carries the OAuth `code` that is
/// exchanged for the payer's openid.
#[derive(Debug, Clone, PartialEq)]
pub enum PayChannel {
    JsApi { code: String },
    App,
    Qr,
}

impl PayChannel {
    pub fn from_tag(tag: ChannelTag, code: Option<String>) -> Result<Self, PayError> {
        match tag {
            ChannelTag::Js => match code {
                Some(code) if !code.is_empty() => Ok(PayChannel::JsApi { code }),
                _ => Err(PayError::MalformedRequest(
                    "missing oauth code for js channel".to_string(),
                )),
            },
            ChannelTag::App => Ok(PayChannel::App),
            ChannelTag::Qrcode => Ok(PayChannel::Qr),
        }
    }

    pub fn trade_type(&self) -> TradeType {
        match self {
            PayChannel::JsApi { .. } => TradeType::JsApi,
            PayChannel::App => TradeType::App,
            PayChannel::Qr => TradeType::Native,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub enum TradeType {
    #[serde(rename = "JSAPI")]
    JsApi,
    #[serde(rename = "APP")]
    App,
    #[serde(rename = "NATIVE")]
    Native,
}

impl TradeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::JsApi => "JSAPI",
            TradeType::App => "APP",
            TradeType::Native => "NATIVE",
        }
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
