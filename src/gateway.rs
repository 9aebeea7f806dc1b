use crate::core::{PayChannel, PayError, PayResponse, UnifiedOrderRequest, XmlMap};
use crate::weixin::{
    AppPay, JsApiPay, NotificationPayload, NotifyReply, PayApi, PayConfig, V2Client, WeixinError,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// One gateway per logical transaction: an outbound payment or an inbound
/// notification. Credentials and the API handle are shared and immutable.
pub struct WechatPay {
    config: Arc<PayConfig>,
    api: Arc<dyn PayApi>,
    order: Option<UnifiedOrderRequest>,
}

impl WechatPay {
    pub fn configure(config: PayConfig) -> Result<Self, PayError> {
        Self::with_api(Arc::new(config), Arc::new(V2Client::new()))
    }

    pub fn with_api(config: Arc<PayConfig>, api: Arc<dyn PayApi>) -> Result<Self, PayError> {
        config.validate().map_err(PayError::InvalidConfig)?;
        Ok(Self {
            config,
            api,
            order: None,
        })
    }

    pub fn config(&self) -> &PayConfig {
        &self.config
    }

    pub fn order(&self) -> Option<&UnifiedOrderRequest> {
        self.order.as_ref()
    }

    pub fn set_order_content(
        &mut self,
        order_id: &str,
        description: &str,
        amount: i64, // 支付金额, 精确到分
        extra: XmlMap,
    ) {
        self.order = Some(UnifiedOrderRequest::new(order_id, description, amount, extra));
    }

    pub async fn app_pay(&mut self) -> PayResponse {
        self.pay(PayChannel::App).await
    }

    pub async fn js_pay(&mut self, code: &str) -> PayResponse {
        self.pay(PayChannel::JsApi {
            code: code.to_string(),
        })
        .await
    }

    pub async fn qr_pay(&mut self) -> PayResponse {
        self.pay(PayChannel::Qr).await
    }

    /// Single-attempt unified order for `channel`; every failure comes back as
    /// an `ok: false` envelope.
    pub async fn pay(&mut self, channel: PayChannel) -> PayResponse {
        match self.try_pay(&channel).await {
            Ok(data) => PayResponse::success("request succeeded", data),
            Err(e) => {
                tracing::warn!(channel = ?channel, "unified order failed: {}", e);
                PayResponse::failure(format!("unified order failed: {}", e), Value::Null)
            }
        }
    }

    async fn try_pay(&mut self, channel: &PayChannel) -> Result<Value, WeixinError> {
        let config = self.config.clone();
        let api = self.api.clone();
        let order = self
            .order
            .as_mut()
            .ok_or_else(|| WeixinError::MalformedRequest("order content not set".into()))?;

        match channel {
            PayChannel::JsApi { code } => {
                let openid = JsApiPay::new(&config).resolve_open_id(api.as_ref(), code).await?;
                order.set_trade_type(channel.trade_type());
                order.set_openid(&openid);
            }
            PayChannel::App => order.set_trade_type(channel.trade_type()),
            PayChannel::Qr => {
                order.set_trade_type(channel.trade_type());
                if order.extra_value("product_id").is_none() {
                    let product_id = order.out_trade_no.clone();
                    order.extra.insert("product_id".into(), product_id);
                }
            }
        }

        let unified_order = api.unified_order(&config, order).await?;
        tracing::info!(
            out_trade_no = order.out_trade_no.as_str(),
            trade_type = channel.trade_type().as_str(),
            "unified order created"
        );

        match channel {
            PayChannel::JsApi { .. } => JsApiPay::new(&config).parameters(&unified_order),
            PayChannel::App => AppPay::new(&config).parameters(&unified_order),
            PayChannel::Qr => Ok(json!([unified_order])),
        }
    }

    /// Business outcomes are envelopes; only transport faults are `Err`.
    pub async fn query_order(&self, transaction_id: &str) -> Result<PayResponse, PayError> {
        let result = self.api.order_query(&self.config, transaction_id).await?;
        let succeeded = ["return_code", "result_code"]
            .iter()
            .all(|field| result.get(*field).map(String::as_str) == Some("SUCCESS"));
        if succeeded {
            Ok(PayResponse::success("query succeeded", json!(result)))
        } else {
            tracing::warn!(transaction_id, "order query failed: {:?}", result);
            Ok(PayResponse::failure("query failed", json!(result)))
        }
    }

    /**
     * 回调校验: 通信结果 -> 回调参数 -> 签名 -> (可选) 查单, 任一步失败立即返回
     */
    pub async fn verify_notification(&self, raw_body: &str, also_query: bool) -> PayResponse {
        let payload = match NotificationPayload::parse(raw_body) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("notification parse failed: {}", e);
                return PayResponse::failure(
                    format!("notification parse failed: {}", e),
                    json!({ "origin": raw_body, "convert": {} }),
                );
            }
        };
        let data = payload.to_value();

        if payload.get("return_code") != Some("SUCCESS") {
            return PayResponse::failure("communication error", data);
        }
        let transaction_id = match (payload.get("transaction_id"), payload.get("out_trade_no")) {
            (Some(transaction_id), Some(_)) => transaction_id,
            _ => return PayResponse::failure("callback parameter error", data),
        };

        match payload.verify_sign(&self.config) {
            Ok(true) => {}
            Ok(false) => return PayResponse::failure("signature verification failed", data),
            Err(e) => {
                tracing::warn!("notification signature check error: {}", e);
                return PayResponse::failure("signature verification failed", data);
            }
        }

        if also_query {
            match self.query_order(transaction_id).await {
                Ok(res) if res.ok => {}
                Ok(_) => return PayResponse::failure("order query failed", data),
                Err(e) => {
                    tracing::error!(transaction_id, "order query error: {}", e);
                    return PayResponse::failure("order query failed", data);
                }
            }
        }

        tracing::info!(
            transaction_id,
            out_trade_no = payload.get("out_trade_no").unwrap_or(""),
            "async verification passed"
        );
        PayResponse::success("async verification passed", data)
    }

    pub fn reply_to_notification(
        &self,
        succeeded: bool,
        message: &str,
        terminate_after: bool,
    ) -> NotifyReply {
        NotifyReply::new(succeeded, message, terminate_after)
    }
}
