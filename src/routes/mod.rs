use crate::core::{ChannelTag, PayChannel, PayError, PayResponse, XmlMap};
use crate::gateway::WechatPay;
use crate::weixin::{JsApiPay, NotifyReply, PayApi, PayConfig};
use axum::{
    extract::{Path, Query, State},
    response::{Json, Redirect},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::{str::FromStr, sync::Arc};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PayConfig>,
    pub api: Arc<dyn PayApi>,
}

impl AppState {
    fn gateway(&self) -> Result<WechatPay, PayError> {
        WechatPay::with_api(self.config.clone(), self.api.clone())
    }
}

#[derive(Deserialize, Debug)]
pub struct PayRequestPayload {
    pub order_id: String,
    pub description: String,
    pub amount: i64, // 分
    #[serde(default)]
    pub extra: XmlMap,
    #[serde(default)]
    pub code: Option<String>, // js 渠道网页授权 code
}

#[derive(Deserialize, Debug)]
pub struct NotifyQuery {
    #[serde(default)]
    pub query: bool,
}

#[derive(Deserialize, Debug)]
pub struct AuthorizeQuery {
    #[serde(default)]
    pub redirect_uri: Option<String>, // 缺省用配置的 return_url
    #[serde(default)]
    pub state: String,
}

async fn pay(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    body: String,
) -> Result<Json<PayResponse>, PayError> {
    tracing::info!(channel, body, "pay");
    let tag = ChannelTag::from_str(&channel).map_err(PayError::MalformedRequest)?;
    let payload: PayRequestPayload = serde_json::from_str(&body).map_err(|e| {
        PayError::MalformedRequest(format!("error parsing pay request payload: {:?}", e))
    })?;
    let channel = PayChannel::from_tag(tag, payload.code)?;
    let mut gateway = state.gateway()?;
    gateway.set_order_content(
        &payload.order_id,
        &payload.description,
        payload.amount,
        payload.extra,
    );
    Ok(Json(gateway.pay(channel).await))
}

async fn query_order(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<PayResponse>, PayError> {
    tracing::info!(transaction_id, "query_order");
    let gateway = state.gateway()?;
    Ok(Json(gateway.query_order(&transaction_id).await?))
}

async fn notify(
    State(state): State<AppState>,
    Query(query): Query<NotifyQuery>,
    body: String,
) -> Result<NotifyReply, PayError> {
    tracing::info!(payload = body.as_str(), query = query.query, "notify");
    let gateway = state.gateway()?;
    let res = gateway.verify_notification(&body, query.query).await;
    if !res.ok {
        tracing::warn!(message = res.message.as_str(), "notification rejected");
    }
    // the provider expects exactly this body and nothing after it
    Ok(gateway.reply_to_notification(res.ok, &res.message, true))
}

async fn authorize(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Redirect, PayError> {
    let redirect_uri = query
        .redirect_uri
        .as_deref()
        .filter(|uri| !uri.is_empty())
        .or(state.config.return_url.as_deref())
        .filter(|uri| !uri.is_empty())
        .ok_or_else(|| PayError::MalformedRequest("missing redirect_uri".into()))?;
    tracing::info!(redirect_uri, "authorize");
    let url = JsApiPay::new(&state.config).authorize_url(redirect_uri, &query.state);
    Ok(Redirect::temporary(&url))
}

pub fn get_routes(state: AppState) -> Router {
    Router::new()
        .route("/pay/:channel", post(pay))
        .route("/orders/:transaction_id", get(query_order))
        .route("/notify", post(notify))
        .route("/jsapi/authorize", get(authorize))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weixin::test_support::{map, test_config, RecordingApi};
    use crate::weixin::{v2api, SignType};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    fn app(api: RecordingApi) -> Router {
        get_routes(AppState {
            config: Arc::new(test_config(SignType::Md5)),
            api: Arc::new(api),
        })
    }

    async fn body_string(res: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_pay_route() {
        let api = RecordingApi {
            unified_order: Some(map(&[
                ("return_code", "SUCCESS"),
                ("result_code", "SUCCESS"),
                ("appid", "wxd930ea5d5a258f4f"),
                ("prepay_id", "wx2026101915000012345"),
            ])),
            ..Default::default()
        };
        let req = Request::post("/pay/app")
            .body(Body::from(
                r#"{"order_id":"20261019001","description":"VIP","amount":100}"#,
            ))
            .unwrap();
        let res = app(api).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(res).await).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["data"]["prepayid"], "wx2026101915000012345");
    }

    #[tokio::test]
    async fn test_pay_route_rejects_unknown_channel() {
        let req = Request::post("/pay/h5")
            .body(Body::from(
                r#"{"order_id":"20261019001","description":"VIP","amount":100}"#,
            ))
            .unwrap();
        let res = app(RecordingApi::default()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_pay_route_js_requires_code() {
        let req = Request::post("/pay/js")
            .body(Body::from(
                r#"{"order_id":"20261019001","description":"VIP","amount":100}"#,
            ))
            .unwrap();
        let res = app(RecordingApi::default()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_query_route_transport_fault() {
        let req = Request::get("/orders/4200001234202610190000000001")
            .body(Body::empty())
            .unwrap();
        let res = app(RecordingApi::default()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_notify_route_replies_xml() {
        let config = test_config(SignType::Md5);
        let m = v2api::signed_payload(
            &config,
            map(&[
                ("return_code", "SUCCESS"),
                ("result_code", "SUCCESS"),
                ("transaction_id", "4200001234202610190000000001"),
                ("out_trade_no", "20261019001"),
            ]),
        )
        .unwrap();
        let req = Request::post("/notify")
            .body(Body::from(v2api::to_xml(&m).unwrap()))
            .unwrap();
        let res = app(RecordingApi::default()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            body_string(res).await,
            "<xml><return_code>SUCCESS</return_code><return_msg>OK</return_msg></xml>"
        );

        let req = Request::post("/notify")
            .body(Body::from("<xml><return_code>FAIL</return_code></xml>"))
            .unwrap();
        let res = app(RecordingApi::default()).oneshot(req).await.unwrap();
        let reply = v2api::parse_xml(&body_string(res).await).unwrap();
        assert_eq!(reply["return_code"], "FAIL");
        assert_eq!(reply["return_msg"], "communication error");
    }

    #[tokio::test]
    async fn test_authorize_route_redirects() {
        let req = Request::get("/jsapi/authorize?redirect_uri=https%3A%2F%2Fshop.example.com%2Fpay&state=s1")
            .body(Body::empty())
            .unwrap();
        let res = app(RecordingApi::default()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = res.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://open.weixin.qq.com/connect/oauth2/authorize?"));
        assert!(location.contains("state=s1#wechat_redirect"));
    }

    #[tokio::test]
    async fn test_authorize_route_falls_back_to_return_url() {
        let mut config = test_config(SignType::Md5);
        config.return_url = Some("https://shop.example.com/paid".into());
        let app = get_routes(AppState {
            config: Arc::new(config),
            api: Arc::new(RecordingApi::default()),
        });
        let req = Request::get("/jsapi/authorize?state=s2")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = res.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.contains("redirect_uri=https%3A%2F%2Fshop%2Eexample%2Ecom%2Fpaid&"));
        assert!(location.contains("state=s2#wechat_redirect"));
    }

    #[tokio::test]
    async fn test_authorize_route_requires_some_redirect() {
        let req = Request::get("/jsapi/authorize?state=s3")
            .body(Body::empty())
            .unwrap();
        let res = app(RecordingApi::default()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
