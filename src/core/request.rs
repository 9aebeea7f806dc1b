use super::TradeType;
use std::collections::BTreeMap;

/// Flat key/value view of a v2 XML document.
pub type XmlMap = BTreeMap<String, String>;

/// Pending unified order. `trade_type` and `openid` are filled in by the
/// gateway when a channel is chosen.
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedOrderRequest {
    pub out_trade_no: String,
    pub body: String,
    pub total_fee: i64, // 支付金额, 精确到分
    pub trade_type: Option<TradeType>,
    pub openid: Option<String>,
    pub extra: XmlMap,
}

impl UnifiedOrderRequest {
    pub fn new(out_trade_no: &str, body: &str, total_fee: i64, extra: XmlMap) -> Self {
        Self {
            out_trade_no: out_trade_no.to_string(),
            body: body.to_string(),
            total_fee,
            trade_type: None,
            openid: None,
            extra,
        }
    }

    pub fn set_trade_type(&mut self, trade_type: TradeType) {
        self.trade_type = Some(trade_type);
    }

    pub fn set_openid(&mut self, openid: &str) {
        self.openid = Some(openid.to_string());
    }

    pub fn extra_value(&self, key: &str) -> Option<&str> {
        self.extra
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Extra fields first; the order's own fields always win.
    pub fn to_xml_map(&self) -> XmlMap {
        let mut m = self.extra.clone();
        m.insert("out_trade_no".into(), self.out_trade_no.clone());
        m.insert("body".into(), self.body.clone());
        m.insert("total_fee".into(), self.total_fee.to_string());
        if let Some(trade_type) = self.trade_type {
            m.insert("trade_type".into(), trade_type.to_string());
        }
        if let Some(openid) = &self.openid {
            m.insert("openid".into(), openid.clone());
        }
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_fields_override_extra() {
        let mut extra = XmlMap::new();
        extra.insert("attach".into(), "coupon=7".into());
        extra.insert("total_fee".into(), "1".into());
        extra.insert("trade_type".into(), "MWEB".into());
        let mut order = UnifiedOrderRequest::new("20261019001", "VIP 月卡", 2500, extra);
        order.set_trade_type(TradeType::App);

        let m = order.to_xml_map();
        assert_eq!(m["out_trade_no"], "20261019001");
        assert_eq!(m["body"], "VIP 月卡");
        assert_eq!(m["total_fee"], "2500");
        assert_eq!(m["trade_type"], "APP");
        assert_eq!(m["attach"], "coupon=7");
        assert!(!m.contains_key("openid"));
    }

    #[test]
    fn test_extra_value_ignores_empty() {
        let mut extra = XmlMap::new();
        extra.insert("product_id".into(), "".into());
        let order = UnifiedOrderRequest::new("1", "b", 1, extra);
        assert_eq!(order.extra_value("product_id"), None);
        assert_eq!(order.extra_value("missing"), None);
    }
}
