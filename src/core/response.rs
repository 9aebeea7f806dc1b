use serde::Serialize;
use serde_json::Value;

/// Uniform `{ok, message, data}` envelope returned by every gateway operation.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PayResponse {
    pub ok: bool,
    pub message: String,
    pub data: Value,
}

impl PayResponse {
    pub fn success(message: impl Into<String>, data: Value) -> Self {
        Self {
            ok: true,
            message: message.into(),
            data,
        }
    }

    pub fn failure(message: impl Into<String>, data: Value) -> Self {
        Self {
            ok: false,
            message: message.into(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_serialization() {
        let res = PayResponse::failure("query failed", Value::Null);
        assert_eq!(
            serde_json::to_value(&res).unwrap(),
            json!({"ok": false, "message": "query failed", "data": null})
        );
    }
}
