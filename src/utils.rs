use rand::{distributions::Alphanumeric, Rng};

/// Random `[0-9A-Za-z]` string, used for `nonce_str` / `nonceStr`.
pub fn nonce_str(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Unix timestamp in seconds, as the string the client SDKs expect.
pub fn timestamp() -> String {
    chrono::Utc::now().timestamp().to_string()
}
