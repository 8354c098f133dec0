//! Correlation id generation.
//!
//! Every logical call carries an opaque id of the form `req_<unix-millis>_<suffix>`
//! so its request, response, retries, and errors can be joined in logs.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;

const SUFFIX_LEN: usize = 9;

/// Source of correlation ids.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Generates `req_<unix-millis>_<9 lowercase alphanumerics>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimestampIdGenerator;

impl IdGenerator for TimestampIdGenerator {
    fn next_id(&self) -> String {
        generate_request_id()
    }
}

/// Generate a fresh correlation id.
pub fn generate_request_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("req_{}_{}", Utc::now().timestamp_millis(), suffix)
}
