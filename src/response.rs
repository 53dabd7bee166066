//! Response parser
//!
//! Thin dispatch from a provider to its adapter's parser.

use crate::error::Result;
use crate::providers::{NormalizedResponse, Provider};

/// Parse a raw 2xx body from `provider`
///
/// # Errors
///
/// Returns `EmptyResponse` when the provider produced nothing to show,
/// `SafetyBlocked` for Google safety rejections, and `InvalidResponse`
/// when the body is not the JSON shape the provider documents.
///
/// # Examples
///
/// ```
/// use chatrelay::providers::Provider;
/// use chatrelay::response::parse;
///
/// let body = r#"{"choices":[{"message":{"content":"Hi!"},"finish_reason":"stop"}]}"#;
/// assert_eq!(parse(Provider::Groq, body).unwrap().content, "Hi!");
/// ```
pub fn parse(provider: Provider, raw_body: &str) -> Result<NormalizedResponse> {
    provider.adapter().parse_response(raw_body)
}
