//! Endpoint constants and URL construction for the realtime client.

/// Default WebSocket endpoint when no base URL is configured.
pub const DEFAULT_REALTIME_URL: &str = "wss://localhost/realtime";

/// Build the connect URL from a base endpoint and an auth token.
///
/// The token is appended as a `token` query parameter, URL-encoded. Tokens
/// are read once per connection attempt; a rotation requires an explicit
/// reconnect.
pub fn realtime_url(base: &str, token: &str) -> String {
    let base = base.trim_end_matches('/');
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}token={}", base, separator, urlencoding::encode(token))
}
