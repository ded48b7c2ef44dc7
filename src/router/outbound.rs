//! Outbound transport seam.
//!
//! The router only knows how to send text to an identity; delivery
//! guarantees and retries stay with the transport.

use std::future::Future;

/// Outbound message primitive. Failures come back as human-readable
/// strings; the router decides whether each one is surfaced or logged.
pub trait Transport: Send + Sync {
    /// Send `text` to `chat_id`, optionally Markdown-formatted.
    /// Returns the transport's message id.
    fn send(
        &self,
        chat_id: i64,
        text: &str,
        markdown: bool,
    ) -> impl Future<Output = Result<i64, String>> + Send;

    /// Send `text` together with the persistent menu keyboard.
    fn send_menu(
        &self,
        chat_id: i64,
        text: &str,
        captions: &[String],
    ) -> impl Future<Output = Result<i64, String>> + Send;
}
