//! Error taxonomy for the adapter.
//!
//! Signature and decode failures are converted to HTTP statuses inside the facade;
//! only `Configuration` and `UpstreamSend` are expected to reach the embedding application.

#[derive(Debug, thiserror::Error)]
pub enum WeixinError {
    /// Missing shared token, default sender, or another required setting.
    #[error("weixin configuration error: {0}")]
    Configuration(String),
    #[error("signature rejected")]
    RejectedSignature,
    /// XML or field-level parse failure. Carries the parser message, never the parser error itself.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("no handler registered for message")]
    NoHandler,
    /// Network or HTTP failure from the outbound custom-send call.
    #[error("weixin send failed: {0}")]
    UpstreamSend(String),
}

impl WeixinError {
    pub(crate) fn malformed(e: impl std::fmt::Display) -> Self {
        WeixinError::MalformedPayload(e.to_string())
    }
}

pub type Result<T, E = WeixinError> = std::result::Result<T, E>;
