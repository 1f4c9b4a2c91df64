//! `Weixin`: the request pipeline (validate, decode, resolve, invoke or fall back, encode)
//! plus reply and custom-send helpers.

use crate::config::Credentials;
use crate::dispatch::{HandlerRegistry, MessageHandler, Resolution};
use crate::error::{Result, WeixinError};
use crate::message::{self, NormalizedMessage};
use crate::reply::{self, ReplyKind};
use crate::send::{HttpTransport, SendTransport};
use crate::signature;
use axum::http::StatusCode;
use serde::Deserialize;
use std::sync::Arc;

pub const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Text reply content used when no handler matches.
pub const FALLBACK_REPLY: &str = "failed";

/// Query parameters the provider sends with every request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookQuery {
    pub signature: Option<String>,
    pub timestamp: Option<String>,
    pub nonce: Option<String>,
    /// Present on the GET verification handshake.
    pub echostr: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    /// Verification handshake.
    Get,
    /// Message delivery.
    Post,
}

/// Transport-neutral view of an inbound webhook request.
#[derive(Debug, Clone, Copy)]
pub struct WebhookRequest<'a> {
    pub method: RequestMethod,
    pub query: &'a WebhookQuery,
    pub body: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
}

impl WebhookResponse {
    fn xml(body: String) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: XML_CONTENT_TYPE,
            body,
        }
    }

    fn plain(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: TEXT_CONTENT_TYPE,
            body: body.into(),
        }
    }
}

/// What a request that passed validation turns into.
enum Outcome {
    Echo(String),
    Reply(String),
}

/// Adapter for one official account: credentials, handler registry, and send transport.
pub struct Weixin {
    credentials: Credentials,
    registry: HandlerRegistry,
    transport: Arc<dyn SendTransport>,
}

impl Weixin {
    pub fn new(credentials: Credentials) -> Self {
        Self::with_transport(credentials, Arc::new(HttpTransport::default()))
    }

    pub fn with_transport(credentials: Credentials, transport: Arc<dyn SendTransport>) -> Self {
        Self {
            credentials,
            registry: HandlerRegistry::new(),
            transport,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    fn require_token(&self) -> Result<&str> {
        self.credentials
            .token
            .as_deref()
            .ok_or_else(|| WeixinError::Configuration("WEIXIN_TOKEN is missing".to_string()))
    }

    /// Check a request signature against the shared token and replay window.
    /// A missing token is a configuration error, not a rejection.
    pub fn validate(&self, signature: &str, timestamp: &str, nonce: &str) -> Result<bool> {
        let token = self.require_token()?;
        Ok(signature::validate(
            Some(token),
            signature,
            timestamp,
            nonce,
            chrono::Utc::now().timestamp(),
            self.credentials.expires_in,
        ))
    }

    pub fn parse(&self, body: &[u8]) -> Result<NormalizedMessage> {
        message::decode(body)
    }

    /// Encode a reply to `username`. `sender` defaults to the configured sender.
    pub fn reply(&self, username: &str, sender: Option<&str>, kind: &ReplyKind) -> Result<String> {
        let sender = sender
            .filter(|s| !s.is_empty())
            .or(self.credentials.sender.as_deref())
            .ok_or_else(|| WeixinError::Configuration("WEIXIN_SENDER is missing".to_string()))?;
        Ok(reply::encode(username, sender, kind))
    }

    pub async fn register(&self, key: impl Into<String>, handler: impl MessageHandler + 'static) {
        self.registry.register(key, Arc::new(handler)).await;
    }

    /// Register literal reply text; it is sent back as a text reply to the message sender.
    pub async fn register_text(&self, key: impl Into<String>, text: impl Into<String>) {
        self.registry.register_text(key, text).await;
    }

    /// Run one webhook request through the pipeline.
    ///
    /// Signature and payload failures become 400 responses. `Err` is returned only for
    /// configuration errors (missing token, or no sender to reply as).
    pub async fn handle(&self, req: &WebhookRequest<'_>) -> Result<WebhookResponse> {
        match self.process(req).await {
            Ok(Outcome::Echo(echostr)) => Ok(WebhookResponse::plain(StatusCode::OK, echostr)),
            Ok(Outcome::Reply(body)) => Ok(WebhookResponse::xml(body)),
            Err(WeixinError::RejectedSignature) => Ok(WebhookResponse::plain(
                StatusCode::BAD_REQUEST,
                "signature failed",
            )),
            Err(WeixinError::MalformedPayload(e)) => {
                log::debug!("rejecting malformed message body: {}", e);
                Ok(WebhookResponse::plain(StatusCode::BAD_REQUEST, "invalid"))
            }
            Err(e) => Err(e),
        }
    }

    async fn process(&self, req: &WebhookRequest<'_>) -> Result<Outcome> {
        let q = req.query;
        let signature = q.signature.as_deref().unwrap_or_default();
        let timestamp = q.timestamp.as_deref().unwrap_or_default();
        let nonce = q.nonce.as_deref().unwrap_or_default();
        if !self.validate(signature, timestamp, nonce)? {
            log::debug!("signature check failed (timestamp {:?})", timestamp);
            return Err(WeixinError::RejectedSignature);
        }

        if req.method == RequestMethod::Get {
            return Ok(Outcome::Echo(q.echostr.clone().unwrap_or_default()));
        }

        let msg = self.parse(req.body)?;
        log::debug!(
            "received {} message {:?} from {:?}",
            msg.msg_type,
            msg.id,
            msg.sender
        );

        let body = match self.dispatch(&msg).await {
            Err(WeixinError::NoHandler) => {
                log::warn!(
                    "no handler for {} message from {:?}, sending fallback reply",
                    msg.msg_type,
                    msg.sender
                );
                self.reply_to(&msg, FALLBACK_REPLY)?
            }
            other => other?,
        };
        Ok(Outcome::Reply(body))
    }

    async fn dispatch(&self, msg: &NormalizedMessage) -> Result<String> {
        match self.registry.resolve(msg).await {
            Resolution::Handler(h) => Ok(h.handle(msg)),
            Resolution::Text(text) => self.reply_to(msg, &text),
            Resolution::NotFound => Err(WeixinError::NoHandler),
        }
    }

    /// Text reply back to the message sender, sent as the account that received it.
    fn reply_to(&self, msg: &NormalizedMessage, content: &str) -> Result<String> {
        self.reply(
            msg.sender.as_deref().unwrap_or_default(),
            msg.receiver.as_deref(),
            &ReplyKind::text(content),
        )
    }

    /// Custom-send a text message. Returns the provider's response body verbatim.
    /// Upstream failures are returned as `UpstreamSend`; nothing is retried.
    pub async fn send(&self, to_user: &str, content: &str) -> Result<String> {
        let token = self.credentials.send_token().ok_or_else(|| {
            WeixinError::Configuration("WEIXIN_TOKEN is missing".to_string())
        })?;
        if to_user.trim().is_empty() {
            return Err(WeixinError::Configuration("to_user is missing".to_string()));
        }
        let url = format!("{}?access_token={}", self.credentials.send_url, token);
        let body = reply::build_send_payload(to_user, content);
        log::debug!("custom send to {}", to_user);
        self.transport.post_json(&url, body).await
    }
}
