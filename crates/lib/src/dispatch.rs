//! Handler registry: routes an inbound message to a registered handler or literal reply text.

use crate::message::{MessageType, NormalizedMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Reserved key matched when no exact text-content key applies.
pub const WILDCARD: &str = "*";

/// Produces the encoded reply body for a message.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, message: &NormalizedMessage) -> String;
}

impl<F> MessageHandler for F
where
    F: Fn(&NormalizedMessage) -> String + Send + Sync,
{
    fn handle(&self, message: &NormalizedMessage) -> String {
        self(message)
    }
}

/// Value stored under a key. The registry does not interpret `Text`; the facade turns it into a reply.
#[derive(Debug, Clone)]
pub enum Registered {
    Handler(Arc<dyn MessageHandler>),
    Text(String),
}

/// Outcome of resolving a message.
#[derive(Debug, Clone)]
pub enum Resolution {
    Handler(Arc<dyn MessageHandler>),
    Text(String),
    NotFound,
}

impl From<Registered> for Resolution {
    fn from(r: Registered) -> Self {
        match r {
            Registered::Handler(h) => Resolution::Handler(h),
            Registered::Text(t) => Resolution::Text(t),
        }
    }
}

impl std::fmt::Debug for dyn MessageHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MessageHandler")
    }
}

/// Key -> handler map. Entries are only added or replaced, never removed.
pub struct HandlerRegistry {
    inner: Arc<RwLock<HashMap<String, Registered>>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a value under `key`, replacing any previous one.
    pub async fn insert(&self, key: impl Into<String>, value: Registered) {
        let key = key.into();
        let mut g = self.inner.write().await;
        if g.insert(key.clone(), value).is_some() {
            log::debug!("replaced handler for key {:?}", key);
        }
    }

    pub async fn register(&self, key: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        self.insert(key, Registered::Handler(handler)).await;
    }

    pub async fn register_text(&self, key: impl Into<String>, text: impl Into<String>) {
        self.insert(key, Registered::Text(text.into())).await;
    }

    /// Exact text-content match first, then the wildcard, else `NotFound`.
    pub async fn resolve(&self, message: &NormalizedMessage) -> Resolution {
        let g = self.inner.read().await;
        if message.msg_type == MessageType::Text {
            if let Some(found) = message.content().and_then(|c| g.get(c)) {
                return found.clone().into();
            }
        }
        match g.get(WILDCARD) {
            Some(found) => found.clone().into(),
            None => Resolution::NotFound,
        }
    }

    pub async fn keys(&self) -> Vec<String> {
        let g = self.inner.read().await;
        g.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::decode;

    fn text_message(content: &str) -> NormalizedMessage {
        let xml = format!(
            "<xml><FromUserName>alice</FromUserName><ToUserName>bob</ToUserName>\
             <MsgType>text</MsgType><Content>{}</Content></xml>",
            content
        );
        decode(xml.as_bytes()).unwrap()
    }

    fn reply_with(tag: &'static str) -> Arc<dyn MessageHandler> {
        Arc::new(move |_: &NormalizedMessage| tag.to_string())
    }

    fn call(resolution: Resolution, message: &NormalizedMessage) -> Option<String> {
        match resolution {
            Resolution::Handler(h) => Some(h.handle(message)),
            _ => None,
        }
    }

    #[tokio::test]
    async fn exact_content_match_wins() {
        let registry = HandlerRegistry::new();
        registry.register("help", reply_with("help")).await;
        registry.register(WILDCARD, reply_with("any")).await;

        let msg = text_message("help");
        assert_eq!(call(registry.resolve(&msg).await, &msg).as_deref(), Some("help"));
    }

    #[tokio::test]
    async fn wildcard_fallback_and_not_found() {
        let registry = HandlerRegistry::new();
        registry.register("help", reply_with("help")).await;
        let msg = text_message("unknown");
        assert!(matches!(registry.resolve(&msg).await, Resolution::NotFound));

        registry.register(WILDCARD, reply_with("any")).await;
        assert_eq!(call(registry.resolve(&msg).await, &msg).as_deref(), Some("any"));
    }

    #[tokio::test]
    async fn non_text_messages_only_use_wildcard() {
        let registry = HandlerRegistry::new();
        registry.register_text("help", "help text").await;
        let msg = decode(b"<xml><MsgType>image</MsgType><Content>help</Content></xml>").unwrap();
        assert!(matches!(registry.resolve(&msg).await, Resolution::NotFound));

        registry.register_text(WILDCARD, "fallback").await;
        match registry.resolve(&msg).await {
            Resolution::Text(t) => assert_eq!(t, "fallback"),
            other => panic!("unexpected resolution: {:?}", other),
        }
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let registry = HandlerRegistry::new();
        registry.register("help", reply_with("first")).await;
        registry.register_text("help", "second").await;
        let msg = text_message("help");
        match registry.resolve(&msg).await {
            Resolution::Text(t) => assert_eq!(t, "second"),
            other => panic!("unexpected resolution: {:?}", other),
        }
        assert_eq!(registry.keys().await, vec!["help".to_string()]);
    }
}
