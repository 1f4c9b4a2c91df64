//! Reply and custom-send payload encoding.
//!
//! Replies are XML documents built from fixed templates. Caller text goes verbatim into
//! CDATA sections with no other escaping, so content must not contain `]]>`.

use serde::Serialize;
use std::fmt::Write;

/// Music reply fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Music {
    pub title: String,
    pub description: String,
    pub music_url: String,
    pub hq_music_url: String,
}

/// One news article.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    pub description: String,
    pub pic_url: String,
    pub url: String,
}

/// Reply shape selected by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyKind {
    Text { content: String },
    Music(Music),
    News(Vec<Article>),
}

impl ReplyKind {
    pub fn text(content: impl Into<String>) -> Self {
        ReplyKind::Text {
            content: content.into(),
        }
    }
}

/// Encode `kind` addressed to `to_user` from `from_user`.
pub fn encode(to_user: &str, from_user: &str, kind: &ReplyKind) -> String {
    match kind {
        ReplyKind::Text { content } => text_reply(to_user, from_user, content),
        ReplyKind::Music(music) => music_reply(to_user, from_user, music),
        ReplyKind::News(articles) => news_reply(to_user, from_user, articles),
    }
}

/// Envelope fields shared by every reply; `CreateTime` is the current unix time in seconds.
pub fn shared_envelope(to_user: &str, from_user: &str, msg_type: &str) -> String {
    envelope_at(to_user, from_user, msg_type, chrono::Utc::now().timestamp())
}

fn envelope_at(to_user: &str, from_user: &str, msg_type: &str, create_time: i64) -> String {
    format!(
        "<ToUserName><![CDATA[{}]]></ToUserName>\
         <FromUserName><![CDATA[{}]]></FromUserName>\
         <CreateTime>{}</CreateTime>\
         <MsgType><![CDATA[{}]]></MsgType>",
        to_user, from_user, create_time, msg_type
    )
}

pub fn text_reply(to_user: &str, from_user: &str, content: &str) -> String {
    format!(
        "<xml>{}<Content><![CDATA[{}]]></Content></xml>",
        shared_envelope(to_user, from_user, "text"),
        content
    )
}

pub fn music_reply(to_user: &str, from_user: &str, music: &Music) -> String {
    format!(
        "<xml>{}<Music>\
         <Title><![CDATA[{}]]></Title>\
         <Description><![CDATA[{}]]></Description>\
         <MusicUrl><![CDATA[{}]]></MusicUrl>\
         <HQMusicUrl><![CDATA[{}]]></HQMusicUrl>\
         </Music></xml>",
        shared_envelope(to_user, from_user, "music"),
        music.title,
        music.description,
        music.music_url,
        music.hq_music_url
    )
}

/// News reply: one `<item>` per article, in order.
pub fn news_reply(to_user: &str, from_user: &str, articles: &[Article]) -> String {
    let mut items = String::new();
    for a in articles {
        let _ = write!(
            items,
            "<item>\
             <Title><![CDATA[{}]]></Title>\
             <Description><![CDATA[{}]]></Description>\
             <PicUrl><![CDATA[{}]]></PicUrl>\
             <Url><![CDATA[{}]]></Url>\
             </item>",
            a.title, a.description, a.pic_url, a.url
        );
    }
    format!(
        "<xml>{}<ArticleCount>{}</ArticleCount><Articles>{}</Articles></xml>",
        shared_envelope(to_user, from_user, "news"),
        articles.len(),
        items
    )
}

#[derive(Serialize)]
struct SendPayload<'a> {
    to_user: &'a str,
    #[serde(rename = "type")]
    msg_type: &'a str,
    text: SendText<'a>,
}

#[derive(Serialize)]
struct SendText<'a> {
    content: &'a str,
}

/// JSON body for a custom-send text message: `{"to_user", "type": "text", "text": {"content"}}`.
pub fn build_send_payload(to_user: &str, content: &str) -> String {
    let payload = SendPayload {
        to_user,
        msg_type: "text",
        text: SendText { content },
    };
    // Only string fields; serialization cannot fail.
    serde_json::to_string(&payload).unwrap_or_default()
}
