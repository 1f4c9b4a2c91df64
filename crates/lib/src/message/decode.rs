//! XML body → tag map → `NormalizedMessage`.

use super::{MessageBody, MessageType, NormalizedMessage};
use crate::error::{Result, WeixinError};
use chrono::DateTime;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Direct children of the root element: tag name -> text content (None when the element has no text).
/// Keeps first-seen order; a repeated tag overwrites the earlier value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTagMap {
    entries: Vec<(String, Option<String>)>,
}

/// Child element currently being read (depth 2).
struct OpenChild {
    tag: String,
    text: String,
    /// Set once a nested element starts; later text is not part of this child's own text.
    nested: bool,
}

impl RawTagMap {
    /// Parse a UTF-8 XML document. Fails on anything that is not a single well-formed root element.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let xml = std::str::from_utf8(raw).map_err(WeixinError::malformed)?;
        let mut reader = Reader::from_str(xml);
        let mut tags = RawTagMap::default();
        let mut depth = 0usize;
        let mut seen_root = false;
        let mut open: Option<OpenChild> = None;

        loop {
            match reader.read_event().map_err(WeixinError::malformed)? {
                Event::Start(e) => {
                    match depth {
                        0 => enter_root(&mut seen_root)?,
                        1 => {
                            open = Some(OpenChild {
                                tag: tag_name(&e)?,
                                text: String::new(),
                                nested: false,
                            })
                        }
                        _ => mark_nested(&mut open),
                    }
                    depth += 1;
                }
                Event::Empty(e) => match depth {
                    0 => enter_root(&mut seen_root)?,
                    1 => tags.insert(tag_name(&e)?, None),
                    _ => mark_nested(&mut open),
                },
                Event::End(_) => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| WeixinError::malformed("unexpected closing tag"))?;
                    if depth == 1 {
                        if let Some(child) = open.take() {
                            let text = (!child.text.is_empty()).then_some(child.text);
                            tags.insert(child.tag, text);
                        }
                    }
                }
                Event::Text(e) => {
                    if depth == 0 {
                        if !e.iter().all(u8::is_ascii_whitespace) {
                            return Err(WeixinError::malformed("text outside the root element"));
                        }
                    } else if depth == 2 {
                        let text = e.unescape().map_err(WeixinError::malformed)?;
                        push_text(&mut open, &text);
                    }
                }
                Event::CData(e) => {
                    if depth == 0 {
                        return Err(WeixinError::malformed("CDATA outside the root element"));
                    }
                    if depth == 2 {
                        let bytes = e.into_inner();
                        let text = std::str::from_utf8(&bytes).map_err(WeixinError::malformed)?;
                        push_text(&mut open, text);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if depth != 0 {
            return Err(WeixinError::malformed("unclosed element at end of document"));
        }
        if !seen_root {
            return Err(WeixinError::malformed("document has no root element"));
        }
        Ok(tags)
    }

    pub fn insert(&mut self, tag: String, text: Option<String>) {
        match self.entries.iter_mut().find(|(t, _)| *t == tag) {
            Some(entry) => entry.1 = text,
            None => self.entries.push((tag, text)),
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.iter().any(|(t, _)| t == tag)
    }

    /// Text of `tag`; None when the tag is absent or empty.
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == tag)
            .and_then(|(_, v)| v.as_deref())
    }

    fn owned(&self, tag: &str) -> Option<String> {
        self.get(tag).map(str::to_string)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(t, v)| (t.as_str(), v.as_deref()))
    }
}

fn enter_root(seen_root: &mut bool) -> Result<()> {
    if *seen_root {
        return Err(WeixinError::malformed("multiple root elements"));
    }
    *seen_root = true;
    Ok(())
}

fn mark_nested(open: &mut Option<OpenChild>) {
    if let Some(child) = open.as_mut() {
        child.nested = true;
    }
}

fn push_text(open: &mut Option<OpenChild>, text: &str) {
    if let Some(child) = open.as_mut() {
        if !child.nested {
            child.text.push_str(text);
        }
    }
}

fn tag_name(e: &BytesStart<'_>) -> Result<String> {
    std::str::from_utf8(e.name().as_ref())
        .map(str::to_string)
        .map_err(WeixinError::malformed)
}

/// Decode a raw XML message body.
pub fn decode(raw: &[u8]) -> Result<NormalizedMessage> {
    let tags = RawTagMap::parse(raw)?;
    normalize(&tags)
}

fn normalize(tags: &RawTagMap) -> Result<NormalizedMessage> {
    let timestamp = if tags.contains("CreateTime") {
        let raw = tags.get("CreateTime").unwrap_or("");
        raw.trim().parse::<i64>().map_err(|_| {
            WeixinError::malformed(format!("CreateTime is not an integer: {:?}", raw))
        })?
    } else {
        0
    };
    // CreateTime is read as milliseconds here, not seconds.
    let time = DateTime::from_timestamp_millis(timestamp)
        .ok_or_else(|| WeixinError::malformed(format!("CreateTime out of range: {}", timestamp)))?;

    let msg_type = MessageType::from_wire(tags.get("MsgType"));
    let body = extract(msg_type, tags);

    Ok(NormalizedMessage {
        id: tags.owned("MsgId"),
        timestamp,
        time,
        receiver: tags.owned("ToUserName"),
        sender: tags.owned("FromUserName"),
        msg_type,
        body,
    })
}

fn extract(msg_type: MessageType, tags: &RawTagMap) -> MessageBody {
    match msg_type {
        MessageType::Text => MessageBody::Text {
            content: tags.owned("Content"),
        },
        MessageType::Image => MessageBody::Image {
            pic_url: tags.owned("PicUrl"),
        },
        MessageType::Location => MessageBody::Location {
            location_x: tags.owned("Location_X"),
            location_y: tags.owned("Location_Y"),
            scale: tags
                .get("Scale")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0),
            label: tags.owned("Label"),
        },
        MessageType::Link => MessageBody::Link {
            title: tags.owned("Title"),
            description: tags.owned("Description"),
            url: tags.owned("Url").or_else(|| tags.owned("url")),
        },
        MessageType::Event => MessageBody::Event {
            event: tags.owned("Event"),
            event_key: tags.owned("EventKey"),
            ticket: tags.owned("Ticket"),
            latitude: tags.owned("Latitude"),
            longitude: tags.owned("Longitude"),
            precision: tags.owned("Precision"),
        },
        MessageType::InvalidType => MessageBody::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_xml() -> &'static str {
        "<xml>\
         <ToUserName><![CDATA[bob]]></ToUserName>\
         <FromUserName><![CDATA[alice]]></FromUserName>\
         <CreateTime>1000000</CreateTime>\
         <MsgType><![CDATA[text]]></MsgType>\
         <Content><![CDATA[hello]]></Content>\
         <MsgId>1</MsgId>\
         </xml>"
    }

    #[test]
    fn decodes_text_message() {
        let msg = decode(text_xml().as_bytes()).unwrap();
        assert_eq!(msg.msg_type, MessageType::Text);
        assert_eq!(msg.content(), Some("hello"));
        assert_eq!(msg.sender.as_deref(), Some("alice"));
        assert_eq!(msg.receiver.as_deref(), Some("bob"));
        assert_eq!(msg.id.as_deref(), Some("1"));
        assert_eq!(msg.timestamp, 1_000_000);
        assert_eq!(msg.time.timestamp(), 1000);
    }

    #[test]
    fn unknown_type_is_invalid_with_no_fields() {
        let xml = "<xml><MsgType>foo</MsgType><Content>hi</Content></xml>";
        let msg = decode(xml.as_bytes()).unwrap();
        assert_eq!(msg.msg_type, MessageType::InvalidType);
        assert_eq!(msg.body, MessageBody::Invalid);
        assert_eq!(msg.content(), None);
    }

    #[test]
    fn missing_type_and_time_default() {
        let msg = decode(b"<xml><FromUserName>alice</FromUserName></xml>").unwrap();
        assert_eq!(msg.msg_type, MessageType::InvalidType);
        assert_eq!(msg.timestamp, 0);
        assert_eq!(msg.time.timestamp(), 0);
        assert_eq!(msg.id, None);
    }

    #[test]
    fn non_numeric_create_time_is_malformed() {
        let err = decode(b"<xml><CreateTime>soon</CreateTime></xml>").unwrap_err();
        assert!(matches!(err, WeixinError::MalformedPayload(_)));
        let err = decode(b"<xml><CreateTime/></xml>").unwrap_err();
        assert!(matches!(err, WeixinError::MalformedPayload(_)));
    }

    #[test]
    fn decodes_location() {
        let xml = "<xml><MsgType>location</MsgType>\
                   <Location_X>23.134521</Location_X><Location_Y>113.358803</Location_Y>\
                   <Scale>20</Scale><Label><![CDATA[somewhere]]></Label></xml>";
        let msg = decode(xml.as_bytes()).unwrap();
        assert_eq!(
            msg.body,
            MessageBody::Location {
                location_x: Some("23.134521".into()),
                location_y: Some("113.358803".into()),
                scale: 20,
                label: Some("somewhere".into()),
            }
        );
    }

    #[test]
    fn location_scale_defaults_to_zero() {
        let msg = decode(b"<xml><MsgType>location</MsgType><Scale>wide</Scale></xml>").unwrap();
        let MessageBody::Location { scale, label, .. } = msg.body else {
            panic!("expected location body");
        };
        assert_eq!(scale, 0);
        assert_eq!(label, None);
    }

    #[test]
    fn decodes_image_link_and_event() {
        let msg = decode(b"<xml><MsgType>image</MsgType><PicUrl>http://p/1.jpg</PicUrl></xml>")
            .unwrap();
        assert_eq!(
            msg.body,
            MessageBody::Image {
                pic_url: Some("http://p/1.jpg".into())
            }
        );

        let msg = decode(
            b"<xml><MsgType>link</MsgType><Title>t</Title><Description>d</Description><Url>http://x</Url></xml>",
        )
        .unwrap();
        assert_eq!(
            msg.body,
            MessageBody::Link {
                title: Some("t".into()),
                description: Some("d".into()),
                url: Some("http://x".into()),
            }
        );

        let msg = decode(
            b"<xml><MsgType>event</MsgType><Event>subscribe</Event><EventKey>qrscene_1</EventKey><Ticket>tk</Ticket></xml>",
        )
        .unwrap();
        assert_eq!(
            msg.body,
            MessageBody::Event {
                event: Some("subscribe".into()),
                event_key: Some("qrscene_1".into()),
                ticket: Some("tk".into()),
                latitude: None,
                longitude: None,
                precision: None,
            }
        );
    }

    #[test]
    fn lowercase_link_url_accepted() {
        let msg = decode(b"<xml><MsgType>link</MsgType><url>http://y</url></xml>").unwrap();
        let MessageBody::Link { url, .. } = msg.body else {
            panic!("expected link body");
        };
        assert_eq!(url.as_deref(), Some("http://y"));
    }

    #[test]
    fn repeated_tag_last_wins() {
        let tags = RawTagMap::parse(b"<xml><A>1</A><B>2</B><A>3</A></xml>").unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.get("A"), Some("3"));
        let order: Vec<&str> = tags.iter().map(|(t, _)| t).collect();
        assert_eq!(order, vec!["A", "B"]);
    }

    #[test]
    fn only_direct_children_and_their_own_text() {
        let tags =
            RawTagMap::parse(b"<xml><A>a &amp; b<Inner>x</Inner>tail</A><Empty></Empty></xml>")
                .unwrap();
        assert_eq!(tags.get("A"), Some("a & b"));
        assert!(!tags.contains("Inner"));
        assert!(tags.contains("Empty"));
        assert_eq!(tags.get("Empty"), None);
    }

    #[test]
    fn malformed_documents_rejected() {
        let cases: [&[u8]; 6] = [
            b"",
            b"not xml",
            b"<xml><A>1</B></xml>",
            b"<xml><A>1</A>",
            b"<xml/><xml/>",
            b"\xff\xfe<xml/>",
        ];
        for bad in cases {
            let err = decode(bad).unwrap_err();
            assert!(
                matches!(err, WeixinError::MalformedPayload(_)),
                "expected malformed for {:?}",
                bad
            );
        }
    }
}
