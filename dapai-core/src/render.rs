//! Message rendering: raw inbound message → markup-safe fragments.
//!
//! Every piece of sender- or message-derived text is HTML-escaped before it
//! is placed in a fragment; fragments carry only escaped strings. The only
//! structure that is not escaped input is the fixed scaffolding emitted by
//! [`RenderedContent::to_html`] and the resolver URL prefix.

use std::fmt::Display;
use std::sync::LazyLock;

use chrono::{Local, TimeZone};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use serde::Serialize;

use crate::message::{InboundMessage, MessageKind};
use crate::session::avatar_text;

/// External player the movie embed points at; the encoded URL is appended.
pub const DEFAULT_RESOLVER_BASE: &str = "https://jx.playerjy.com/?url=";

pub const EMBED_WIDTH: u32 = 400;
pub const EMBED_HEIGHT: u32 = 400;

/// Characters `encodeURIComponent` leaves alone, besides alphanumerics.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@\w+").expect("valid regex"));
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid regex"));

/// Escape text for inclusion in HTML content or a quoted attribute.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Percent-encode like JavaScript's `encodeURIComponent`.
pub fn encode_uri_component(text: &str) -> String {
    utf8_percent_encode(text, URI_COMPONENT).to_string()
}

/// A unit of display-safe content. All strings are already escaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fragment {
    Text { text: String },
    Mention { text: String },
    Link { href: String, text: String },
    Embed { src: String, width: u32, height: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedContent {
    /// Escaped sender nickname.
    pub sender: String,
    /// Escaped avatar text of the sender.
    pub avatar_text: String,
    pub timestamp: i64,
    /// `HH:MM` in local time.
    pub time_label: String,
    pub kind: MessageKind,
    pub fragments: Vec<Fragment>,
}

impl RenderedContent {
    /// Lay the message out as HTML using fixed scaffolding only.
    pub fn to_html(&self) -> String {
        let mut body = String::new();
        for fragment in &self.fragments {
            match fragment {
                Fragment::Text { text } => body.push_str(text),
                Fragment::Mention { text } => {
                    body.push_str(&format!(r#"<span class="mention-highlight">{text}</span>"#));
                }
                Fragment::Link { href, text } => body.push_str(&format!(
                    r#"<a href="{href}" target="_blank" rel="noopener noreferrer">{text}</a>"#
                )),
                Fragment::Embed { src, width, height } => body.push_str(&format!(
                    r#"<div class="movie-player"><iframe src="{src}" width="{width}" height="{height}" frameborder="0" allowfullscreen title="Movie player"></iframe></div>"#
                )),
            }
        }
        format!(
            concat!(
                r#"<div class="message-header">"#,
                r#"<div class="message-avatar">{avatar}</div>"#,
                r#"<span class="message-user">{sender}</span>"#,
                r#"<span class="message-time">{time}</span>"#,
                r#"</div>"#,
                r#"<div class="message-content {kind}">{body}</div>"#,
            ),
            avatar = self.avatar_text,
            sender = self.sender,
            time = self.time_label,
            kind = self.kind.name(),
            body = body,
        )
    }

    /// Concatenated text of the text-like fragments (embeds excluded).
    pub fn plain_text(&self) -> String {
        self.fragments
            .iter()
            .filter_map(|f| match f {
                Fragment::Text { text } | Fragment::Mention { text } | Fragment::Link { text, .. } => {
                    Some(text.as_str())
                }
                Fragment::Embed { .. } => None,
            })
            .collect()
    }
}

/// HTML form of a join/leave notice.
pub fn system_notice_html(text: &str) -> String {
    format!("<p>{}</p>", escape(text))
}

/// `HH:MM` of an epoch-millis timestamp in `tz`.
pub fn format_time_in<Tz>(timestamp_ms: i64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    match tz.timestamp_millis_opt(timestamp_ms).earliest() {
        Some(dt) => dt.format("%H:%M").to_string(),
        None => "--:--".to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct MessageRenderer {
    resolver_base: String,
}

impl Default for MessageRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLVER_BASE)
    }
}

impl MessageRenderer {
    pub fn new(resolver_base: impl Into<String>) -> Self {
        Self {
            resolver_base: resolver_base.into(),
        }
    }

    pub fn render(&self, message: &InboundMessage) -> RenderedContent {
        let fragments = match &message.kind {
            MessageKind::Movie { url: Some(url) } => self.movie_fragments(&message.message, url),
            MessageKind::Movie { url: None } => {
                let mut fragments = Vec::new();
                push_text(&mut fragments, &escape(&message.message));
                fragments
            }
            MessageKind::Mention => mention_fragments(&escape(&message.message)),
            MessageKind::Plain | MessageKind::Ai { .. } | MessageKind::System => {
                let mut fragments = Vec::new();
                linkify_into(&escape(&message.message), &mut fragments);
                fragments
            }
        };
        RenderedContent {
            sender: escape(&message.sender),
            avatar_text: escape(&avatar_text(&message.sender)),
            timestamp: message.timestamp,
            time_label: format_time_in(message.timestamp, &Local),
            kind: message.kind.clone(),
            fragments,
        }
    }

    /// The embed source for a movie URL.
    pub fn embed_src(&self, url: &str) -> String {
        escape(&format!("{}{}", self.resolver_base, encode_uri_component(url)))
    }

    fn movie_fragments(&self, message: &str, url: &str) -> Vec<Fragment> {
        let mut fragments = Vec::new();
        let remainder = message.replacen(url, "", 1);
        push_text(&mut fragments, &escape(remainder.trim()));
        fragments.push(Fragment::Embed {
            src: self.embed_src(url),
            width: EMBED_WIDTH,
            height: EMBED_HEIGHT,
        });
        fragments
    }
}

fn push_text(fragments: &mut Vec<Fragment>, text: &str) {
    if !text.is_empty() {
        fragments.push(Fragment::Text {
            text: text.to_string(),
        });
    }
}

/// Split escaped text into text runs and links.
fn linkify_into(escaped: &str, fragments: &mut Vec<Fragment>) {
    let mut last = 0;
    for m in LINK_RE.find_iter(escaped) {
        push_text(fragments, &escaped[last..m.start()]);
        fragments.push(Fragment::Link {
            href: m.as_str().to_string(),
            text: m.as_str().to_string(),
        });
        last = m.end();
    }
    push_text(fragments, &escaped[last..]);
}

/// Mentions first; the runs between them still get link detection.
fn mention_fragments(escaped: &str) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    let mut last = 0;
    for m in MENTION_RE.find_iter(escaped) {
        linkify_into(&escaped[last..m.start()], &mut fragments);
        fragments.push(Fragment::Mention {
            text: m.as_str().to_string(),
        });
        last = m.end();
    }
    linkify_into(&escaped[last..], &mut fragments);
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sender: &str, text: &str, kind: MessageKind) -> InboundMessage {
        InboundMessage {
            sender: sender.to_string(),
            message: text.to_string(),
            timestamp: 1_700_000_000_000,
            kind,
        }
    }

    fn text(s: &str) -> Fragment {
        Fragment::Text { text: s.to_string() }
    }

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
        assert_eq!(escape("plain 文字"), "plain 文字");
    }

    #[test]
    fn test_encode_uri_component() {
        assert_eq!(
            encode_uri_component("http://x/y z?a=1&b=ü"),
            "http%3A%2F%2Fx%2Fy%20z%3Fa%3D1%26b%3D%C3%BC"
        );
        assert_eq!(encode_uri_component("A-z_0.!~*'()"), "A-z_0.!~*'()");
    }

    #[test]
    fn test_movie_embed_replaces_url() {
        let renderer = MessageRenderer::default();
        let rendered = renderer.render(&message(
            "bob",
            "check @movie http://x/y.mp4",
            MessageKind::Movie {
                url: Some("http://x/y.mp4".to_string()),
            },
        ));

        assert_eq!(
            rendered.fragments,
            vec![
                text("check @movie"),
                Fragment::Embed {
                    src: "https://jx.playerjy.com/?url=http%3A%2F%2Fx%2Fy.mp4".to_string(),
                    width: 400,
                    height: 400,
                },
            ]
        );
        assert!(!rendered.plain_text().contains("http://x/y.mp4"));
        let embeds = rendered
            .fragments
            .iter()
            .filter(|f| matches!(f, Fragment::Embed { .. }))
            .count();
        assert_eq!(embeds, 1);
    }

    #[test]
    fn test_movie_with_only_url_has_no_text() {
        let renderer = MessageRenderer::new("https://player.test/?u=");
        let rendered = renderer.render(&message(
            "bob",
            "  http://x/a.mp4 ",
            MessageKind::Movie {
                url: Some("http://x/a.mp4".to_string()),
            },
        ));
        assert_eq!(rendered.fragments.len(), 1);
        assert!(rendered.to_html().contains(r#"src="https://player.test/?u=http%3A%2F%2Fx%2Fa.mp4""#));
    }

    #[test]
    fn test_movie_text_is_escaped_and_not_linkified() {
        let renderer = MessageRenderer::default();
        let rendered = renderer.render(&message(
            "bob",
            "<b>film</b> https://other.site http://x/y.mp4",
            MessageKind::Movie {
                url: Some("http://x/y.mp4".to_string()),
            },
        ));
        assert_eq!(
            rendered.fragments[0],
            text("&lt;b&gt;film&lt;/b&gt; https://other.site")
        );
    }

    #[test]
    fn test_movie_without_url_stays_movie_text() {
        let incoming = InboundMessage::from(dapai_sdk::event::MessagePayload {
            sender: "bob".to_string(),
            message: "watch <this> http://x/y.mp4".to_string(),
            timestamp: serde_json::Value::Null,
            kind: "movie".to_string(),
            command_data: None,
        });
        let rendered = MessageRenderer::default().render(&incoming);

        assert_eq!(rendered.kind.name(), "movie");
        assert_eq!(
            rendered.fragments,
            vec![text("watch &lt;this&gt; http://x/y.mp4")]
        );
        assert!(rendered.to_html().contains(r#"<div class="message-content movie">"#));
        assert!(!rendered.to_html().contains("<a "));
        assert!(!rendered.to_html().contains("<iframe"));
    }

    #[test]
    fn test_mentions_are_highlighted() {
        let rendered = MessageRenderer::default().render(&message(
            "ann",
            "hi @bob and @小明!",
            MessageKind::Mention,
        ));
        assert_eq!(
            rendered.fragments,
            vec![
                text("hi "),
                Fragment::Mention { text: "@bob".to_string() },
                text(" and "),
                Fragment::Mention { text: "@小明".to_string() },
                text("!"),
            ]
        );
        assert!(rendered
            .to_html()
            .contains(r#"<span class="mention-highlight">@bob</span>"#));
    }

    #[test]
    fn test_mention_message_links_between_mentions() {
        let rendered = MessageRenderer::default().render(&message(
            "ann",
            "@bob see https://a.b/c",
            MessageKind::Mention,
        ));
        assert_eq!(
            rendered.fragments,
            vec![
                Fragment::Mention { text: "@bob".to_string() },
                text(" see "),
                Fragment::Link {
                    href: "https://a.b/c".to_string(),
                    text: "https://a.b/c".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_plain_links() {
        let rendered = MessageRenderer::default().render(&message(
            "ann",
            "go to https://x.com/a?b=1&c=2 now",
            MessageKind::Plain,
        ));
        assert_eq!(
            rendered.fragments,
            vec![
                text("go to "),
                Fragment::Link {
                    href: "https://x.com/a?b=1&amp;c=2".to_string(),
                    text: "https://x.com/a?b=1&amp;c=2".to_string(),
                },
                text(" now"),
            ]
        );
        assert!(rendered.to_html().contains(
            r#"<a href="https://x.com/a?b=1&amp;c=2" target="_blank" rel="noopener noreferrer">"#
        ));
    }

    #[test]
    fn test_plain_message_mentions_are_not_highlighted() {
        let rendered =
            MessageRenderer::default().render(&message("ann", "hey @bob", MessageKind::Plain));
        assert_eq!(rendered.fragments, vec![text("hey @bob")]);
    }

    #[test]
    fn test_ai_messages_are_linkified_only() {
        let rendered = MessageRenderer::default().render(&message(
            "AI",
            "see http://docs.rs",
            MessageKind::Ai { question: None },
        ));
        assert_eq!(rendered.fragments.len(), 2);
        assert!(rendered.to_html().contains(r#"class="message-content ai""#));
    }

    #[test]
    fn test_hostile_input_never_reaches_markup() {
        let renderer = MessageRenderer::default();
        let payloads = [
            r#"<img src=x onerror="alert(1)">"#,
            "<script>alert('x')</script>",
            r#"@<b>bob</b> "quoted" & more"#,
            r#"http://evil/"><script>"#,
        ];
        let kinds = [
            MessageKind::Plain,
            MessageKind::Mention,
            MessageKind::Ai { question: None },
            MessageKind::Movie {
                url: Some(r#"http://evil/"><script>"#.to_string()),
            },
            MessageKind::Movie { url: None },
        ];
        for payload in payloads {
            for kind in &kinds {
                let rendered = renderer.render(&message("<b>mallory</b>", payload, kind.clone()));
                let html = rendered.to_html();
                assert!(!html.contains("<script"), "{html}");
                assert!(!html.contains("<img"), "{html}");
                assert!(!html.contains("<b>"), "{html}");
                assert!(!html.contains(r#""quoted""#), "{html}");
                assert_eq!(rendered.sender, "&lt;b&gt;mallory&lt;/b&gt;");
                assert_eq!(rendered.avatar_text, "&lt;B");
            }
        }
    }

    #[test]
    fn test_time_label() {
        assert_eq!(format_time_in(1_700_000_000_000, &chrono::Utc), "22:13");
        assert_eq!(format_time_in(0, &chrono::Utc), "00:00");
    }

    #[test]
    fn test_system_notice_html() {
        assert_eq!(
            system_notice_html("<b>bob</b> joined"),
            "<p>&lt;b&gt;bob&lt;/b&gt; joined</p>"
        );
    }
}
