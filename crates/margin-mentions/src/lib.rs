#![warn(missing_docs)]
//! `margin-mentions` - tokenizer for comment bodies.
//!
//! Comment text is stored as a flat string that may carry mention tokens in one of two
//! grammars, depending on when the comment was written:
//!
//! - **Bracketed** (legacy): `<#USERID:DISPLAYNAME#>`. The reserved user id
//!   [`DOCUMENT_MENTION_USER_ID`] mentions the whole document membership instead of one user.
//! - **Angle-bracket user id** (current): `<@U<digits>>`.
//!
//! [`tokenize`] turns such a string into [`ContentSegment`]s that a renderer can draw directly.
//! The bracketed grammar is applied first; the user-id grammar is only applied to the plain
//! text that survives it. Line breaks become [`ContentSegment::Break`].
//!
//! ```rust
//! use margin_mentions::{ContentSegment, Member, tokenize};
//!
//! let members = vec![Member::new(2, "User 2")];
//! let segments = tokenize("ping <@U2>\nthanks", &members);
//!
//! assert_eq!(segments.len(), 4);
//! assert_eq!(segments[0], ContentSegment::Text("ping "));
//! assert_eq!(segments[2], ContentSegment::Break);
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// User id that turns a bracketed mention into a document mention.
pub const DOCUMENT_MENTION_USER_ID: &str = "0";

static BRACKETED_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<#([^:#\n]*):([^\n]*?)#>").expect("valid bracketed mention regex"));

static USER_ID_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@U(\d+)>").expect("valid user id mention regex"));

/// A document member that mentions can resolve to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Numeric user id.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Optional avatar URL (host-defined).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl Member {
    /// Create a member without an avatar.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            avatar_url: None,
        }
    }
}

/// A user mention found in comment text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mention<'a> {
    /// Text the mention stands for in the source: the display name for bracketed mentions,
    /// the raw `<@U..>` token for user-id mentions.
    pub token: &'a str,
    /// Raw user id as written in the source.
    pub user_id: &'a str,
    /// The member with a matching numeric id, if any.
    pub user: Option<&'a Member>,
}

impl<'a> Mention<'a> {
    /// Text to show for this mention: the resolved member's name, else the token.
    pub fn display(&self) -> &'a str {
        match self.user {
            Some(member) => member.name.as_str(),
            None => self.token,
        }
    }
}

/// One typed piece of a tokenized comment body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ContentSegment<'a> {
    /// Plain text (never empty).
    Text(&'a str),
    /// A line break.
    Break,
    /// A mention of one user.
    Mention(Mention<'a>),
    /// A mention of the whole document membership; carries the token text.
    DocumentMention(&'a str),
}

impl ContentSegment<'_> {
    /// Source text this segment stands for (`"\n"` for breaks, token text for mentions).
    pub fn source_text(&self) -> &str {
        match self {
            ContentSegment::Text(text) => text,
            ContentSegment::Break => "\n",
            ContentSegment::Mention(mention) => mention.token,
            ContentSegment::DocumentMention(token) => token,
        }
    }
}

/// Tokenize a comment body against the document's member list.
pub fn tokenize<'a>(source: &'a str, members: &'a [Member]) -> Vec<ContentSegment<'a>> {
    let mut out = Vec::new();
    let mut cursor = 0usize;

    for captures in BRACKETED_MENTION.captures_iter(source) {
        let (Some(whole), Some(user_id), Some(name)) =
            (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };

        push_plain(&mut out, &source[cursor..whole.start()], members);
        if user_id.as_str() == DOCUMENT_MENTION_USER_ID {
            out.push(ContentSegment::DocumentMention(name.as_str()));
        } else {
            out.push(ContentSegment::Mention(Mention {
                token: name.as_str(),
                user_id: user_id.as_str(),
                user: resolve(user_id.as_str(), members),
            }));
        }
        cursor = whole.end();
    }

    push_plain(&mut out, &source[cursor..], members);
    out
}

/// Split plain text on line breaks, then scan each line for user-id mentions.
fn push_plain<'a>(out: &mut Vec<ContentSegment<'a>>, text: &'a str, members: &'a [Member]) {
    let mut lines = text.split('\n').peekable();
    while let Some(line) = lines.next() {
        push_user_id_mentions(out, line, members);
        if lines.peek().is_some() {
            out.push(ContentSegment::Break);
        }
    }
}

fn push_user_id_mentions<'a>(
    out: &mut Vec<ContentSegment<'a>>,
    text: &'a str,
    members: &'a [Member],
) {
    let mut cursor = 0usize;
    for captures in USER_ID_MENTION.captures_iter(text) {
        let (Some(whole), Some(digits)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        push_text(out, &text[cursor..whole.start()]);
        out.push(ContentSegment::Mention(Mention {
            token: whole.as_str(),
            user_id: digits.as_str(),
            user: resolve(digits.as_str(), members),
        }));
        cursor = whole.end();
    }
    push_text(out, &text[cursor..]);
}

fn push_text<'a>(out: &mut Vec<ContentSegment<'a>>, text: &'a str) {
    if !text.is_empty() {
        out.push(ContentSegment::Text(text));
    }
}

fn resolve<'a>(user_id: &str, members: &'a [Member]) -> Option<&'a Member> {
    let id: u64 = user_id.trim().parse().ok()?;
    members.iter().find(|member| member.id == id)
}

/// Numeric ids of every resolvable-looking user mention in `source`, in first-seen order.
///
/// Document mentions are not included; hosts expand those to the full membership themselves.
pub fn mentioned_user_ids(source: &str) -> Vec<u64> {
    let mut ids: Vec<u64> = Vec::new();
    for segment in tokenize(source, &[]) {
        if let ContentSegment::Mention(mention) = segment
            && let Ok(id) = mention.user_id.trim().parse::<u64>()
            && !ids.contains(&id)
        {
            ids.push(id);
        }
    }
    ids
}

/// Flatten segments into display text (mentions render as `@name`).
pub fn to_plain_text(segments: &[ContentSegment<'_>]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            ContentSegment::Text(text) => out.push_str(text),
            ContentSegment::Break => out.push('\n'),
            ContentSegment::Mention(mention) => match mention.user {
                Some(member) => {
                    out.push('@');
                    out.push_str(&member.name);
                }
                None => out.push_str(mention.token),
            },
            ContentSegment::DocumentMention(token) => {
                out.push('@');
                out.push_str(token);
            }
        }
    }
    out
}

/// Encode a user mention in the current `<@U<id>>` grammar.
pub fn encode_mention(user_id: u64) -> String {
    format!("<@U{user_id}>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_single_segment() {
        assert_eq!(tokenize("hello", &[]), vec![ContentSegment::Text("hello")]);
    }

    #[test]
    fn test_empty_source_yields_nothing() {
        assert!(tokenize("", &[]).is_empty());
    }

    #[test]
    fn test_consecutive_breaks_have_no_empty_text_between() {
        assert_eq!(
            tokenize("a\n\nb", &[]),
            vec![
                ContentSegment::Text("a"),
                ContentSegment::Break,
                ContentSegment::Break,
                ContentSegment::Text("b"),
            ]
        );
    }

    #[test]
    fn test_document_mention_sentinel() {
        let segments = tokenize("hey <#0:everyone#>!", &[]);
        assert_eq!(
            segments,
            vec![
                ContentSegment::Text("hey "),
                ContentSegment::DocumentMention("everyone"),
                ContentSegment::Text("!"),
            ]
        );
    }

    #[test]
    fn test_unknown_user_falls_back_to_token() {
        let members = vec![Member::new(1, "One")];
        let segments = tokenize("<@U9>", &members);
        let ContentSegment::Mention(mention) = &segments[0] else {
            panic!("expected mention, got {:?}", segments[0]);
        };
        assert!(mention.user.is_none());
        assert_eq!(mention.display(), "<@U9>");
    }

    #[test]
    fn test_user_id_grammar_does_not_rescan_bracketed_names() {
        let members = vec![Member::new(3, "Three")];
        let segments = tokenize("<#4:<@U3>#>", &members);
        assert_eq!(segments.len(), 1);
        let ContentSegment::Mention(mention) = &segments[0] else {
            panic!("expected mention");
        };
        assert_eq!(mention.token, "<@U3>");
        assert_eq!(mention.user_id, "4");
        assert!(mention.user.is_none());
    }

    #[test]
    fn test_mentioned_user_ids_dedup() {
        assert_eq!(
            mentioned_user_ids("<@U2> <#5:Five#> <@U2> <#0:all#>"),
            vec![2, 5]
        );
    }

    #[test]
    fn test_encode_round_trips_through_tokenize() {
        let members = vec![Member::new(42, "Answer")];
        let text = encode_mention(42);
        let segments = tokenize(&text, &members);
        assert_eq!(to_plain_text(&segments), "@Answer");
    }
}
