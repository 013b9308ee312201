//! The destination store's block model, as far as this pipeline uses it.
//! Blocks serialize to the store's JSON shape; text leaves are limited to
//! 2000 characters, so longer runs are split at sentence boundaries before
//! a block is ever built.

use serde_json::{json, Value};

/// Hard per-block character limit imposed by the store API.
pub const MAX_TEXT_BLOCK_CHARS: usize = 2000;

/// One styled run of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
    pub href: Option<String>,
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: false,
            italic: false,
            code: false,
            href: None,
        }
    }

    pub fn link(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            href: Some(url.into()),
            ..Self::plain(text)
        }
    }
}

/// A sequence of styled runs, the content of every text-bearing block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RichText(pub Vec<Span>);

impl RichText {
    pub fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            return Self::default();
        }
        Self(vec![Span::plain(text)])
    }

    /// Total character count across spans.
    pub fn char_len(&self) -> usize {
        self.0.iter().map(|s| s.text.chars().count()).sum()
    }

    pub fn to_plain_string(&self) -> String {
        self.0.iter().map(|s| s.text.as_str()).collect()
    }

    fn to_json(&self) -> Value {
        Value::Array(
            self.0
                .iter()
                .map(|span| {
                    let mut text = json!({ "content": span.text });
                    if let Some(url) = &span.href {
                        text["link"] = json!({ "url": url });
                    }
                    json!({
                        "type": "text",
                        "text": text,
                        "annotations": {
                            "bold": span.bold,
                            "italic": span.italic,
                            "code": span.code,
                        }
                    })
                })
                .collect(),
        )
    }
}

/// The block subset the formatter emits.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading2(RichText),
    Heading3(RichText),
    Paragraph(RichText),
    Bullet(RichText),
    Numbered(RichText),
    Quote(RichText),
    Code {
        language: String,
        text: String,
    },
    Callout {
        emoji: String,
        text: RichText,
        children: Vec<Block>,
    },
    Toggle {
        title: RichText,
        children: Vec<Block>,
    },
    Bookmark {
        url: String,
    },
    Divider,
}

impl Block {
    /// The store's JSON representation of this block.
    pub fn to_json(&self) -> Value {
        match self {
            Block::Heading2(text) => json!({
                "object": "block",
                "type": "heading_2",
                "heading_2": { "rich_text": text.to_json() }
            }),
            Block::Heading3(text) => json!({
                "object": "block",
                "type": "heading_3",
                "heading_3": { "rich_text": text.to_json() }
            }),
            Block::Paragraph(text) => json!({
                "object": "block",
                "type": "paragraph",
                "paragraph": { "rich_text": text.to_json() }
            }),
            Block::Bullet(text) => json!({
                "object": "block",
                "type": "bulleted_list_item",
                "bulleted_list_item": { "rich_text": text.to_json() }
            }),
            Block::Numbered(text) => json!({
                "object": "block",
                "type": "numbered_list_item",
                "numbered_list_item": { "rich_text": text.to_json() }
            }),
            Block::Quote(text) => json!({
                "object": "block",
                "type": "quote",
                "quote": { "rich_text": text.to_json() }
            }),
            Block::Code { language, text } => json!({
                "object": "block",
                "type": "code",
                "code": {
                    "language": language,
                    "rich_text": RichText::plain(text.clone()).to_json()
                }
            }),
            Block::Callout {
                emoji,
                text,
                children,
            } => {
                let mut body = json!({
                    "icon": { "type": "emoji", "emoji": emoji },
                    "rich_text": text.to_json(),
                });
                if !children.is_empty() {
                    body["children"] = blocks_to_json(children);
                }
                json!({ "object": "block", "type": "callout", "callout": body })
            }
            Block::Toggle { title, children } => {
                let mut body = json!({ "rich_text": title.to_json() });
                if !children.is_empty() {
                    body["children"] = blocks_to_json(children);
                }
                json!({ "object": "block", "type": "toggle", "toggle": body })
            }
            Block::Bookmark { url } => json!({
                "object": "block",
                "type": "bookmark",
                "bookmark": { "url": url }
            }),
            Block::Divider => json!({
                "object": "block",
                "type": "divider",
                "divider": {}
            }),
        }
    }

    /// Character count of this block's own text (children excluded).
    pub fn text_char_len(&self) -> usize {
        match self {
            Block::Heading2(t)
            | Block::Heading3(t)
            | Block::Paragraph(t)
            | Block::Bullet(t)
            | Block::Numbered(t)
            | Block::Quote(t) => t.char_len(),
            Block::Code { text, .. } => text.chars().count(),
            Block::Callout { text, .. } => text.char_len(),
            Block::Toggle { title, .. } => title.char_len(),
            Block::Bookmark { .. } | Block::Divider => 0,
        }
    }
}

/// Serializes a block list for a create/append request body.
pub fn blocks_to_json(blocks: &[Block]) -> Value {
    Value::Array(blocks.iter().map(Block::to_json).collect())
}

/// Splits text into chunks of at most [`MAX_TEXT_BLOCK_CHARS`] characters,
/// cutting at sentence boundaries where one exists inside the window and
/// falling back to a whitespace cut, then a hard cut.
pub fn split_long_text(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining: &str = text;

    while remaining.chars().count() > MAX_TEXT_BLOCK_CHARS {
        let window: String = remaining.chars().take(MAX_TEXT_BLOCK_CHARS).collect();
        let cut = sentence_cut(&window)
            .or_else(|| window.rfind(char::is_whitespace))
            .filter(|&c| c > 0)
            .unwrap_or(window.len());
        chunks.push(window[..cut].trim_end().to_string());
        remaining = &remaining[cut..];
        remaining = remaining.trim_start();
    }
    if !remaining.is_empty() {
        chunks.push(remaining.to_string());
    }
    chunks
}

/// Byte offset just past the last sentence terminator in `window`, if any.
fn sentence_cut(window: &str) -> Option<usize> {
    window
        .char_indices()
        .filter(|(_, c)| matches!(c, '.' | '!' | '?'))
        .map(|(i, c)| i + c.len_utf8())
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(split_long_text("hello world."), vec!["hello world."]);
    }

    #[test]
    fn long_text_splits_at_sentence_boundaries() {
        let sentence = "This sentence is about sixty characters long for the test. ";
        let text = sentence.repeat(60);
        let chunks = split_long_text(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= MAX_TEXT_BLOCK_CHARS);
            assert!(chunk.ends_with('.'), "chunk should end on a sentence: {chunk:?}");
        }
    }

    #[test]
    fn unbroken_text_still_splits() {
        let text = "x".repeat(4500);
        let chunks = split_long_text(&text);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= MAX_TEXT_BLOCK_CHARS));
    }

    #[test]
    fn block_json_shapes() {
        let block = Block::Callout {
            emoji: "📝".into(),
            text: RichText::plain("Summary"),
            children: vec![Block::Paragraph(RichText::plain("body"))],
        };
        let value = block.to_json();
        assert_eq!(value["type"], "callout");
        assert_eq!(value["callout"]["icon"]["emoji"], "📝");
        assert_eq!(
            value["callout"]["children"][0]["paragraph"]["rich_text"][0]["text"]["content"],
            "body"
        );

        let plain = Block::Paragraph(RichText(vec![Span {
            text: "bold".into(),
            bold: true,
            italic: false,
            code: false,
            href: None,
        }]));
        assert_eq!(
            plain.to_json()["paragraph"]["rich_text"][0]["annotations"]["bold"],
            true
        );
    }
}
