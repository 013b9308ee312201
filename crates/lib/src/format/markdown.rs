//! Markdown-to-block conversion for the subset the destination store can
//! render: H2/H3 headings, bulleted and numbered lists, bold, italic,
//! inline code, block quotes, and fenced code. Anything else is downgraded
//! to a plain paragraph rather than dropped.

use regex::Regex;

use super::blocks::{split_long_text, Block, RichText, Span};

/// Converts a markdown document into blocks. Paragraphs longer than the
/// store's per-block limit come back as several consecutive paragraphs,
/// split at sentence boundaries.
pub fn markdown_to_blocks(markdown: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<String> = Vec::new();
    let mut code: Option<(String, Vec<String>)> = None;

    for line in markdown.lines() {
        if let Some((language, lines)) = code.as_mut() {
            if line.trim_start().starts_with("```") {
                blocks.push(Block::Code {
                    language: std::mem::take(language),
                    text: lines.join("\n"),
                });
                code = None;
            } else {
                lines.push(line.to_string());
            }
            continue;
        }

        let trimmed = line.trim();

        if let Some(rest) = trimmed.strip_prefix("```") {
            flush_paragraph(&mut blocks, &mut paragraph);
            let language = rest.trim();
            code = Some((
                if language.is_empty() {
                    "plain text".to_string()
                } else {
                    language.to_string()
                },
                Vec::new(),
            ));
            continue;
        }

        if trimmed.is_empty() {
            flush_paragraph(&mut blocks, &mut paragraph);
            continue;
        }

        if let Some(rest) = heading_text(trimmed, "### ") {
            flush_paragraph(&mut blocks, &mut paragraph);
            blocks.push(Block::Heading3(inline_spans(rest)));
        } else if let Some(rest) = heading_text(trimmed, "## ").or_else(|| heading_text(trimmed, "# ")) {
            // H1 is outside the subset; it joins H2 rather than vanishing.
            flush_paragraph(&mut blocks, &mut paragraph);
            blocks.push(Block::Heading2(inline_spans(rest)));
        } else if let Some(rest) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
            flush_paragraph(&mut blocks, &mut paragraph);
            blocks.push(Block::Bullet(inline_spans(rest)));
        } else if let Some(rest) = numbered_item(trimmed) {
            flush_paragraph(&mut blocks, &mut paragraph);
            blocks.push(Block::Numbered(inline_spans(rest)));
        } else if let Some(rest) = trimmed.strip_prefix("> ") {
            flush_paragraph(&mut blocks, &mut paragraph);
            blocks.push(Block::Quote(inline_spans(rest)));
        } else {
            // Unsupported constructs (tables, images, horizontal rules)
            // fall through here and become paragraph text.
            paragraph.push(trimmed.to_string());
        }
    }

    // An unterminated fence is treated as code to the end of input.
    if let Some((language, lines)) = code {
        blocks.push(Block::Code {
            language,
            text: lines.join("\n"),
        });
    }
    flush_paragraph(&mut blocks, &mut paragraph);
    blocks
}

fn flush_paragraph(blocks: &mut Vec<Block>, paragraph: &mut Vec<String>) {
    if paragraph.is_empty() {
        return;
    }
    let text = paragraph.join(" ");
    paragraph.clear();
    for chunk in split_long_text(&text) {
        blocks.push(Block::Paragraph(inline_spans(&chunk)));
    }
}

fn heading_text<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix).map(str::trim)
}

fn numbered_item(line: &str) -> Option<&str> {
    let re = Regex::new(r"^\d{1,3}[.)]\s+").unwrap();
    re.find(line).map(|m| line[m.end()..].trim())
}

/// Parses inline `**bold**`, `*italic*`, and `` `code` `` runs into spans.
/// Malformed markers are left as literal text.
pub fn inline_spans(text: &str) -> RichText {
    let pattern = Regex::new(r"(\*\*[^*]+\*\*|\*[^*\s][^*]*\*|`[^`]+`)").unwrap();
    let mut spans = Vec::new();
    let mut cursor = 0;

    for found in pattern.find_iter(text) {
        if found.start() > cursor {
            spans.push(Span::plain(&text[cursor..found.start()]));
        }
        let token = found.as_str();
        if let Some(inner) = token.strip_prefix("**").and_then(|t| t.strip_suffix("**")) {
            spans.push(Span {
                text: inner.to_string(),
                bold: true,
                italic: false,
                code: false,
                href: None,
            });
        } else if let Some(inner) = token.strip_prefix('`').and_then(|t| t.strip_suffix('`')) {
            spans.push(Span {
                text: inner.to_string(),
                bold: false,
                italic: false,
                code: true,
                href: None,
            });
        } else if let Some(inner) = token.strip_prefix('*').and_then(|t| t.strip_suffix('*')) {
            spans.push(Span {
                text: inner.to_string(),
                bold: false,
                italic: true,
                code: false,
                href: None,
            });
        }
        cursor = found.end();
    }
    if cursor < text.len() {
        spans.push(Span::plain(&text[cursor..]));
    }
    if spans.is_empty() {
        spans.push(Span::plain(""));
    }
    RichText(spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_lists_and_quotes_convert() {
        let md = "## Overview\nSome intro text.\n\n- first\n- second\n1. one\n> quoted\n### Detail";
        let blocks = markdown_to_blocks(md);
        assert!(matches!(blocks[0], Block::Heading2(_)));
        assert!(matches!(blocks[1], Block::Paragraph(_)));
        assert!(matches!(blocks[2], Block::Bullet(_)));
        assert!(matches!(blocks[3], Block::Bullet(_)));
        assert!(matches!(blocks[4], Block::Numbered(_)));
        assert!(matches!(blocks[5], Block::Quote(_)));
        assert!(matches!(blocks[6], Block::Heading3(_)));
    }

    #[test]
    fn h1_downgrades_to_h2() {
        let blocks = markdown_to_blocks("# Top");
        match &blocks[0] {
            Block::Heading2(text) => assert_eq!(text.to_plain_string(), "Top"),
            other => panic!("expected heading, got {other:?}"),
        }
    }

    #[test]
    fn fenced_code_is_preserved() {
        let blocks = markdown_to_blocks("```rust\nfn main() {}\n```");
        match &blocks[0] {
            Block::Code { language, text } => {
                assert_eq!(language, "rust");
                assert_eq!(text, "fn main() {}");
            }
            other => panic!("expected code, got {other:?}"),
        }
    }

    #[test]
    fn tables_downgrade_to_paragraphs() {
        let blocks = markdown_to_blocks("| a | b |\n|---|---|\n| 1 | 2 |");
        assert_eq!(blocks.len(), 1);
        assert!(matches!(blocks[0], Block::Paragraph(_)));
    }

    #[test]
    fn inline_styles_become_annotated_spans() {
        let rich = inline_spans("plain **bold** and *ital* plus `code` end");
        let spans = &rich.0;
        assert_eq!(spans.len(), 7);
        assert!(spans[1].bold && spans[1].text == "bold");
        assert!(spans[3].italic && spans[3].text == "ital");
        assert!(spans[5].code && spans[5].text == "code");
    }

    #[test]
    fn long_paragraphs_split_into_consecutive_blocks() {
        let text = "A sentence that is reasonably long for splitting purposes. ".repeat(80);
        let blocks = markdown_to_blocks(&text);
        assert!(blocks.len() > 1);
        assert!(blocks
            .iter()
            .all(|b| b.text_char_len() <= super::super::blocks::MAX_TEXT_BLOCK_CHARS));
    }
}
