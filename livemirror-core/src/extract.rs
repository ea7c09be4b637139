//! Formatting extractor: raw text × rendered markup → lines of styled words.
//!
//! The rendered view knows the style of every run but not the buffer's exact
//! characters; the buffer knows the characters but not their style. We walk
//! the rendered lines char by char while advancing a single cursor through
//! the raw text. The cursor moves once per rendered char and is never reset
//! or realigned between lines, so raw line breaks are not skipped.
//!
//! ```text
//! raw:     l e t   x   =   1 ␠
//!          │ │ │ │ │ │ │ │ │ │
//! markup: [let ][x] ␠ = ␠ 1            (spans + loose text)
//!          │    │   │ │ │ │
//! words:  let ␠ x   ␠ = ␠ 1
//! ```
//!
//! Wire shape: `{"ws": [{"w": "let", "c": "cm-keyword"}, ...]}`.

use serde::{Deserialize, Serialize};

use crate::markup::{MarkupNode, MarkupTree};

/// Class token of a rendered line container.
pub const LINE_CLASS: &str = "cm-line";
/// Class of the remote-caret marker span.
pub const CARET_CLASS: &str = "cm-ySelectionCaret";

/// Canonical class for whitespace, padding and unstyled spans.
pub const PLAIN: &str = "plain";
/// Canonical class for non-whitespace chars of unstyled text.
pub const SYMBOL: &str = "symbol";
/// Canonical class replacing [`CARET_CLASS`].
pub const CARET: &str = "caret";

/// A run of chars sharing one style class, or a single separator char.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordUnit {
    #[serde(rename = "w")]
    pub text: String,
    #[serde(rename = "c")]
    pub style_class: String,
}

impl WordUnit {
    pub fn new(text: impl Into<String>, style_class: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style_class: style_class.into(),
        }
    }

    fn separator(ch: char, style_class: &str) -> Self {
        Self {
            text: ch.to_string(),
            style_class: style_class.to_string(),
        }
    }

    /// Number of chars in this unit.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// One rendered line, as ordered words.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineUnit {
    #[serde(rename = "ws")]
    pub words: Vec<WordUnit>,
}

impl LineUnit {
    /// The line's text, reassembled from its words.
    pub fn text(&self) -> String {
        self.words.iter().map(|w| w.text.as_str()).collect()
    }

    pub fn char_count(&self) -> usize {
        self.words.iter().map(WordUnit::char_count).sum()
    }
}

/// Extract the styled line sequence of the current buffer.
///
/// Returns `None` when the view has no markup yet; callers treat that as
/// "nothing to send". Never fails: unknown elements are read as plain text.
pub fn extract(raw_text: &str, markup: Option<&MarkupTree>) -> Option<Vec<LineUnit>> {
    let markup = markup?;
    let mut walker = Walker::new(raw_text);
    Some(
        markup
            .find_all(LINE_CLASS)
            .into_iter()
            .map(|line| walker.line(line))
            .collect(),
    )
}

/// Cursor into the raw text, shared by every line of one extraction.
struct Walker {
    raw: Vec<char>,
    text_index: usize,
}

impl Walker {
    fn new(raw_text: &str) -> Self {
        Self {
            raw: raw_text.chars().collect(),
            text_index: 0,
        }
    }

    fn past_end(&self) -> bool {
        self.text_index >= self.raw.len()
    }

    fn line(&mut self, line: &MarkupNode) -> LineUnit {
        let mut words = Vec::new();
        for child in line.children() {
            match child {
                MarkupNode::Element {
                    tag, class_name, ..
                } if tag == "span" => {
                    self.span(&child.text_content(), span_class(class_name), &mut words);
                }
                other => self.loose_text(&other.text_content(), &mut words),
            }
        }
        LineUnit { words }
    }

    fn span(&mut self, text: &str, class: &str, words: &mut Vec<WordUnit>) {
        let mut word = String::new();
        for ch in text.chars() {
            if ch == ' ' || self.past_end() {
                flush(&mut word, class, words);
                words.push(WordUnit::separator(ch, class));
            } else {
                word.push(ch);
            }
            self.text_index += 1;
        }
        flush(&mut word, class, words);
    }

    /// Text outside any span carries no style, so every char stands alone.
    fn loose_text(&mut self, text: &str, words: &mut Vec<WordUnit>) {
        for ch in text.chars() {
            let class = if ch.is_whitespace() || self.past_end() {
                PLAIN
            } else {
                SYMBOL
            };
            words.push(WordUnit::separator(ch, class));
            self.text_index += 1;
        }
    }
}

fn span_class(class_name: &str) -> &str {
    match class_name {
        "" => PLAIN,
        CARET_CLASS => CARET,
        other => other,
    }
}

fn flush(word: &mut String, class: &str, words: &mut Vec<WordUnit>) {
    if !word.is_empty() {
        words.push(WordUnit::new(std::mem::take(word), class));
    }
}
