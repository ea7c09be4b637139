//! Rendered markup as a tagged node tree.
//!
//! The view layer hands us its current `innerHTML`. We parse it once per
//! extraction into [`MarkupNode`]s so the extractor can pattern-match on
//! element vs. text instead of probing node types at runtime.

use std::borrow::Cow;

/// Errors raised while reading rendered markup.
#[derive(Debug, thiserror::Error)]
pub enum MarkupError {
    #[error("failed to parse markup: {0}")]
    Parse(String),
}

/// One node of the rendered view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupNode {
    Element {
        /// Lower-cased tag name.
        tag: String,
        /// Raw `class` attribute, empty when absent.
        class_name: String,
        children: Vec<MarkupNode>,
    },
    Text(String),
}

impl MarkupNode {
    pub fn element(
        tag: impl Into<String>,
        class_name: impl Into<String>,
        children: Vec<MarkupNode>,
    ) -> Self {
        MarkupNode::Element {
            tag: tag.into(),
            class_name: class_name.into(),
            children,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        MarkupNode::Text(text.into())
    }

    /// Child nodes; text nodes have none.
    pub fn children(&self) -> &[MarkupNode] {
        match self {
            MarkupNode::Element { children, .. } => children,
            MarkupNode::Text(_) => &[],
        }
    }

    /// Whether this is an element whose class list contains `token`.
    pub fn has_class(&self, token: &str) -> bool {
        match self {
            MarkupNode::Element { class_name, .. } => {
                class_name.split_ascii_whitespace().any(|c| c == token)
            }
            MarkupNode::Text(_) => false,
        }
    }

    /// Concatenated text of this node and all descendants, like DOM `textContent`.
    pub fn text_content(&self) -> Cow<'_, str> {
        match self {
            MarkupNode::Text(text) => Cow::Borrowed(text),
            MarkupNode::Element { children, .. } => {
                let mut out = String::new();
                for child in children {
                    child.push_text(&mut out);
                }
                Cow::Owned(out)
            }
        }
    }

    fn push_text(&self, out: &mut String) {
        match self {
            MarkupNode::Text(text) => out.push_str(text),
            MarkupNode::Element { children, .. } => {
                for child in children {
                    child.push_text(out);
                }
            }
        }
    }

    fn collect_by_class<'a>(&'a self, token: &str, found: &mut Vec<&'a MarkupNode>) {
        if self.has_class(token) {
            found.push(self);
        }
        for child in self.children() {
            child.collect_by_class(token, found);
        }
    }
}

/// A parsed markup fragment (the children of one container element).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupTree {
    roots: Vec<MarkupNode>,
}

impl MarkupTree {
    pub fn new(roots: Vec<MarkupNode>) -> Self {
        Self { roots }
    }

    /// Parse an HTML fragment such as a container's `innerHTML`.
    ///
    /// Comments are dropped and entities in text are decoded.
    pub fn parse(html: &str) -> Result<Self, MarkupError> {
        let dom = tl::parse(html, tl::ParserOptions::default())
            .map_err(|e| MarkupError::Parse(format!("{e:?}")))?;
        let parser = dom.parser();
        let roots = dom
            .children()
            .iter()
            .filter_map(|handle| convert(*handle, parser))
            .collect();
        Ok(Self { roots })
    }

    pub fn roots(&self) -> &[MarkupNode] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// All elements carrying class `token`, in document order.
    pub fn find_all(&self, token: &str) -> Vec<&MarkupNode> {
        let mut found = Vec::new();
        for root in &self.roots {
            root.collect_by_class(token, &mut found);
        }
        found
    }

    /// First element carrying class `token`, in document order.
    pub fn find_first(&self, token: &str) -> Option<&MarkupNode> {
        self.find_all(token).into_iter().next()
    }
}

fn convert(handle: tl::NodeHandle, parser: &tl::Parser) -> Option<MarkupNode> {
    match handle.get(parser)? {
        tl::Node::Tag(tag) => {
            let tag_name = tag.name().as_utf8_str().to_lowercase();
            let class_name = tag
                .attributes()
                .iter()
                .find(|(key, _)| {
                    let key_str: &str = key.as_ref();
                    key_str.eq_ignore_ascii_case("class")
                })
                .and_then(|(_, value)| value.map(|v| v.to_string()))
                .unwrap_or_default();
            let children = tag
                .children()
                .top()
                .iter()
                .filter_map(|child| convert(*child, parser))
                .collect();
            Some(MarkupNode::Element {
                tag: tag_name,
                class_name,
                children,
            })
        }
        tl::Node::Raw(bytes) => {
            let raw = bytes.as_utf8_str();
            if raw.is_empty() {
                return None;
            }
            Some(MarkupNode::Text(
                html_escape::decode_html_entities(raw.as_ref()).into_owned(),
            ))
        }
        tl::Node::Comment(_) => None,
    }
}
