//! JSON wire protocol between the bridge and the projection endpoint.
//!
//! Wire format (one text frame per payload):
//! ```text
//! content / caret:  {"html": [{"ws": [{"w": "let", "c": "tok-keyword"}, …]}, …],
//!                    "address": "/flok", "username": "alice"}
//! no markup yet:    {"html": "", "address": "/flok", "username": "alice"}
//! scroll:           {"scrollTop": 120.0, "address": "/flok/scrollChange",
//!                    "username": "alice"}
//! ```

use livemirror_core::LineUnit;
use serde::Serialize;

/// Routing address of content and caret updates.
pub const CONTENT_ADDRESS: &str = "/flok";
/// Routing address of scroll updates.
pub const SCROLL_ADDRESS: &str = "/flok/scrollChange";

/// Protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What a payload carries.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadKind {
    /// Buffer text changed. `None` when the view had no markup.
    Content { lines: Option<Vec<LineUnit>> },
    /// Caret moved; carries the same snapshot as a content update.
    CaretMove { lines: Option<Vec<LineUnit>> },
    /// Vertical scroll offset of the view, in pixels.
    Scroll { offset: f64 },
}

/// One message to the endpoint. Built per send and dropped right after.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastPayload {
    pub kind: PayloadKind,
    pub address: String,
    pub username: String,
}

impl BroadcastPayload {
    pub fn content(
        lines: Option<Vec<LineUnit>>,
        address: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            kind: PayloadKind::Content { lines },
            address: address.into(),
            username: username.into(),
        }
    }

    pub fn caret_move(
        lines: Option<Vec<LineUnit>>,
        address: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            kind: PayloadKind::CaretMove { lines },
            address: address.into(),
            username: username.into(),
        }
    }

    pub fn scroll(offset: f64, address: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            kind: PayloadKind::Scroll { offset },
            address: address.into(),
            username: username.into(),
        }
    }

    /// Serialize to the JSON text frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let frame = match &self.kind {
            PayloadKind::Content { lines } | PayloadKind::CaretMove { lines } => WireFrame::Html {
                html: match lines {
                    Some(lines) => Html::Lines(lines),
                    None => Html::Empty(""),
                },
                address: &self.address,
                username: &self.username,
            },
            PayloadKind::Scroll { offset } => WireFrame::Scroll {
                scroll_top: *offset,
                address: &self.address,
                username: &self.username,
            },
        };
        Ok(serde_json::to_string(&frame)?)
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireFrame<'a> {
    Html {
        html: Html<'a>,
        address: &'a str,
        username: &'a str,
    },
    Scroll {
        #[serde(rename = "scrollTop")]
        scroll_top: f64,
        address: &'a str,
        username: &'a str,
    },
}

#[derive(Serialize)]
#[serde(untagged)]
enum Html<'a> {
    Lines(&'a [LineUnit]),
    Empty(&'static str),
}
