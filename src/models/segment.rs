use serde::{Deserialize, Serialize};

/// One typed piece of a parsed human answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Segment {
    Text {
        text: String,
    },
    Image {
        /// MIME subtype, e.g. `png` for `image/png`
        subtype: String,
        /// Base64 payload, unmodified
        data: String,
    },
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Segment::Text { text: text.into() }
    }

    pub fn image(subtype: impl Into<String>, data: impl Into<String>) -> Self {
        Segment::Image {
            subtype: subtype.into(),
            data: data.into(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Segment::Text { text } => Some(text),
            Segment::Image { .. } => None,
        }
    }
}
