use serde::{Deserialize, Serialize};

/// A block of prompt content from the control-plane client.
/// Only text blocks reach the assistant service; the other kinds are carried
/// for protocol completeness and ignored when building the outbound turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { data: String, media_type: String },
    Resource { uri: String },
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text { text: s.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Concatenate the textual blocks of a request into one prompt string.
pub fn prompt_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(ContentBlock::as_text)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_blocks_concatenate() {
        let blocks = vec![
            ContentBlock::text("first"),
            ContentBlock::text("second"),
        ];
        assert_eq!(prompt_text(&blocks), "first\nsecond");
    }

    #[test]
    fn non_text_blocks_ignored() {
        let blocks = vec![
            ContentBlock::text("hello"),
            ContentBlock::Image {
                data: "aGk=".into(),
                media_type: "image/png".into(),
            },
            ContentBlock::Resource { uri: "file:///tmp/a".into() },
        ];
        assert_eq!(prompt_text(&blocks), "hello");
    }

    #[test]
    fn empty_request_yields_empty_prompt() {
        assert_eq!(prompt_text(&[]), "");
    }

    #[test]
    fn serde_tagging() {
        let block = ContentBlock::text("hi");
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "hi");
    }
}
