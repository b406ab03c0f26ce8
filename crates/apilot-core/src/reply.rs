//! Reply envelope returned to the host chat framework.

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Text,
    ImageFile,
    ImageUrl,
    VideoUrl,
}

/// Which media family the producing handler deals in; decides between
/// image and video when a raw result classifies as a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaHint {
    Image,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub content: String,
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Text,
            content: content.into(),
        }
    }

    /// Three-way classification of a handler's raw result, in documented
    /// precedence order: existing local file, then absolute URL, then
    /// plain text. The file check must run first — a downloaded image is
    /// represented as a path and must not degrade to text or URL.
    pub fn classify(raw: String, hint: MediaHint) -> Self {
        if Path::new(&raw).is_file() {
            return Self {
                kind: ReplyKind::ImageFile,
                content: raw,
            };
        }
        if apilot_fetch::is_absolute_url(&raw) {
            let kind = match hint {
                MediaHint::Image => ReplyKind::ImageUrl,
                MediaHint::Video => ReplyKind::VideoUrl,
            };
            return Self { kind, content: raw };
        }
        Self {
            kind: ReplyKind::Text,
            content: raw,
        }
    }
}
