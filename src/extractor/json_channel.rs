//! Parses the `-json=0,<dir>` structured diagnostics side-channel: a
//! whitespace-separated stream of JSON objects, the first of which is a
//! header to discard.

use serde::Deserialize;
use serde_json::Deserializer;

use crate::model::{Diagnostic, Position, Range};

#[derive(Debug, Deserialize)]
struct Header {
    #[allow(dead_code)]
    file: Option<String>,
    #[allow(dead_code)]
    version: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    code: String,
    #[allow(dead_code)]
    message: Option<String>,
    range: JsonRange,
}

#[derive(Debug, Deserialize)]
struct JsonRange {
    start: JsonPosition,
    end: JsonPosition,
}

#[derive(Debug, Deserialize)]
struct JsonPosition {
    line: usize,
    character: usize,
}

impl From<&JsonRange> for Range {
    fn from(r: &JsonRange) -> Self {
        let end = r.end.clone_widened(&r.start);
        Range {
            start: Position { line: r.start.line, column: r.start.character },
            end: Position { line: end.line, column: end.character },
        }
    }
}

impl JsonPosition {
    fn clone_widened(&self, start: &JsonPosition) -> JsonPosition {
        if self.line == start.line && self.character == start.character {
            JsonPosition { line: self.line, character: self.character + 1 }
        } else {
            JsonPosition { line: self.line, character: self.character }
        }
    }
}

pub fn parse(json: &[u8]) -> Vec<Diagnostic> {
    let mut stream = Deserializer::from_slice(json).into_iter::<serde_json::Value>();

    // First object is a header; discard it (and bail quietly if absent or malformed).
    match stream.next() {
        Some(Ok(value)) => {
            if serde_json::from_value::<Header>(value).is_err() {
                return Vec::new();
            }
        }
        _ => return Vec::new(),
    }

    let mut diagnostics = Vec::new();
    for value in stream {
        let Ok(value) = value else { break };
        let Ok(entry) = serde_json::from_value::<Entry>(value) else { continue };
        match entry.code.as_str() {
            "isInBounds" | "isSliceInBounds" => {
                diagnostics.push(Diagnostic::BoundsCheck { range: (&entry.range).into() });
            }
            "canInlineFunction" | "cannotInlineCall" | "cannotInlineFunction" | "escape"
            | "escapes" | "leak" | "nilcheck" => {
                // Recognized, redundant with the text-log-derived diagnostics.
            }
            _ => {}
        }
    }
    diagnostics
}
