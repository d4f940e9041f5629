//! Shader pass identities and source snapshots

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pass types for multi-pass shaders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassName {
    Image,
    BufferA,
    BufferB,
    BufferC,
    BufferD,
    Common,
}

impl PassName {
    /// Every pass, in the order they are compiled and rendered.
    /// Buffers first so Image can sample their output; Common is never compiled alone.
    pub const RENDER_ORDER: [PassName; 5] = [
        PassName::BufferA,
        PassName::BufferB,
        PassName::BufferC,
        PassName::BufferD,
        PassName::Image,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PassName::Image => "Image",
            PassName::BufferA => "Buffer A",
            PassName::BufferB => "Buffer B",
            PassName::BufferC => "Buffer C",
            PassName::BufferD => "Buffer D",
            PassName::Common => "Common",
        }
    }

    /// Parse a user-facing pass name ("Image", "Buffer A", "buffer_a", "bufferA", ...)
    pub fn parse(name: &str) -> Option<PassName> {
        let normalized: String = name
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "image" | "mainimage" => Some(PassName::Image),
            "buffera" => Some(PassName::BufferA),
            "bufferb" => Some(PassName::BufferB),
            "bufferc" => Some(PassName::BufferC),
            "bufferd" => Some(PassName::BufferD),
            "common" => Some(PassName::Common),
            _ => None,
        }
    }
}

impl fmt::Display for PassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A snapshot of one pass's source as handed over by the editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSource {
    pub name: PassName,
    pub code: String,
}

impl PassSource {
    pub fn new(name: PassName, code: impl Into<String>) -> Self {
        Self {
            name,
            code: code.into(),
        }
    }

    /// True if the pass holds anything other than blank lines and line comments
    pub fn has_code(&self) -> bool {
        self.code.lines().any(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with("//")
        })
    }
}

/// Find the Common pass code in a snapshot, or "" when there is none
pub fn common_code(passes: &[PassSource]) -> &str {
    passes
        .iter()
        .find(|p| p.name == PassName::Common)
        .map(|p| p.code.as_str())
        .unwrap_or("")
}
