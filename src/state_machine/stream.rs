//! Streaming accumulator for the in-flight assistant turn

/// Text shown when a cycle fails without a server-provided reason
const FALLBACK_DETAIL: &str = "Please try again.";

/// Transient buffer of assistant text for the outstanding request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamBuffer {
    text: String,
    chunks: usize,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk verbatim. No trimming, no dedup.
    pub fn append(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        self.chunks += 1;
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    /// Final assistant text for a successful cycle.
    ///
    /// A non-empty `full_response` wins over whatever was accumulated.
    pub fn finalize(self, full_response: Option<&str>) -> String {
        match full_response {
            Some(full) if !full.is_empty() => full.to_string(),
            _ => self.text,
        }
    }
}

/// User-visible assistant text for a failed cycle
pub fn fallback_message(error: Option<&str>) -> String {
    let detail = error
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .unwrap_or(FALLBACK_DETAIL);
    format!("Something went wrong: {detail}")
}
