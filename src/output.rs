//! Text output surface: per-reading lines, error messages and the final summary.

use std::sync::{Arc, Mutex};

use chrono::Utc;

pub trait OutputSink: Send {
    /// Append one line of output.
    fn line(&mut self, text: &str);

    /// Replace everything shown so far.
    fn clear(&mut self) {}
}

/// Prints timestamped lines to stdout.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn line(&mut self, text: &str) {
        println!("[{}] {}", Utc::now().format("%H:%M:%S"), text);
    }
}

/// Keeps lines in memory, newest first. Clones share the same transcript.
#[derive(Debug, Default, Clone)]
pub struct TranscriptSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl TranscriptSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn latest(&self) -> Option<String> {
        self.lines.lock().ok().and_then(|l| l.first().cloned())
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines
            .lock()
            .map(|l| l.iter().any(|line| line.contains(needle)))
            .unwrap_or(false)
    }
}

impl OutputSink for TranscriptSink {
    fn line(&mut self, text: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.insert(0, text.to_string());
        }
    }

    fn clear(&mut self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_newest_first() {
        let view = TranscriptSink::new();
        let mut sink = view.clone();
        sink.line("first");
        sink.line("second");
        assert_eq!(view.lines(), vec!["second".to_string(), "first".to_string()]);
        assert_eq!(view.latest().as_deref(), Some("second"));
        assert!(view.contains("fir"));
        sink.clear();
        assert!(view.lines().is_empty());
    }
}
