use std::io::Write;
use std::sync::{Arc, Mutex};

/// Destination for everything the engine renders: status rows, spinner
/// glyphs and echoed child output.
pub trait TerminalSink: Send + Sync {
    fn write_str(&self, text: &str);
    fn flush(&self);
}

pub type Terminal = Arc<dyn TerminalSink>;

pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const RED: &str = "\x1b[31m";
pub const BRIGHT_BLUE: &str = "\x1b[94m";
pub const RESET: &str = "\x1b[0m";

pub const CLEAR_LINE: &str = "\x1b[K";
pub const BACKSPACE: &str = "\x08";

pub fn paint(text: &str, color: &str, enabled: bool) -> String {
    if enabled {
        format!("{}{}{}", color, text, RESET)
    } else {
        text.to_string()
    }
}

pub struct StdoutSink;

impl TerminalSink for StdoutSink {
    fn write_str(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
    }
}

pub fn stdout() -> Terminal {
    Arc::new(StdoutSink)
}

#[derive(Default)]
pub struct MemorySink {
    writes: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn contents(&self) -> String {
        self.writes().concat()
    }

    pub fn clear(&self) {
        if let Ok(mut writes) = self.writes.lock() {
            writes.clear();
        }
    }
}

impl TerminalSink for MemorySink {
    fn write_str(&self, text: &str) {
        if let Ok(mut writes) = self.writes.lock() {
            writes.push(text.to_string());
        }
    }

    fn flush(&self) {}
}

pub fn stdout_is_tty() -> bool {
    atty::is(atty::Stream::Stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.write_str("a");
        sink.write_str("b");
        assert_eq!(sink.writes(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(sink.contents(), "ab");

        sink.clear();
        assert!(sink.writes().is_empty());
    }

    #[test]
    fn test_paint() {
        assert_eq!(paint("OK", GREEN, true), "\x1b[32mOK\x1b[0m");
        assert_eq!(paint("OK", GREEN, false), "OK");
    }
}
