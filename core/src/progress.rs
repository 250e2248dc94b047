use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::terminal::{self, Terminal};

const GLYPHS: [&str; 4] = ["|", "/", "-", "\\"];

pub const DEFAULT_TICK: Duration = Duration::from_millis(100);
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct ProgressSettings {
    pub enabled: bool,
    pub colors: bool,
    pub tick: Duration,
    pub settle: Duration,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            colors: false,
            tick: DEFAULT_TICK,
            settle: DEFAULT_SETTLE,
        }
    }
}

/// Owns the spinner shown while a step runs.
///
/// `active` is written only by `start`/`stop` and read only by the spinner
/// task. At most one spinner task exists at a time.
pub struct ProgressController {
    terminal: Terminal,
    settings: ProgressSettings,
    active: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressController {
    pub fn new(terminal: Terminal, settings: ProgressSettings) -> Self {
        Self {
            terminal,
            settings,
            active: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn disabled(terminal: Terminal) -> Self {
        Self::new(
            terminal,
            ProgressSettings {
                enabled: false,
                ..ProgressSettings::default()
            },
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn start(&mut self) {
        if !self.settings.enabled {
            return;
        }

        if self.handle.is_some() {
            warn!("progress indicator already running, ignoring start");
            return;
        }

        self.active.store(true, Ordering::Release);
        self.handle = Some(tokio::spawn(spin(
            self.terminal.clone(),
            self.active.clone(),
            self.settings.tick,
            self.settings.colors,
        )));
    }

    /// Joins the spinner task, then waits the settle delay. If a spinner was
    /// running the cursor steps back one cell so the next token starts on
    /// the gap before the glyph.
    pub async fn stop(&mut self) {
        self.active.store(false, Ordering::Release);

        let was_running = match self.handle.take() {
            Some(handle) => {
                if let Err(err) = handle.await {
                    warn!(error = %err, "progress indicator task failed");
                }
                true
            }
            None => false,
        };

        if !self.settings.enabled {
            return;
        }

        tokio::time::sleep(self.settings.settle).await;

        if was_running {
            self.terminal.write_str(terminal::BACKSPACE);
            self.terminal.flush();
        }
    }
}

async fn spin(out: Terminal, active: Arc<AtomicBool>, tick: Duration, colors: bool) {
    for glyph in GLYPHS.iter().cycle() {
        if !active.load(Ordering::Acquire) {
            break;
        }

        out.write_str(&terminal::paint(glyph, terminal::BRIGHT_BLUE, colors));
        out.flush();
        out.write_str(terminal::BACKSPACE);

        tokio::time::sleep(tick).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::MemorySink;

    fn fast(sink: &Arc<MemorySink>) -> ProgressController {
        ProgressController::new(
            sink.clone(),
            ProgressSettings {
                enabled: true,
                colors: false,
                tick: Duration::from_millis(20),
                settle: Duration::from_millis(10),
            },
        )
    }

    fn assert_single_cycle(writes: &[String]) {
        for (i, pair) in writes.chunks(2).enumerate() {
            assert_eq!(pair[0], GLYPHS[i % GLYPHS.len()], "write pair {i}: {writes:?}");
            assert_eq!(pair[1], terminal::BACKSPACE);
        }
    }

    #[tokio::test]
    async fn test_disabled_never_writes() {
        let sink = MemorySink::new();
        let mut progress = ProgressController::disabled(sink.clone());

        progress.start();
        assert!(!progress.is_active());
        tokio::time::sleep(Duration::from_millis(50)).await;
        progress.stop().await;

        assert!(sink.writes().is_empty());
    }

    #[tokio::test]
    async fn test_stop_halts_all_writes() {
        let sink = MemorySink::new();
        let mut progress = fast(&sink);

        progress.start();
        assert!(progress.is_active());
        tokio::time::sleep(Duration::from_millis(150)).await;
        progress.stop().await;
        assert!(!progress.is_active());

        let writes = sink.writes();
        assert!(writes.len() >= 3);
        assert!(writes.iter().all(|w| !w.contains('\n')));
        assert_eq!(writes.last().map(String::as_str), Some(terminal::BACKSPACE));

        let (last, spinner) = writes.split_last().unwrap();
        assert_eq!(last, terminal::BACKSPACE);
        assert_single_cycle(spinner);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.writes().len(), writes.len());
    }

    #[tokio::test]
    async fn test_second_start_does_not_spawn_another_spinner() {
        let sink = MemorySink::new();
        let mut progress = fast(&sink);

        progress.start();
        progress.start();
        tokio::time::sleep(Duration::from_millis(150)).await;
        progress.stop().await;

        let writes = sink.writes();
        let (_, spinner) = writes.split_last().unwrap();
        assert_single_cycle(spinner);
    }

    #[tokio::test]
    async fn test_stop_without_start_only_settles() {
        let sink = MemorySink::new();
        let mut progress = fast(&sink);

        progress.stop().await;
        assert!(sink.writes().is_empty());
    }
}
