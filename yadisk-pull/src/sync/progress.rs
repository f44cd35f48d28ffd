use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Mutex;

/// Observer for an apply run. Implementations must not fail; the apply loop
/// never looks at what they do.
pub trait ProgressSink: Send + Sync {
    fn start(&self, total: u64);
    fn increment(&self);
    fn finish(&self);
}

/// Progress bar on stderr, one tick per applied change.
pub struct TerminalProgress {
    bar: Mutex<Option<ProgressBar>>,
    draw_hidden: bool,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
            draw_hidden: false,
        }
    }

    /// Keeps counting but never draws; handy when stderr is not a terminal.
    pub fn hidden() -> Self {
        Self {
            bar: Mutex::new(None),
            draw_hidden: true,
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock()
            && let Some(bar) = guard.as_ref()
        {
            f(bar);
        }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalProgress {
    fn start(&self, total: u64) {
        let bar = ProgressBar::new(total);
        if self.draw_hidden {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}") {
            bar.set_style(style.progress_chars("=>-"));
        }
        if let Ok(mut guard) = self.bar.lock() {
            *guard = Some(bar);
        }
    }

    fn increment(&self) {
        self.with_bar(|bar| bar.inc(1));
    }

    fn finish(&self) {
        // `finish` would jump to the full length even when the run aborted.
        self.with_bar(|bar| bar.abandon());
    }
}
