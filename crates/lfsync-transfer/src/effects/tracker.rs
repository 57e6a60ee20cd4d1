use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;

use crate::data::{Progress, ProgressCallback};

const PB_STYLE: &str = "{spinner:.blue} {prefix:>12.cyan.bold} [{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {wide_msg}";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const PB_CHARS: &str = "█▓▒░  ";

static PB_TEMPLATE: Lazy<Option<ProgressStyle>> = Lazy::new(|| {
    ProgressStyle::with_template(PB_STYLE)
        .ok()
        .map(|style| style.tick_chars(TICK).progress_chars(PB_CHARS))
});

/// Aggregate terminal progress bar for one queue run.
///
/// Sized from the caller-declared byte budget; every chunk of every object
/// advances the same bar.
#[derive(Clone)]
pub struct ProgressTracker {
    pb:     ProgressBar,
    finish: Option<String>,
}

impl ProgressTracker {
    pub fn builder() -> ProgressTrackerBuilder { ProgressTrackerBuilder::default() }

    pub fn step(&self, len: u64) -> &Self {
        self.pb.inc(len);
        self
    }

    /// Bytes counted so far.
    pub fn position(&self) -> u64 { self.pb.position() }

    /// A queue progress callback feeding this bar.
    pub fn callback(&self) -> ProgressCallback {
        let pb = self.pb.clone();
        Arc::new(move |progress: &Progress<'_>| {
            pb.inc(progress.chunk_len as u64);
            if !progress.name.is_empty() {
                pb.set_message(progress.name.to_string());
            }
        })
    }

    pub fn finish(self) {
        match self.finish {
            Some(msg) => self.pb.finish_with_message(msg),
            None => self.pb.finish(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProgressTrackerBuilder {
    len:    Option<u64>,
    prefix: Option<String>,
    finish: Option<String>,
    hidden: bool,
}

impl ProgressTrackerBuilder {
    pub fn with_len(mut self, len: u64) -> Self {
        self.len = Some(len);
        self
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    pub fn with_finish(mut self, finish: &str) -> Self {
        self.finish = Some(finish.to_string());
        self
    }

    /// Count without drawing, for non-interactive output.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn build(self) -> ProgressTracker {
        let pb = match (self.hidden, self.len) {
            (true, len) => {
                let pb = ProgressBar::hidden();
                if let Some(len) = len {
                    pb.set_length(len);
                }
                pb
            }
            (false, Some(len)) => ProgressBar::new(len),
            (false, None) => ProgressBar::new_spinner(),
        };
        let pb = match PB_TEMPLATE.as_ref() {
            Some(style) => pb.with_style(style.clone()),
            None => pb,
        };

        if let Some(prefix) = self.prefix {
            pb.set_prefix(prefix);
        }
        ProgressTracker {
            pb,
            finish: self.finish,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Direction;
    use lfsync_store::Oid;

    #[test]
    fn test_callback_advances_bar() {
        let tracker = ProgressTracker::builder()
            .with_len(10)
            .with_prefix("Uploading")
            .hidden()
            .build();
        let callback = tracker.callback();
        let oid: Oid = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
            .parse()
            .unwrap();

        for (so_far, chunk) in [(4, 4), (10, 6)] {
            callback(&Progress {
                direction:    Direction::Upload,
                oid:          &oid,
                name:         "a.bin",
                total_bytes:  10,
                bytes_so_far: so_far,
                chunk_len:    chunk,
            });
        }
        assert_eq!(tracker.position(), 10);
        tracker.step(1);
        assert_eq!(tracker.position(), 11);
        tracker.finish();
    }
}
