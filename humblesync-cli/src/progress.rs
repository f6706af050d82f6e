//! Indicatif-backed progress rendering.
//!
//! The library reports hashing and download progress through its
//! `ProgressSink` trait; this sink turns each operation into a bar on a
//! shared `MultiProgress`, removed again when the operation finishes so
//! the terminal only shows in-flight work.

use humblesync::progress::{ProgressHandle, ProgressSink};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

pub struct BarSink {
    multi: MultiProgress,
}

impl BarSink {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
        }
    }

    fn bytes_style() -> ProgressStyle {
        ProgressStyle::with_template(" {bar:30.cyan/blue} {bytes:>10}/{total_bytes:<10} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template(" {spinner} {bytes:>10} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}

impl Default for BarSink {
    fn default() -> Self {
        Self::new()
    }
}

struct BarHandle {
    bar: ProgressBar,
    multi: MultiProgress,
}

impl ProgressHandle for BarHandle {
    fn advance(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
        self.multi.remove(&self.bar);
    }
}

impl ProgressSink for BarSink {
    fn begin(&self, label: &str, total_bytes: Option<u64>) -> Box<dyn ProgressHandle> {
        let bar = match total_bytes {
            Some(total) => {
                let bar = ProgressBar::new(total);
                bar.set_style(Self::bytes_style());
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(Self::spinner_style());
                bar
            }
        };
        let bar = self.multi.add(bar);
        bar.set_message(label.to_string());
        Box::new(BarHandle {
            bar,
            multi: self.multi.clone(),
        })
    }
}
