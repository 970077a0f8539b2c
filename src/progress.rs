use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressStyle};

/// Per-record progress bar. A hidden instance turns every call into a no-op.
pub struct Progress {
    bar: Option<ProgressBar>,
}

impl Progress {
    /// Bar over `total` steps; hidden when stderr is not a terminal.
    #[must_use]
    pub fn bar(total: u64, message: &str) -> Self {
        if !std::io::stderr().is_terminal() {
            return Self::hidden();
        }

        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::with_template("{msg} {wide_bar:.cyan/blue} {pos}/{len} [{elapsed_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message(message.to_string());
        Self { bar: Some(bar) }
    }

    #[must_use]
    pub fn hidden() -> Self {
        Self { bar: None }
    }

    pub fn inc(&self, delta: u64) {
        if let Some(bar) = &self.bar {
            bar.inc(delta);
        }
    }

    pub fn finish_clear(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}
