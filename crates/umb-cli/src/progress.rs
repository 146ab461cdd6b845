use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use umb_core::Window;
use umb_sampler::{RunObserver, WindowOutcome, WindowState};

const TEMPLATE: &str =
    "  {spinner:.cyan} [{elapsed_precise}] {bar:32.cyan/blue} {pos}/{len} {msg}";

/// Progress bar advanced once per finished window.
pub struct WindowProgress {
    bar: ProgressBar,
}

impl WindowProgress {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .progress_chars("=> ");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl RunObserver for WindowProgress {
    fn run_started(&self, total: usize, workers: usize) {
        self.bar.set_length(total as u64);
        self.bar
            .println(format!("  sampling {total} windows on {workers} worker(s)"));
    }

    fn window_started(&self, window: &Window, _total: usize) {
        self.bar.set_message(window.to_string());
    }

    fn window_finished(&self, outcome: &WindowOutcome, _total: usize) {
        match outcome.state {
            WindowState::Failed => {
                let reason = outcome
                    .error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                self.bar
                    .println(format!("  \x1b[31m✗\x1b[0m {} {reason}", outcome.window));
            }
            WindowState::Reused => {
                self.bar
                    .println(format!("  \x1b[2m·\x1b[0m {} reused", outcome.window));
            }
            _ => {}
        }
        self.bar.inc(1);
    }
}
