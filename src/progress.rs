//! Console run hooks with a progress bar.

use indicatif::{ProgressBar, ProgressStyle};

use crate::sim::system::RunHooks;

/// [`RunHooks`] implementation for the command line: renders a progress bar
/// over the simulated minutes. When disabled, all hooks are no-ops.
pub struct ConsoleHooks {
    total_minutes: u32,
    enabled: bool,
    bar: Option<ProgressBar>,
}

impl ConsoleHooks {
    pub fn new(total_minutes: u32, enabled: bool) -> Self {
        Self {
            total_minutes,
            enabled,
            bar: None,
        }
    }
}

impl RunHooks for ConsoleHooks {
    fn init_run(&mut self) -> bool {
        if self.enabled {
            let bar = ProgressBar::new(self.total_minutes as u64);
            let style = ProgressStyle::with_template("{prefix}[{bar:40}] {percent:>3}%")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar.set_prefix("Progress ");
            self.bar = Some(bar);
        }
        true
    }

    fn progress(&mut self, minute: u32) {
        if let Some(bar) = &self.bar {
            bar.set_position(minute as u64);
        }
    }

    fn tear_down_run(&mut self) -> bool {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_hooks_have_no_bar() {
        let mut hooks = ConsoleHooks::new(100, false);
        assert!(hooks.init_run());
        hooks.progress(50);
        assert!(hooks.bar.is_none());
        assert!(hooks.tear_down_run());
    }

    #[test]
    fn test_enabled_hooks_track_progress() {
        let mut hooks = ConsoleHooks::new(100, true);
        assert!(hooks.init_run());
        assert!(hooks.bar.is_some());
        hooks.progress(42);
        assert_eq!(hooks.bar.as_ref().unwrap().position(), 42);
        assert!(hooks.tear_down_run());
        assert!(hooks.bar.is_none());
    }
}
