//! Per-slot progress display.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Receives progress updates from a dispatch run; never affects scheduling
pub trait ProgressSink {
    /// Report a slot's completion percentage and status line
    fn update(&self, slot: usize, percent: u8, status: &str, title: Option<&str>);

    /// The run is over
    fn finish(&self) {}
}

/// Discards all updates
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn update(&self, _slot: usize, _percent: u8, _status: &str, _title: Option<&str>) {}
}

/// One terminal progress bar per slot
pub struct BarProgress {
    _multi: MultiProgress,
    bars: Vec<ProgressBar>,
}

impl BarProgress {
    /// Bars for `slots` slots
    pub fn new(slots: usize) -> Self {
        let multi = MultiProgress::new();
        let style = ProgressStyle::default_bar()
            .template("{prefix:>28} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");

        let bars = (0..slots)
            .map(|slot| {
                let bar = multi.add(ProgressBar::new(100));
                bar.set_style(style.clone());
                bar.set_prefix(format!("job {}", slot + 1));
                bar
            })
            .collect();

        Self {
            _multi: multi,
            bars,
        }
    }
}

impl ProgressSink for BarProgress {
    fn update(&self, slot: usize, percent: u8, status: &str, title: Option<&str>) {
        let Some(bar) = self.bars.get(slot) else {
            return;
        };
        if let Some(title) = title {
            bar.set_prefix(format!("{} (job {})", title, slot + 1));
        }
        bar.set_position(u64::from(percent.min(100)));
        bar.set_message(status.to_string());
    }

    fn finish(&self) {
        for bar in &self.bars {
            bar.finish();
        }
    }
}

/// Percentage of `done` over `total`, 100 when there is nothing to do
pub fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (done.saturating_mul(100) / total).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 4), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(4, 4), 100);
        assert_eq!(percent(5, 4), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn test_bar_progress_ignores_unknown_slot() {
        let progress = BarProgress::new(2);
        progress.update(1, 50, "p10.0", Some("Exploring gemm"));
        progress.update(7, 10, "ignored", None);
        assert_eq!(progress.bars[1].position(), 50);
        progress.finish();
    }
}
