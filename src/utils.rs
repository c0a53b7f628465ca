use std::io::Write;
use std::path::{Path, PathBuf};

/// Features-written counter on stderr, redrawn in place every `interval` features.
///
/// A disabled counter only counts.
pub struct ProgressCounter {
    label: &'static str,
    interval: u64,
    enabled: bool,
    features: u64,
    batches: u64,
}

impl ProgressCounter {
    pub fn new(label: &'static str, interval: u64, enabled: bool) -> Self {
        let counter = Self {
            label,
            interval: interval.max(1),
            enabled,
            features: 0,
            batches: 0,
        };
        counter.print();
        counter
    }

    pub fn add_batch(&mut self, features: u64) {
        let prev = self.features;
        self.features += features;
        self.batches += 1;
        // Print if we crossed an interval boundary
        if prev / self.interval < self.features / self.interval {
            self.print();
        }
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }

    pub fn finish(&self) {
        if !self.enabled {
            return;
        }
        self.print();
        eprintln!();
    }

    fn print(&self) {
        if !self.enabled {
            return;
        }
        eprint!(
            "\r{}: {} features ({} batches)",
            self.label, self.features, self.batches
        );
        let _ = std::io::stderr().flush();
    }
}

/// Replaces a leading `~` with `$HOME`. Other paths are returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

pub fn per_second(count: u64, seconds: f64) -> u64 {
    if seconds > 0.0 {
        (count as f64 / seconds) as u64
    } else {
        count
    }
}
