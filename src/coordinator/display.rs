//! Progress display thread
//!
//! Polls the progress file on a fixed interval and renders a percentage.
//! Stopped (and joined) when the executing phase ends.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::shared::{ProgressFile, ProgressState};
use crate::ui;

const SCALE: u64 = 1000;

pub struct Display {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Display {
    /// Start polling `progress` every `interval`. A hidden display still polls.
    pub fn start(progress: ProgressFile, interval: Duration, visible: bool) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            let bar = if visible {
                ProgressBar::new(SCALE)
            } else {
                ProgressBar::hidden()
            };
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
            {
                bar.set_style(style.progress_chars("=>-"));
            }

            while !flag.load(Ordering::SeqCst) {
                if let Some(state) = progress.read() {
                    bar.set_position((state.fraction() * SCALE as f64) as u64);
                    bar.set_message(message(&state));
                }
                bar.tick();
                thread::sleep(interval);
            }
            bar.finish_and_clear();
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal the thread and wait for it
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Display {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn message(state: &ProgressState) -> String {
    let mut msg = format!(
        "[{}/{}] {}",
        (state.operation_index + 1).min(state.total_operations),
        state.total_operations,
        state.operation_name
    );
    if state.total_items > 0 && !state.item_label.is_empty() {
        msg.push_str(&format!(
            " ({}/{}) {}",
            state.current_item + 1,
            state.total_items,
            ui::truncate_path(&state.item_label, 40)
        ));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::lock::LockOptions;
    use std::time::Instant;
    use tempfile::TempDir;

    #[test]
    fn test_message() {
        let state = ProgressState {
            operation_index: 0,
            total_operations: 2,
            operation_name: "pip-cache".to_string(),
            current_item: 0,
            total_items: 3,
            item_label: "/home/me/.cache/pip".to_string(),
        };
        assert_eq!(message(&state), "[1/2] pip-cache (1/3) /home/me/.cache/pip");
    }

    #[test]
    fn test_stop_joins_promptly() {
        let tmp = TempDir::new().unwrap();
        let progress = ProgressFile::new(tmp.path(), LockOptions::default());
        let display = Display::start(progress, Duration::from_millis(10), false);
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        display.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
