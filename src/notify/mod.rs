//! User-facing export notifications
//!
//! The workflow reports an export's lifecycle through [`ExportNotifier`]:
//! one starting notice, throttled progress updates, then exactly one of
//! completed, cancelled or failed.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use nu_ansi_term::Color;

use crate::export::{CsvPhase, FileType};
use crate::workflow::ExportHandle;

/// Snapshot passed to [`ExportNotifier::show_in_progress`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportProgress {
    pub file_path: PathBuf,
    pub file_type: FileType,
    pub docs_written: u64,
    pub csv_phase: Option<CsvPhase>,
}

/// Presenter for export lifecycle notices
///
/// `handle` lets a presenter offer a cancel action while an export runs.
pub trait ExportNotifier: Send + Sync {
    fn show_starting(&self, namespace: &str, handle: &ExportHandle);

    fn show_in_progress(&self, progress: &ExportProgress, handle: &ExportHandle);

    fn show_completed(&self, docs_written: u64, file_path: &Path);

    fn show_cancelled(&self, docs_written: u64, file_path: &Path);

    fn show_failed(&self, message: &str);
}

/// Spinner on stderr plus a coloured summary line
pub struct TerminalNotifier {
    bar: Mutex<Option<ProgressBar>>,
    quiet: bool,
    color: bool,
}

impl TerminalNotifier {
    /// Create a terminal notifier
    ///
    /// # Arguments
    /// * `quiet` - Hide the spinner; final lines are still printed
    /// * `color` - Enable ANSI colours
    pub fn new(quiet: bool, color: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            quiet,
            color,
        }
    }

    fn paint(&self, color: Color, text: &str) -> String {
        if self.color {
            color.paint(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn with_bar(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        let mut bar = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut bar);
    }

    fn clear(&self) {
        self.with_bar(|bar| {
            if let Some(bar) = bar.take() {
                bar.finish_and_clear();
            }
        });
    }

    fn spinner() -> ProgressBar {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(std::time::Duration::from_millis(120));
        bar
    }
}

impl ExportNotifier for TerminalNotifier {
    fn show_starting(&self, namespace: &str, _handle: &ExportHandle) {
        if self.quiet {
            return;
        }
        let message = format!("Exporting documents from {} (Ctrl+C to cancel)", namespace);
        self.with_bar(|bar| {
            let spinner = bar.get_or_insert_with(Self::spinner);
            spinner.set_message(message);
        });
    }

    fn show_in_progress(&self, progress: &ExportProgress, _handle: &ExportHandle) {
        if self.quiet {
            return;
        }
        let message = match progress.csv_phase {
            Some(phase) => format!(
                "{} documents {} to {}",
                progress.docs_written,
                phase,
                progress.file_path.display()
            ),
            None => format!(
                "{} documents written to {}",
                progress.docs_written,
                progress.file_path.display()
            ),
        };
        self.with_bar(|bar| {
            let spinner = bar.get_or_insert_with(Self::spinner);
            spinner.set_message(message);
        });
    }

    fn show_completed(&self, docs_written: u64, file_path: &Path) {
        self.clear();
        eprintln!(
            "{} {} {} to {}",
            self.paint(Color::Green, "Export completed."),
            docs_written,
            noun(docs_written),
            file_path.display()
        );
    }

    fn show_cancelled(&self, docs_written: u64, file_path: &Path) {
        self.clear();
        eprintln!(
            "{} {} {} written to {}",
            self.paint(Color::Yellow, "Export aborted."),
            docs_written,
            noun(docs_written),
            file_path.display()
        );
    }

    fn show_failed(&self, message: &str) {
        self.clear();
        eprintln!("{} {}", self.paint(Color::Red, "Failed to export:"), message);
    }
}

fn noun(count: u64) -> &'static str {
    if count == 1 { "document" } else { "documents" }
}
