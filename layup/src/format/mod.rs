use crate::context::{ColorChoice, VerbosityLevel};
use indicatif::{ProgressBar, ProgressStyle};
use liblayup::{Event, Observer, Stage};
use owo_colors::OwoColorize;
use std::cell::RefCell;
use std::io::IsTerminal;
use std::time::Duration;

/// Trait for output formatting that can be TTY-aware or plain text
pub trait OutputFormatter {
    /// Print a success message
    fn success(&self, message: &str);

    /// Print an error message
    fn error(&self, message: &str);

    /// Print an informational line
    fn info(&self, message: &str);

    /// Create a spinner for indeterminate progress
    fn spinner(&self, message: &str) -> ProgressBar;

    /// Finish a progress operation with a message
    fn finish_progress(&self, pb: ProgressBar, message: &str);
}

/// TTY-aware formatter with colors and progress indicators
pub struct TtyFormatter;

impl OutputFormatter for TtyFormatter {
    fn success(&self, message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    fn error(&self, message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message);
    }

    fn info(&self, message: &str) {
        println!("  {}", message.dimmed());
    }

    fn spinner(&self, message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    }

    fn finish_progress(&self, pb: ProgressBar, message: &str) {
        pb.finish_with_message(format!("{} {}", "✓".green(), message));
    }
}

/// Plain text formatter for non-TTY output (piped, scripted)
pub struct PlainFormatter;

impl OutputFormatter for PlainFormatter {
    fn success(&self, message: &str) {
        println!("{}", message);
    }

    fn error(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn info(&self, message: &str) {
        println!("  {}", message);
    }

    fn spinner(&self, message: &str) -> ProgressBar {
        println!("{}", message);
        ProgressBar::hidden()
    }

    fn finish_progress(&self, pb: ProgressBar, _message: &str) {
        pb.finish();
    }
}

/// Whether the TTY formatter should be used.
pub fn use_tty(color: ColorChoice, is_terminal: bool, no_color: bool) -> bool {
    match color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => is_terminal && !no_color,
    }
}

/// Create the appropriate formatter based on the color choice, TTY and environment
pub fn create_formatter(color: ColorChoice) -> Box<dyn OutputFormatter> {
    let is_terminal = std::io::stdout().is_terminal() || std::io::stderr().is_terminal();
    let no_color = std::env::var_os("NO_COLOR").is_some();

    if use_tty(color, is_terminal, no_color) {
        Box::new(TtyFormatter)
    } else {
        Box::new(PlainFormatter)
    }
}

/// The progress line shown while a build is in `stage`.
pub fn stage_message(stage: Stage) -> Option<&'static str> {
    match stage {
        Stage::Fetching => Some("Checking base image..."),
        Stage::Mutating => Some("Building new image..."),
        Stage::Pushing => Some("Pushing..."),
        Stage::Done => Some("Done."),
        Stage::Idle | Stage::Failed => None,
    }
}

/// A one-line description of a blob decision.
pub fn event_line(event: &Event) -> Option<String> {
    match event {
        Event::BlobSkipped { digest } => Some(format!("{}: already present", short(digest.hex()))),
        Event::BlobMounted { digest, from } => {
            Some(format!("{}: mounted from {}", short(digest.hex()), from))
        }
        Event::BlobUploaded { digest, size } => {
            Some(format!("{}: uploaded ({} bytes)", short(digest.hex()), size))
        }
        Event::ManifestPushed { digest } => Some(format!("manifest {}", digest)),
        Event::StageEntered(_) => None,
    }
}

fn short(hex: &str) -> &str {
    hex.get(..12).unwrap_or(hex)
}

/// Renders build events through a formatter, one spinner per stage.
///
/// Blob lines are only printed at `-v` and above.
pub struct BuildProgress<'a> {
    formatter: &'a dyn OutputFormatter,
    verbosity: VerbosityLevel,
    current: RefCell<Option<(ProgressBar, &'static str)>>,
}

impl<'a> BuildProgress<'a> {
    pub fn new(formatter: &'a dyn OutputFormatter, verbosity: VerbosityLevel) -> Self {
        Self {
            formatter,
            verbosity,
            current: RefCell::new(None),
        }
    }

    fn finish_current(&self) {
        if let Some((pb, message)) = self.current.borrow_mut().take() {
            self.formatter.finish_progress(pb, message);
        }
    }
}

impl Observer for BuildProgress<'_> {
    fn on_event(&self, event: &Event) {
        match event {
            Event::StageEntered(Stage::Done) => {
                self.finish_current();
                if let Some(message) = stage_message(Stage::Done) {
                    self.formatter.success(message);
                }
            }
            Event::StageEntered(Stage::Failed) => {
                if let Some((pb, _)) = self.current.borrow_mut().take() {
                    pb.abandon();
                }
            }
            Event::StageEntered(stage) => {
                self.finish_current();
                if let Some(message) = stage_message(*stage) {
                    let pb = self.formatter.spinner(message);
                    *self.current.borrow_mut() = Some((pb, message));
                }
            }
            other => {
                if self.verbosity >= VerbosityLevel::Verbose
                    && let Some(line) = event_line(other)
                {
                    match self.current.borrow().as_ref() {
                        Some((pb, _)) => pb.suspend(|| self.formatter.info(&line)),
                        None => self.formatter.info(&line),
                    }
                }
            }
        }
    }
}
