// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use serde::Serialize;
use std::fmt::Display;
use std::time::Instant;

use crate::promotion::{PromotionReport, PromotionState};

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    #[default]
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
#[derive(Debug, Clone)]
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Announce a state the promotion entered.
    pub fn state(&self, state: PromotionState) {
        match self.mode {
            OutputMode::Normal => println!("  → {state}"),
            OutputMode::Quiet => {}
            OutputMode::Json => print_json(&JsonEvent {
                event: "state",
                message: &state.to_string(),
                duration_secs: self.duration(),
            }),
        }
    }

    /// Print a non-fatal warning.
    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Warning: {message}"),
            OutputMode::Json => eprint_json(&JsonEvent {
                event: "warning",
                message,
                duration_secs: None,
            }),
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => print_json(&JsonEvent {
                event: "success",
                message,
                duration_secs: self.duration(),
            }),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => eprint_json(&JsonEvent {
                event: "error",
                message,
                duration_secs: self.duration(),
            }),
        }
    }

    /// Print the final report of a promotion run.
    pub fn report(&self, report: &PromotionReport) {
        match self.mode {
            OutputMode::Json => print_json(&JsonReport {
                event: "report",
                exit_code: report.exit_code(),
                duration_secs: self.duration(),
                report,
            }),
            OutputMode::Quiet => println!("{}: {}", report.candidate, report.outcome),
            OutputMode::Normal => {
                if let Some(detail) = &report.detail {
                    println!("  ! {detail}");
                }
                for env in &report.environments {
                    println!("  {}: {}", env.name, env.running);
                }
                let line = format!("{}: {}", report.candidate, report.outcome);
                if report.outcome.is_success() {
                    self.success(&line);
                } else {
                    println!("{line}");
                }
            }
        }
    }

    /// Print a document: JSON in json mode, its `Display` rendering otherwise.
    pub fn emit<T: Serialize + Display>(&self, value: &T) {
        match self.mode {
            OutputMode::Json => print_json(value),
            OutputMode::Normal | OutputMode::Quiet => print!("{value}"),
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "failed to serialize output"),
    }
}

fn eprint_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => eprintln!("{json}"),
        Err(e) => tracing::error!(error = %e, "failed to serialize output"),
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    event: &'a str,
    exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
    #[serde(flatten)]
    report: &'a PromotionReport,
}
