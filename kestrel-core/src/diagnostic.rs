//! Diagnostic rendering with deduplication and an error budget.
//!
//! Rendered blocks look like
//!
//! ```text
//! main.ks (3:8): Error: expected ';', found 'let'
//! let a = 1
//!         ^
//! ```
//!
//! Lines are 1-based, columns 0-based byte offsets.

use std::fmt;

use tracing::trace;

use crate::span::{ModuleLoc, SourceMap, locate_line};

/// Default number of errors printed before the rest are dropped.
pub const DEFAULT_MAX_ERRORS: usize = 10;

/// Notice printed once when the error budget runs out.
pub const TOO_MANY_ERRORS: &str = "Too many errors, further errors are suppressed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("Error"),
            Severity::Warning => f.write_str("Warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub loc: ModuleLoc,
    pub message: String,
}

impl Diagnostic {
    pub fn error(loc: ModuleLoc, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            loc,
            message: message.into(),
        }
    }

    pub fn warning(loc: ModuleLoc, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            loc,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Renders diagnostics and applies the dedup and budget rules.
///
/// Every printed block is recorded; with `echo` set it is also written to
/// stderr.
#[derive(Debug)]
pub struct DiagnosticEngine {
    max_errors: usize,
    error_count: usize,
    last_loc: Option<ModuleLoc>,
    budget_notice_sent: bool,
    echo: bool,
    emitted: Vec<String>,
}

impl Default for DiagnosticEngine {
    fn default() -> Self {
        DiagnosticEngine::new(DEFAULT_MAX_ERRORS)
    }
}

impl DiagnosticEngine {
    pub fn new(max_errors: usize) -> Self {
        DiagnosticEngine {
            max_errors,
            error_count: 0,
            last_loc: None,
            budget_notice_sent: false,
            echo: false,
            emitted: Vec::new(),
        }
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn max_errors(&self) -> usize {
        self.max_errors
    }

    /// Number of errors that were printed.
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Every block printed so far, in order.
    pub fn emitted(&self) -> &[String] {
        &self.emitted
    }

    pub fn take_emitted(&mut self) -> Vec<String> {
        std::mem::take(&mut self.emitted)
    }

    /// Reports a diagnostic. Returns `true` when something was printed.
    pub fn report(&mut self, sources: &mut SourceMap, diag: &Diagnostic) -> bool {
        if self.last_loc == Some(diag.loc) {
            trace!(loc = %diag.loc, "suppressed duplicate diagnostic");
            return false;
        }
        self.last_loc = Some(diag.loc);

        if diag.is_error() {
            if self.error_count >= self.max_errors {
                if self.budget_notice_sent {
                    return false;
                }
                self.budget_notice_sent = true;
                self.emit(TOO_MANY_ERRORS.to_string());
                return true;
            }
            self.error_count += 1;
        }
        let block = render(sources, diag);
        self.emit(block);
        true
    }

    fn emit(&mut self, block: String) {
        if self.echo {
            eprintln!("{block}");
        }
        self.emitted.push(block);
    }
}

/// Formats one diagnostic block.
///
/// Falls back to a location-less header when the module path or its source
/// text cannot be recovered.
pub fn render(sources: &mut SourceMap, diag: &Diagnostic) -> String {
    let Some(path) = sources.path(diag.loc.module).map(|p| p.display().to_string()) else {
        return format!("<unknown> (unknown location): {}: {}", diag.severity, diag.message);
    };
    let text = sources.text(diag.loc.module);
    let Some(info) = text
        .as_deref()
        .and_then(|text| locate_line(text, diag.loc.offset as usize))
    else {
        return format!("{path} (unknown location): {}: {}", diag.severity, diag.message);
    };
    format!(
        "{path} ({}:{}): {}: {}\n{}\n{}^",
        info.line,
        info.column,
        diag.severity,
        diag.message,
        info.text,
        caret_padding(info.text, info.column)
    )
}

/// Spaces up to `column`, with tabs kept as tabs so the caret lines up.
fn caret_padding(line: &str, column: usize) -> String {
    match line.get(..column) {
        Some(prefix) => prefix
            .chars()
            .map(|ch| if ch == '\t' { '\t' } else { ' ' })
            .collect(),
        None => " ".repeat(column),
    }
}
