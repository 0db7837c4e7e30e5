//! Ariadne-based rendering of resolution errors.
//!
//! Each error gets a stable code (`R` for user errors, `I` for internal
//! ones), a one-line message, a label at the offending span and, where a
//! fix is plausible, a help line. A JSON mode emits the same information
//! on a single line for tools.

use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use braid_common::{LineIndex, Span};
use serde::Serialize;

use crate::error::{InternalError, ResolveError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiagnosticOptions {
    pub color: bool,
    pub json: bool,
}

impl DiagnosticOptions {
    /// Plain text without ANSI escapes, for snapshots and logs.
    pub fn colorless() -> Self {
        DiagnosticOptions { color: false, json: false }
    }

    pub fn json_mode() -> Self {
        DiagnosticOptions { color: false, json: true }
    }
}

// ── Error Codes ────────────────────────────────────────────────────────

fn error_code(err: &ResolveError) -> &'static str {
    match err {
        ResolveError::UnresolvedCall { .. } => "R0001",
        ResolveError::AmbiguousCall { .. } => "R0002",
        ResolveError::ReturnTypeConflict { .. } => "R0003",
        ResolveError::SignatureMismatch { .. } => "R0004",
        ResolveError::ReturnMismatch { .. } => "R0005",
        ResolveError::DeclarationMismatch { .. } => "R0006",
        ResolveError::MissingEntryPoint { .. } => "R0007",
        ResolveError::Internal(internal) => match internal {
            InternalError::MissingFormalAnnotation { .. } => "I0001",
            InternalError::MissingReturnAnnotation { .. } => "I0002",
            InternalError::MismatchedShape { .. } => "I0003",
            InternalError::UnsupportedWhereClause { .. } => "I0004",
            InternalError::UnresolvedReference { .. } => "I0005",
            InternalError::EmptyDefinition { .. } => "I0006",
            InternalError::Unimplemented { .. } => "I0007",
        },
    }
}

fn label_message(err: &ResolveError) -> String {
    match err {
        ResolveError::UnresolvedCall { .. } => "no matching function".to_string(),
        ResolveError::AmbiguousCall { candidates, .. } => format!("{} candidates match equally well", candidates.len()),
        ResolveError::ReturnTypeConflict { second, .. } => format!("this returns {second}"),
        ResolveError::SignatureMismatch { .. } => "no candidate accepts these argument types".to_string(),
        ResolveError::ReturnMismatch { .. } => "returned here".to_string(),
        ResolveError::DeclarationMismatch { .. } => "initializer has a different type".to_string(),
        ResolveError::MissingEntryPoint { .. } => "resolution starts here".to_string(),
        ResolveError::Internal(_) => "while resolving this".to_string(),
    }
}

fn help(err: &ResolveError) -> Option<String> {
    match err {
        ResolveError::UnresolvedCall { name, .. } => {
            Some(format!("check the argument types and that `{name}` is visible here"))
        }
        ResolveError::AmbiguousCall { candidates, .. } => Some(format!("candidates are: {}", candidates.join("; "))),
        ResolveError::ReturnTypeConflict { first, .. } => Some(format!("an earlier return has type {first}")),
        ResolveError::MissingEntryPoint { name } => Some(format!("declare a function named `{name}`")),
        ResolveError::Internal(_) => Some("this is a compiler bug".to_string()),
        _ => None,
    }
}

// ── Rendering ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct JsonDiagnostic<'a> {
    code: &'static str,
    severity: &'static str,
    message: String,
    file: &'a str,
    spans: Vec<JsonSpan>,
    help: Option<String>,
}

#[derive(Serialize)]
struct JsonSpan {
    start: usize,
    end: usize,
    line: u32,
    column: u32,
    label: String,
}

/// Render `error` against `source`. Errors without a span are reported at
/// the start of the file.
pub fn render_diagnostic(error: &ResolveError, source: &str, filename: &str, options: &DiagnosticOptions) -> String {
    let source_len = source.len();

    // ariadne needs at least one character to point at.
    let clamp = |span: Span| -> Range<usize> {
        let r = span.to_range(source_len);
        if r.is_empty() {
            r.start..r.end.saturating_add(1).min(source_len)
        } else {
            r
        }
    };

    let code = error_code(error);
    let range = clamp(error.span().unwrap_or_default());

    if options.json {
        let (line, column) = LineIndex::new(source).line_col(range.start as u32);
        let diagnostic = JsonDiagnostic {
            code,
            severity: "error",
            message: error.to_string(),
            file: filename,
            spans: vec![JsonSpan { start: range.start, end: range.end, line, column, label: label_message(error) }],
            help: help(error),
        };
        return serde_json::to_string(&diagnostic).unwrap_or_else(|_| error.to_string());
    }

    let mut builder = Report::build(ReportKind::Error, range.clone())
        .with_code(code)
        .with_message(error.to_string())
        .with_config(Config::default().with_color(options.color))
        .with_label(Label::new(range).with_message(label_message(error)).with_color(Color::Red));
    if let Some(help) = help(error) {
        builder.set_help(help);
    }
    let report = builder.finish();

    let mut buf = Vec::new();
    match report.write(Source::from(source), &mut buf) {
        Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
        Err(_) => short_message(error, source, filename),
    }
}

/// `file:line:col: error[code]: message`, for one-line logs.
pub fn short_message(error: &ResolveError, source: &str, filename: &str) -> String {
    let (line, col) = match error.span() {
        Some(span) => LineIndex::new(source).line_col(span.start.min(source.len() as u32)),
        None => (1, 1),
    };
    format!("{filename}:{line}:{col}: error[{}]: {error}", error_code(error))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unresolved() -> ResolveError {
        ResolveError::UnresolvedCall {
            name: "area".into(),
            arg_types: vec!["String".into()],
            span: Span::new(14, 26),
        }
    }

    const SRC: &str = "fn main() {\n  area(\"wide\")\n}\n";

    #[test]
    fn codes_are_distinct() {
        let errors = [
            unresolved(),
            ResolveError::MissingEntryPoint { name: "main".into() },
            ResolveError::SignatureMismatch { name: "f".into(), span: Span::default() },
            InternalError::EmptyDefinition { name: "x".into(), span: Span::default() }.into(),
        ];
        let codes: Vec<_> = errors.iter().map(error_code).collect();
        assert_eq!(codes, vec!["R0001", "R0007", "R0004", "I0006"]);
    }

    #[test]
    fn rendered_report_contains_code_and_help() {
        let out = render_diagnostic(&unresolved(), SRC, "shapes.braid", &DiagnosticOptions::colorless());
        assert!(out.contains("[R0001]"), "{out}");
        assert!(out.contains("unresolved call `area(String)`"), "{out}");
        assert!(out.contains("no matching function"), "{out}");
        assert!(out.contains("is visible here"), "{out}");
        assert!(!out.contains('\u{1b}'), "colorless output has escapes: {out}");
    }

    #[test]
    fn spanless_errors_still_render() {
        let err = ResolveError::MissingEntryPoint { name: "main".into() };
        let out = render_diagnostic(&err, "fn helper() {}\n", "lib.braid", &DiagnosticOptions::colorless());
        assert!(out.contains("entry point `main` not found"), "{out}");
    }

    #[test]
    fn json_mode_is_one_line() {
        let out = render_diagnostic(&unresolved(), SRC, "shapes.braid", &DiagnosticOptions::json_mode());
        assert!(!out.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["code"], "R0001");
        assert_eq!(value["severity"], "error");
        assert_eq!(value["spans"][0]["line"], 2);
        assert_eq!(value["spans"][0]["column"], 3);
    }

    #[test]
    fn short_message_format() {
        let msg = short_message(&unresolved(), SRC, "shapes.braid");
        assert_eq!(msg, "shapes.braid:2:3: error[R0001]: unresolved call `area(String)`");
    }
}
