use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Span, end: Span) -> Span {
        Span {
            start: start.start,
            end: end.end,
        }
    }

    pub fn at(ls: usize, cs: usize, le: usize, ce: usize) -> Span {
        Span {
            start: Position { line: ls, column: cs },
            end: Position { line: le, column: ce },
        }
    }

    pub fn empty() -> Span {
        Span::at(0, 0, 0, 0)
    }

    pub fn is_empty(&self) -> bool {
        self.start.line == 0 && self.start.column == 0 && self.end.line == 0 && self.end.column == 0
    }

    /// True if there are no blank lines between this span and `other`.
    pub fn adjacent(&self, other: &Span) -> bool {
        self.end.line + 1 == other.start.line
    }

    /// True if this span ends on the line where `other` starts.
    pub fn same_line(&self, other: &Span) -> bool {
        self.end.line == other.start.line
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} - {}:{}",
            self.start.line, self.start.column, self.end.line, self.end.column
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub message: String,
    pub span: Span,
    pub path: String,
    pub module: Option<String>,
    pub severity: Severity,
    pub typing_context: Option<String>,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.severity >= Severity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.message, self.span)
    }
}

const YELLOW: &str = "\u{1b}[33m";
const RESET: &str = "\u{1b}[0m";

pub fn render_diagnostic(diag: &Diagnostic) -> String {
    let module = match &diag.module {
        Some(name) => format!("module {YELLOW}{name}{RESET} "),
        None => String::new(),
    };
    let at = format!("at {}:{}\n\n", diag.path, diag.span);
    let context = diag.typing_context.as_deref().unwrap_or("");
    format!("{}{}{}\n\n{}", module, at, prepend_indent(&diag.message, "  "), context)
}

pub fn render_diagnostics(diags: &[Diagnostic]) -> String {
    diags
        .iter()
        .map(render_diagnostic)
        .collect::<Vec<_>>()
        .join("\n")
}

fn prepend_indent(text: &str, indent: &str) -> String {
    text.lines()
        .map(|line| format!("{indent}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(Diagnostic::is_error)
}
