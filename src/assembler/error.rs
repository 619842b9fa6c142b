//! Structured assembler diagnostics: kind, source line, column, message
//!
//! One enum, a manual `Display` impl that reprints the offending source
//! line with a caret under the column, generalized to four diagnostic
//! kinds: lex, syntax, macro-processor, and file-read errors.

use std::fmt;

/// A single assembler/macro-processor diagnostic
#[derive(Debug, Clone)]
pub enum Error {
    Lex { line: usize, col: usize, message: String, source: String },
    Syntax { line: usize, col: Option<usize>, message: String, source: String },
    Macro { line: usize, col: Option<usize>, message: String, source: String, user_message: bool },
    Read { path: String },
}

impl Error {
    pub fn lex(line: usize, col: usize, message: String, source: String) -> Error {
        Error::Lex { line, col, message, source }
    }

    pub fn syntax(line: usize, col: Option<usize>, source: impl Into<String>, message: impl Into<String>) -> Error {
        Error::Syntax { line, col, message: message.into(), source: source.into() }
    }

    pub fn macro_err(
        line: usize,
        col: Option<usize>,
        source: impl Into<String>,
        message: impl Into<String>,
        user_message: bool,
    ) -> Error {
        Error::Macro { line, col, message: message.into(), source: source.into(), user_message }
    }

    pub fn read(path: impl Into<String>) -> Error {
        Error::Read { path: path.into() }
    }

    /// Attach the line number and raw source text once they're known to
    /// the caller (the lexer produces errors before it knows its own line
    /// number, since it's only ever handed a line suffix).
    pub fn with_line(self, line_no: usize, source: &str) -> Error {
        match self {
            Error::Lex { col, message, .. } => {
                Error::Lex { line: line_no, col, message, source: source.to_string() }
            }
            other => other,
        }
    }

    /// True for a [Error::Syntax] raised while `ctx.macdef` is set — these
    /// are swallowed during macro-body capture per `spec.md` §7.
    pub fn is_syntax(&self) -> bool {
        matches!(self, Error::Syntax { .. })
    }

    pub fn line_number(&self) -> Option<usize> {
        match self {
            Error::Lex { line, .. } => Some(*line),
            Error::Syntax { line, .. } => Some(*line),
            Error::Macro { line, .. } => Some(*line),
            Error::Read { .. } => None,
        }
    }
}

impl std::error::Error for Error {}

fn underline(col: usize) -> String {
    format!("{}^", " ".repeat(col))
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Lex { line, col, message, source } => {
                writeln!(f, "lex error at line {}: {}", line, message)?;
                writeln!(f, "{}\t{}", line, source)?;
                write!(f, "\t{}", underline(*col))
            }
            Error::Syntax { line, col, message, source } => {
                writeln!(f, "syntax error at line {}: {}", line, message)?;
                write!(f, "{}\t{}", line, source)?;
                if let Some(col) = col {
                    writeln!(f)?;
                    write!(f, "\t{}", underline(*col))?;
                }
                Ok(())
            }
            Error::Macro { line, col, message, source, user_message } => {
                if *user_message {
                    writeln!(f, "line {}: {}", line, message)?;
                } else {
                    writeln!(f, "macro error at line {}: {}", line, message)?;
                }
                write!(f, "{}\t{}", line, source)?;
                if let Some(col) = col {
                    writeln!(f)?;
                    write!(f, "\t{}", underline(*col))?;
                }
                Ok(())
            }
            Error::Read { path } => write!(f, "failed to read file {}", path),
        }
    }
}
