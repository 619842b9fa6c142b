//! Structured linker diagnostics. Simpler than the assembler's: the
//! linker works over whole object files rather than source lines, so
//! there is no column/caret to reproduce.

use std::fmt;

#[derive(Debug, Clone)]
pub struct LinkError {
    pub message: String,
}

impl LinkError {
    pub fn new(message: impl Into<String>) -> LinkError {
        LinkError { message: message.into() }
    }
}

impl std::error::Error for LinkError {}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link error: {}", self.message)
    }
}

impl From<String> for LinkError {
    fn from(message: String) -> LinkError {
        LinkError::new(message)
    }
}
