mod notebook;
mod python;

pub use notebook::{strip_magics, CellFailure, NotebookImports, NotebookParser};
pub use python::PythonParser;

use crate::models::ImportOccurrence;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Failed to initialize parser: {0}")]
    InitError(String),
    #[error("Failed to parse source code: {0}")]
    ParseError(String),
    #[error("invalid syntax at line {line}, column {column}")]
    SyntaxError { line: usize, column: usize },
    #[error("invalid notebook JSON: {0}")]
    NotebookError(#[from] serde_json::Error),
}

/// Trait for script parsers that extract import statements
pub trait ImportParser {
    /// Parse source code and extract absolute imports. Fails on syntax
    /// errors so the caller can skip the file.
    fn parse(&mut self, source: &str) -> Result<Vec<ImportOccurrence>, ParserError>;
}
