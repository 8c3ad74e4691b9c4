use crate::models::ImportOccurrence;
use serde::Deserialize;

use super::{ImportParser, ParserError, PythonParser};

#[derive(Debug, Deserialize)]
struct Notebook {
    #[serde(default)]
    cells: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    #[serde(default)]
    cell_type: String,
    #[serde(default)]
    source: CellSource,
}

/// nbformat allows the cell source as one string or as a list of lines
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CellSource {
    Text(String),
    Lines(Vec<String>),
}

impl Default for CellSource {
    fn default() -> Self {
        CellSource::Text(String::new())
    }
}

impl CellSource {
    fn joined(self) -> String {
        match self {
            CellSource::Text(text) => text,
            CellSource::Lines(lines) => lines.concat(),
        }
    }
}

/// A code cell that could not be parsed
#[derive(Debug)]
pub struct CellFailure {
    pub cell: usize,
    pub error: ParserError,
}

/// Imports pulled out of a notebook, with the cells that were skipped
#[derive(Debug, Default)]
pub struct NotebookImports {
    pub imports: Vec<ImportOccurrence>,
    pub failures: Vec<CellFailure>,
}

/// Extracts imports from the code cells of a Jupyter notebook. Every code
/// cell is parsed as independent script text.
pub struct NotebookParser {
    python: PythonParser,
    strip_magics: bool,
}

impl NotebookParser {
    pub fn new(strip_magics: bool) -> Result<Self, ParserError> {
        Ok(Self {
            python: PythonParser::new()?,
            strip_magics,
        })
    }

    pub fn parse(&mut self, content: &str) -> Result<NotebookImports, ParserError> {
        let notebook: Notebook = serde_json::from_str(content)?;
        let mut result = NotebookImports::default();

        for (index, cell) in notebook.cells.into_iter().enumerate() {
            if cell.cell_type != "code" {
                continue;
            }

            let source = cell.source.joined();
            let parsed = match self.python.parse(&source) {
                Err(_) if self.strip_magics => self.python.parse(&strip_magics(&source)),
                parsed => parsed,
            };

            match parsed {
                Ok(imports) => {
                    result
                        .imports
                        .extend(imports.into_iter().map(|mut occurrence| {
                            occurrence.cell = Some(index);
                            occurrence
                        }));
                }
                Err(error) => result.failures.push(CellFailure { cell: index, error }),
            }
        }

        Ok(result)
    }
}

/// Blank IPython line magics, cell magics and shell escapes while keeping
/// line numbers stable. Only lines that start a logical line are touched, so
/// `!=` or `%` on a continuation line survive. A `%%` cell magic blanks the
/// whole cell, since its body is not Python.
pub fn strip_magics(source: &str) -> String {
    if source.trim_start().starts_with("%%") {
        return source.lines().map(|_| "").collect::<Vec<_>>().join("\n");
    }

    let mut continuation = LineContinuation::default();
    source
        .lines()
        .map(|line| {
            let starts_logical_line = continuation.is_clear();
            let trimmed = line.trim_start();
            if starts_logical_line && (trimmed.starts_with('%') || trimmed.starts_with('!')) {
                ""
            } else {
                continuation.feed(line);
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Tracks whether the next physical line continues the current statement:
/// open brackets, a trailing backslash, or an unterminated triple-quoted
/// string.
#[derive(Default)]
struct LineContinuation {
    depth: usize,
    backslash: bool,
    triple_quote: Option<char>,
}

impl LineContinuation {
    fn is_clear(&self) -> bool {
        self.depth == 0 && !self.backslash && self.triple_quote.is_none()
    }

    fn feed(&mut self, line: &str) {
        let chars: Vec<char> = line.chars().collect();
        let mut quote: Option<char> = None;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            let triple = |q: char| chars.len() >= i + 3 && chars[i..i + 3].iter().all(|&x| x == q);

            if let Some(q) = self.triple_quote {
                if triple(q) {
                    self.triple_quote = None;
                    i += 3;
                } else {
                    i += if c == '\\' { 2 } else { 1 };
                }
                continue;
            }

            if let Some(q) = quote {
                if c == '\\' {
                    i += 2;
                    continue;
                }
                if c == q {
                    quote = None;
                }
                i += 1;
                continue;
            }

            match c {
                '#' => break,
                '\'' | '"' if triple(c) => {
                    self.triple_quote = Some(c);
                    i += 3;
                    continue;
                }
                '\'' | '"' => quote = Some(c),
                '(' | '[' | '{' => self.depth += 1,
                ')' | ']' | '}' => self.depth = self.depth.saturating_sub(1),
                _ => {}
            }
            i += 1;
        }

        self.backslash = self.triple_quote.is_none() && line.trim_end().ends_with('\\');
    }
}
