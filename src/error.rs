use std::fmt::{Display, Formatter};
use std::num::ParseIntError;
use std::path::PathBuf;

use crate::record::FieldKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A named dotenv file could not be opened or read.
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid UTF-8 input: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("field `{key}` has unsupported type `{kind}`")]
    UnsupportedFieldType { key: String, kind: FieldKind },
    #[error("cannot convert value of `{key}` to {kind}")]
    Conversion {
        key: String,
        kind: FieldKind,
        #[source]
        source: ParseIntError,
    },
    #[error("cannot set environment variable `{key}`: {reason}")]
    EnvironmentWrite { key: String, reason: String },
}

impl Error {
    /// The parse error kind, if this is a parse failure.
    pub fn parse_kind(&self) -> Option<ParseErrorKind> {
        match self {
            Self::Parse(err) => Some(err.kind),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: u32,
    pub path: Option<PathBuf>,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn new(line: u32, kind: ParseErrorKind) -> Self {
        Self {
            line,
            path: None,
            kind,
        }
    }

    pub(crate) fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(
                f,
                "parse error in {} at line {}: {}",
                path.display(),
                self.line,
                self.kind
            ),
            None => write!(f, "parse error at line {}: {}", self.line, self.kind),
        }
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    /// The line has no `=` separator.
    #[error("missing `=` separator")]
    MalformedLine,
    #[error("empty key")]
    EmptyKey,
    #[error("unterminated quote")]
    UnterminatedQuote,
    /// A `${NAME` token is not closed by `}`.
    #[error("invalid substitution")]
    InvalidSubstitution,
}
