//! Parse `.env` files and apply them to the environment or a typed record.
//!
//! Values may be quoted with `"` or `'`, carry a trailing ` #` comment when
//! unquoted, and reference keys defined on earlier lines of the same file
//! with `$KEY` or `${KEY}`.
//!
//! [`parse_str`] and friends are pure and return an [`EnvMap`]. [`EnvLoader`]
//! reads files in order and applies each one to an [`Environment`] before
//! moving on to the next. The process-environment shortcuts ([`load`],
//! [`overload`], [`load_from`], [`overload_from`]) are `unsafe`, because
//! callers must guarantee no concurrent process-environment access.

mod env;
mod error;
mod lines;
mod loader;
mod model;
mod parser;
mod record;
mod substitution;

pub use env::{Environment, MemoryEnv, ProcessEnv, apply};
pub use error::{Error, ParseError, ParseErrorKind};
pub use lines::{RawLine, ValidLines, valid_lines};
pub use loader::{EnvLoader, load, load_from, load_in, overload, overload_from};
pub use model::{EnvMap, LoadReport, SubstitutionMode};
pub use parser::{
    parse_bytes, parse_bytes_with_mode, parse_reader, parse_reader_with_mode, parse_str,
    parse_str_with_mode,
};
pub use record::{EnvRecord, FieldKind, Schema};
