use std::fmt::{Display, Formatter};
use std::num::ParseIntError;

use tracing::trace;

use crate::error::Error;
use crate::model::EnvMap;

/// Semantic type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    /// Base-10 `i64`.
    Integer,
    /// Comma-separated strings, split on every `,` with no trimming.
    StringList,
    /// Comma-separated base-10 `i64` values.
    IntegerList,
    /// A type with no built-in conversion. Populating it always fails.
    Custom(&'static str),
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::StringList => write!(f, "string list"),
            Self::IntegerList => write!(f, "integer list"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// A converted value, ready to hand to a field setter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FieldValue {
    String(String),
    Integer(i64),
    StringList(Vec<String>),
    IntegerList(Vec<i64>),
}

impl FieldValue {
    fn convert(kind: FieldKind, raw: &str) -> Result<Option<Self>, ParseIntError> {
        let value = match kind {
            FieldKind::String => Self::String(raw.to_owned()),
            FieldKind::Integer => Self::Integer(raw.parse()?),
            FieldKind::StringList => Self::StringList(raw.split(',').map(str::to_owned).collect()),
            FieldKind::IntegerList => Self::IntegerList(
                raw.split(',')
                    .map(str::parse::<i64>)
                    .collect::<Result<_, _>>()?,
            ),
            FieldKind::Custom(_) => return Ok(None),
        };
        Ok(Some(value))
    }
}

type Setter<T> = Box<dyn Fn(&mut T, FieldValue)>;

struct Field<T> {
    name: String,
    kind: FieldKind,
    set: Setter<T>,
}

/// Named, typed fields of a record that can be filled from an [`EnvMap`].
///
/// ```
/// use envar::{EnvMap, Schema};
///
/// #[derive(Default)]
/// struct Config {
///     port: i64,
///     hosts: Vec<String>,
/// }
///
/// let schema = Schema::new()
///     .integer("PORT", |config: &mut Config, value| config.port = value)
///     .string_list("HOSTS", |config, value| config.hosts = value);
///
/// let env_map: EnvMap = [("PORT", "8080"), ("HOSTS", "a,b")]
///     .into_iter()
///     .map(|(key, value)| (key.to_owned(), value.to_owned()))
///     .collect();
///
/// let mut config = Config::default();
/// schema.populate(&mut config, &env_map)?;
/// assert_eq!(config.port, 8080);
/// assert_eq!(config.hosts, ["a", "b"]);
/// # Ok::<(), envar::Error>(())
/// ```
pub struct Schema<T> {
    fields: Vec<Field<T>>,
}

impl<T> Default for Schema<T> {
    fn default() -> Self {
        Self { fields: Vec::new() }
    }
}

impl<T> std::fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.fields.iter().map(|field| (&field.name, field.kind)))
            .finish()
    }
}

impl<T> Schema<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn string(self, name: impl Into<String>, set: impl Fn(&mut T, String) + 'static) -> Self {
        self.field(name, FieldKind::String, move |record, value| {
            if let FieldValue::String(value) = value {
                set(record, value);
            }
        })
    }

    pub fn integer(self, name: impl Into<String>, set: impl Fn(&mut T, i64) + 'static) -> Self {
        self.field(name, FieldKind::Integer, move |record, value| {
            if let FieldValue::Integer(value) = value {
                set(record, value);
            }
        })
    }

    pub fn string_list(
        self,
        name: impl Into<String>,
        set: impl Fn(&mut T, Vec<String>) + 'static,
    ) -> Self {
        self.field(name, FieldKind::StringList, move |record, value| {
            if let FieldValue::StringList(value) = value {
                set(record, value);
            }
        })
    }

    pub fn integer_list(
        self,
        name: impl Into<String>,
        set: impl Fn(&mut T, Vec<i64>) + 'static,
    ) -> Self {
        self.field(name, FieldKind::IntegerList, move |record, value| {
            if let FieldValue::IntegerList(value) = value {
                set(record, value);
            }
        })
    }

    /// Declare a field whose type has no conversion from a string.
    pub fn custom(self, name: impl Into<String>, type_name: &'static str) -> Self {
        self.field(name, FieldKind::Custom(type_name), |_, _| {})
    }

    fn field(
        mut self,
        name: impl Into<String>,
        kind: FieldKind,
        set: impl Fn(&mut T, FieldValue) + 'static,
    ) -> Self {
        self.fields.push(Field {
            name: name.into(),
            kind,
            set: Box::new(set),
        });
        self
    }

    /// Assign every field whose name is a key of `env_map`.
    ///
    /// All matching values are converted before any field is written, so a
    /// failure leaves `record` untouched. Returns the number of fields set.
    pub fn populate(&self, record: &mut T, env_map: &EnvMap) -> Result<usize, Error> {
        let mut converted = Vec::new();

        for field in &self.fields {
            let Some(raw) = env_map.get(&field.name) else {
                continue;
            };

            let value = FieldValue::convert(field.kind, raw)
                .map_err(|source| Error::Conversion {
                    key: field.name.clone(),
                    kind: field.kind,
                    source,
                })?
                .ok_or_else(|| Error::UnsupportedFieldType {
                    key: field.name.clone(),
                    kind: field.kind,
                })?;
            converted.push((field, value));
        }

        let assigned = converted.len();
        for (field, value) in converted {
            trace!(field = %field.name, kind = %field.kind, "assigning field");
            (field.set)(record, value);
        }

        Ok(assigned)
    }
}

/// A record that knows how to describe its own fields.
pub trait EnvRecord: Sized {
    fn schema() -> Schema<Self>;
}
