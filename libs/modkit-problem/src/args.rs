//! Constructor arguments.
//!
//! A [`Typed`](crate::Typed) constructor takes a heterogeneous list of [`Arg`]s and dispatches
//! on the variant, so the same call can carry a detail message, context markers, a wrapped
//! error and structured side-channel data in any order.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::problem::Problem;

/// Shared handle to a wrapped error.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Explicit detail message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detail(pub String);

/// Problem category, part of the derived type URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category(pub String);

/// URI reference of the specific occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance(pub String);

/// Resource the problem relates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource(pub String);

/// Field the problem relates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field(pub String);

/// Alternating key/value entries, folded into the problem's `meta` map.
///
/// Keys are stringified; a trailing key without a value is ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meta(pub Vec<Value>);

impl Meta {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entry(mut self, key: impl Into<Value>, value: impl Into<Value>) -> Self {
        self.0.push(key.into());
        self.0.push(value.into());
        self
    }

    pub(crate) fn merge_into(self, target: &mut Map<String, Value>) {
        let mut entries = self.0.into_iter();
        while let Some(key) = entries.next() {
            let Some(value) = entries.next() else {
                break;
            };
            target.insert(plain(&key), value);
        }
    }
}

impl<V: Into<Value>> FromIterator<V> for Meta {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Structured validation context; later keys overwrite earlier ones when merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult(pub Map<String, Value>);

impl ValidationResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub(crate) fn merge_into(self, target: &mut Map<String, Value>) {
        target.extend(self.0);
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ValidationResult {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A single constructor argument.
#[derive(Clone)]
pub enum Arg {
    Detail(String),
    Category(String),
    Instance(String),
    Resource(String),
    Field(String),
    /// Plain string; becomes the detail unless one is already set.
    Text(String),
    /// Wrapped error whose causes are spliced into the new problem.
    Error(SharedError),
    /// Rendered `Display` value; becomes the detail unless one is already set.
    Stringable(String),
    Meta(Meta),
    Validation(ValidationResult),
    /// Anything else; only used, stringified, when it is the first argument.
    Value(Value),
}

impl Arg {
    pub fn error<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Error(Arc::new(err))
    }

    pub fn display(value: &impl fmt::Display) -> Self {
        Self::Stringable(value.to_string())
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detail(s) => f.debug_tuple("Detail").field(s).finish(),
            Self::Category(s) => f.debug_tuple("Category").field(s).finish(),
            Self::Instance(s) => f.debug_tuple("Instance").field(s).finish(),
            Self::Resource(s) => f.debug_tuple("Resource").field(s).finish(),
            Self::Field(s) => f.debug_tuple("Field").field(s).finish(),
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Error(e) => f.debug_tuple("Error").field(&e.to_string()).finish(),
            Self::Stringable(s) => f.debug_tuple("Stringable").field(s).finish(),
            Self::Meta(m) => f.debug_tuple("Meta").field(m).finish(),
            Self::Validation(v) => f.debug_tuple("Validation").field(v).finish(),
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
        }
    }
}

macro_rules! marker_into_arg {
    ($($marker:ident),* $(,)?) => {
        $(
            impl $marker {
                pub fn new(value: impl Into<String>) -> Self {
                    Self(value.into())
                }
            }

            impl From<$marker> for Arg {
                fn from(value: $marker) -> Self {
                    Self::$marker(value.0)
                }
            }
        )*
    };
}

marker_into_arg!(Detail, Category, Instance, Resource, Field);

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for Arg {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<Problem> for Arg {
    fn from(value: Problem) -> Self {
        Self::Error(Arc::new(value))
    }
}

impl From<std::io::Error> for Arg {
    fn from(value: std::io::Error) -> Self {
        Self::Error(Arc::new(value))
    }
}

impl From<SharedError> for Arg {
    fn from(value: SharedError) -> Self {
        Self::Error(value)
    }
}

impl From<Box<dyn StdError + Send + Sync + 'static>> for Arg {
    fn from(value: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        Self::Error(Arc::from(value))
    }
}

impl From<Meta> for Arg {
    fn from(value: Meta) -> Self {
        Self::Meta(value)
    }
}

impl From<ValidationResult> for Arg {
    fn from(value: ValidationResult) -> Self {
        Self::Validation(value)
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Renders a value the way it reads in prose: strings bare, everything else as JSON.
pub(crate) fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders a value as a literal: strings quoted, everything else as JSON.
pub(crate) fn literal(value: &Value) -> String {
    value.to_string()
}
