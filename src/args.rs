//! Argument values passed to message formatting.
//!
//! [`ArgValue`] covers what a Fluent bundle accepts as a variable: scalars,
//! strings, nested containers, and host-defined [`OpaqueArg`] values. The
//! argument bag itself is an [`ArgBag`], whose iteration order is unspecified;
//! [`normalize`](crate::key::normalize) is responsible for canonical ordering.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Named arguments for one format call.
pub type ArgBag = HashMap<String, ArgValue>;

/// Host-defined argument value.
///
/// Implementors that can be cached return a stable token describing their
/// observable state. Returning `None` marks the value as unhashable: the
/// format call still resolves, but bypasses the cache.
pub trait OpaqueArg: fmt::Debug + Send + Sync {
    /// Stable type name, mixed into the key so equal tokens from different
    /// types never collide.
    fn type_name(&self) -> &str;

    fn cache_token(&self) -> Option<String>;
}

/// A single argument value.
#[derive(Debug, Clone)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Positional sequence.
    List(Vec<ArgValue>),
    /// Unordered multiset.
    Set(Vec<ArgValue>),
    /// Unordered key/value pairs.
    Map(Vec<(ArgValue, ArgValue)>),
    Opaque(Arc<dyn OpaqueArg>),
}

impl ArgValue {
    /// Builds a map value from string keys.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, ArgValue)>,
    {
        ArgValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (ArgValue::Str(k.into()), v))
                .collect(),
        )
    }

    /// Short variant name, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ArgValue::Null => "null",
            ArgValue::Bool(_) => "bool",
            ArgValue::Int(_) => "int",
            ArgValue::Float(_) => "float",
            ArgValue::Str(_) => "string",
            ArgValue::List(_) => "list",
            ArgValue::Set(_) => "set",
            ArgValue::Map(_) => "map",
            ArgValue::Opaque(_) => "opaque",
        }
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        ArgValue::Bool(v)
    }
}

impl From<i32> for ArgValue {
    fn from(v: i32) -> Self {
        ArgValue::Int(i64::from(v))
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Int(v)
    }
}

impl From<u32> for ArgValue {
    fn from(v: u32) -> Self {
        ArgValue::Int(i64::from(v))
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        ArgValue::Float(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::Str(v.to_owned())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        ArgValue::Str(v)
    }
}

impl<T: Into<ArgValue>> From<Vec<T>> for ArgValue {
    fn from(v: Vec<T>) -> Self {
        ArgValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ArgValue>> From<Option<T>> for ArgValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ArgValue::Null, Into::into)
    }
}

/// Builds an [`ArgBag`] from `name => value` pairs.
///
/// ```
/// use ftlcache::args;
///
/// let bag = args! { "count" => 3, "name" => "Ana" };
/// assert_eq!(bag.len(), 2);
/// ```
#[macro_export]
macro_rules! args {
    () => { $crate::args::ArgBag::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut bag = $crate::args::ArgBag::new();
        $( bag.insert(::std::string::String::from($name), $crate::args::ArgValue::from($value)); )+
        bag
    }};
}
