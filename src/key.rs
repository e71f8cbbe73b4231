//! Cache key normalization.
//!
//! Turns `(message_id, attribute, args)` into a [`CacheKey`] whose equality
//! and hash do not depend on how the argument bag was built.
//!
//! ## Encoding
//!
//! ```text
//!   value            bytes
//!   ─────            ─────
//!   Null             0x00
//!   Bool(b)          0x01 b
//!   Int(i)           0x02 i:be64
//!   Float(f)         0x03 bits:be64     (-0.0 → 0.0)
//!   Float(NaN)       0x04               (every NaN payload)
//!   Str(s)           0x05 len:be64 utf8
//!   List(xs)         0x06 len:be64 enc(x0) enc(x1) ...
//!   Set(xs)          0x07 len:be64 sorted(enc(x)...)
//!   Map(kvs)         0x08 len:be64 sorted(enc(k) enc(v) ...)
//!   Opaque(o)        0x09 enc_str(type_name) enc_str(token)
//! ```
//!
//! Every encoded element is self-delimiting, so concatenated encodings never
//! become ambiguous. The top-level bag is encoded as a map keyed by argument
//! name.
//!
//! `Bool(true)` and `Int(1)` get different tags, as do `Int(1)` and
//! `Float(1.0)`: each of these formats differently.
//!
//! ## Example Usage
//!
//! ```
//! use ftlcache::args;
//! use ftlcache::key::normalize;
//!
//! let a = args! { "n" => 1, "name" => "Ana" };
//! let mut b = ftlcache::args::ArgBag::new();
//! b.insert("name".into(), "Ana".into());
//! b.insert("n".into(), 1.into());
//!
//! assert_eq!(normalize("hello", None, &a).unwrap(), normalize("hello", None, &b).unwrap());
//! assert_ne!(
//!     normalize("hello", None, &a).unwrap(),
//!     normalize("hello", Some("title"), &a).unwrap()
//! );
//! ```

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::args::{ArgBag, ArgValue};
use crate::error::NormalizeError;

/// Containers nested deeper than this fail normalization.
pub const MAX_NESTING_DEPTH: usize = 100;

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_NAN: u8 = 0x04;
const TAG_STR: u8 = 0x05;
const TAG_LIST: u8 = 0x06;
const TAG_SET: u8 = 0x07;
const TAG_MAP: u8 = 0x08;
const TAG_OPAQUE: u8 = 0x09;

/// Canonical, hashable identity of one format request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    message_id: Box<str>,
    attribute: Option<Box<str>>,
    args: Box<[u8]>,
}

impl CacheKey {
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    /// Canonical argument encoding.
    pub fn encoded_args(&self) -> &[u8] {
        &self.args
    }

    /// 64-bit digest of the whole key, for logs and audit records.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Normalizes a format request into a [`CacheKey`].
///
/// Pure and deterministic. Fails only on [`ArgValue::Opaque`] values without
/// a cache token, or on nesting deeper than [`MAX_NESTING_DEPTH`].
pub fn normalize(
    message_id: &str,
    attribute: Option<&str>,
    args: &ArgBag,
) -> Result<CacheKey, NormalizeError> {
    let mut entries: Vec<(&str, Vec<u8>)> = Vec::with_capacity(args.len());
    for (name, value) in args {
        let mut buf = Vec::new();
        encode_value(value, 0, &mut buf).map_err(|failure| failure.into_error(name))?;
        entries.push((name.as_str(), buf));
    }
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

    let mut out = Vec::new();
    out.push(TAG_MAP);
    put_len(&mut out, entries.len());
    for (name, encoded) in entries {
        put_str(&mut out, name);
        out.extend_from_slice(&encoded);
    }

    Ok(CacheKey {
        message_id: message_id.into(),
        attribute: attribute.map(Into::into),
        args: out.into_boxed_slice(),
    })
}

enum EncodeFailure {
    Unhashable,
    TooDeep,
}

impl EncodeFailure {
    fn into_error(self, arg: &str) -> NormalizeError {
        match self {
            EncodeFailure::Unhashable => NormalizeError::Unhashable {
                arg: arg.to_owned(),
            },
            EncodeFailure::TooDeep => NormalizeError::TooDeep {
                arg: arg.to_owned(),
                limit: MAX_NESTING_DEPTH,
            },
        }
    }
}

fn encode_value(value: &ArgValue, depth: usize, out: &mut Vec<u8>) -> Result<(), EncodeFailure> {
    match value {
        ArgValue::Null => out.push(TAG_NULL),
        ArgValue::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*b));
        },
        ArgValue::Int(i) => {
            out.push(TAG_INT);
            out.extend_from_slice(&i.to_be_bytes());
        },
        ArgValue::Float(f) => encode_float(*f, out),
        ArgValue::Str(s) => put_str(out, s),
        ArgValue::List(items) => {
            check_depth(depth)?;
            out.push(TAG_LIST);
            put_len(out, items.len());
            for item in items {
                encode_value(item, depth + 1, out)?;
            }
        },
        ArgValue::Set(items) => {
            check_depth(depth)?;
            let mut encoded = items
                .iter()
                .map(|item| {
                    let mut buf = Vec::new();
                    encode_value(item, depth + 1, &mut buf).map(|()| buf)
                })
                .collect::<Result<Vec<_>, _>>()?;
            encoded.sort_unstable();
            out.push(TAG_SET);
            put_len(out, encoded.len());
            for buf in encoded {
                out.extend_from_slice(&buf);
            }
        },
        ArgValue::Map(entries) => {
            check_depth(depth)?;
            let mut encoded = entries
                .iter()
                .map(|(k, v)| {
                    let mut buf = Vec::new();
                    encode_value(k, depth + 1, &mut buf)?;
                    encode_value(v, depth + 1, &mut buf)?;
                    Ok::<_, EncodeFailure>(buf)
                })
                .collect::<Result<Vec<_>, _>>()?;
            // Key encodings are self-delimiting, so sorting the pair bytes
            // orders by key first.
            encoded.sort_unstable();
            out.push(TAG_MAP);
            put_len(out, encoded.len());
            for buf in encoded {
                out.extend_from_slice(&buf);
            }
        },
        ArgValue::Opaque(obj) => {
            let token = obj.cache_token().ok_or(EncodeFailure::Unhashable)?;
            out.push(TAG_OPAQUE);
            put_str(out, obj.type_name());
            put_str(out, &token);
        },
    }
    Ok(())
}

#[inline]
fn check_depth(depth: usize) -> Result<(), EncodeFailure> {
    if depth >= MAX_NESTING_DEPTH {
        Err(EncodeFailure::TooDeep)
    } else {
        Ok(())
    }
}

fn encode_float(f: f64, out: &mut Vec<u8>) {
    if f.is_nan() {
        out.push(TAG_NAN);
        return;
    }
    // `-0.0 == 0.0` must produce one encoding.
    let canonical = if f == 0.0 { 0.0_f64 } else { f };
    out.push(TAG_FLOAT);
    out.extend_from_slice(&canonical.to_bits().to_be_bytes());
}

#[inline]
fn put_len(out: &mut Vec<u8>, len: usize) {
    out.extend_from_slice(&(len as u64).to_be_bytes());
}

#[inline]
fn put_str(out: &mut Vec<u8>, s: &str) {
    out.push(TAG_STR);
    put_len(out, s.len());
    out.extend_from_slice(s.as_bytes());
}
