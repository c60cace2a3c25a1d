//! The host-side value model.
//!
//! The guest cannot hold a native reference to a host value; everything it
//! sees is a small integer handle into the [`HeapTable`](crate::HeapTable).
//! [`HostValue`] is the set of values a handle can reference: JSON-like data
//! (the options objects going in, the result objects coming out) plus the
//! sentinels the guest's environment-probing and typed-array imports operate
//! on.
//!
//! Values have *value semantics*: cloning a handle duplicates the value into
//! an independent slot. Two handles never alias mutable state.

use vellum_common::BridgeError;

/// A value referenced by a guest-visible handle.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    /// The absent value.
    Undefined,
    /// The null value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A double-precision number (the only numeric type crossing the
    /// boundary).
    Number(f64),
    /// A string.
    Str(String),
    /// An ordered array.
    Array(Vec<HostValue>),
    /// A string-keyed object. Insertion order is preserved.
    Object(Vec<(String, HostValue)>),
    /// A host-owned byte buffer (a standalone `Uint8Array`).
    Bytes(Vec<u8>),
    /// The guest's linear-memory object.
    Memory,
    /// The backing buffer of the guest's linear memory.
    Buffer,
    /// A byte window over the guest's linear memory (a `Uint8Array` view).
    View {
        /// Start offset in guest memory.
        ptr: u32,
        /// Window length in bytes.
        len: u32,
    },
    /// The global-scope sentinel the environment probes resolve to.
    Scope,
    /// The crypto-object sentinel backing the randomness imports.
    Crypto,
    /// An error value carrying a message.
    Error(String),
}

impl HostValue {
    /// Returns `true` for values the guest's `is_object` probe accepts:
    /// non-null, non-primitive values.
    pub fn is_object_like(&self) -> bool {
        !matches!(
            self,
            HostValue::Undefined
                | HostValue::Null
                | HostValue::Bool(_)
                | HostValue::Number(_)
                | HostValue::Str(_)
        )
    }

    /// Look up a key on an object, or an index on an array.
    ///
    /// Returns [`HostValue::Undefined`] for a missing key, mirroring
    /// property access semantics the guest expects.
    pub fn property(&self, key: &HostValue) -> HostValue {
        match (self, key) {
            (HostValue::Object(entries), HostValue::Str(k)) => entries
                .iter()
                .find(|(name, _)| name == k)
                .map_or(HostValue::Undefined, |(_, v)| v.clone()),
            (HostValue::Array(items), HostValue::Number(n)) => {
                let idx = *n;
                if idx.fract() == 0.0 && idx >= 0.0 && (idx as usize) < items.len() {
                    items[idx as usize].clone()
                } else {
                    HostValue::Undefined
                }
            }
            _ => HostValue::Undefined,
        }
    }

    /// `key in value` semantics for the membership probe.
    pub fn has_property(&self, key: &HostValue) -> bool {
        match (self, key) {
            (HostValue::Object(entries), HostValue::Str(k)) => {
                entries.iter().any(|(name, _)| name == k)
            }
            (HostValue::Array(items), HostValue::Number(n)) => {
                n.fract() == 0.0 && *n >= 0.0 && (*n as usize) < items.len()
            }
            _ => false,
        }
    }

    /// Insert or replace a key on an object value.
    ///
    /// # Errors
    ///
    /// Returns a marshalling fault if `self` is not an object.
    pub fn set_property(&mut self, key: String, value: HostValue) -> Result<(), BridgeError> {
        let HostValue::Object(entries) = self else {
            return Err(BridgeError::marshalling(format!(
                "cannot set property '{key}' on {}",
                self.type_name()
            )));
        };
        if let Some(entry) = entries.iter_mut().find(|(name, _)| *name == key) {
            entry.1 = value;
        } else {
            entries.push((key, value));
        }
        Ok(())
    }

    /// Set an element on an array value, padding with `Undefined` as needed.
    ///
    /// # Errors
    ///
    /// Returns a marshalling fault if `self` is not an array.
    pub fn set_index(&mut self, index: u32, value: HostValue) -> Result<(), BridgeError> {
        let HostValue::Array(items) = self else {
            return Err(BridgeError::marshalling(format!(
                "cannot set index {index} on {}",
                self.type_name()
            )));
        };
        let index = index as usize;
        if index >= items.len() {
            items.resize(index + 1, HostValue::Undefined);
        }
        items[index] = value;
        Ok(())
    }

    /// A short name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Undefined => "undefined",
            HostValue::Null => "null",
            HostValue::Bool(_) => "boolean",
            HostValue::Number(_) => "number",
            HostValue::Str(_) => "string",
            HostValue::Array(_) => "array",
            HostValue::Object(_) => "object",
            HostValue::Bytes(_) | HostValue::View { .. } => "Uint8Array",
            HostValue::Memory => "Memory",
            HostValue::Buffer => "ArrayBuffer",
            HostValue::Scope => "global",
            HostValue::Crypto => "Crypto",
            HostValue::Error(_) => "Error",
        }
    }

    /// Convert a data value into JSON for typed deserialization.
    ///
    /// Integral numbers become JSON integers so integer-typed output fields
    /// (word counts, reading times) deserialize cleanly from the guest's
    /// double-precision wire representation.
    ///
    /// # Errors
    ///
    /// Returns a marshalling fault for values with no data representation
    /// (memory objects, views, sentinels).
    pub fn into_json(self) -> Result<serde_json::Value, BridgeError> {
        use serde_json::Value;

        match self {
            HostValue::Undefined | HostValue::Null => Ok(Value::Null),
            HostValue::Bool(b) => Ok(Value::Bool(b)),
            HostValue::Number(n) => Ok(number_to_json(n)),
            HostValue::Str(s) => Ok(Value::String(s)),
            HostValue::Error(message) => Ok(Value::String(message)),
            HostValue::Array(items) => Ok(Value::Array(
                items
                    .into_iter()
                    .map(HostValue::into_json)
                    .collect::<Result<_, _>>()?,
            )),
            HostValue::Object(entries) => {
                let mut map = serde_json::Map::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(key, value.into_json()?);
                }
                Ok(Value::Object(map))
            }
            other => Err(BridgeError::marshalling(format!(
                "guest returned a non-data value ({})",
                other.type_name()
            ))),
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    #[allow(clippy::cast_possible_truncation)]
    if n.is_finite() && n.fract() == 0.0 && (i64::MIN as f64..=i64::MAX as f64).contains(&n) {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}

/// Loose equality between two values, the way the guest's equality import
/// expects it: `null` and `undefined` compare equal, numeric strings
/// compare equal to their numbers, booleans coerce to numbers. Non-primitive
/// values never compare equal here; identity comparison is handled at the
/// handle level by the caller.
pub fn loose_eq(a: &HostValue, b: &HostValue) -> bool {
    use HostValue::{Bool, Null, Number, Str, Undefined};

    match (a, b) {
        (Undefined | Null, Undefined | Null) => true,
        (Number(x), Number(y)) => x == y,
        (Str(x), Str(y)) => x == y,
        (Bool(x), Bool(y)) => x == y,
        (Number(n), Str(s)) | (Str(s), Number(n)) => {
            s.trim().parse::<f64>().is_ok_and(|parsed| parsed == *n)
        }
        (Bool(x), Number(n)) | (Number(n), Bool(x)) => f64::from(u8::from(*x)) == *n,
        _ => false,
    }
}

/// Render a value for the guest's debug-formatting import.
pub fn debug_string(value: &HostValue) -> String {
    match value {
        HostValue::Undefined => "undefined".into(),
        HostValue::Null => "null".into(),
        HostValue::Bool(b) => b.to_string(),
        HostValue::Number(n) => format_number(*n),
        HostValue::Str(s) => format!("\"{s}\""),
        HostValue::Array(items) => {
            let inner: Vec<String> = items.iter().map(debug_string).collect();
            format!("[{}]", inner.join(", "))
        }
        HostValue::Object(_) => match value.clone().into_json() {
            Ok(json) => format!("Object({json})"),
            Err(_) => "Object".into(),
        },
        HostValue::Bytes(b) => format!("Uint8Array({})", b.len()),
        HostValue::View { len, .. } => format!("Uint8Array({len})"),
        HostValue::Memory => "Memory".into(),
        HostValue::Buffer => "ArrayBuffer".into(),
        HostValue::Scope => "[object global]".into(),
        HostValue::Crypto => "Crypto".into(),
        HostValue::Error(message) => format!("Error: {message}"),
    }
}

/// Format a number the way the guest-facing string conversions expect:
/// integral values without a trailing `.0`.
pub fn format_number(n: f64) -> String {
    #[allow(clippy::cast_possible_truncation)]
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
