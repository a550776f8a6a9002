//! Dynamic entity values.
//!
//! Entities are untyped trees of [`Value`]s. Objects carry two pieces of
//! metadata that never take part in equality: a frozen flag, which turns every
//! later assignment into an error, and an optional change tracker installed by
//! enrichment.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::closure::ClosureError;
use crate::error::ValueError;

// ============================================================================
// Value
// ============================================================================

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    Object(Object),
    Function(Function),
}

impl Value {
    pub fn object() -> Self {
        Value::Object(Object::new())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(function) => Some(function),
            _ => None,
        }
    }

    /// Shorthand for `as_object().and_then(|o| o.get(key))`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|object| object.get(key))
    }

    /// Walks `path` through nested objects.
    ///
    /// Reads are lenient: a missing key, a null ancestor or a non-object
    /// ancestor all resolve to `None`. A present null resolves to
    /// `Some(&Value::Null)`.
    pub fn select<'a, I>(&self, path: I) -> Option<&Value>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut current = self;
        for name in path {
            current = current.as_object()?.get(name)?;
        }
        Some(current)
    }

    /// Writes `value` at `path`, returning the previous value.
    ///
    /// Every ancestor must already be an object. Frozen objects reject the
    /// write with [`ValueError::Frozen`].
    pub fn assign<'a, I>(&mut self, path: I, value: Value) -> Result<Option<Value>, ValueError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let names: Vec<&str> = path.into_iter().collect();
        let Some((last, parents)) = names.split_last() else {
            return Ok(Some(std::mem::replace(self, value)));
        };

        let mut current = self;
        for (depth, name) in parents.iter().enumerate() {
            let object = match current {
                Value::Object(object) => object,
                Value::Null => {
                    return Err(ValueError::MissingParent {
                        path: names.join("."),
                    })
                }
                other => {
                    return Err(ValueError::NotAnObject {
                        path: names[..depth].join("."),
                        found: other.type_name(),
                    })
                }
            };
            current = match object.fields.get_mut(*name) {
                Some(next) => next,
                None => {
                    return Err(ValueError::MissingParent {
                        path: names.join("."),
                    })
                }
            };
        }

        match current {
            Value::Object(object) => object.set(*last, value),
            Value::Null => Err(ValueError::MissingParent {
                path: names.join("."),
            }),
            other => Err(ValueError::NotAnObject {
                path: parents.join("."),
                found: other.type_name(),
            }),
        }
    }

    /// Raw mutable navigation that ignores frozen flags.
    ///
    /// Only monotonic changes (freezing, tracking) and in-place element
    /// programs, which check frozen flags on their own writes, go through
    /// here.
    pub fn descend_mut<'a, I>(&mut self, path: I) -> Option<&mut Value>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut current = self;
        for name in path {
            current = match current {
                Value::Object(object) => object.fields.get_mut(name)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Freezes the object at `path`. Returns `false` when there is nothing to
    /// freeze or the object is already frozen.
    pub fn freeze_at<'a, I>(&mut self, path: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        match self.descend_mut(path) {
            Some(Value::Object(object)) if !object.frozen => {
                object.frozen = true;
                true
            }
            _ => false,
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.as_object().is_some_and(Object::is_frozen)
    }

    /// Installs a change tracker on the object at `path`.
    pub fn track_at<'a, I>(&mut self, path: I, mode: TrackingMode) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        match self.descend_mut(path) {
            Some(Value::Object(object)) => object.track(mode),
            _ => false,
        }
    }

    /// Dotted paths of every tracked assignment in this tree.
    pub fn changed_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_changes(self, "", &mut out);
        out
    }

    /// Deep copy without frozen flags or trackers.
    pub fn detached(&self) -> Value {
        match self {
            Value::Array(items) => Value::Array(items.iter().map(Value::detached).collect()),
            Value::Object(object) => Value::Object(Object {
                fields: object
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.detached()))
                    .collect(),
                frozen: false,
                tracker: None,
            }),
            other => other.clone(),
        }
    }

    /// Plain JSON view. Dates become ISO-8601 strings and functions become null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Function(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(format_date(d)),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(object) => serde_json::Value::Object(
                object
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Stable JSON form used for hashing. Strings are quoted and object
    /// keys sorted, so distinct values never render alike. Dates render as
    /// their quoted ISO form.
    pub fn canonical(&self) -> String {
        self.to_json().to_string()
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

fn collect_changes(value: &Value, prefix: &str, out: &mut Vec<String>) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", prefix, key)
        }
    };
    match value {
        Value::Object(object) => {
            if let Some(tracker) = &object.tracker {
                out.extend(tracker.changed.iter().map(|key| join(key)));
            }
            for (key, child) in &object.fields {
                collect_changes(child, &join(key), out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                collect_changes(child, &join(&index.to_string()), out);
            }
        }
        _ => {}
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Function(function) => write!(f, "[function {}]", function.name()),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Function> for Value {
    fn from(function: Function) -> Self {
        Value::Function(function)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

/// ISO-8601 with millisecond precision, e.g. `2024-01-01T00:00:00.000Z`.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

// ============================================================================
// Object
// ============================================================================

#[derive(Clone, Debug, Default)]
pub struct Object {
    fields: BTreeMap<String, Value>,
    frozen: bool,
    tracker: Option<Box<Tracker>>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Result<Option<Value>, ValueError> {
        let key = key.into();
        if self.frozen {
            return Err(ValueError::Frozen { key });
        }
        if let Some(tracker) = self.tracker.as_mut() {
            if self.fields.get(&key) != Some(&value) {
                tracker.record(&key, self.fields.get(&key));
            }
        }
        Ok(self.fields.insert(key, value))
    }

    /// Builder-style [`set`](Self::set) for unfrozen objects.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get_mut(&mut self, key: &str) -> Result<Option<&mut Value>, ValueError> {
        if self.frozen {
            return Err(ValueError::Frozen {
                key: key.to_string(),
            });
        }
        Ok(self.fields.get_mut(key))
    }

    pub fn remove(&mut self, key: &str) -> Result<Option<Value>, ValueError> {
        if self.frozen {
            return Err(ValueError::Frozen {
                key: key.to_string(),
            });
        }
        if let Some(tracker) = self.tracker.as_mut() {
            if self.fields.contains_key(key) {
                tracker.record(key, self.fields.get(key));
            }
        }
        Ok(self.fields.remove(key))
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Installs a tracker. Re-tracking with the same mode keeps the changes
    /// recorded so far. Returns whether a tracker is active afterwards.
    pub fn track(&mut self, mode: TrackingMode) -> bool {
        if mode == TrackingMode::Disabled {
            return self.tracker.is_some();
        }
        match &self.tracker {
            Some(existing) if existing.mode == mode => {}
            _ => {
                self.tracker = Some(Box::new(Tracker {
                    mode,
                    ..Tracker::default()
                }))
            }
        }
        true
    }

    pub fn tracking_mode(&self) -> TrackingMode {
        self.tracker
            .as_ref()
            .map(|tracker| tracker.mode)
            .unwrap_or_default()
    }

    /// Keys assigned since tracking started.
    pub fn changes(&self) -> impl Iterator<Item = &str> {
        self.tracker
            .iter()
            .flat_map(|tracker| tracker.changed.iter().map(String::as_str))
    }

    /// Value a key held before its first tracked assignment. Only recorded in
    /// [`TrackingMode::Snapshot`]; a key that did not exist reads as null.
    pub fn previous(&self, key: &str) -> Option<&Value> {
        self.tracker
            .as_ref()
            .and_then(|tracker| tracker.previous.get(key))
    }

    pub fn into_fields(self) -> BTreeMap<String, Value> {
        self.fields
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl FromIterator<(String, Value)> for Object {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Object {
            fields: iter.into_iter().collect(),
            ..Object::default()
        }
    }
}

// ============================================================================
// Change tracking
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    #[default]
    Disabled,
    /// Record which keys were assigned.
    Keys,
    /// Record assigned keys and the value each held before.
    Snapshot,
}

impl TrackingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackingMode::Disabled => "disabled",
            TrackingMode::Keys => "keys",
            TrackingMode::Snapshot => "snapshot",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "disabled" => Some(TrackingMode::Disabled),
            "keys" => Some(TrackingMode::Keys),
            "snapshot" => Some(TrackingMode::Snapshot),
            _ => None,
        }
    }
}

impl From<TrackingMode> for Value {
    fn from(mode: TrackingMode) -> Self {
        Value::String(mode.as_str().to_string())
    }
}

#[derive(Clone, Debug, Default)]
struct Tracker {
    mode: TrackingMode,
    changed: BTreeSet<String>,
    previous: BTreeMap<String, Value>,
}

impl Tracker {
    fn record(&mut self, key: &str, before: Option<&Value>) {
        self.changed.insert(key.to_string());
        if self.mode == TrackingMode::Snapshot && !self.previous.contains_key(key) {
            self.previous
                .insert(key.to_string(), before.cloned().unwrap_or_default());
        }
    }
}

// ============================================================================
// Function values
// ============================================================================

type NativeFn = dyn Fn(&[Value]) -> Result<Value, ClosureError> + Send + Sync;

/// A callable entity field. Equality is identity.
#[derive(Clone)]
pub struct Function {
    name: Arc<str>,
    inner: Arc<NativeFn>,
}

impl Function {
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, ClosureError> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            inner: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, ClosureError> {
        (self.inner)(args)
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Function").field(&self.name).finish()
    }
}
