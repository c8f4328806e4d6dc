//! Value model shared by extractors, the cache and the aggregate.
//!
//! Extractors produce [`RawMetadata`], an ordered list of loosely typed
//! values that may be null or empty. The coordinator normalizes that into an
//! [`ExtractionResult`] whose every field holds either a concrete value or
//! [`FieldValue::NotAvailable`].

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ExtractionError;

/// Display text for a field with no value.
pub const NOT_AVAILABLE: &str = "Not Available";

/// A field value as reported by an extractor, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    List(Vec<RawValue>),
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Integer(value)
    }
}

impl From<i32> for RawValue {
    fn from(value: i32) -> Self {
        RawValue::Integer(value.into())
    }
}

impl From<u32> for RawValue {
    fn from(value: u32) -> Self {
        RawValue::Integer(value.into())
    }
}

impl From<u64> for RawValue {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(v) => RawValue::Integer(v),
            Err(_) => RawValue::Float(value as f64),
        }
    }
}

impl From<usize> for RawValue {
    fn from(value: usize) -> Self {
        RawValue::from(value as u64)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Float(value)
    }
}

impl From<DateTime<Utc>> for RawValue {
    fn from(value: DateTime<Utc>) -> Self {
        RawValue::Timestamp(value)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(RawValue::Null, Into::into)
    }
}

impl<T: Into<RawValue>> From<Vec<T>> for RawValue {
    fn from(values: Vec<T>) -> Self {
        RawValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Ordered field list returned by an extractor.
///
/// Order is display order. Inserting a name that already exists replaces
/// the value but keeps the original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMetadata {
    fields: Vec<(String, RawValue)>,
}

impl RawMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<RawValue>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Chaining form of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl IntoIterator for RawMetadata {
    type Item = (String, RawValue);
    type IntoIter = std::vec::IntoIter<(String, RawValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<K: Into<String>, V: Into<RawValue>> FromIterator<(K, V)> for RawMetadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = RawMetadata::new();
        for (name, value) in iter {
            metadata.insert(name, value);
        }
        metadata
    }
}

/// A normalized field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    NotAvailable,
}

impl FieldValue {
    pub fn is_available(&self) -> bool {
        !matches!(self, FieldValue::NotAvailable)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Integer(n) => write!(f, "{}", n),
            FieldValue::Float(n) => write!(f, "{}", n),
            FieldValue::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
            FieldValue::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

/// Normalized metadata for one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    fields: Vec<Field>,
}

impl ExtractionResult {
    pub(crate) fn from_fields(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields
            .iter()
            .map(|field| (field.name.as_str(), &field.value))
    }

    /// Converts back into raw form. `NotAvailable` becomes `Null`, so
    /// normalizing the result again yields an equal value.
    pub fn into_raw(self) -> RawMetadata {
        self.fields
            .into_iter()
            .map(|field| {
                let raw = match field.value {
                    FieldValue::Text(text) => RawValue::Text(text),
                    FieldValue::Integer(n) => RawValue::Integer(n),
                    FieldValue::Float(n) => RawValue::Float(n),
                    FieldValue::Timestamp(ts) => RawValue::Timestamp(ts),
                    FieldValue::NotAvailable => RawValue::Null,
                };
                (field.name, raw)
            })
            .collect()
    }
}

/// Success or failure for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Success(ExtractionResult),
    #[serde(rename = "error")]
    Failure(ExtractionError),
}

impl ExtractionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Success(_))
    }

    pub fn as_result(&self) -> Option<&ExtractionResult> {
        match self {
            ExtractionOutcome::Success(result) => Some(result),
            ExtractionOutcome::Failure(_) => None,
        }
    }

    pub fn as_error(&self) -> Option<&ExtractionError> {
        match self {
            ExtractionOutcome::Success(_) => None,
            ExtractionOutcome::Failure(err) => Some(err),
        }
    }
}

impl From<ExtractionError> for ExtractionOutcome {
    fn from(err: ExtractionError) -> Self {
        ExtractionOutcome::Failure(err)
    }
}

/// Outcomes of one batch keyed by path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateResult {
    entries: HashMap<PathBuf, ExtractionOutcome>,
}

impl AggregateResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, path: PathBuf, outcome: ExtractionOutcome) {
        self.entries.insert(path, outcome);
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&ExtractionOutcome> {
        self.entries.get(path.as_ref())
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.entries.contains_key(path.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &ExtractionOutcome)> {
        self.entries.iter()
    }

    /// Entries ordered by path.
    pub fn sorted(&self) -> Vec<(&PathBuf, &ExtractionOutcome)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    pub fn succeeded(&self) -> usize {
        self.entries.values().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }
}

impl IntoIterator for AggregateResult {
    type Item = (PathBuf, ExtractionOutcome);
    type IntoIter = std::collections::hash_map::IntoIter<PathBuf, ExtractionOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for AggregateResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let sorted = self.sorted();
        let mut map = serializer.serialize_map(Some(sorted.len()))?;
        for (path, outcome) in sorted {
            map.serialize_entry(&path.display().to_string(), outcome)?;
        }
        map.end()
    }
}
