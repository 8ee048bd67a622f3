//! The preference record and its normalization rules.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Language used when nothing has been written yet.
pub const DEFAULT_LANGUAGE: &str = "ru";
/// Currency used when nothing has been written yet.
pub const DEFAULT_CURRENCY: &str = "USD";
/// Unit system used when nothing has been written yet.
pub const DEFAULT_METRIC_SYSTEM: &str = "imperial";
/// Timezone used when nothing has been written yet.
pub const DEFAULT_TIMEZONE: &str = "utc";

/// A user's synchronized preferences.
///
/// The record is always replaced as a whole; `updated_at_ms` is the only
/// field that takes part in ordering. Deserialization is lenient about field
/// types (numbers become strings, missing fields take defaults) and always
/// yields a normalized record, but it still requires a JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawRecord")]
pub struct PreferenceRecord {
    /// Display language code, lower-case (`en`, `ru`, ...).
    pub language: String,
    /// Currency code, upper-case (`USD`, `AED`, ...).
    pub currency: String,
    /// Unit system, lower-case (`imperial`, `metric`).
    pub metric_system: String,
    /// Timezone identifier, lower-case.
    pub timezone: String,
    /// Logical write timestamp in milliseconds. `0` means never written.
    pub updated_at_ms: i64,
}

impl PreferenceRecord {
    /// Build a normalized record from its parts.
    pub fn new(
        language: impl Into<String>,
        currency: impl Into<String>,
        metric_system: impl Into<String>,
        timezone: impl Into<String>,
        updated_at_ms: i64,
    ) -> Self {
        Self {
            language: language.into(),
            currency: currency.into(),
            metric_system: metric_system.into(),
            timezone: timezone.into(),
            updated_at_ms,
        }
        .normalized()
    }

    /// Apply the casing and default rules.
    ///
    /// Idempotent: normalizing a normalized record returns it unchanged.
    pub fn normalized(self) -> Self {
        Self {
            language: lower_or(&self.language, DEFAULT_LANGUAGE),
            currency: upper_or(&self.currency, DEFAULT_CURRENCY),
            metric_system: lower_or(&self.metric_system, DEFAULT_METRIC_SYSTEM),
            timezone: lower_or(&self.timezone, DEFAULT_TIMEZONE),
            updated_at_ms: self.updated_at_ms,
        }
    }

    /// True if [`normalized`](Self::normalized) would not change the record.
    pub fn is_normalized(&self) -> bool {
        self.clone().normalized() == *self
    }

    /// True if the record has never been written by anyone.
    pub fn is_unwritten(&self) -> bool {
        self.updated_at_ms == 0
    }

    /// Return a copy stamped with a new write timestamp.
    pub fn with_updated_at(mut self, updated_at_ms: i64) -> Self {
        self.updated_at_ms = updated_at_ms;
        self
    }

    /// Leniently read a record out of an arbitrary JSON value.
    ///
    /// Returns `None` when the value is not an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

impl Default for PreferenceRecord {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
            metric_system: DEFAULT_METRIC_SYSTEM.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            updated_at_ms: 0,
        }
    }
}

/// A partial edit of the record. `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreferencePatch {
    /// New display language.
    pub language: Option<String>,
    /// New currency.
    pub currency: Option<String>,
    /// New unit system.
    pub metric_system: Option<String>,
    /// New timezone.
    pub timezone: Option<String>,
}

impl PreferencePatch {
    /// An empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set the currency.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Set the unit system.
    pub fn with_metric_system(mut self, metric_system: impl Into<String>) -> Self {
        self.metric_system = Some(metric_system.into());
        self
    }

    /// Set the timezone.
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// True if no field is set.
    pub fn is_empty(&self) -> bool {
        self.language.is_none()
            && self.currency.is_none()
            && self.metric_system.is_none()
            && self.timezone.is_none()
    }

    /// Overlay the patch onto `base` and stamp the result with `updated_at_ms`.
    pub fn apply_to(&self, base: &PreferenceRecord, updated_at_ms: i64) -> PreferenceRecord {
        let pick = |patched: &Option<String>, current: &str| {
            patched.clone().unwrap_or_else(|| current.to_string())
        };
        PreferenceRecord::new(
            pick(&self.language, &base.language),
            pick(&self.currency, &base.currency),
            pick(&self.metric_system, &base.metric_system),
            pick(&self.timezone, &base.timezone),
            updated_at_ms,
        )
    }
}

/// Wire shape accepted from storage and from remote peers.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawRecord {
    language: Option<Value>,
    currency: Option<Value>,
    metric_system: Option<Value>,
    timezone: Option<Value>,
    updated_at_ms: Option<Value>,
}

impl From<RawRecord> for PreferenceRecord {
    fn from(raw: RawRecord) -> Self {
        Self {
            language: coerce_text(raw.language).unwrap_or_default(),
            currency: coerce_text(raw.currency).unwrap_or_default(),
            metric_system: coerce_text(raw.metric_system).unwrap_or_default(),
            timezone: coerce_text(raw.timezone).unwrap_or_default(),
            updated_at_ms: coerce_timestamp(raw.updated_at_ms),
        }
        .normalized()
    }
}

fn lower_or(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_lowercase()
    } else {
        value.to_lowercase()
    }
}

fn upper_or(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_uppercase()
    } else {
        value.to_uppercase()
    }
}

/// Scalars become their string form; falsy or structured values are absent.
fn coerce_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

/// Numbers and numeric strings are accepted; anything else reads as `0`.
fn coerce_timestamp(value: Option<Value>) -> i64 {
    let as_float = match value {
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => return i,
            None => n.as_f64(),
        },
        Some(Value::String(s)) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(i) => return i,
                Err(_) => s.parse::<f64>().ok(),
            }
        }
        _ => None,
    };
    match as_float {
        Some(f) if f.is_finite() => f.trunc() as i64,
        _ => 0,
    }
}
