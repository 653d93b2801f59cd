//! Helpers shared by the reconcilers.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::EnvVar;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde_json::Value;

/// True when every field set in `desired` has the same value in `existing`.
///
/// Fields absent (or `null`) in `desired` are ignored, so values the API
/// server defaults on its side never count as drift. Arrays must have the
/// same length and match element by element.
pub fn is_derivative(desired: &Value, existing: &Value) -> bool {
    match (desired, existing) {
        (Value::Null, _) => true,
        (Value::Object(want), Value::Object(have)) => want.iter().all(|(key, value)| {
            value.is_null() || have.get(key).is_some_and(|current| is_derivative(value, current))
        }),
        (Value::Array(want), Value::Array(have)) => {
            want.len() == have.len() && want.iter().zip(have).all(|(w, h)| is_derivative(w, h))
        }
        (want, have) => want == have,
    }
}

/// Convert an API timestamp to chrono
pub fn to_utc(time: &Time) -> Option<DateTime<Utc>> {
    let value = serde_json::to_value(time).ok()?;
    DateTime::parse_from_rfc3339(value.as_str()?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Set `name=value` in `env`, replacing an existing entry of the same name
pub fn upsert_env(env: &mut Vec<EnvVar>, name: &str, value: String) {
    let var = EnvVar {
        name: name.to_string(),
        value: Some(value),
        value_from: None,
    };
    match env.iter_mut().find(|e| e.name == name) {
        Some(existing) => *existing = var,
        None => env.push(var),
    }
}
