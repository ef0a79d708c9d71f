//! Request schema-contract validation: does an incoming feature map match
//! the bundle's declared feature schema.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

const MAX_LISTED_NAMES: usize = 20;

/// One request feature value. The wire contract allows any JSON scalar;
/// only finite numeric (int/float) values pass validation — bools, strings,
/// and nulls are rejected as non-numeric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

impl FeatureValue {
    /// The finite numeric value this represents, or `None` if it isn't a
    /// finite number (bools and strings are explicitly rejected even
    /// though JSON numbers and booleans can look alike on the wire).
    #[must_use]
    pub fn as_finite_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) if f.is_finite() => Some(*f),
            _ => None,
        }
    }
}

/// A request that failed schema validation. Carries enough detail to build
/// the decision policy's structured reason codes.
#[derive(Debug, Clone, Default)]
pub struct SchemaViolation {
    pub schema_mismatch: Option<(i64, i64)>,
    pub missing: Vec<String>,
    pub extra: Vec<String>,
    pub invalid: Vec<String>,
}

impl SchemaViolation {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schema_mismatch.is_none()
            && self.missing.is_empty()
            && self.extra.is_empty()
            && self.invalid.is_empty()
    }

    /// Structured reason strings, `DATA_CONTRACT` first, per spec's
    /// ordering: schema mismatch, then missing, extra, invalid-value lists.
    #[must_use]
    pub fn reasons(&self) -> Vec<String> {
        let mut reasons = vec!["DATA_CONTRACT".to_string()];
        if let Some((got, expected)) = self.schema_mismatch {
            reasons.push(format!("SCHEMA_MISMATCH:{got}!={expected}"));
        }
        if !self.missing.is_empty() {
            reasons.push(format!("MISSING_FEATURES:{}", truncated_list(&self.missing)));
        }
        if !self.extra.is_empty() {
            reasons.push(format!("EXTRA_FEATURES:{}", truncated_list(&self.extra)));
        }
        if !self.invalid.is_empty() {
            reasons.push(format!(
                "INVALID_FEATURE_VALUES:{}",
                truncated_list(&self.invalid)
            ));
        }
        reasons
    }
}

fn truncated_list(names: &[String]) -> String {
    if names.len() > MAX_LISTED_NAMES {
        let mut shown: Vec<&str> = names[..MAX_LISTED_NAMES].iter().map(String::as_str).collect();
        shown.push("...");
        shown.join(",")
    } else {
        names.join(",")
    }
}

/// Validate a request's feature map against the bundle's declared schema.
/// Returns `None` when the request is fully conforming.
#[must_use]
pub fn validate_request(
    features: &HashMap<String, FeatureValue>,
    feature_names: &[String],
    request_schema_version: i64,
    expected_schema_version: i64,
    allow_extras: bool,
) -> Option<SchemaViolation> {
    let mut violation = SchemaViolation::default();

    if request_schema_version != expected_schema_version {
        violation.schema_mismatch = Some((request_schema_version, expected_schema_version));
    }

    for name in feature_names {
        if !features.contains_key(name) {
            violation.missing.push(name.clone());
        }
    }

    if !allow_extras {
        let known: std::collections::HashSet<&str> =
            feature_names.iter().map(String::as_str).collect();
        for key in features.keys() {
            if !known.contains(key.as_str()) {
                violation.extra.push(key.clone());
            }
        }
        violation.extra.sort();
    }

    for name in feature_names {
        if let Some(value) = features.get(name) {
            if value.as_finite_f64().is_none() {
                violation.invalid.push(name.clone());
            }
        }
    }

    if violation.is_empty() {
        None
    } else {
        Some(violation)
    }
}

/// Vectorize a validated feature map into the bundle's declared row order.
///
/// # Panics
/// Panics if `features` is missing any name in `feature_names` or holds a
/// non-numeric value for one — callers must run `validate_request` first.
#[must_use]
pub fn vectorize(features: &HashMap<String, FeatureValue>, feature_names: &[String]) -> Vec<f64> {
    feature_names
        .iter()
        .map(|name| {
            features
                .get(name)
                .and_then(FeatureValue::as_finite_f64)
                .expect("vectorize called on an unvalidated feature map")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["amount".to_string(), "hour".to_string()]
    }

    fn features(pairs: &[(&str, FeatureValue)]) -> HashMap<String, FeatureValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn conforming_request_has_no_violation() {
        let f = features(&[
            ("amount", FeatureValue::Float(12.5)),
            ("hour", FeatureValue::Int(3)),
        ]);
        assert!(validate_request(&f, &names(), 1, 1, false).is_none());
    }

    #[test]
    fn schema_version_mismatch_is_flagged() {
        let f = features(&[
            ("amount", FeatureValue::Float(12.5)),
            ("hour", FeatureValue::Int(3)),
        ]);
        let violation = validate_request(&f, &names(), 2, 1, false).unwrap();
        assert_eq!(violation.schema_mismatch, Some((2, 1)));
        assert!(violation.reasons().contains(&"SCHEMA_MISMATCH:2!=1".to_string()));
    }

    #[test]
    fn missing_feature_is_flagged() {
        let f = features(&[("amount", FeatureValue::Float(12.5))]);
        let violation = validate_request(&f, &names(), 1, 1, false).unwrap();
        assert_eq!(violation.missing, vec!["hour".to_string()]);
    }

    #[test]
    fn extra_feature_is_flagged_unless_allowed() {
        let f = features(&[
            ("amount", FeatureValue::Float(12.5)),
            ("hour", FeatureValue::Int(3)),
            ("bonus", FeatureValue::Int(1)),
        ]);
        assert!(validate_request(&f, &names(), 1, 1, false).unwrap().extra.contains(&"bonus".to_string()));
        assert!(validate_request(&f, &names(), 1, 1, true).is_none());
    }

    #[test]
    fn non_numeric_value_is_flagged() {
        let f = features(&[
            ("amount", FeatureValue::Bool(true)),
            ("hour", FeatureValue::Int(3)),
        ]);
        let violation = validate_request(&f, &names(), 1, 1, false).unwrap();
        assert_eq!(violation.invalid, vec!["amount".to_string()]);
    }

    #[test]
    fn long_name_lists_are_truncated() {
        let names: Vec<String> = (0..25).map(|i| format!("f{i}")).collect();
        let violation = SchemaViolation {
            missing: names,
            ..Default::default()
        };
        let reason = violation
            .reasons()
            .into_iter()
            .find(|r| r.starts_with("MISSING_FEATURES:"))
            .unwrap();
        assert!(reason.ends_with("...") || reason.ends_with(",..."));
        assert!(reason.contains("f19"));
        assert!(!reason.contains("f20"));
    }

    #[test]
    fn vectorize_respects_declared_order() {
        let f = features(&[
            ("hour", FeatureValue::Int(3)),
            ("amount", FeatureValue::Float(12.5)),
        ]);
        let row = vectorize(&f, &names());
        assert_eq!(row, vec![12.5, 3.0]);
    }
}
