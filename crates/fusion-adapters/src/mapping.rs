//! Severity Mapper and Field Mapper (spec §4.1 steps 2–3).

use fusion_common::events::{dotted_lookup, dotted_write};
use fusion_common::integration::{FieldMapping, FieldTransform, SeverityMapping};
use fusion_common::severity::Severity;
use serde_json::Value;
use thiserror::Error;

/// Iterate canonical levels in order, pick the first level whose label
/// list contains the vendor label case-insensitively; else `medium`
/// (spec §4.1 step 2).
pub fn map_severity(mapping: &SeverityMapping, vendor_label: &str) -> Severity {
    let label = vendor_label.to_lowercase();
    for (severity, labels) in [
        (Severity::Critical, &mapping.critical),
        (Severity::High, &mapping.high),
        (Severity::Medium, &mapping.medium),
        (Severity::Low, &mapping.low),
        (Severity::Info, &mapping.info),
    ] {
        if labels.iter().any(|l| l.to_lowercase() == label) {
            return severity;
        }
    }
    Severity::Medium
}

#[derive(Debug, Error)]
pub enum FieldMapError {
    #[error("required field missing: {source_field} -> {target_field}")]
    RequiredFieldMissing {
        source_field: String,
        target_field: String,
    },
}

/// Apply every field mapping rule over a vendor-shaped draft record,
/// producing the attributes map the Normalized Event carries forward
/// (spec §4.1 step 3).
pub fn apply_field_mappings(
    draft: &Value,
    mappings: &[FieldMapping],
) -> Result<Value, FieldMapError> {
    let mut output = Value::Object(Default::default());
    for mapping in mappings {
        let source_value = dotted_lookup(draft, &mapping.source_field);
        let value = match (&source_value, &mapping.transform) {
            (Some(v), FieldTransform::Direct) => Some(v.clone()),
            (Some(Value::String(s)), FieldTransform::Uppercase) => {
                Some(Value::String(s.to_uppercase()))
            }
            (Some(Value::String(s)), FieldTransform::Lowercase) => {
                Some(Value::String(s.to_lowercase()))
            }
            (Some(Value::String(s)), FieldTransform::Date) => {
                Some(Value::String(normalize_date(s)))
            }
            (Some(v), FieldTransform::Custom) => Some(v.clone()),
            (Some(v), _) => Some(v.clone()),
            (None, _) => None,
        };

        let resolved = value.or_else(|| mapping.default_value.clone());

        match resolved {
            Some(v) => dotted_write(&mut output, &mapping.target_field, v),
            None if mapping.required => {
                return Err(FieldMapError::RequiredFieldMissing {
                    source_field: mapping.source_field.clone(),
                    target_field: mapping.target_field.clone(),
                });
            }
            None => {}
        }
    }
    Ok(output)
}

/// Best-effort ISO-8601 normalization: if the input already parses as
/// RFC3339 it is passed through; otherwise it is returned unchanged
/// (vendor timestamp formats vary too widely to guess here — unparsable
/// values fall through to the caller, who treats the field as present
/// but raw, rather than failing the whole record).
fn normalize_date(input: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(input)
        .map(|d| d.to_rfc3339())
        .unwrap_or_else(|_| input.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping_fixture() -> SeverityMapping {
        SeverityMapping {
            critical: vec!["critical".into(), "p1".into(), "sev1".into(), "10".into(), "9".into(), "highest".into()],
            high: vec!["high".into(), "p2".into()],
            medium: vec!["medium".into()],
            low: vec!["low".into()],
            info: vec!["info".into()],
        }
    }

    #[test]
    fn scenario_1_severity_mapping() {
        // spec §8 scenario 1
        let mapping = mapping_fixture();
        assert_eq!(map_severity(&mapping, "Highest"), Severity::Critical);
    }

    #[test]
    fn unmapped_label_falls_back_to_medium() {
        let mapping = mapping_fixture();
        assert_eq!(map_severity(&mapping, "unknown-vendor-label"), Severity::Medium);
    }

    #[test]
    fn field_mapper_direct_roundtrip_is_identity() {
        // P5: transform=direct with identity paths is a no-op round-trip.
        let draft = serde_json::json!({"title": "x", "nested": {"a": 1}});
        let mappings = vec![
            FieldMapping {
                source_field: "title".into(),
                target_field: "title".into(),
                transform: FieldTransform::Direct,
                required: true,
                default_value: None,
            },
            FieldMapping {
                source_field: "nested.a".into(),
                target_field: "nested.a".into(),
                transform: FieldTransform::Direct,
                required: false,
                default_value: None,
            },
        ];
        let output = apply_field_mappings(&draft, &mappings).unwrap();
        assert_eq!(output["title"], draft["title"]);
        assert_eq!(output["nested"]["a"], draft["nested"]["a"]);
    }

    #[test]
    fn required_missing_field_errors() {
        let draft = serde_json::json!({});
        let mappings = vec![FieldMapping {
            source_field: "missing".into(),
            target_field: "out".into(),
            transform: FieldTransform::Direct,
            required: true,
            default_value: None,
        }];
        assert!(apply_field_mappings(&draft, &mappings).is_err());
    }

    #[test]
    fn missing_optional_field_uses_default() {
        let draft = serde_json::json!({});
        let mappings = vec![FieldMapping {
            source_field: "missing".into(),
            target_field: "out".into(),
            transform: FieldTransform::Direct,
            required: false,
            default_value: Some(Value::String("fallback".into())),
        }];
        let output = apply_field_mappings(&draft, &mappings).unwrap();
        assert_eq!(output["out"], Value::String("fallback".into()));
    }

    #[test]
    fn uppercase_transform_applies() {
        let draft = serde_json::json!({"s": "abc"});
        let mappings = vec![FieldMapping {
            source_field: "s".into(),
            target_field: "s".into(),
            transform: FieldTransform::Uppercase,
            required: false,
            default_value: None,
        }];
        let output = apply_field_mappings(&draft, &mappings).unwrap();
        assert_eq!(output["s"], Value::String("ABC".into()));
    }

    proptest::proptest! {
        /// P1: `map_severity` returns one of the five canonical levels
        /// for any vendor label, mapped or not.
        #[test]
        fn p1_severity_is_always_canonical(label in "\\PC{0,32}") {
            let mapping = mapping_fixture();
            let severity = map_severity(&mapping, &label);
            proptest::prop_assert!(Severity::ALL.contains(&severity));
        }

        /// P5: a direct-transform mapping from a path to itself is an
        /// identity round-trip for any scalar JSON value.
        #[test]
        fn p5_direct_transform_roundtrips_arbitrary_scalars(s in "\\PC{0,32}", n in proptest::num::i64::ANY) {
            let draft = serde_json::json!({"s": s, "n": n});
            let mappings = vec![
                FieldMapping { source_field: "s".into(), target_field: "s".into(), transform: FieldTransform::Direct, required: false, default_value: None },
                FieldMapping { source_field: "n".into(), target_field: "n".into(), transform: FieldTransform::Direct, required: false, default_value: None },
            ];
            let output = apply_field_mappings(&draft, &mappings).unwrap();
            proptest::prop_assert_eq!(&output["s"], &draft["s"]);
            proptest::prop_assert_eq!(&output["n"], &draft["n"]);
        }
    }
}
