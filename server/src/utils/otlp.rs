//! OTLP attribute handling
//!
//! Converts protobuf attribute lists into the ordered string map the
//! warehouse stores. Insertion order follows the payload; downstream text
//! construction depends on it.

use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue, any_value};

use crate::data::types::AttrMap;

/// Extract attributes from a KeyValue list, preserving payload order.
///
/// Attributes without a value are kept with an empty string, matching the
/// stringification of an absent variant.
pub fn extract_attributes(attrs: &[KeyValue]) -> AttrMap {
    attrs
        .iter()
        .map(|kv| {
            let value = kv
                .value
                .as_ref()
                .map(any_value_to_string)
                .unwrap_or_default();
            (kv.key.clone(), value)
        })
        .collect()
}

/// Convert an AnyValue to its stored string form.
///
/// The scalar variants win directly (bools render lowercase); composite or
/// unknown variants are stringified wholesale, bytes as hex.
pub fn any_value_to_string(value: &AnyValue) -> String {
    match &value.value {
        Some(any_value::Value::StringValue(s)) => s.clone(),
        Some(any_value::Value::IntValue(i)) => i.to_string(),
        Some(any_value::Value::DoubleValue(d)) => d.to_string(),
        Some(any_value::Value::BoolValue(b)) => b.to_string(),
        Some(any_value::Value::ArrayValue(arr)) => {
            let values: Vec<String> = arr.values.iter().map(any_value_to_string).collect();
            serde_json::to_string(&values).unwrap_or_default()
        }
        Some(any_value::Value::KvlistValue(kvlist)) => {
            let map: Vec<(String, String)> = kvlist
                .values
                .iter()
                .map(|kv| {
                    let value = kv
                        .value
                        .as_ref()
                        .map(any_value_to_string)
                        .unwrap_or_default();
                    (kv.key.clone(), value)
                })
                .collect();
            let obj: serde_json::Map<String, serde_json::Value> = map
                .into_iter()
                .map(|(k, v)| (k, serde_json::Value::String(v)))
                .collect();
            serde_json::to_string(&obj).unwrap_or_default()
        }
        Some(any_value::Value::BytesValue(b)) => hex::encode(b),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::common::v1::ArrayValue;

    fn kv(key: &str, value: any_value::Value) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: Some(AnyValue { value: Some(value) }),
        }
    }

    #[test]
    fn test_string_value() {
        let av = AnyValue {
            value: Some(any_value::Value::StringValue("hello".to_string())),
        };
        assert_eq!(any_value_to_string(&av), "hello");
    }

    #[test]
    fn test_int_value() {
        let av = AnyValue {
            value: Some(any_value::Value::IntValue(-42)),
        };
        assert_eq!(any_value_to_string(&av), "-42");
    }

    #[test]
    fn test_double_value() {
        let av = AnyValue {
            value: Some(any_value::Value::DoubleValue(3.5)),
        };
        assert_eq!(any_value_to_string(&av), "3.5");
    }

    #[test]
    fn test_bool_renders_lowercase() {
        let av = AnyValue {
            value: Some(any_value::Value::BoolValue(true)),
        };
        assert_eq!(any_value_to_string(&av), "true");
        let av = AnyValue {
            value: Some(any_value::Value::BoolValue(false)),
        };
        assert_eq!(any_value_to_string(&av), "false");
    }

    #[test]
    fn test_bytes_render_hex() {
        let av = AnyValue {
            value: Some(any_value::Value::BytesValue(vec![0xde, 0xad, 0xbe, 0xef])),
        };
        assert_eq!(any_value_to_string(&av), "deadbeef");
    }

    #[test]
    fn test_array_stringified_does_not_throw() {
        let av = AnyValue {
            value: Some(any_value::Value::ArrayValue(ArrayValue {
                values: vec![
                    AnyValue {
                        value: Some(any_value::Value::IntValue(1)),
                    },
                    AnyValue {
                        value: Some(any_value::Value::StringValue("two".to_string())),
                    },
                ],
            })),
        };
        assert_eq!(any_value_to_string(&av), r#"["1","two"]"#);
    }

    #[test]
    fn test_empty_value_is_empty_string() {
        let av = AnyValue { value: None };
        assert_eq!(any_value_to_string(&av), "");
    }

    #[test]
    fn test_extract_preserves_insertion_order() {
        let attrs = vec![
            kv("zebra", any_value::Value::StringValue("z".to_string())),
            kv("alpha", any_value::Value::StringValue("a".to_string())),
            kv("mid", any_value::Value::IntValue(7)),
        ];
        let map = extract_attributes(&attrs);
        assert_eq!(
            map,
            vec![
                ("zebra".to_string(), "z".to_string()),
                ("alpha".to_string(), "a".to_string()),
                ("mid".to_string(), "7".to_string()),
            ]
        );
    }
}
