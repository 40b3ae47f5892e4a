use chrono::{DateTime, Utc};
use common::domain::{DomainError, DomainResult, UplinkRecord};
use serde_json::Value;
use tracing::debug;

const APPLICATION_ID_PATH: &[&str] = &["deviceInfo", "applicationId"];
const DEV_EUI_PATH: &[&str] = &["deviceInfo", "devEui"];
const F_PORT_PATH: &[&str] = &["fPort"];
const DATA_PATH: &[&str] = &["data"];
const RX_INFO_PATH: &[&str] = &["rxInfo"];
const OBJECT_PATH: &[&str] = &["object"];

/// Parse a raw uplink payload into a JSON object
///
/// Invalid UTF-8, invalid JSON and JSON documents whose top level is not an
/// object are all `DomainError::DecodeError`.
pub fn decode_payload(payload: &[u8]) -> DomainResult<Value> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| DomainError::DecodeError(format!("payload is not valid JSON: {}", e)))?;

    if !value.is_object() {
        return Err(DomainError::DecodeError(format!(
            "payload must be a JSON object, got {}",
            json_kind(&value)
        )));
    }

    Ok(value)
}

/// Safe nested lookup
///
/// Returns `None` when any level of `path` is missing or is not an object,
/// and when the value found is JSON `null`.
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |current, key| current.get(*key))
        .filter(|found| !found.is_null())
}

/// Project a decoded payload into an uplink record stamped with `timestamp`
pub fn extract_record(payload: &Value, timestamp: DateTime<Utc>) -> UplinkRecord {
    UplinkRecord {
        application_id: string_field(payload, APPLICATION_ID_PATH),
        dev_eui: string_field(payload, DEV_EUI_PATH),
        f_port: integer_field(payload, F_PORT_PATH),
        data: lookup(payload, DATA_PATH).cloned(),
        rx_info: lookup(payload, RX_INFO_PATH).cloned(),
        object_json: lookup(payload, OBJECT_PATH).cloned(),
        timestamp,
    }
}

fn string_field(payload: &Value, path: &[&str]) -> Option<String> {
    let value = lookup(payload, path)?;
    match value.as_str() {
        Some(s) => Some(s.to_string()),
        None => {
            debug!(
                field = %path.join("."),
                kind = json_kind(value),
                "ignoring non-string value"
            );
            None
        }
    }
}

fn integer_field(payload: &Value, path: &[&str]) -> Option<i64> {
    let value = lookup(payload, path)?;
    match value.as_i64() {
        Some(n) => Some(n),
        None => {
            debug!(
                field = %path.join("."),
                kind = json_kind(value),
                "ignoring non-integer value"
            );
            None
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FULL_PAYLOAD: &str = r#"{"deviceInfo":{"applicationId":"11","devEui":"AABBCCDDEEFF0011"},"fPort":2,"data":"SGVsbG8=","rxInfo":[{"gatewayId":"g1"}],"object":{"temp":21.5}}"#;

    #[test]
    fn test_extract_full_payload() {
        let payload = decode_payload(FULL_PAYLOAD.as_bytes()).unwrap();
        let timestamp = Utc::now();

        let record = extract_record(&payload, timestamp);

        assert_eq!(
            record,
            UplinkRecord {
                application_id: Some("11".to_string()),
                dev_eui: Some("AABBCCDDEEFF0011".to_string()),
                f_port: Some(2),
                data: Some(json!("SGVsbG8=")),
                rx_info: Some(json!([{"gatewayId": "g1"}])),
                object_json: Some(json!({"temp": 21.5})),
                timestamp,
            }
        );
    }

    #[test]
    fn test_missing_device_info_leaves_siblings_intact() {
        let payload = json!({"fPort": 10, "data": "AQI=", "object": {"humidity": 40}});

        let record = extract_record(&payload, Utc::now());

        assert_eq!(record.application_id, None);
        assert_eq!(record.dev_eui, None);
        assert_eq!(record.f_port, Some(10));
        assert_eq!(record.data, Some(json!("AQI=")));
        assert_eq!(record.rx_info, None);
        assert_eq!(record.object_json, Some(json!({"humidity": 40})));
    }

    #[test]
    fn test_empty_object_yields_all_absent() {
        let record = extract_record(&json!({}), Utc::now());

        assert_eq!(record.application_id, None);
        assert_eq!(record.dev_eui, None);
        assert_eq!(record.f_port, None);
        assert_eq!(record.data, None);
        assert_eq!(record.rx_info, None);
        assert_eq!(record.object_json, None);
    }

    #[test]
    fn test_device_info_not_an_object() {
        let payload = json!({"deviceInfo": "oops", "fPort": 1});

        let record = extract_record(&payload, Utc::now());

        assert_eq!(record.application_id, None);
        assert_eq!(record.dev_eui, None);
        assert_eq!(record.f_port, Some(1));
    }

    #[test]
    fn test_null_values_are_absent() {
        let payload = json!({"deviceInfo": null, "fPort": null, "object": null});

        let record = extract_record(&payload, Utc::now());

        assert_eq!(record.application_id, None);
        assert_eq!(record.f_port, None);
        assert_eq!(record.object_json, None);
    }

    #[test]
    fn test_wrongly_typed_scalars_are_absent() {
        let payload = json!({
            "deviceInfo": {"applicationId": 11, "devEui": ["AA"]},
            "fPort": "2"
        });

        let record = extract_record(&payload, Utc::now());

        assert_eq!(record.application_id, None);
        assert_eq!(record.dev_eui, None);
        assert_eq!(record.f_port, None);
    }

    #[test]
    fn test_fractional_f_port_is_absent() {
        let record = extract_record(&json!({"fPort": 2.5}), Utc::now());
        assert_eq!(record.f_port, None);
    }

    #[test]
    fn test_pass_through_fields_keep_any_shape() {
        let payload = json!({"data": 42, "rxInfo": {"gatewayId": "g1"}, "object": [1, 2]});

        let record = extract_record(&payload, Utc::now());

        assert_eq!(record.data, Some(json!(42)));
        assert_eq!(record.rx_info, Some(json!({"gatewayId": "g1"})));
        assert_eq!(record.object_json, Some(json!([1, 2])));
    }

    #[test]
    fn test_lookup_nested_paths() {
        let value = json!({"a": {"b": {"c": 1}}});

        assert_eq!(lookup(&value, &["a", "b", "c"]), Some(&json!(1)));
        assert_eq!(lookup(&value, &["a", "x", "c"]), None);
        assert_eq!(lookup(&value, &["a", "b", "c", "d"]), None);
        assert_eq!(lookup(&value, &[]), Some(&value));
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        let result = decode_payload(b"not valid json");
        assert!(matches!(result, Err(DomainError::DecodeError(_))));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let result = decode_payload(&[0xff, 0xfe, 0x7b]);
        assert!(matches!(result, Err(DomainError::DecodeError(_))));
    }

    #[test]
    fn test_decode_rejects_empty_payload() {
        let result = decode_payload(b"");
        assert!(matches!(result, Err(DomainError::DecodeError(_))));
    }

    #[test]
    fn test_decode_rejects_non_object_json() {
        let payloads: [&[u8]; 4] = [b"[1,2,3]", b"42", b"\"text\"", b"null"];
        for payload in payloads {
            let result = decode_payload(payload);
            assert!(
                matches!(result, Err(DomainError::DecodeError(_))),
                "expected decode error for {:?}",
                String::from_utf8_lossy(payload)
            );
        }
    }
}
