use common::domain::{DomainError, DomainResult};

/// Default subscription: uplink events of every device of every application
pub const UPLINK_TOPIC_FILTER: &str = "application/+/device/+/event/up";

/// Parsed network-server event topic
#[derive(Debug, Clone, PartialEq)]
pub struct UplinkTopic {
    pub application_id: String,
    pub dev_eui: String,
    pub event: String,
}

/// Parse a topic in the format `application/{application_id}/device/{dev_eui}/event/{event}`
///
/// # Examples
/// ```
/// use uplink_ingester::mqtt::parse_uplink_topic;
///
/// let parsed = parse_uplink_topic("application/11/device/0011223344556677/event/up").unwrap();
/// assert_eq!(parsed.application_id, "11");
/// assert_eq!(parsed.dev_eui, "0011223344556677");
/// assert_eq!(parsed.event, "up");
/// ```
pub fn parse_uplink_topic(topic: &str) -> DomainResult<UplinkTopic> {
    let parts: Vec<&str> = topic.split('/').collect();

    match parts.as_slice() {
        ["application", application_id, "device", dev_eui, "event", event]
            if !application_id.is_empty() && !dev_eui.is_empty() && !event.is_empty() =>
        {
            Ok(UplinkTopic {
                application_id: application_id.to_string(),
                dev_eui: dev_eui.to_string(),
                event: event.to_string(),
            })
        }
        _ => Err(DomainError::DecodeError(format!(
            "Invalid topic format '{}': expected 'application/{{application_id}}/device/{{dev_eui}}/event/{{event}}'",
            topic
        ))),
    }
}

/// MQTT topic filter matching
///
/// `+` matches exactly one level, `#` matches the remaining levels (including
/// none). Topics starting with `$` are never matched by a leading wildcard.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
