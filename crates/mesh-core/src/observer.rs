//! Observability event model (§4.6, §6).
//!
//! A narrow contract — `event`, `request_critical_section`,
//! `enter_critical_section`, `exit_critical_section` — is all a routing or
//! sync core needs from its device; this module supplies the data shape
//! that flows through it and the HTTP-facing rendering rules from the
//! reference UI this replaces.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::{ip_to_string, prefix_len_of_mask, Timestamp};

/// Which HTTP stream an event belongs to (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Events,
    Logs,
    Status,
}

/// A typed attribute value, rendered per the well-known-attribute rules in §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Ip(u32),
    Mask(u32),
    Bytes(Vec<u8>),
    Text(String),
    Number(i64),
}

impl Value {
    pub fn render(&self) -> String {
        match self {
            Value::Ip(ip) => ip_to_string(*ip),
            Value::Mask(mask) => prefix_len_of_mask(*mask).to_string(),
            Value::Bytes(bytes) => bytes
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" "),
            Value::Text(s) => s.clone(),
            Value::Number(n) => n.to_string(),
        }
    }
}

/// One recorded observation, carrying a wall-clock timestamp and the
/// critical-section flag in effect when it was recorded (§4.6).
#[derive(Debug, Clone)]
pub struct Event {
    pub timestamp: Timestamp,
    pub source: String,
    pub stream: Stream,
    pub name: String,
    pub data: Vec<(String, Value)>,
    pub in_critical_section: bool,
}

impl Event {
    /// Render following the `events` stream rule: merge `network`+`mask`
    /// (and `ext_network`+`ext_mask`) into `a.b.c.d/len`, then join the
    /// remaining attributes as `k=v` pairs.
    pub fn format_events_line(&self) -> String {
        let mut parts = Vec::new();
        let merged = merge_network_mask(&self.data, "network", "mask")
            .or_else(|| merge_network_mask(&self.data, "ext_network", "ext_mask"));
        if let Some(cidr) = &merged {
            parts.push(cidr.clone());
        }
        for (key, value) in &self.data {
            if matches!(key.as_str(), "network" | "mask" | "ext_network" | "ext_mask") {
                continue;
            }
            parts.push(format!("{key}={}", value.render()));
        }
        format!("{}: {}", self.name, parts.join(" "))
    }

    /// Render following the `status` stream rule: one paragraph per attribute.
    pub fn format_status_paragraphs(&self) -> String {
        self.data
            .iter()
            .map(|(k, v)| format!("{k}: {}", v.render()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn merge_network_mask(data: &[(String, Value)], net_key: &str, mask_key: &str) -> Option<String> {
    let network = data.iter().find(|(k, _)| k == net_key).map(|(_, v)| v)?;
    let mask = data.iter().find(|(k, _)| k == mask_key).map(|(_, v)| v)?;
    if let (Value::Ip(net), Value::Mask(mask)) = (network, mask) {
        Some(format!("{}/{}", ip_to_string(*net), prefix_len_of_mask(*mask)))
    } else {
        None
    }
}

/// Bounded ring buffer of recorded events, queried via `DeviceQuery` (§6).
pub struct EventLog {
    capacity: usize,
    events: VecDeque<Event>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, event: Event) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn events_for(&self, source: Option<&str>, stream: Option<Stream>) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| match source {
                Some(s) => e.source == s,
                None => true,
            })
            .filter(|e| match stream {
                Some(s) => e.stream == s,
                None => true,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event {
            timestamp: Timestamp::new(0),
            source: "north".into(),
            stream: Stream::Events,
            name: "on-connected".into(),
            data: vec![
                ("network".into(), Value::Ip(0x0A200000)),
                ("mask".into(), Value::Mask(0xFFE0_0000)),
            ],
            in_critical_section: false,
        }
    }

    #[test]
    fn merges_network_and_mask_into_cidr() {
        let event = sample_event();
        assert_eq!(event.format_events_line(), "on-connected: 10.32.0.0/11");
    }

    #[test]
    fn bytes_render_as_space_grouped_hex() {
        let value = Value::Bytes(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(value.render(), "de ad be ef");
    }

    #[test]
    fn event_log_evicts_oldest_past_capacity() {
        let mut log = EventLog::new(2);
        for i in 0..3u8 {
            let mut event = sample_event();
            event.name = format!("event-{i}");
            log.push(event);
        }
        let all = log.events_for(None, None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "event-1");
    }

    #[test]
    fn filters_by_source_and_stream() {
        let mut log = EventLog::new(8);
        log.push(sample_event());
        let mut other = sample_event();
        other.source = "east".into();
        log.push(other);

        assert_eq!(log.events_for(Some("north"), None).len(), 1);
        assert_eq!(log.events_for(None, Some(Stream::Logs)).len(), 0);
    }
}
