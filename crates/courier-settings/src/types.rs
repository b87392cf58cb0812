//! Settings types with compiled defaults.

use serde::{Deserialize, Serialize};

/// Root settings document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CourierSettings {
    /// HTTP server knobs.
    pub server: ServerSettings,
    /// Database location.
    pub database: DatabaseSettings,
    /// Transport bridge and routing.
    pub transport: TransportSettings,
    /// Webhook dispatch policy.
    pub dispatch: DispatchSettings,
    /// Outbound send queue.
    pub queue: QueueSettings,
    /// Delivery log batching.
    pub logging: LoggingSettings,
}

/// HTTP server knobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerSettings {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8420,
        }
    }
}

/// Database location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatabaseSettings {
    /// Path to the sqlite file; `~` expands to the home directory.
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "~/.courier/courier.db".to_string(),
        }
    }
}

/// Transport bridge and destination routing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransportSettings {
    /// Base URL of the session bridge.
    pub bridge_url: String,
    /// Country code applied to unqualified destination numbers.
    pub default_country_code: String,
    /// Routing suffix appended to canonical addresses.
    pub routing_suffix: String,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            bridge_url: "http://127.0.0.1:3500".to_string(),
            default_country_code: "91".to_string(),
            routing_suffix: "@c.us".to_string(),
        }
    }
}

/// Webhook dispatch policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DispatchSettings {
    /// URL markers identifying low-latency automation platforms.
    pub automation_markers: Vec<String>,
    /// Delivery timeout for recognized automation targets, seconds.
    pub automation_timeout_secs: u64,
    /// Delivery timeout for everything else, seconds.
    pub default_timeout_secs: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            automation_markers: vec![
                "n8n".to_string(),
                "zapier".to_string(),
                "make.com".to_string(),
                "pipedream".to_string(),
            ],
            automation_timeout_secs: 5,
            default_timeout_secs: 10,
        }
    }
}

/// Outbound send queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueueSettings {
    /// Per-account admission cap.
    pub max_depth: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self { max_depth: 20 }
    }
}

/// Delivery log batching.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingSettings {
    /// Flush when this many records are buffered.
    pub batch_size: usize,
    /// Flush at least this often, seconds.
    pub flush_interval_secs: u64,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            flush_interval_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let settings = CourierSettings::default();
        assert_eq!(settings.queue.max_depth, 20);
        assert_eq!(settings.logging.batch_size, 10);
        assert_eq!(settings.logging.flush_interval_secs, 5);
        assert_eq!(settings.dispatch.automation_timeout_secs, 5);
        assert_eq!(settings.dispatch.default_timeout_secs, 10);
    }

    #[test]
    fn partial_document_fills_defaults() {
        let settings: CourierSettings =
            serde_json::from_str(r#"{"server": {"port": 9000}}"#).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.queue.max_depth, 20);
    }

    #[test]
    fn camel_case_keys() {
        let json = serde_json::to_value(CourierSettings::default()).unwrap();
        assert!(json["transport"].get("defaultCountryCode").is_some());
        assert!(json["logging"].get("flushIntervalSecs").is_some());
    }
}
