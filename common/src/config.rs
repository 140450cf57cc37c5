use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_ms: u64,
    pub min_error_interval_ms: u64,
    pub max_error_interval_ms: u64,
    pub error_interval_multiplier: f64,
    pub command_retry_delay_ms: u64,
    pub max_command_attempts: u32,
    /// Poll shortly after a successful command to pick up the new climate state.
    pub revalidate_after_command_ms: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_800_000,
            min_error_interval_ms: 30_000,
            max_error_interval_ms: 7_200_000,
            error_interval_multiplier: 1.5,
            command_retry_delay_ms: 15_000,
            max_command_attempts: 3,
            revalidate_after_command_ms: Some(60_000),
        }
    }
}

impl SchedulerConfig {
    pub fn sanitize(&mut self) {
        if !self.error_interval_multiplier.is_finite() || self.error_interval_multiplier < 1.0 {
            self.error_interval_multiplier = 1.0;
        }
        self.min_error_interval_ms = self.min_error_interval_ms.max(1);
        if self.max_error_interval_ms < self.min_error_interval_ms {
            self.max_error_interval_ms = self.min_error_interval_ms;
        }
        self.poll_interval_ms = self.poll_interval_ms.max(1_000);
        self.max_command_attempts = self.max_command_attempts.max(1);
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn command_retry_delay(&self) -> Duration {
        Duration::from_millis(self.command_retry_delay_ms)
    }

    pub fn revalidate_after_command(&self) -> Option<Duration> {
        self.revalidate_after_command_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub region_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

/// Contents of the options file. Key names match the options file consumed by
/// earlier deployments of the bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub username: String,
    pub password: String,
    pub regioncode: String,
    pub mqtt_server: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub command_topic: String,
    pub telemetry_topic: String,
    pub device_id: String,
    pub http_port: u16,
    pub scheduler: SchedulerConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            regioncode: String::new(),
            mqtt_server: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            command_topic: String::new(),
            telemetry_topic: String::new(),
            device_id: "leaf".to_string(),
            http_port: 8080,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl BridgeConfig {
    pub fn from_json(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// Applies environment-style overrides on top of the file contents.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CARWINGS_USERNAME") {
            self.username = value;
        }
        if let Some(value) = lookup("CARWINGS_PASSWORD") {
            self.password = value;
        }
        if let Some(value) = lookup("CARWINGS_REGION") {
            self.regioncode = value;
        }
        if let Some(value) = lookup("MQTT_HOST") {
            self.mqtt_server = value;
        }
        if let Some(value) = lookup("MQTT_PORT") {
            self.mqtt_port = parse_port("MQTT_PORT", &value)?;
        }
        if let Some(value) = lookup("MQTT_USER") {
            self.mqtt_user = value;
        }
        if let Some(value) = lookup("MQTT_PASS") {
            self.mqtt_pass = value;
        }
        if let Some(value) = lookup("BRIDGE_HTTP_PORT") {
            self.http_port = parse_port("BRIDGE_HTTP_PORT", &value)?;
        }
        Ok(())
    }

    /// Rejects configurations the bridge cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("username", &self.username),
            ("password", &self.password),
            ("regioncode", &self.regioncode),
            ("mqtt_server", &self.mqtt_server),
            ("command_topic", &self.command_topic),
            ("telemetry_topic", &self.telemetry_topic),
            ("device_id", &self.device_id),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(field));
            }
        }

        if self.command_topic.contains(['#', '+']) {
            return Err(ConfigError::Invalid {
                field: "command_topic",
                reason: "wildcards are not allowed".to_string(),
            });
        }
        if self.telemetry_topic.contains(['#', '+']) {
            return Err(ConfigError::Invalid {
                field: "telemetry_topic",
                reason: "wildcards are not allowed".to_string(),
            });
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
            region_code: self.regioncode.clone(),
        }
    }

    pub fn mqtt(&self) -> MqttConfig {
        MqttConfig {
            host: self.mqtt_server.clone(),
            port: self.mqtt_port,
            user: self.mqtt_user.clone(),
            pass: self.mqtt_pass.clone(),
        }
    }
}

fn parse_port(field: &'static str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|err| ConfigError::Invalid {
        field,
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use pretty_assertions::assert_eq;

    fn complete() -> BridgeConfig {
        BridgeConfig {
            username: "driver@example.com".to_string(),
            password: "hunter2".to_string(),
            regioncode: "NNA".to_string(),
            command_topic: "leaf/cmnd".to_string(),
            telemetry_topic: "leaf/tele".to_string(),
            ..BridgeConfig::default()
        }
    }

    #[test]
    fn parses_legacy_options_file() {
        let raw = br#"{
            "username": "driver@example.com",
            "password": "hunter2",
            "regioncode": "NE",
            "mqtt_server": "broker.local",
            "mqtt_port": 1884,
            "command_topic": "leaf/cmnd",
            "telemetry_topic": "leaf/tele"
        }"#;

        let config = BridgeConfig::from_json(raw).unwrap();

        assert_eq!(config.regioncode, "NE");
        assert_eq!(config.mqtt_server, "broker.local");
        assert_eq!(config.mqtt_port, 1884);
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_credentials_fail_fast() {
        let mut config = complete();
        config.password.clear();
        assert_eq!(config.validate(), Err(ConfigError::Missing("password")));

        let mut config = complete();
        config.regioncode = "  ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::Missing("regioncode")));

        assert_eq!(
            BridgeConfig::default().validate(),
            Err(ConfigError::Missing("username"))
        );
    }

    #[test]
    fn wildcard_topics_are_rejected() {
        let mut config = complete();
        config.command_topic = "leaf/#".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "command_topic",
                ..
            })
        ));
    }

    #[test]
    fn overrides_take_precedence() {
        let env: HashMap<&str, &str> = [
            ("MQTT_HOST", "10.0.0.2"),
            ("MQTT_PORT", "8883"),
            ("CARWINGS_PASSWORD", "from-env"),
        ]
        .into_iter()
        .collect();

        let mut config = complete();
        config
            .apply_overrides(|key| env.get(key).map(|value| value.to_string()))
            .unwrap();

        assert_eq!(config.mqtt_server, "10.0.0.2");
        assert_eq!(config.mqtt_port, 8883);
        assert_eq!(config.password, "from-env");
        assert_eq!(config.username, "driver@example.com");
    }

    #[test]
    fn bad_port_override_is_reported() {
        let mut config = complete();
        let result =
            config.apply_overrides(|key| (key == "MQTT_PORT").then(|| "99999".to_string()));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "MQTT_PORT",
                ..
            })
        ));
    }

    #[test]
    fn sanitize_clamps_scheduler_values() {
        let mut scheduler = SchedulerConfig {
            error_interval_multiplier: 0.5,
            min_error_interval_ms: 60_000,
            max_error_interval_ms: 10_000,
            max_command_attempts: 0,
            ..SchedulerConfig::default()
        };
        scheduler.sanitize();

        assert_eq!(scheduler.error_interval_multiplier, 1.0);
        assert_eq!(scheduler.max_error_interval_ms, 60_000);
        assert_eq!(scheduler.max_command_attempts, 1);
    }
}
