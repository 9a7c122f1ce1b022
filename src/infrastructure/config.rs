use crate::application::connector::ConnectorSettings;
use crate::application::producer::ProducerSettings;
use crate::application::transport::Endpoint;
use crate::domain::metric::{GenerationRule, Metric, MetricCatalog};
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub broker: BrokerSettings,
    pub feed: FeedSettings,
    pub http: HttpSettings,
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedSettings {
    pub topic: String,
    pub publish_interval_ms: u64,
    pub refresh_interval_ms: u64,
    pub buffer_capacity: usize,
    pub retry_delay_ms: u64,
    pub inbound_queue: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpSettings {
    pub listen: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricConfig {
    pub id: String,
    pub unit: String,
    pub min: f64,
    pub max: f64,
    #[serde(default = "default_precision")]
    pub precision: u32,
    #[serde(default)]
    pub aliases: Vec<String>,
}

fn default_precision() -> u32 {
    2
}

/// Beyond this many decimals an f64 has no digits left to round
const MAX_PRECISION: u32 = 15;

/// Load `<path>.toml` (optional) with `HVAC_*` environment overrides,
/// e.g. `HVAC_BROKER__HOST=localhost`
pub fn load_app_config(path: &str) -> anyhow::Result<AppConfig> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix("HVAC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    build_app_config(builder)
}

fn build_app_config(builder: ConfigBuilder<DefaultState>) -> anyhow::Result<AppConfig> {
    let settings = with_defaults(builder)?.build()?;
    let app_config: AppConfig = settings.try_deserialize()?;
    app_config.validate()?;
    Ok(app_config)
}

fn with_defaults(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    builder
        .set_default("broker.host", "mqtt.eclipseprojects.io")?
        .set_default("broker.port", 1883_i64)?
        .set_default("broker.keep_alive_secs", 60_i64)?
        .set_default("feed.topic", "hvac/sensor")?
        .set_default("feed.publish_interval_ms", 2_000_i64)?
        .set_default("feed.refresh_interval_ms", 1_000_i64)?
        .set_default("feed.buffer_capacity", 50_i64)?
        .set_default("feed.retry_delay_ms", 5_000_i64)?
        .set_default("feed.inbound_queue", 256_i64)?
        .set_default("http.listen", "127.0.0.1:8050")
}

impl AppConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.feed.buffer_capacity == 0 {
            anyhow::bail!("feed.buffer_capacity must be greater than zero");
        }
        if self.feed.publish_interval_ms == 0 || self.feed.refresh_interval_ms == 0 {
            anyhow::bail!("feed intervals must be greater than zero");
        }
        if self.feed.retry_delay_ms == 0 {
            anyhow::bail!("feed.retry_delay_ms must be greater than zero");
        }
        if self.feed.topic.is_empty() {
            anyhow::bail!("feed.topic must not be empty");
        }

        let mut seen = HashSet::new();
        for metric in &self.metrics {
            if !metric.min.is_finite() || !metric.max.is_finite() {
                anyhow::bail!(
                    "metric '{}' needs a finite range, got {} to {}",
                    metric.id,
                    metric.min,
                    metric.max
                );
            }
            if metric.precision > MAX_PRECISION {
                anyhow::bail!(
                    "metric '{}' precision {} exceeds {}",
                    metric.id,
                    metric.precision,
                    MAX_PRECISION
                );
            }
            if metric.min > metric.max {
                anyhow::bail!(
                    "metric '{}' has min {} greater than max {}",
                    metric.id,
                    metric.min,
                    metric.max
                );
            }
            if !seen.insert(metric.id.as_str()) {
                anyhow::bail!("metric '{}' is defined more than once", metric.id);
            }
        }
        Ok(())
    }

    /// Configured metrics, or the built-in HVAC set when none are listed
    pub fn catalog(&self) -> MetricCatalog {
        if self.metrics.is_empty() {
            return MetricCatalog::hvac();
        }

        let metrics = self
            .metrics
            .iter()
            .map(|m| Metric {
                id: m.id.clone(),
                unit: m.unit.clone(),
                rule: GenerationRule::new(m.min, m.max, m.precision),
                aliases: m.aliases.clone(),
            })
            .collect();
        MetricCatalog::new(metrics)
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.broker.host.clone(), self.broker.port)
    }

    pub fn client_id(&self, role: &str) -> String {
        self.broker
            .client_id
            .clone()
            .unwrap_or_else(|| format!("hvac-{}-{}", role, std::process::id()))
    }

    pub fn connector_settings(&self) -> ConnectorSettings {
        ConnectorSettings {
            endpoint: self.endpoint(),
            retry_delay: Duration::from_millis(self.feed.retry_delay_ms),
            inbound_queue: self.feed.inbound_queue,
        }
    }

    pub fn producer_settings(&self) -> ProducerSettings {
        ProducerSettings {
            topic: self.feed.topic.clone(),
            interval: Duration::from_millis(self.feed.publish_interval_ms),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.feed.refresh_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn from_toml(toml: &str) -> anyhow::Result<AppConfig> {
        build_app_config(config::Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn test_defaults() {
        let app_config = build_app_config(config::Config::builder()).unwrap();

        assert_eq!(app_config.broker.host, "mqtt.eclipseprojects.io");
        assert_eq!(app_config.broker.port, 1883);
        assert_eq!(app_config.feed.topic, "hvac/sensor");
        assert_eq!(app_config.feed.buffer_capacity, 50);
        assert_eq!(app_config.connector_settings().retry_delay, Duration::from_secs(5));
        assert_eq!(app_config.producer_settings().interval, Duration::from_secs(2));
        assert_eq!(app_config.refresh_interval(), Duration::from_secs(1));
        assert_eq!(app_config.catalog(), MetricCatalog::hvac());
    }

    #[test]
    fn test_file_overrides() {
        let app_config = from_toml(
            r#"
            [broker]
            host = "localhost"
            client_id = "chiller-7"

            [feed]
            buffer_capacity = 10

            [[metrics]]
            id = "Supply Temp"
            unit = "°C"
            min = 5.0
            max = 12.0
            aliases = ["Supply"]
            "#,
        )
        .unwrap();

        assert_eq!(app_config.endpoint(), Endpoint::new("localhost", 1883));
        assert_eq!(app_config.client_id("sensor"), "chiller-7");
        assert_eq!(app_config.feed.buffer_capacity, 10);

        let catalog = app_config.catalog();
        assert_eq!(catalog.len(), 1);
        let metric = catalog.resolve("Supply").unwrap();
        assert_eq!(metric.rule, GenerationRule::new(5.0, 12.0, 2));
    }

    #[test]
    fn test_rejects_invalid_settings() {
        assert!(from_toml("[feed]\nbuffer_capacity = 0").is_err());
        assert!(from_toml("[feed]\nrefresh_interval_ms = 0").is_err());

        let inverted = r#"
            [[metrics]]
            id = "Flow"
            unit = "L/min"
            min = 10.0
            max = 1.0
        "#;
        assert!(from_toml(inverted).is_err());

        let duplicated = r#"
            [[metrics]]
            id = "Flow"
            unit = "L/min"
            min = 1.0
            max = 10.0

            [[metrics]]
            id = "Flow"
            unit = "L/min"
            min = 1.0
            max = 10.0
        "#;
        assert!(from_toml(duplicated).is_err());
    }

    #[test]
    fn test_rejects_unusable_metric_ranges() {
        for range in ["min = -inf\nmax = 10.0", "min = 0.0\nmax = inf", "min = nan\nmax = 1.0"] {
            let toml = format!("[[metrics]]\nid = \"Flow\"\nunit = \"L/min\"\n{range}");
            assert!(from_toml(&toml).is_err(), "accepted {range}");
        }

        let too_precise = r#"
            [[metrics]]
            id = "Flow"
            unit = "L/min"
            min = 1.0
            max = 10.0
            precision = 400
        "#;
        assert!(from_toml(too_precise).is_err());

        let finest = too_precise.replace("400", "15");
        assert!(from_toml(&finest).is_ok());
    }

    #[test]
    fn test_rejects_zero_retry_delay() {
        let err = from_toml("[feed]\nretry_delay_ms = 0").unwrap_err();
        assert!(err.to_string().contains("retry_delay_ms"));
    }

    #[test]
    fn test_generated_client_id_names_role() {
        let app_config = build_app_config(config::Config::builder()).unwrap();
        assert!(app_config.client_id("dashboard").starts_with("hvac-dashboard-"));
    }
}
