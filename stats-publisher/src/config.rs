//! Publisher configuration
//!
//! Loaded from a TOML file, then overridden by `STATS_*` environment
//! variables (a `.env` file is honoured by the binary). Everything is
//! validated before the first publish: a bad setting stops startup.

use crate::batch::BatchSize;
use crate::context::{NodeRole, PublisherContext};
use crate::discovery::HostInfo;
use crate::error::ConfigError;
use crate::publisher::{IndexSettings, DEFAULT_INDEX, DEFAULT_METRICS_TYPE, DEFAULT_STATS_TYPE};
use crate::scheduler::PublishSchedule;
use crate::transport::HttpTransport;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "STATS_PUBLISHER_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub elastic: ElasticConfig,
    pub node: NodeConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticConfig {
    pub host_address: String,
    pub index: String,
    pub metrics_type: String,
    pub stats_type: String,
    pub max_bulk_docs: i64,
    pub request_timeout_secs: Option<u64>,
    pub username: Option<String>,
    #[serde(skip_serializing)] // never written back to disk
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub deployment_id: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub role: NodeRole,
    pub address: Option<String>,
    pub gateway_address: Option<String>,
    pub host_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub metrics_interval_secs: u64,
    pub stats_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            host_address: String::new(),
            index: DEFAULT_INDEX.to_string(),
            metrics_type: DEFAULT_METRICS_TYPE.to_string(),
            stats_type: DEFAULT_STATS_TYPE.to_string(),
            max_bulk_docs: crate::batch::DEFAULT_BATCH_SIZE as i64,
            request_timeout_secs: None,
            username: None,
            password: None,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            metrics_interval_secs: 10,
            stats_interval_secs: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "stats_publisher=info".to_string(),
            json: false,
        }
    }
}

impl PublisherConfig {
    /// Read a TOML config file
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Config file location: `$STATS_PUBLISHER_CONFIG`, or the OS config dir
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }
        let mut path = dirs::config_dir().ok_or_else(|| {
            ConfigError::invalid("config path", "could not find the user config directory")
        })?;
        path.push("stats-publisher");
        path.push("config.toml");
        Ok(path)
    }

    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env(std::env::vars())
    }

    /// Override settings from `STATS_*` variables; unknown keys are ignored
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                "STATS_ELASTIC_HOST_ADDRESS" => self.elastic.host_address = value,
                "STATS_ELASTIC_INDEX" => self.elastic.index = value,
                "STATS_ELASTIC_METRICS_TYPE" => self.elastic.metrics_type = value,
                "STATS_ELASTIC_STATS_TYPE" => self.elastic.stats_type = value,
                "STATS_ELASTIC_MAX_BULK_DOCS" => {
                    self.elastic.max_bulk_docs = parse_env("elastic.max_bulk_docs", &value)?
                }
                "STATS_ELASTIC_REQUEST_TIMEOUT_SECS" => {
                    self.elastic.request_timeout_secs =
                        Some(parse_env("elastic.request_timeout_secs", &value)?)
                }
                "STATS_ELASTIC_USERNAME" => self.elastic.username = Some(value),
                "STATS_ELASTIC_PASSWORD" => self.elastic.password = Some(value),
                "STATS_DEPLOYMENT_ID" => self.node.deployment_id = value,
                "STATS_NODE_ID" => self.node.id = Some(value),
                "STATS_NODE_NAME" => self.node.name = Some(value),
                "STATS_NODE_ROLE" => self.node.role = value.parse()?,
                "STATS_NODE_ADDRESS" => self.node.address = Some(value),
                "STATS_GATEWAY_ADDRESS" => self.node.gateway_address = Some(value),
                "STATS_HOST_NAME" => self.node.host_name = Some(value),
                "STATS_METRICS_INTERVAL_SECS" => {
                    self.schedule.metrics_interval_secs =
                        parse_env("schedule.metrics_interval_secs", &value)?
                }
                "STATS_STATS_INTERVAL_SECS" => {
                    self.schedule.stats_interval_secs =
                        parse_env("schedule.stats_interval_secs", &value)?
                }
                "STATS_LOG_FILTER" => self.logging.filter = value,
                "STATS_LOG_JSON" => self.logging.json = parse_env("logging.json", &value)?,
                _ => {}
            }
        }
        Ok(())
    }

    pub fn index_settings(&self) -> Result<IndexSettings, ConfigError> {
        let settings = IndexSettings {
            index: self.elastic.index.trim().to_string(),
            metrics_type: self.elastic.metrics_type.trim().to_string(),
            stats_type: self.elastic.stats_type.trim().to_string(),
            batch_size: BatchSize::try_from(self.elastic.max_bulk_docs)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn transport(&self) -> Result<HttpTransport, ConfigError> {
        let mut transport = HttpTransport::new(&self.elastic.host_address)?;
        if let Some(secs) = self.elastic.request_timeout_secs {
            if secs == 0 {
                return Err(ConfigError::invalid("elastic.request_timeout_secs", "must be greater than zero"));
            }
            transport = transport.with_timeout(Duration::from_secs(secs));
        }
        if let Some(username) = &self.elastic.username {
            transport = transport.with_basic_auth(username.clone(), self.elastic.password.clone());
        }
        Ok(transport)
    }

    pub fn schedule(&self) -> Result<PublishSchedule, ConfigError> {
        PublishSchedule::new(
            self.schedule.metrics_interval_secs,
            self.schedule.stats_interval_secs,
        )
    }

    /// Node identity, filling host name and address from discovery when unset
    pub fn context(&self, host: &HostInfo) -> Result<PublisherContext, ConfigError> {
        let host_name = self
            .node
            .host_name
            .clone()
            .unwrap_or_else(|| host.host_name.clone());
        let mut builder = PublisherContext::builder()
            .deployment_id(self.node.deployment_id.clone())
            .role(self.node.role)
            .node_name(self.node.name.clone().unwrap_or_else(|| host_name.clone()))
            .host_name(host_name)
            .address(
                self.node
                    .address
                    .clone()
                    .or_else(|| host.address.map(|ip| ip.to_string()))
                    .unwrap_or_default(),
            )
            .gateway_address(self.node.gateway_address.clone().unwrap_or_default());
        if let Some(id) = &self.node.id {
            builder = builder.node_id(id.clone());
        }
        builder.build()
    }

    /// Check every section at once, so startup fails before any publish
    pub fn validate(&self, host: &HostInfo) -> Result<(), ConfigError> {
        self.transport()?;
        self.index_settings()?;
        self.schedule()?;
        self.context(host)?;
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(field, e.to_string()))
}
