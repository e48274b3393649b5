use figment2::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::update_check::MonitoredService;

pub type ServiceName = String;
pub type ContainerName = String;
pub type ImageReference = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(#[from] Box<figment2::Error>),
    #[error("config file {} does not exist", .0.display())]
    Missing(PathBuf),
    #[error("no services configured")]
    Empty,
    #[error("duplicate service name `{0}`")]
    DuplicateService(String),
    #[error("container `{0}` is assigned to more than one service")]
    DuplicateContainer(String),
}

/// One row of the stack table: compose service, its reserved container name and,
/// if it is pulled from a registry, the reference to check for updates.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ServiceEntry {
    pub name: ServiceName,
    pub container: ContainerName,
    #[serde(default)]
    pub image: Option<ImageReference>,
}

impl ServiceEntry {
    pub fn new(name: &str, container: &str, image: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            container: container.to_string(),
            image: image.map(str::to_string),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct StackConfig {
    pub project_dir: PathBuf,
    pub compose_file: PathBuf,
    #[serde(default)]
    pub project_name: Option<String>,
    pub timeout_secs: u64,
    pub services: Vec<ServiceEntry>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("/opt/n8n"),
            compose_file: PathBuf::from("docker-compose.yml"),
            project_name: None,
            timeout_secs: 60,
            services: vec![
                ServiceEntry::new("n8n", "n8n", Some("docker.n8n.io/n8nio/n8n:latest")),
                ServiceEntry::new("postgres", "n8n-postgres", Some("postgres:16-alpine")),
                ServiceEntry::new("redis", "n8n-redis", Some("redis:7-alpine")),
                ServiceEntry::new(
                    "docling",
                    "n8n-docling",
                    Some("quay.io/docling-project/docling-serve:latest"),
                ),
            ],
        }
    }
}

impl StackConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.services.is_empty() {
            return Err(ConfigError::Empty);
        }
        let mut names = HashSet::new();
        let mut containers = HashSet::new();
        for service in &self.services {
            if !names.insert(service.name.as_str()) {
                return Err(ConfigError::DuplicateService(service.name.clone()));
            }
            if !containers.insert(service.container.as_str()) {
                return Err(ConfigError::DuplicateContainer(service.container.clone()));
            }
        }
        Ok(())
    }

    pub fn container_for(&self, service: &str) -> Option<&str> {
        self.services
            .iter()
            .find(|s| s.name == service)
            .map(|s| s.container.as_str())
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }

    /// Services that have a remote image to compare against.
    pub fn monitored(&self) -> Vec<MonitoredService> {
        self.services
            .iter()
            .filter_map(|s| {
                s.image.as_ref().map(|image| MonitoredService {
                    name: s.name.clone(),
                    container: s.container.clone(),
                    image: image.clone(),
                })
            })
            .collect()
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn compose_path(&self) -> PathBuf {
        self.project_dir.join(&self.compose_file)
    }
}

/// Built-in defaults, overridden by the TOML file, overridden by
/// `STACKKEEPER_*` environment variables. Nested keys are separated by `__`.
/// A file that is named but missing is an error.
pub fn load_config(config_path: Option<&Path>) -> Result<StackConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(StackConfig::default()));
    if let Some(path) = config_path {
        if !path.is_file() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        figment = figment.merge(Toml::file(path));
    }
    let config: StackConfig = figment
        .merge(Env::prefixed("STACKKEEPER_").split("__"))
        .extract()
        .map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}
