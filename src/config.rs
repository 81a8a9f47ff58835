use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};
use crate::types::{Borough, ParseError};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub data_dir: PathBuf,
    #[serde(default = "default_partition_pattern")]
    pub partition_pattern: String, // `{}` is replaced by the partition number
    #[serde(default = "default_partitions")]
    pub partitions: u32,
    #[serde(default)]
    pub columns: ColumnConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ColumnConfig {
    pub species: String,
    pub borough: String,
    pub health: String,
    pub steward: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            species: "spc_common".to_string(),
            borough: "borough".to_string(),
            health: "health".to_string(),
            steward: "steward".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub default_species: String,
    pub default_borough: String,
}

impl DashboardConfig {
    pub fn borough(&self) -> std::result::Result<Borough, ParseError> {
        self.default_borough.parse()
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            default_species: "pin oak".to_string(),
            default_borough: "Brooklyn".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub chart_dir: PathBuf,
    #[serde(default = "default_cell_px")]
    pub heatmap_cell_px: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

fn default_partition_pattern() -> String {
    "tree{}.csv".to_string()
}

fn default_partitions() -> u32 {
    12
}

fn default_cell_px() -> u32 {
    64
}

impl InputConfig {
    /// Paths of all partitions, in load order.
    pub fn partition_paths(&self) -> Vec<PathBuf> {
        (1..=self.partitions)
            .map(|i| self.data_dir.join(self.partition_pattern.replace("{}", &i.to_string())))
            .collect()
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.dashboard.borough()
            .context("Invalid dashboard.default_borough")?;
        Ok(config)
    }
}
