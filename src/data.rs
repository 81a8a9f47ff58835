use crate::config::{AppConfig, ColumnConfig};
use crate::types::{Borough, Health, Steward, TreeRecord};
use anyhow::{Context, Result, anyhow};
use csv::ReaderBuilder;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// All surveyed trees, loaded once and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<TreeRecord>,
    species: Vec<String>,
}

impl Dataset {
    pub fn new(records: Vec<TreeRecord>) -> Self {
        let mut seen = HashSet::new();
        let species = records
            .iter()
            .filter_map(|r| r.species.as_deref())
            .filter(|s| seen.insert(*s))
            .map(str::to_string)
            .collect();
        Self { records, species }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TreeRecord] {
        &self.records
    }

    /// Distinct species in first-seen order.
    pub fn species(&self) -> &[String] {
        &self.species
    }

    pub fn contains_species(&self, species: &str) -> bool {
        self.species.iter().any(|s| s == species)
    }

    pub fn filter_species<'a>(&'a self, species: &'a str) -> impl Iterator<Item = &'a TreeRecord> + 'a {
        self.records.iter().filter(move |r| r.is_species(species))
    }

    pub fn filter_borough_species<'a>(
        &'a self,
        borough: Borough,
        species: &'a str,
    ) -> impl Iterator<Item = &'a TreeRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| r.borough == borough && r.is_species(species))
    }
}

pub fn load_dataset(config: &AppConfig) -> Result<Dataset> {
    let paths = config.input.partition_paths();
    info!(partitions = paths.len(), dir = ?config.input.data_dir, "Loading tree census");

    let mut records = Vec::new();
    for path in &paths {
        let before = records.len();
        load_partition(path, &config.input.columns, &mut records)?;
        debug!(path = ?path, rows = records.len() - before, "Loaded partition");
    }

    let dataset = Dataset::new(records);
    info!(
        rows = dataset.len(),
        species = dataset.species().len(),
        "Dataset ready"
    );
    Ok(dataset)
}

fn load_partition(path: &Path, columns: &ColumnConfig, out: &mut Vec<TreeRecord>) -> Result<()> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path))?;
    read_records(file, columns, out)
        .with_context(|| format!("Failed to read CSV file: {:?}", path))
}

/// Parse one partition. Blank cells become missing values; borough is required.
pub fn read_records<R: Read>(reader: R, columns: &ColumnConfig, out: &mut Vec<TreeRecord>) -> Result<()> {
    let mut rdr = ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();

    let position = |name: &str| {
        headers.iter().position(|h| h == name)
            .ok_or_else(|| anyhow!("Column '{}' not found in CSV", name))
    };
    let species_idx = position(&columns.species)?;
    let borough_idx = position(&columns.borough)?;
    let health_idx = position(&columns.health)?;
    let steward_idx = position(&columns.steward)?;

    for result in rdr.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let cell = |idx: usize| record.get(idx).map(str::trim).filter(|s| !s.is_empty());

        let borough = cell(borough_idx)
            .ok_or_else(|| anyhow!("Missing borough on line {}", line))?
            .parse::<Borough>()
            .with_context(|| format!("Invalid record on line {}", line))?;
        let health = cell(health_idx)
            .map(str::parse::<Health>)
            .transpose()
            .with_context(|| format!("Invalid record on line {}", line))?;
        let steward = cell(steward_idx)
            .map(str::parse::<Steward>)
            .transpose()
            .with_context(|| format!("Invalid record on line {}", line))?;

        out.push(TreeRecord {
            species: cell(species_idx).map(str::to_string),
            borough,
            health,
            steward,
        });
    }

    Ok(())
}
