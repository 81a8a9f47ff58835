use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A category string that is not one of the fixed values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown borough '{0}'")]
    Borough(String),
    #[error("unknown health condition '{0}'")]
    Health(String),
    #[error("unknown steward category '{0}'")]
    Steward(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Borough {
    Brooklyn,
    Bronx,
    Manhattan,
    Queens,
    #[serde(rename = "Staten Island")]
    StatenIsland,
}

impl Borough {
    /// Display order for the bar chart and the borough selector.
    pub const ALL: [Borough; 5] = [
        Borough::Brooklyn,
        Borough::Bronx,
        Borough::Manhattan,
        Borough::Queens,
        Borough::StatenIsland,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Borough::Brooklyn => "Brooklyn",
            Borough::Bronx => "Bronx",
            Borough::Manhattan => "Manhattan",
            Borough::Queens => "Queens",
            Borough::StatenIsland => "Staten Island",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Borough {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Borough {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Borough::ALL
            .into_iter()
            .find(|b| b.label() == s.trim())
            .ok_or_else(|| ParseError::Borough(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Health {
    Good,
    Fair,
    Poor,
}

impl Health {
    /// Condition order for bar groups and heatmap rows.
    pub const ALL: [Health; 3] = [Health::Good, Health::Fair, Health::Poor];

    pub fn label(self) -> &'static str {
        match self {
            Health::Good => "Good",
            Health::Fair => "Fair",
            Health::Poor => "Poor",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Health {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Health::ALL
            .into_iter()
            .find(|h| h.label() == s.trim())
            .ok_or_else(|| ParseError::Health(s.to_string()))
    }
}

/// Number of people observed caring for a tree. `None` means nobody was
/// observed, which is different from the value being absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Steward {
    #[serde(rename = "None")]
    NoSteward,
    #[serde(rename = "1or2")]
    OneOrTwo,
    #[serde(rename = "3or4")]
    ThreeOrFour,
    #[serde(rename = "4orMore")]
    FourOrMore,
}

impl Steward {
    /// Heatmap column order, most cared-for first.
    pub const HEATMAP_ORDER: [Steward; 4] = [
        Steward::FourOrMore,
        Steward::ThreeOrFour,
        Steward::OneOrTwo,
        Steward::NoSteward,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Steward::NoSteward => "None",
            Steward::OneOrTwo => "1or2",
            Steward::ThreeOrFour => "3or4",
            Steward::FourOrMore => "4orMore",
        }
    }

    /// Column of this category in `HEATMAP_ORDER`.
    pub fn heatmap_column(self) -> usize {
        match self {
            Steward::FourOrMore => 0,
            Steward::ThreeOrFour => 1,
            Steward::OneOrTwo => 2,
            Steward::NoSteward => 3,
        }
    }
}

impl fmt::Display for Steward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Steward {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Steward::HEATMAP_ORDER
            .into_iter()
            .find(|st| st.label() == s.trim())
            .ok_or_else(|| ParseError::Steward(s.to_string()))
    }
}

/// One surveyed street tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRecord {
    pub species: Option<String>,
    pub borough: Borough,
    pub health: Option<Health>,
    pub steward: Option<Steward>,
}

impl TreeRecord {
    pub fn new(species: &str, borough: Borough, health: Health, steward: Option<Steward>) -> Self {
        Self {
            species: Some(species.to_string()),
            borough,
            health: Some(health),
            steward,
        }
    }

    pub fn is_species(&self, species: &str) -> bool {
        self.species.as_deref() == Some(species)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProportionRow {
    pub borough: Borough,
    pub condition: Health,
    pub proportion: f64,
}

/// Bar chart input: one row per (borough, condition), boroughs outer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProportionTable {
    /// Size of the subset the proportions are relative to.
    pub total: usize,
    pub rows: Vec<ProportionRow>,
}

impl ProportionTable {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn get(&self, borough: Borough, condition: Health) -> f64 {
        self.rows[borough.index() * Health::ALL.len() + condition.index()].proportion
    }
}

/// Heatmap input: rows follow `Health::ALL`, columns `Steward::HEATMAP_ORDER`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatTable {
    pub total: usize,
    pub values: [[f64; 4]; 3],
}

impl HeatTable {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn get(&self, health: Health, steward: Steward) -> f64 {
        self.values[health.index()][steward.heatmap_column()]
    }

    pub fn max_value(&self) -> f64 {
        self.values
            .iter()
            .flatten()
            .copied()
            .fold(0.0, f64::max)
    }
}
