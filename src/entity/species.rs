// src/entity/species.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeciesCategory {
    #[default]
    Nativa,
    Exotica,
    Frutales,
}

impl std::fmt::Display for SpeciesCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeciesCategory::Nativa => write!(f, "Nativa"),
            SpeciesCategory::Exotica => write!(f, "Exótica"),
            SpeciesCategory::Frutales => write!(f, "Frutales"),
        }
    }
}

impl std::str::FromStr for SpeciesCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nativa" => Ok(SpeciesCategory::Nativa),
            "exótica" | "exotica" => Ok(SpeciesCategory::Exotica),
            "frutales" => Ok(SpeciesCategory::Frutales),
            _ => Err(format!("Invalid species category: {}", s)),
        }
    }
}

/// Catalog entry for a tree species. Reference data: created by seeding,
/// looked up by common name, never modified by the permit workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Species {
    #[serde(default)]
    pub id: i64,
    pub common_name: String,
    pub scientific_name: String,
    pub family: Option<String>,
    pub crown_shape: Option<String>,
    pub avg_age_years: Option<u32>,
    pub avg_height_m: Option<f64>,
    pub avg_dbh_cm: Option<f64>,
    pub avg_crown_m: Option<f64>,
    pub category: SpeciesCategory,
    pub compensation_coefficient: f64,
    pub native: bool,
    pub description: Option<String>,
}

impl Species {
    pub fn new(common_name: &str, scientific_name: &str) -> Self {
        Self {
            id: 0,
            common_name: common_name.to_string(),
            scientific_name: scientific_name.to_string(),
            family: None,
            crown_shape: None,
            avg_age_years: None,
            avg_height_m: None,
            avg_dbh_cm: None,
            avg_crown_m: None,
            category: SpeciesCategory::default(),
            compensation_coefficient: 1.0,
            native: false,
            description: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_roundtrip() {
        for s in ["Nativa", "Exótica", "Frutales"] {
            let cat: SpeciesCategory = s.parse().unwrap();
            assert_eq!(cat.to_string(), s);
        }
    }

    #[test]
    fn test_category_accepts_ascii_form() {
        let cat: SpeciesCategory = "exotica".parse().unwrap();
        assert_eq!(cat, SpeciesCategory::Exotica);
    }

    #[test]
    fn test_default_coefficient_is_one() {
        let s = Species::new("Roble", "Quercus humboldtii");
        assert_eq!(s.compensation_coefficient, 1.0);
    }
}
