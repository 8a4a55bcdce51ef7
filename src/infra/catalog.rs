//! Reference catalog loaded from JSON, with bundled defaults.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::application::catalog::ReferenceCatalog;
use crate::config::CatalogSettings;
use crate::domain::catalog::{Canteen, LegendItem};

const BUNDLED_CANTEENS: &str = include_str!("../../data/canteens.json");
const BUNDLED_LEGEND: &str = include_str!("../../data/legend.json");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file `{path}`")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {what}")]
    Parse {
        what: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("duplicate {entity} id `{id}`")]
    Duplicate { entity: &'static str, id: String },
}

#[derive(Debug, Clone)]
pub struct StaticCatalog {
    canteens: Vec<Canteen>,
    legend: Vec<LegendItem>,
}

impl StaticCatalog {
    /// The catalog shipped with the binary.
    pub fn bundled() -> Result<Self, CatalogError> {
        Self::from_json(BUNDLED_CANTEENS, BUNDLED_LEGEND)
    }

    /// Load the catalog, replacing bundled parts with configured files.
    pub fn load(settings: &CatalogSettings) -> Result<Self, CatalogError> {
        let canteens = match settings.canteens_file.as_deref() {
            Some(path) => read_file(path)?,
            None => BUNDLED_CANTEENS.to_string(),
        };
        let legend = match settings.legend_file.as_deref() {
            Some(path) => read_file(path)?,
            None => BUNDLED_LEGEND.to_string(),
        };
        let catalog = Self::from_json(&canteens, &legend)?;
        info!(
            target = "mensa::catalog",
            canteens = catalog.canteens.len(),
            legend_items = catalog.legend.len(),
            custom_canteens = settings.canteens_file.is_some(),
            custom_legend = settings.legend_file.is_some(),
            "Reference catalog loaded"
        );
        Ok(catalog)
    }

    pub fn from_json(canteens: &str, legend: &str) -> Result<Self, CatalogError> {
        let canteens: Vec<Canteen> =
            serde_json::from_str(canteens).map_err(|source| CatalogError::Parse {
                what: "canteens".to_string(),
                source,
            })?;
        let legend: Vec<LegendItem> =
            serde_json::from_str(legend).map_err(|source| CatalogError::Parse {
                what: "legend".to_string(),
                source,
            })?;
        Self::new(canteens, legend)
    }

    pub fn new(canteens: Vec<Canteen>, legend: Vec<LegendItem>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for canteen in &canteens {
            if !seen.insert(canteen.id.as_str()) {
                return Err(CatalogError::Duplicate {
                    entity: "canteen",
                    id: canteen.id.clone(),
                });
            }
            let mut lines = HashSet::new();
            for line in &canteen.lines {
                if !lines.insert(line.id.as_str()) {
                    return Err(CatalogError::Duplicate {
                        entity: "line",
                        id: format!("{}/{}", canteen.id, line.id),
                    });
                }
            }
        }
        Ok(Self { canteens, legend })
    }
}

impl ReferenceCatalog for StaticCatalog {
    fn canteens(&self) -> &[Canteen] {
        &self.canteens
    }

    fn legend(&self) -> &[LegendItem] {
        &self.legend
    }
}

fn read_file(path: &Path) -> Result<String, CatalogError> {
    std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })
}
