//! Read-only reference data: canteens, their lines, and the meal legend.

use std::sync::Arc;

use crate::domain::catalog::{Canteen, LegendItem, Line};
use crate::domain::error::DomainError;

/// Source of canteen reference data and upstream-name matching.
pub trait ReferenceCatalog: Send + Sync {
    fn canteens(&self) -> &[Canteen];

    fn legend(&self) -> &[LegendItem];

    fn canteen(&self, id: &str) -> Option<&Canteen> {
        self.canteens().iter().find(|canteen| canteen.id == id)
    }

    /// Resolve a human-readable canteen name to its id, if it is known.
    fn match_canteen_by_name(&self, name: &str) -> Option<&str> {
        let canteens = self.canteens();
        canteens
            .iter()
            .find(|canteen| names_of(&canteen.name, &canteen.aliases).any(|n| n == name))
            .or_else(|| {
                let wanted = canonical_name(name);
                canteens.iter().find(|canteen| {
                    names_of(&canteen.name, &canteen.aliases).any(|n| canonical_name(n) == wanted)
                })
            })
            .map(|canteen| canteen.id.as_str())
    }

    /// Resolve a line name within one canteen to the line's id.
    fn match_line_by_name(&self, canteen_id: &str, name: &str) -> Option<&str> {
        let lines = &self.canteen(canteen_id)?.lines;
        lines
            .iter()
            .find(|line| names_of(&line.name, &line.aliases).any(|n| n == name))
            .or_else(|| {
                let wanted = canonical_name(name);
                lines.iter().find(|line| {
                    names_of(&line.name, &line.aliases).any(|n| canonical_name(n) == wanted)
                })
            })
            .map(|line| line.id.as_str())
    }
}

fn names_of<'a>(name: &'a str, aliases: &'a [String]) -> impl Iterator<Item = &'a str> {
    std::iter::once(name).chain(aliases.iter().map(String::as_str))
}

/// Trim, collapse internal whitespace and lowercase.
pub fn canonical_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Lookups backing the canteen and legend endpoints.
#[derive(Clone)]
pub struct CatalogService {
    catalog: Arc<dyn ReferenceCatalog>,
}

impl CatalogService {
    pub fn new(catalog: Arc<dyn ReferenceCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<dyn ReferenceCatalog> {
        &self.catalog
    }

    pub fn legend(&self) -> &[LegendItem] {
        self.catalog.legend()
    }

    pub fn canteens(&self) -> &[Canteen] {
        self.catalog.canteens()
    }

    pub fn canteen(&self, id: &str) -> Result<&Canteen, DomainError> {
        self.catalog
            .canteen(id)
            .ok_or_else(|| DomainError::not_found("canteen"))
    }

    pub fn lines(&self, canteen_id: &str) -> Result<&[Line], DomainError> {
        Ok(&self.canteen(canteen_id)?.lines)
    }

    pub fn line(&self, canteen_id: &str, line_id: &str) -> Result<&Line, DomainError> {
        self.canteen(canteen_id)?
            .line(line_id)
            .ok_or_else(|| DomainError::not_found("line"))
    }

    /// Whether `id` names a known canteen.
    pub fn is_known_canteen(&self, id: &str) -> bool {
        self.catalog.canteen(id).is_some()
    }
}
