//! Plan records as fetched from upstream and stored in the cache.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::date::DateKey;

/// One canteen's plan for one date.
///
/// `id` is `None` when the upstream source could not resolve a stable
/// identifier for `name` at fetch time. Fields this type does not model are
/// kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub date: DateKey,
    #[serde(default)]
    pub lines: Vec<LineRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One serving line of a canteen plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    /// Meal entries, copied through without interpretation.
    #[serde(default)]
    pub meals: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlanRecord {
    pub fn new(date: DateKey, name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            date,
            lines: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_lines(mut self, lines: Vec<LineRecord>) -> Self {
        self.lines = lines;
        self
    }
}

impl LineRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            meals: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_meals(mut self, meals: Vec<Value>) -> Self {
        self.meals = meals;
        self
    }
}
