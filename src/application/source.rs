//! Interface to the upstream service that publishes canteen plans.

use std::error::Error as StdError;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::date::DateKey;
use crate::domain::plans::PlanRecord;

/// What to ask the upstream service for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    /// Plans for exactly these dates.
    Dates(Vec<DateKey>),
    /// Whatever the source currently publishes.
    Current,
}

/// Upstream flavours the fetch job knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// One HTML-derived document per date.
    #[default]
    SimpleSite,
    /// Authenticated JSON API serving all current plans at once.
    JsonApi,
}

impl SourceKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            SourceKind::SimpleSite => "simplesite",
            SourceKind::JsonApi => "jsonapi",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "simplesite" => Ok(SourceKind::SimpleSite),
            "jsonapi" => Ok(SourceKind::JsonApi),
            other => Err(format!(
                "unknown source `{other}`; expected `simplesite` or `jsonapi`"
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to `{url}` failed")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("`{url}` responded with status {status}")]
    Status { url: String, status: u16 },
    #[error("response from `{url}` is not a valid plan list")]
    Decode {
        url: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("{kind} source does not support {request} requests")]
    Unsupported {
        kind: SourceKind,
        request: &'static str,
    },
}

#[async_trait]
pub trait PlanSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<PlanRecord>, SourceError>;
}
