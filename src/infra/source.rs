//! HTTP client for the upstream plan services.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use reqwest::{Client, Response, Url};
use tracing::{debug, warn};

use crate::application::source::{FetchRequest, PlanSource, SourceError, SourceKind};
use crate::config::FetchSettings;
use crate::domain::date::DateKey;
use crate::domain::plans::PlanRecord;

use super::error::InfraError;

/// Per-date requests kept in flight at once for date-addressed sources.
const CONCURRENT_DATE_REQUESTS: usize = 4;

#[derive(Debug, Clone)]
enum Endpoint {
    SimpleSite {
        base: Url,
    },
    JsonApi {
        url: Url,
        user: String,
        password: String,
    },
}

#[derive(Debug, Clone)]
pub struct RemotePlanSource {
    client: Client,
    endpoint: Endpoint,
}

impl RemotePlanSource {
    pub fn user_agent() -> &'static str {
        concat!("mensa/", env!("CARGO_PKG_VERSION"))
    }

    /// Build the source selected by `settings`, or `None` when the selected
    /// source has no upstream URL configured.
    pub fn from_settings(settings: &FetchSettings) -> Result<Option<Self>, InfraError> {
        let endpoint = match settings.source {
            SourceKind::SimpleSite => match &settings.simplesite.base_url {
                Some(base) => Endpoint::SimpleSite { base: base.clone() },
                None => return Ok(None),
            },
            SourceKind::JsonApi => {
                let jsonapi = &settings.jsonapi;
                let Some(url) = jsonapi.base_url.clone() else {
                    return Ok(None);
                };
                let (Some(user), Some(password)) = (&jsonapi.user, &jsonapi.password) else {
                    return Err(InfraError::configuration(
                        "fetch.jsonapi.user and fetch.jsonapi.password are required for the jsonapi source",
                    ));
                };
                Endpoint::JsonApi {
                    url,
                    user: user.clone(),
                    password: password.clone(),
                }
            }
        };

        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| {
                InfraError::configuration(format!("failed to build http client: {err}"))
            })?;

        Ok(Some(Self { client, endpoint }))
    }

    async fn fetch_date(&self, base: &Url, date: DateKey) -> Result<Vec<PlanRecord>, SourceError> {
        let url = format!("{}/{date}", base.as_str().trim_end_matches('/'));
        debug!(target = "mensa::source", %url, "Requesting plans for date");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| transport(&url, err))?;
        decode(&url, response).await
    }

    async fn fetch_current(
        &self,
        url: &Url,
        user: &str,
        password: &str,
    ) -> Result<Vec<PlanRecord>, SourceError> {
        let url_str = url.as_str().to_string();
        debug!(target = "mensa::source", url = %url_str, "Requesting current plans");
        let response = self
            .client
            .get(url.clone())
            .basic_auth(user, Some(password))
            .send()
            .await
            .map_err(|err| transport(&url_str, err))?;
        decode(&url_str, response).await
    }
}

#[async_trait]
impl PlanSource for RemotePlanSource {
    fn kind(&self) -> SourceKind {
        match self.endpoint {
            Endpoint::SimpleSite { .. } => SourceKind::SimpleSite,
            Endpoint::JsonApi { .. } => SourceKind::JsonApi,
        }
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<PlanRecord>, SourceError> {
        match (&self.endpoint, request) {
            (Endpoint::SimpleSite { base }, FetchRequest::Dates(dates)) => {
                let per_date: Vec<Vec<PlanRecord>> = stream::iter(dates.iter().copied())
                    .map(|date| self.fetch_date(base, date))
                    .buffered(CONCURRENT_DATE_REQUESTS)
                    .try_collect()
                    .await?;
                Ok(per_date.into_iter().flatten().collect())
            }
            (Endpoint::SimpleSite { .. }, FetchRequest::Current) => {
                Err(SourceError::Unsupported {
                    kind: SourceKind::SimpleSite,
                    request: "current",
                })
            }
            (
                Endpoint::JsonApi {
                    url,
                    user,
                    password,
                },
                request,
            ) => {
                let mut plans = self.fetch_current(url, user, password).await?;
                if let FetchRequest::Dates(dates) = request {
                    plans.retain(|plan| dates.contains(&plan.date));
                }
                Ok(plans)
            }
        }
    }
}

fn transport(url: &str, err: reqwest::Error) -> SourceError {
    SourceError::Transport {
        url: url.to_string(),
        source: Box::new(err),
    }
}

async fn decode(url: &str, response: Response) -> Result<Vec<PlanRecord>, SourceError> {
    let status = response.status();
    if !status.is_success() {
        warn!(
            target = "mensa::source",
            url,
            status = status.as_u16(),
            "Upstream responded with an error status"
        );
        return Err(SourceError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let bytes = response.bytes().await.map_err(|err| transport(url, err))?;
    serde_json::from_slice(&bytes).map_err(|err| SourceError::Decode {
        url: url.to_string(),
        source: Box::new(err),
    })
}
