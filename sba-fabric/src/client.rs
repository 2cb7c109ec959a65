//! Outbound SBI plumbing: registry bootstrap, discovery and peer calls.
//!
//! Every NF owns one [`Sbi`] value. It wraps a `reqwest` client with the
//! request deadline of the fabric, keeps the bearer token obtained from the
//! registry, and caches the first address discovered per peer NF type.
//! Losing the registry does not tear down anything already cached; new flows
//! needing an un-cached address surface `backend-unavailable`.

use std::collections::HashMap;
use std::time::Duration;

use axum::http::StatusCode;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use crate::http::HttpError;
use crate::types::{NfProfile, NfType, SearchResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SbiError {
    #[error("peer is unreachable")]
    Unreachable(#[source] reqwest::Error),
    #[error("peer answered {status}")]
    Status { status: StatusCode },
    #[error("peer answered with an undecodable body")]
    Decode(#[source] reqwest::Error),
    #[error("no {0} instance is known to the registry")]
    NoPeer(NfType),
}

impl SbiError {
    /// Map a remote failure onto the local error taxonomy: transport
    /// problems become `backend-unavailable`, diagnostic remote statuses
    /// (4xx, resource exhaustion) pass through unchanged.
    #[track_caller]
    pub fn into_http(self) -> HttpError {
        match self {
            SbiError::Status { status }
                if status.is_client_error() || status == StatusCode::SERVICE_UNAVAILABLE =>
            {
                crate::http::HttpErrorBuilder::new(status).msg("rejected by peer NF")
            }
            SbiError::Status { .. } => HttpError::bad_gateway().msg("peer NF failed"),
            err @ (SbiError::Unreachable(_) | SbiError::Decode(_) | SbiError::NoPeer(_)) => {
                HttpError::bad_gateway().err()(err)
            }
        }
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct Sbi {
    http: reqwest::Client,
    nrf_url: String,
    requester: NfType,
    token: Mutex<Option<String>>,
    peers: Mutex<HashMap<NfType, String>>,
}

impl Sbi {
    pub fn new(nrf_url: impl Into<String>, requester: NfType) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client with static configuration");

        Sbi {
            http,
            nrf_url: nrf_url.into(),
            requester,
            token: Mutex::new(None),
            peers: Mutex::new(HashMap::new()),
        }
    }

    pub fn nrf_url(&self) -> &str {
        &self.nrf_url
    }

    /// Pre-populate the peer cache; used at boot and by tests.
    pub fn set_peer(&self, nf_type: NfType, base_url: impl Into<String>) {
        self.peers.lock().insert(nf_type, base_url.into());
    }

    pub fn cached_peer(&self, nf_type: NfType) -> Option<String> {
        self.peers.lock().get(&nf_type).cloned()
    }

    async fn acquire_token(&self) -> Result<String, SbiError> {
        let response = self
            .http
            .post(format!("{}/oauth2/token", self.nrf_url))
            .json(&TokenRequest {
                grant_type: "client_credentials",
                scope: None,
            })
            .send()
            .await
            .map_err(SbiError::Unreachable)?;

        if !response.status().is_success() {
            return Err(SbiError::Status {
                status: response.status(),
            });
        }

        let body: TokenResponse = response.json().await.map_err(SbiError::Decode)?;
        *self.token.lock() = Some(body.access_token.clone());

        Ok(body.access_token)
    }

    async fn bearer(&self) -> Result<String, SbiError> {
        let cached = self.token.lock().clone();
        match cached {
            Some(token) => Ok(token),
            None => self.acquire_token().await,
        }
    }

    /// `PUT /nnrf-nfm/v1/nf-instances/{id}`. Retries once with a fresh token
    /// when the cached one has expired.
    pub async fn register_profile(&self, profile: &NfProfile) -> Result<(), SbiError> {
        let url = format!("{}/nnrf-nfm/v1/nf-instances/{}", self.nrf_url, profile.nf_instance_id);

        let mut token = self.bearer().await?;

        for attempt in 0..2 {
            let response = self
                .http
                .put(&url)
                .bearer_auth(&token)
                .json(profile)
                .send()
                .await
                .map_err(SbiError::Unreachable)?;

            match response.status() {
                status if status.is_success() => return Ok(()),
                StatusCode::UNAUTHORIZED if attempt == 0 => {
                    token = self.acquire_token().await?;
                }
                status => return Err(SbiError::Status { status }),
            }
        }

        unreachable!("loop either returns or retries exactly once")
    }

    pub async fn deregister(&self, nf_instance_id: Uuid) -> Result<(), SbiError> {
        let url = format!("{}/nnrf-nfm/v1/nf-instances/{nf_instance_id}", self.nrf_url);
        let token = self.bearer().await?;

        let response = self
            .http
            .delete(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(SbiError::Unreachable)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SbiError::Status {
                status: response.status(),
            })
        }
    }

    /// Directed discovery; returns the first address of the best-ranked
    /// profile (the registry sorts by priority, then capacity).
    pub async fn discover(&self, target: NfType) -> Result<String, SbiError> {
        let mut token = self.bearer().await?;

        for attempt in 0..2 {
            let response = self
                .http
                .get(format!("{}/nnrf-disc/v1/nf-instances", self.nrf_url))
                .bearer_auth(&token)
                .query(&[
                    ("target-nf-type", target.as_str()),
                    ("requester-nf-type", self.requester.as_str()),
                ])
                .send()
                .await
                .map_err(SbiError::Unreachable)?;

            match response.status() {
                status if status.is_success() => {
                    let result: SearchResult = response.json().await.map_err(SbiError::Decode)?;
                    let endpoint = result
                        .nf_instances
                        .iter()
                        .find_map(NfProfile::first_endpoint)
                        .ok_or(SbiError::NoPeer(target))?;

                    self.peers.lock().insert(target, endpoint.clone());
                    return Ok(endpoint);
                }
                StatusCode::UNAUTHORIZED if attempt == 0 => {
                    token = self.acquire_token().await?;
                }
                status => return Err(SbiError::Status { status }),
            }
        }

        unreachable!("loop either returns or retries exactly once")
    }

    /// Cached peer address, falling back to a discovery round-trip.
    pub async fn peer(&self, target: NfType) -> Result<String, SbiError> {
        if let Some(cached) = self.cached_peer(target) {
            return Ok(cached);
        }

        self.discover(target).await
    }

    pub async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R, SbiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(SbiError::Unreachable)?;

        if !response.status().is_success() {
            return Err(SbiError::Status {
                status: response.status(),
            });
        }

        response.json().await.map_err(SbiError::Decode)
    }

    pub async fn put_json<B, R>(&self, url: &str, body: &B) -> Result<R, SbiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .put(url)
            .json(body)
            .send()
            .await
            .map_err(SbiError::Unreachable)?;

        if !response.status().is_success() {
            return Err(SbiError::Status {
                status: response.status(),
            });
        }

        response.json().await.map_err(SbiError::Decode)
    }

    pub async fn get_json<R>(&self, url: &str) -> Result<R, SbiError>
    where
        R: DeserializeOwned,
    {
        let response = self.http.get(url).send().await.map_err(SbiError::Unreachable)?;

        if !response.status().is_success() {
            return Err(SbiError::Status {
                status: response.status(),
            });
        }

        response.json().await.map_err(SbiError::Decode)
    }

    pub async fn delete(&self, url: &str) -> Result<(), SbiError> {
        let response = self.http.delete(url).send().await.map_err(SbiError::Unreachable)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SbiError::Status {
                status: response.status(),
            })
        }
    }

    /// Fire-and-forget GET used by heartbeat workers.
    pub async fn probe(&self, url: &str) -> Result<(), SbiError> {
        let response = self.http.get(url).send().await.map_err(SbiError::Unreachable)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SbiError::Status {
                status: response.status(),
            })
        }
    }
}
