//! Authenticated HTTP client for the gallery API.
//!
//! Listing calls carry the secret in an `Authorization: Basic` header. Image
//! URLs carry it in the `auth` query parameter instead, so the URL alone is
//! enough to load the bytes from places that cannot set headers.

use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::header::HeaderName;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

use super::credentials::{CredentialStore, Credentials};
use crate::auth::{encode_token, QUERY_PARAM, USERNAME};
use crate::config::ClientConfig;
use crate::error::{ClientError, StoreError};
use crate::models::{FolderList, FolderPage};

/// Tunnel hosts that interpose a browser warning page.
const TUNNEL_HOSTS: [(&str, &str); 2] = [
    ("ngrok", "ngrok-skip-browser-warning"),
    ("loca.lt", "bypass-tunnel-reminder"),
];

#[derive(Clone)]
pub struct TransportClient {
    http: Client,
    store: Arc<Mutex<CredentialStore>>,
}

impl TransportClient {
    pub fn new(store: CredentialStore, config: &ClientConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ClientError::Connectivity)?;
        Ok(Self {
            http,
            store: Arc::new(Mutex::new(store)),
        })
    }

    /// Snapshot of the current credentials.
    pub fn credentials(&self) -> Credentials {
        self.store.lock().credentials().clone()
    }

    pub fn is_configured(&self) -> bool {
        self.store.lock().is_configured()
    }

    /// Replaces and persists the credentials used by later requests.
    pub fn update_credentials(&self, credentials: &Credentials) -> Result<(), StoreError> {
        self.store.lock().update(credentials)
    }

    pub async fn list_folders(&self) -> Result<Vec<String>, ClientError> {
        let creds = self.configured()?;
        self.warm_up_tunnel(&creds).await;
        let url = endpoint_url(&creds, &["api", "folders"])?;
        let list: FolderList = self.get_json(url, &creds).await?;
        Ok(list.folders)
    }

    pub async fn list_images(
        &self,
        folder: &str,
        page: u32,
        page_size: u32,
    ) -> Result<FolderPage, ClientError> {
        let creds = self.configured()?;
        let mut url = endpoint_url(&creds, &["api", "folders", folder])?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("pageSize", &page_size.to_string());
        self.get_json(url, &creds).await
    }

    /// Self-authenticating URL of one image.
    pub fn image_url(&self, folder: &str, image: &str) -> Result<String, ClientError> {
        let creds = self.configured()?;
        image_url(&creds, folder, image)
    }

    /// Downloads the bytes behind a URL produced by [`Self::image_url`].
    pub async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ClientError> {
        let url = Url::parse(url).map_err(|e| ClientError::InvalidEndpoint(e.to_string()))?;
        let request = with_tunnel_header(self.http.get(url.clone()), &url);
        let response = request.send().await.map_err(ClientError::Connectivity)?;
        let response = check_status(response)?;
        // A body cut short by the connection is a reachability problem.
        let bytes = response.bytes().await.map_err(ClientError::Connectivity)?;
        trace!(len = bytes.len(), "Fetched image bytes");
        Ok(bytes.to_vec())
    }

    /// True if the folder listing succeeds with the current credentials.
    pub async fn test_connection(&self) -> bool {
        match self.list_folders().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Connection test failed");
                false
            }
        }
    }

    fn configured(&self) -> Result<Credentials, ClientError> {
        let creds = self.credentials();
        if creds.is_configured() {
            Ok(creds)
        } else {
            Err(ClientError::NotConfigured)
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        creds: &Credentials,
    ) -> Result<T, ClientError> {
        debug!(path = url.path(), "GET");
        let request = self
            .http
            .get(url.clone())
            .basic_auth(USERNAME, Some(&creds.secret));
        let response = with_tunnel_header(request, &url)
            .send()
            .await
            .map_err(ClientError::Connectivity)?;
        let response = check_status(response)?;
        let body = response.bytes().await.map_err(ClientError::Connectivity)?;
        serde_json::from_slice(&body).map_err(ClientError::Decode)
    }

    /// Best-effort request to the endpoint root so a tunnel's interstitial is
    /// acknowledged before the real call. Failures are ignored.
    async fn warm_up_tunnel(&self, creds: &Credentials) {
        let Ok(url) = Url::parse(creds.base_url()) else {
            return;
        };
        if tunnel_header(&url).is_none() {
            return;
        }
        let request = with_tunnel_header(self.http.get(url.clone()), &url);
        match request.send().await {
            Ok(response) => debug!(status = %response.status(), "Tunnel warm-up"),
            Err(e) => debug!(error = %e, "Tunnel warm-up failed"),
        }
    }
}

/// Builds `{endpoint}/{segments...}` with each segment percent-encoded.
fn endpoint_url(creds: &Credentials, segments: &[&str]) -> Result<Url, ClientError> {
    let mut url = Url::parse(creds.base_url())
        .map_err(|e| ClientError::InvalidEndpoint(format!("{}: {}", creds.endpoint, e)))?;
    url.path_segments_mut()
        .map_err(|_| ClientError::InvalidEndpoint(creds.endpoint.clone()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// `{endpoint}/api/images/{folder}/{image}?auth={token}`.
pub fn image_url(creds: &Credentials, folder: &str, image: &str) -> Result<String, ClientError> {
    let mut url = endpoint_url(creds, &["api", "images", folder, image])?;
    url.query_pairs_mut()
        .append_pair(QUERY_PARAM, &encode_token(USERNAME, &creds.secret));
    Ok(url.into())
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        debug!(%status, "Request failed");
        Err(ClientError::Status { status })
    }
}

fn tunnel_header(url: &Url) -> Option<&'static str> {
    let host = url.host_str()?;
    TUNNEL_HOSTS
        .iter()
        .find(|(marker, _)| host.contains(marker))
        .map(|(_, header)| *header)
}

fn with_tunnel_header(request: RequestBuilder, url: &Url) -> RequestBuilder {
    match tunnel_header(url) {
        Some(name) => request.header(HeaderName::from_static(name), "true"),
        None => request,
    }
}
