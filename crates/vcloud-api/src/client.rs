// Async HTTP client for one surface of the control plane.
//
// Base paths:
//   /cloudapi/  OpenAPI, JSON, `Accept: application/json;version=N`
//   /api/       legacy, XML, `Accept: application/*+xml;version=N`
//   /network/   network manager proxy, XML
// Auth: `Authorization: Bearer <token>`, obtained elsewhere.

use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::envelope::{ContentShape, Envelope, ReferenceList, decode_reference_list};
use crate::error::Error;
use crate::normalize::ProtocolTag;
use crate::pagination::{self, DEFAULT_PAGE_SIZE, WalkOptions, WalkOutcome};
use crate::response::RawResponse;
use crate::transport::TransportConfig;
use crate::version::{Snapshot, Version, Versioned, prepare_create, prepare_update};

/// API version sent in `Accept` when the caller does not pick one.
pub const DEFAULT_API_VERSION: &str = "38.0";

// ── Surface ──────────────────────────────────────────────────────────

/// Which of the three HTTP surfaces a client talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    #[default]
    OpenApi,
    Legacy,
    #[serde(rename = "nsx")]
    NsxProxy,
}

impl Surface {
    fn base_path(self) -> &'static str {
        match self {
            Self::OpenApi => "cloudapi",
            Self::Legacy => "api",
            Self::NsxProxy => "network",
        }
    }

    /// Protocol of this surface's error bodies.
    pub fn protocol(self) -> ProtocolTag {
        match self {
            Self::OpenApi => ProtocolTag::OpenApi,
            Self::Legacy => ProtocolTag::LegacyXml,
            Self::NsxProxy => ProtocolTag::NsxProxy,
        }
    }

    pub fn shape(self) -> ContentShape {
        self.protocol().native_shape()
    }

    fn accept(self, api_version: &str) -> String {
        match self {
            Self::OpenApi => format!("application/json;version={api_version}"),
            Self::Legacy => format!("application/*+xml;version={api_version}"),
            Self::NsxProxy => "application/xml".to_owned(),
        }
    }
}

// ── Config ───────────────────────────────────────────────────────────

/// Everything needed to build an [`ApiClient`].
#[derive(Debug)]
pub struct ClientConfig {
    /// Site root, e.g. `https://vcd.example.com`.
    pub endpoint: Url,
    pub surface: Surface,
    pub api_version: String,
    pub page_size: u64,
    pub transport: TransportConfig,
    pub token: Option<SecretString>,
}

impl ClientConfig {
    pub fn new(endpoint: Url, surface: Surface) -> Self {
        Self {
            endpoint,
            surface,
            api_version: DEFAULT_API_VERSION.to_owned(),
            page_size: DEFAULT_PAGE_SIZE,
            transport: TransportConfig::default(),
            token: None,
        }
    }
}

// ── Client ───────────────────────────────────────────────────────────

/// Async client for one API surface.
///
/// Every failure comes back as an [`Error`] carrying the normalized server
/// error, and every mutation goes through the version-stamp checks.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    surface: Surface,
    accept: HeaderValue,
    bearer: Option<HeaderValue>,
    page_size: u64,
}

impl ApiClient {
    // ── Constructors ─────────────────────────────────────────────────

    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        let http = config.transport.build_client()?;
        let mut client = Self::from_reqwest(
            config.endpoint.as_str(),
            http,
            config.surface,
            &config.api_version,
        )?;
        client.page_size = config.page_size;
        if let Some(ref token) = config.token {
            client = client.with_bearer_token(token)?;
        }
        Ok(client)
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn from_reqwest(
        base_url: &str,
        http: reqwest::Client,
        surface: Surface,
        api_version: &str,
    ) -> Result<Self, Error> {
        let accept = HeaderValue::from_str(&surface.accept(api_version))
            .map_err(|e| Error::InvalidApiVersion(format!("{api_version:?}: {e}")))?;
        Ok(Self {
            http,
            base_url: Self::normalize_base_url(base_url, surface)?,
            surface,
            accept,
            bearer: None,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Send `Authorization: Bearer <token>` on every request.
    pub fn with_bearer_token(mut self, token: &SecretString) -> Result<Self, Error> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|e| Error::InvalidToken(e.to_string()))?;
        value.set_sensitive(true);
        self.bearer = Some(value);
        Ok(self)
    }

    /// Append the surface's base path unless `raw` already ends with it.
    fn normalize_base_url(raw: &str, surface: Surface) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();
        let base = surface.base_path();

        if path.ends_with(&format!("/{base}")) {
            url.set_path(&format!("{path}/"));
        } else {
            url.set_path(&format!("{path}/{base}/"));
        }
        Ok(url)
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    // ── Request plumbing ─────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header(ACCEPT, self.accept.clone());
        match self.bearer {
            Some(ref bearer) => builder.header(AUTHORIZATION, bearer.clone()),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<RawResponse, Error> {
        let resp = builder.send().await?;
        RawResponse::from_reqwest(resp, self.surface.protocol())
            .await?
            .into_success()
    }

    fn encode_body<B: Serialize>(&self, body: &B) -> Result<(&'static str, Vec<u8>), Error> {
        let serialization = |e: &dyn std::fmt::Display| Error::Serialization {
            message: e.to_string(),
        };
        match self.surface.shape() {
            ContentShape::Json => serde_json::to_vec(body)
                .map(|bytes| ("application/json", bytes))
                .map_err(|e| serialization(&e)),
            ContentShape::Xml => quick_xml::se::to_string(body)
                .map(|text| ("application/xml", text.into_bytes()))
                .map_err(|e| serialization(&e)),
        }
    }

    async fn send_body<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<RawResponse, Error> {
        let url = self.url(path)?;
        debug!("{method} {url}");

        let (content_type, bytes) = self.encode_body(body)?;
        let builder = self
            .request(method, url)
            .header(CONTENT_TYPE, content_type)
            .body(bytes);
        self.send(builder).await
    }

    // ── Collections ──────────────────────────────────────────────────

    /// Fetch one page of a collection, elements still undecoded.
    pub async fn get_envelope(
        &self,
        path: &str,
        query: &[(&str, String)],
        page: u64,
        page_size: u64,
    ) -> Result<Envelope, Error> {
        let url = self.url(path)?;
        debug!("GET {url} page={page} pageSize={page_size} params={query:?}");

        let builder = self
            .request(Method::GET, url)
            .query(query)
            .query(&[("page", page), ("pageSize", page_size)]);
        self.send(builder).await?.envelope()
    }

    /// Walk every page of a collection and decode its elements as `T`.
    pub async fn walk<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        options: &WalkOptions,
    ) -> Result<WalkOutcome<T>, Error> {
        pagination::walk(options, move |page, page_size| {
            self.get_envelope(path, query, page, page_size)
        })
        .await
    }

    /// Walk with this client's page size and default options, returning
    /// the elements only.
    pub async fn list_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, Error> {
        let options = WalkOptions {
            page_size: self.page_size,
            ..WalkOptions::default()
        };
        Ok(self.walk(path, &[], &options).await?.elements)
    }

    /// Fetch one page of an `{id, name}` reference list.
    pub async fn get_references(
        &self,
        path: &str,
        page: u64,
        page_size: u64,
    ) -> Result<ReferenceList, Error> {
        let url = self.url(path)?;
        debug!("GET {url} page={page} pageSize={page_size}");

        let builder = self
            .request(Method::GET, url)
            .query(&[("page", page), ("pageSize", page_size)]);
        let resp = self.send(builder).await?;
        decode_reference_list(&resp.body)
    }

    // ── Singletons ───────────────────────────────────────────────────

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url}");

        let resp = self.send(self.request(Method::GET, url)).await?;
        resp.decode()
    }

    /// Read a resource together with the version it is at.
    pub async fn read<T: DeserializeOwned + Versioned>(&self, path: &str) -> Result<Snapshot<T>, Error> {
        let snapshot = Snapshot::new(self.get::<T>(path).await?);
        debug!(path, version = ?snapshot.version(), "read resource");
        Ok(snapshot)
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Create a resource. Fails with [`Error::VersionOnCreate`] before any
    /// request is sent if `resource` carries a version stamp.
    pub async fn create<T, R>(&self, path: &str, resource: &T) -> Result<R, Error>
    where
        T: Serialize + Versioned,
        R: DeserializeOwned,
    {
        prepare_create(resource)?;
        self.send_body(Method::POST, path, resource).await?.decode()
    }

    /// Replace a resource, submitting the version it was read at.
    ///
    /// A stale `version` comes back as [`Error::VersionConflict`]; re-read
    /// and retry.
    pub async fn update<T, R>(&self, path: &str, mut resource: T, version: Option<Version>) -> Result<R, Error>
    where
        T: Serialize + Versioned,
        R: DeserializeOwned,
    {
        prepare_update(&mut resource, version)?;
        self.send_body(Method::PUT, path, &resource)
            .await
            .map_err(Error::into_update_conflict)?
            .decode()
    }

    pub async fn delete(&self, path: &str) -> Result<(), Error> {
        let url = self.url(path)?;
        debug!("DELETE {url}");

        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}
