//! REST terminus
//!
//! Forwards requests to a remote server speaking the v3 URL grammar:
//! `/{category}/v3/{indirection}/{key}?environment=...`. Searches use the
//! plural indirection name. Responses are decoded by their Content-Type.

use async_trait::async_trait;
use indirector_core::naming::{category_for, PluralizationRules};
use indirector_core::{
    Capabilities, Format, IndirectorError, Instance, Method, ModelSpec, Request, Result, Terminus,
};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Longest GET URL sent before switching to a POST with a form body
pub const MAX_URL_LENGTH: usize = 2048;

/// Terminus that talks to a remote server over HTTP
#[derive(Debug, Clone)]
pub struct RestTerminus {
    name: String,
    indirection: String,
    base_url: String,
    model: ModelSpec,
    client: Client,
    plural: String,
}

impl RestTerminus {
    /// Create a terminus for `indirection` against `base_url` (scheme, host and port)
    pub fn new(
        name: impl Into<String>,
        indirection: impl Into<String>,
        base_url: impl Into<String>,
        model: ModelSpec,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .map_err(|e| IndirectorError::terminus(format!("Could not build HTTP client: {}", e)))?;

        let indirection = indirection.into();
        let plural = PluralizationRules::default().pluralize(&indirection);
        Ok(Self {
            name: name.into(),
            indirection,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
            client,
            plural,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Formats offered in the Accept header; yaml is never requested from a
    /// remote server
    fn accept_header(&self) -> String {
        self.model
            .formats
            .iter()
            .filter(|f| **f != Format::Yaml)
            .map(|f| f.mime())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Format used for request bodies
    fn body_format(&self) -> Format {
        self.model
            .formats
            .iter()
            .copied()
            .find(|f| *f != Format::Yaml)
            .unwrap_or(Format::Json)
    }

    /// Path and query for a request, without the base URL
    pub fn path_for(&self, request: &Request) -> String {
        let name = if request.method() == Method::Search {
            &self.plural
        } else {
            &self.indirection
        };
        format!(
            "/{}/v3/{}/{}",
            category_for(&self.indirection),
            name,
            request.escaped_key()
        )
    }

    fn url_for(&self, request: &Request) -> String {
        let query = request.query_string();
        if query.is_empty() {
            format!("{}{}", self.base_url, self.path_for(request))
        } else {
            format!("{}{}?{}", self.base_url, self.path_for(request), query)
        }
    }

    /// GET, or POST with a form body when the URL is too long
    fn read_request(&self, request: &Request) -> RequestBuilder {
        let url = self.url_for(request);
        let builder = if url.len() > MAX_URL_LENGTH {
            debug!(indirection = %self.indirection, length = url.len(), "URL too long; using POST");
            self.client
                .post(format!("{}{}", self.base_url, self.path_for(request)))
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(request.query_string())
        } else {
            self.client.get(url)
        };
        builder.header(ACCEPT, self.accept_header())
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        builder.send().await.map_err(|e| {
            warn!(indirection = %self.indirection, error = %e, "Remote request failed");
            IndirectorError::terminus(format!("Could not reach {}: {}", self.base_url, e))
        })
    }

    /// Error for a non-success status
    async fn status_error(&self, response: Response) -> IndirectorError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        IndirectorError::terminus(format!(
            "Error {} on SERVER {}: {}",
            status.as_u16(),
            self.base_url,
            body.trim()
        ))
    }

    /// Whether a 404 should be reported as a miss
    fn is_miss(&self, status: StatusCode, request: &Request) -> bool {
        status == StatusCode::NOT_FOUND && !request.options().fail_on_404
    }

    fn response_format(&self, response: &Response) -> Result<Format> {
        let header = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                IndirectorError::terminus(format!(
                    "No content type in response from {}",
                    self.base_url
                ))
            })?;
        Format::from_mime(header).ok_or_else(|| {
            IndirectorError::terminus(format!("Unsupported response content type: {}", header))
        })
    }

    async fn body(&self, response: Response) -> Result<(Format, Vec<u8>)> {
        let format = self.response_format(&response)?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| IndirectorError::terminus(format!("Could not read response: {}", e)))?;
        Ok((format, bytes.to_vec()))
    }

    fn decode_one(&self, format: Format, bytes: &[u8], key: &str) -> Result<Instance> {
        let data = format
            .parse(bytes)
            .map_err(|e| IndirectorError::terminus(format!("Invalid response body: {}", e)))?;
        self.model
            .instance_from(data, key)
            .map_err(|e| IndirectorError::terminus(format!("Invalid response body: {}", e)))
    }
}

#[async_trait]
impl Terminus for RestTerminus {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn find(&self, request: &Request) -> Result<Option<Instance>> {
        let response = self.send(self.read_request(request)).await?;
        let status = response.status();
        if self.is_miss(status, request) {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(self.status_error(response).await);
        }
        let (format, bytes) = self.body(response).await?;
        self.decode_one(format, &bytes, request.key()).map(Some)
    }

    async fn head(&self, request: &Request) -> Result<bool> {
        let builder = self
            .client
            .head(self.url_for(request))
            .header(ACCEPT, self.accept_header());
        let response = self.send(builder).await?;
        let status = response.status();
        if self.is_miss(status, request) {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(self.status_error(response).await);
        }
        Ok(true)
    }

    async fn search(&self, request: &Request) -> Result<Vec<Instance>> {
        let response = self.send(self.read_request(request)).await?;
        let status = response.status();
        if self.is_miss(status, request) {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(self.status_error(response).await);
        }
        let (format, bytes) = self.body(response).await?;
        let items = format
            .parse_multiple(&bytes)
            .map_err(|e| IndirectorError::terminus(format!("Invalid response body: {}", e)))?;
        items
            .into_iter()
            .map(|data| {
                self.model
                    .validate(&data)
                    .map_err(|e| IndirectorError::terminus(format!("Invalid response body: {}", e)))?;
                Ok(Instance::from_data(data, ""))
            })
            .collect()
    }

    async fn save(&self, request: &Request) -> Result<Instance> {
        let instance = request
            .instance()
            .ok_or_else(|| IndirectorError::Validation("Save requests need an instance".into()))?;
        let format = self.body_format();
        let body = format.render(&instance.data)?;

        let builder = self
            .client
            .put(self.url_for(request))
            .header(CONTENT_TYPE, format.mime())
            .header(ACCEPT, self.accept_header())
            .body(body);
        let response = self.send(builder).await?;
        if !response.status().is_success() {
            return Err(self.status_error(response).await);
        }

        // Servers may answer with an empty body; the saved instance stands.
        if response.headers().get(CONTENT_TYPE).is_none() {
            return Ok(instance.clone());
        }
        let (format, bytes) = self.body(response).await?;
        match format.parse(&bytes) {
            Ok(data) if data.is_object() => self.model.instance_from(data, request.key()).or_else(|_| Ok(instance.clone())),
            _ => Ok(instance.clone()),
        }
    }

    async fn destroy(&self, request: &Request) -> Result<Option<Instance>> {
        let builder = self
            .client
            .delete(self.url_for(request))
            .header(ACCEPT, self.accept_header());
        let response = self.send(builder).await?;
        let status = response.status();
        if self.is_miss(status, request) {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(self.status_error(response).await);
        }
        if response.headers().get(CONTENT_TYPE).is_none() {
            return Ok(None);
        }
        let (format, bytes) = self.body(response).await?;
        match format.parse(&bytes) {
            Ok(data) if data.is_object() => self.decode_one(format, &bytes, request.key()).map(Some),
            _ => Ok(None),
        }
    }
}
