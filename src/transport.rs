//! Axis VAPIX transport
//! Digest-authenticated HTTP requests against a single device
//!
//! A request is sent without credentials first. When the device answers with
//! a `WWW-Authenticate` challenge the same request is reissued exactly once
//! with a computed `Authorization` header. A second challenge means the
//! credentials were rejected and is reported as HTTP 401; nothing loops.

use log::{ debug, warn };
use reqwest::header::{ AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE };
use reqwest::{ Client, ClientBuilder, RequestBuilder, Response };
use serde::{ Deserialize, Serialize };
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::device::Device;
use crate::digest::{ self, AuthChallenge };
use crate::error::{ detect_application_error, FailureKind, Result, VapixError };

/// HTTP verbs the device API uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
        }
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
        }
    }

    fn requires_body(&self) -> bool {
        matches!(self, Method::Put | Method::Patch)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a POST/PUT/PATCH request
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Serialized and sent as `application/json`
    Json(Value),
    /// Sent verbatim; text starting with `{` or `[` is taken as pre-serialized JSON
    Text(String),
    Binary(Vec<u8>),
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        RequestBody::Text(text.to_string())
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(data: Vec<u8>) -> Self {
        RequestBody::Binary(data)
    }
}

/// How the caller wants the response body decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseKind {
    #[default]
    Text,
    Binary,
    /// JSON when it parses, otherwise the raw text
    Structured,
    /// JSON or a `ParseError`
    Json,
}

/// Decoded response payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Text(String),
    Binary(Vec<u8>),
    Json(Value),
}

impl ResponseBody {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ResponseBody::Binary(data) => Some(data),
            _ => None,
        }
    }

    pub fn into_text(self) -> Result<String> {
        match self {
            ResponseBody::Text(text) => Ok(text),
            ResponseBody::Json(value) => Ok(value.to_string()),
            ResponseBody::Binary(data) =>
                String::from_utf8(data).map_err(|_| {
                    VapixError::parse_error("Response body is not valid UTF-8")
                }),
        }
    }
}

/// One logical operation against the device
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Absolute path including any query string
    pub path: String,
    pub body: Option<RequestBody>,
    pub response_kind: ResponseKind,
    /// Overrides the content type chosen for text and binary bodies
    pub content_type: Option<String>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            response_kind: ResponseKind::default(),
            content_type: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: impl Into<RequestBody>) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: impl Into<RequestBody>) -> Self {
        Self::new(Method::Put, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: impl Into<RequestBody>) -> Self {
        Self::new(Method::Patch, path).with_body(body)
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn decode_as(mut self, kind: ResponseKind) -> Self {
        self.response_kind = kind;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(VapixError::invalid_input("Missing request path"));
        }
        if self.method.requires_body() && is_empty_body(self.body.as_ref()) {
            return Err(
                VapixError::invalid_input(format!("Missing {} body", self.method.as_str().to_lowercase()))
            );
        }
        Ok(())
    }

    fn attach_body(&self, builder: RequestBuilder) -> RequestBuilder {
        let content_type = self.content_type.as_deref();
        match &self.body {
            None => builder,
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Text(text)) if text.starts_with('{') || text.starts_with('[') => {
                builder.header(CONTENT_TYPE, "application/json").body(text.clone())
            }
            Some(RequestBody::Text(text)) => {
                builder
                    .header(CONTENT_TYPE, content_type.unwrap_or("text/plain; charset=utf-8"))
                    .body(text.clone())
            }
            Some(RequestBody::Binary(data)) => {
                builder
                    .header(CONTENT_TYPE, content_type.unwrap_or("application/octet-stream"))
                    .body(data.clone())
            }
        }
    }
}

fn is_empty_body(body: Option<&RequestBody>) -> bool {
    match body {
        None => true,
        Some(RequestBody::Text(text)) => text.is_empty(),
        Some(RequestBody::Binary(data)) => data.is_empty(),
        Some(RequestBody::Json(value)) => value.is_null(),
    }
}

/// Transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Deadline for ordinary requests
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Deadline for multipart uploads (firmware images are large)
    pub upload_timeout: Duration,
    pub user_agent: String,
    /// `context` field sent in VAPIX JSON request envelopes
    pub context: String,
    /// Idle sockets kept per host; 0 keeps no connection beyond one operation
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            upload_timeout: Duration::from_secs(300),
            user_agent: format!("Axis-Vapix/{}", env!("CARGO_PKG_VERSION")),
            context: "axis-vapix".to_string(),
            pool_max_idle_per_host: 0,
        }
    }
}

/// Whether the first attempt carries the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Probe {
    WithPayload,
    /// Send an empty request to collect the challenge, attach the payload afterwards
    Bare,
}

/// Issues requests to devices. Holds no per-device or per-session state.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    config: TransportConfig,
}

impl Transport {
    pub fn new() -> Result<Self> {
        Self::with_config(TransportConfig::default())
    }

    /// TLS certificate validation is disabled: Axis devices ship self-signed certificates
    pub fn with_config(config: TransportConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .danger_accept_invalid_certs(true)
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(|e| VapixError::invalid_input(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Perform one logical operation, authenticating if the device asks for it
    pub async fn request(
        &self,
        device: &Device,
        descriptor: &RequestDescriptor
    ) -> Result<ResponseBody> {
        device.validate()?;
        descriptor.validate()?;
        let url = device.url(&descriptor.path)?;
        debug!("{} {}", descriptor.method, url);

        let response = self.exchange(
            device,
            descriptor.method,
            url,
            self.config.timeout,
            Probe::WithPayload,
            |builder| Ok(descriptor.attach_body(builder))
        ).await?;

        finish(response, descriptor.response_kind).await
    }

    pub async fn get(&self, device: &Device, path: &str, kind: ResponseKind) -> Result<ResponseBody> {
        self.request(device, &RequestDescriptor::get(path).decode_as(kind)).await
    }

    pub async fn post(
        &self,
        device: &Device,
        path: &str,
        body: impl Into<RequestBody>,
        kind: ResponseKind
    ) -> Result<ResponseBody> {
        self.request(device, &RequestDescriptor::post(path, body).decode_as(kind)).await
    }

    pub async fn put(
        &self,
        device: &Device,
        path: &str,
        body: impl Into<RequestBody>,
        kind: ResponseKind
    ) -> Result<ResponseBody> {
        self.request(device, &RequestDescriptor::put(path, body).decode_as(kind)).await
    }

    pub async fn patch(
        &self,
        device: &Device,
        path: &str,
        body: impl Into<RequestBody>,
        kind: ResponseKind
    ) -> Result<ResponseBody> {
        self.request(device, &RequestDescriptor::patch(path, body).decode_as(kind)).await
    }

    /// GET without any digest handling.
    ///
    /// Factory-new cameras accept a few calls (creating the initial `root`
    /// account) without credentials; only the address is required here.
    pub async fn get_unauthenticated(
        &self,
        device: &Device,
        path: &str,
        kind: ResponseKind
    ) -> Result<ResponseBody> {
        if device.address.trim().is_empty() {
            return Err(VapixError::invalid_input("Missing address"));
        }
        let url = device.url(path)?;
        debug!("GET {} (unauthenticated)", url);

        let response = self.client
            .get(url)
            .timeout(self.config.timeout)
            .send().await
            .map_err(VapixError::from_transport)?;

        finish(response, kind).await
    }

    /// Run the challenge/response exchange for one request.
    ///
    /// `attach` adds the payload to a request builder and is called once per
    /// attempt that carries a payload, so non-clonable bodies such as
    /// multipart forms are rebuilt for the retry.
    pub(crate) async fn exchange<F>(
        &self,
        device: &Device,
        method: Method,
        url: Url,
        timeout: Duration,
        probe: Probe,
        attach: F
    ) -> Result<Response>
        where F: Fn(RequestBuilder) -> Result<RequestBuilder>
    {
        let builder = self.client.request(method.to_reqwest(), url.clone()).timeout(timeout);
        let builder = match probe {
            Probe::WithPayload => attach(builder)?,
            Probe::Bare => builder,
        };
        let first = builder.send().await.map_err(VapixError::from_transport)?;

        if !first.headers().contains_key(WWW_AUTHENTICATE) {
            if probe == Probe::Bare && first.status().is_success() {
                debug!("{} accepted {} without authentication, sending payload", url, method);
                let builder = self.client.request(method.to_reqwest(), url).timeout(timeout);
                return attach(builder)?.send().await.map_err(VapixError::from_transport);
            }
            return Ok(first);
        }

        debug!("{} {} challenged with status {}", method, url, first.status());
        let challenge = AuthChallenge::from_headers(first.headers())?;
        let authorization = digest::negotiate(
            &challenge,
            &device.user,
            &device.password,
            method.as_str(),
            url.path()
        )?;

        let builder = self.client
            .request(method.to_reqwest(), url.clone())
            .timeout(timeout)
            .header(AUTHORIZATION, authorization);
        let second = attach(builder)?.send().await.map_err(VapixError::from_transport)?;

        if second.headers().contains_key(WWW_AUTHENTICATE) {
            warn!("{} rejected credentials for user {}", url.host_str().unwrap_or("device"), device.user);
            let body = read_text_lossy(second).await;
            return Err(
                VapixError::new(FailureKind::HttpStatus(401), "Authentication failed").with_body(
                    ResponseBody::Text(body)
                )
            );
        }
        Ok(second)
    }
}

/// Turn a final response into a body or a classified failure
pub(crate) async fn finish(response: Response, kind: ResponseKind) -> Result<ResponseBody> {
    let status = response.status();
    if !status.is_success() {
        let reason = reason_phrase(&response);
        let text = read_text_lossy(response).await;
        debug!("Request failed with status {}: {}", status, text);
        return Err(VapixError::http_status(status, reason, ResponseBody::Text(text)));
    }

    let body = decode(response, kind).await?;
    if let Some(err) = detect_application_error(&body) {
        debug!("Application error in response: {}", err.message);
        return Err(err);
    }
    Ok(body)
}

/// Body of a failed response, empty if it cannot be read
async fn read_text_lossy(response: Response) -> String {
    match response.text().await {
        Ok(text) => text,
        Err(e) => {
            debug!("Failed to read error response body: {}", e);
            String::new()
        }
    }
}

/// Reason phrase from the status line, when the device sent a non-standard one
fn reason_phrase(response: &Response) -> Option<String> {
    response
        .extensions()
        .get::<hyper::ext::ReasonPhrase>()
        .and_then(|reason| std::str::from_utf8(reason.as_bytes()).ok())
        .map(str::to_string)
}

async fn decode(response: Response, kind: ResponseKind) -> Result<ResponseBody> {
    match kind {
        ResponseKind::Binary => {
            let data = response.bytes().await.map_err(VapixError::from_transport)?;
            Ok(ResponseBody::Binary(data.to_vec()))
        }
        ResponseKind::Text => {
            let text = response.text().await.map_err(VapixError::from_transport)?;
            Ok(ResponseBody::Text(text))
        }
        ResponseKind::Structured => {
            let text = response.text().await.map_err(VapixError::from_transport)?;
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => Ok(ResponseBody::Json(value)),
                Err(_) => Ok(ResponseBody::Text(text)),
            }
        }
        ResponseKind::Json => {
            let text = response.text().await.map_err(VapixError::from_transport)?;
            serde_json::from_str::<Value>(&text).map(ResponseBody::Json).map_err(|e| {
                VapixError::parse_error(format!("Invalid JSON response: {}", e)).with_body(
                    ResponseBody::Text(text)
                )
            })
        }
    }
}
