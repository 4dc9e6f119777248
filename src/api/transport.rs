use super::ApiError;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::multipart::Form;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/v1";

/// Per-request extras: query parameters, header overrides and an optional
/// cancellation token.
#[derive(Debug, Default, Clone)]
pub struct RequestOptions {
    params: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    detail: Option<serde_json::Value>,
}

/// HTTP wrapper shared by every service call. Holds the cookie jar that
/// carries the backend session.
#[derive(Clone)]
pub struct Transport {
    base_url: Url,
    client: Client,
    jar: Arc<Jar>,
}

impl Transport {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url).map_err(|e| ApiError::Url {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        let jar = Arc::new(Jar::default());
        let client = Client::builder().cookie_provider(jar.clone()).build()?;
        Ok(Self {
            base_url,
            client,
            jar,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint_url(&self, endpoint: &str, params: &[(String, String)]) -> Result<Url, ApiError> {
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );
        let mut url = Url::parse(&joined).map_err(|e| ApiError::Url {
            url: joined.clone(),
            reason: e.to_string(),
        })?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn builder(
        &self,
        method: Method,
        endpoint: &str,
        options: &RequestOptions,
        json_content: bool,
    ) -> Result<RequestBuilder, ApiError> {
        let url = self.endpoint_url(endpoint, &options.params)?;
        debug!(%method, %url, "Sending request");

        let mut req = self
            .client
            .request(method, url)
            .header(ACCEPT, "application/json");
        if json_content {
            req = req.header(CONTENT_TYPE, "application/json");
        }
        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ApiError::Parse(format!("invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ApiError::Parse(format!("invalid header value: {}", e)))?;
            req = req.header(name, value);
        }
        Ok(req)
    }

    async fn dispatch(
        &self,
        req: RequestBuilder,
        cancel: Option<&CancellationToken>,
    ) -> Result<Response, ApiError> {
        let resp = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(ApiError::Cancelled),
                resp = req.send() => resp?,
            },
            None => req.send().await?,
        };

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        Ok(resp)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Vec<u8>>,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let mut req = self.builder(method, endpoint, &options, true)?;
        if let Some(body) = body {
            req = req.body(body);
        }
        let resp = self.dispatch(req, options.cancel.as_ref()).await?;
        receive(resp, options.cancel.as_ref()).await
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.request(Method::GET, endpoint, None, options).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.request(Method::POST, endpoint, Some(to_json(body)?), options)
            .await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.request(Method::PUT, endpoint, Some(to_json(body)?), options)
            .await
    }

    pub async fn patch<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.request(Method::PATCH, endpoint, Some(to_json(body)?), options)
            .await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.request(Method::DELETE, endpoint, None, options).await
    }

    /// POST a multipart form. The content type (with boundary) comes from the
    /// form encoder, never the JSON default.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        form: Form,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let req = self
            .builder(Method::POST, endpoint, &options, false)?
            .multipart(form);
        let resp = self.dispatch(req, options.cancel.as_ref()).await?;
        receive(resp, options.cancel.as_ref()).await
    }

    /// POST a JSON body and hand back the response with its body unread, for
    /// the streaming reader.
    pub async fn open_stream<B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<Response, ApiError> {
        let req = self
            .builder(Method::POST, endpoint, &RequestOptions::default(), true)?
            .json(body);
        self.dispatch(req, None).await
    }

    /// Cookie header the backend session currently rides on, if any.
    pub fn cookie_header(&self) -> Option<String> {
        self.jar
            .cookies(&self.base_url)
            .and_then(|value| value.to_str().ok().map(str::to_owned))
    }

    /// Seed the jar from a header previously returned by `cookie_header`.
    pub fn restore_cookies(&self, header: &str) {
        for pair in header.split(';').map(str::trim).filter(|p| p.contains('=')) {
            self.jar
                .add_cookie_str(&format!("{}; Path=/", pair), &self.base_url);
        }
    }

    /// Expire every cookie the jar holds for the backend.
    pub fn clear_cookies(&self) {
        let Some(header) = self.cookie_header() else {
            return;
        };
        for name in header.split(';').filter_map(|p| p.trim().split('=').next()) {
            if name.is_empty() {
                continue;
            }
            self.jar
                .add_cookie_str(&format!("{}=; Max-Age=0; Path=/", name), &self.base_url);
        }
    }
}

/// Turn a non-2xx response into `ApiError::Status`, preferring the message
/// from a JSON error body over the status reason.
async fn error_from_response(resp: Response) -> ApiError {
    let status = resp.status();
    let fallback = status
        .canonical_reason()
        .unwrap_or("Unknown error")
        .to_string();
    let is_json = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));

    let message = if is_json {
        match resp.json::<ErrorBody>().await {
            Ok(body) => body
                .message
                .or_else(|| {
                    body.detail.map(|detail| match detail {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                })
                .unwrap_or(fallback),
            Err(e) => {
                warn!(error = %e, "Unreadable JSON error body");
                fallback
            }
        }
    } else {
        fallback
    };

    ApiError::Status {
        status: status.as_u16(),
        message,
    }
}

/// Read and decode the body, still honoring cancellation.
async fn receive<T: DeserializeOwned>(
    resp: Response,
    cancel: Option<&CancellationToken>,
) -> Result<T, ApiError> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(ApiError::Cancelled),
            result = decode(resp) => result,
        },
        None => decode(resp).await,
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let bytes = resp.bytes().await?;
    let body: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        &bytes
    };
    serde_json::from_slice(body).map_err(|e| ApiError::Parse(e.to_string()))
}

fn to_json<B: Serialize>(body: &B) -> Result<Vec<u8>, ApiError> {
    serde_json::to_vec(body).map_err(|e| ApiError::Parse(e.to_string()))
}
