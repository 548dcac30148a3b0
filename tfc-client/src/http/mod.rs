//! `reqwest` implementation of the remote service traits.
//!
//! One [`HttpClient`] is bound to one API token. The per-domain trait impls
//! live in the submodules; this module owns the request plumbing and the
//! status-code to [`ClientError`] mapping.

mod agent_pools;
pub(crate) mod jsonapi;
mod notifications;
mod projects;
mod runs;
mod teams;
mod variables;
mod workspaces;

use std::sync::Arc;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::api::{ClientFactory, TfcApi};
use crate::error::{ClientError, Result};
use crate::paging::{ListOptions, Page};
use jsonapi::{Document, Resource};

const API_PATH: &str = "/api/v2";
const JSON_API: &str = "application/vnd.api+json";
const USER_AGENT: &str = concat!("tfc-operator/", env!("CARGO_PKG_VERSION"));

/// HTTP client for one organization credential.
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    /// Uploads go to pre-signed URLs and must not carry the API token.
    upload: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    pub fn new(address: &str, token: &str, skip_tls_verify: bool) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| ClientError::Config(format!("invalid token: {}", e)))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_API));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_API));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(skip_tls_verify)
            .build()?;
        let upload = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(skip_tls_verify)
            .build()?;

        Ok(Self {
            http,
            upload,
            base_url: format!("{}{}", address.trim_end_matches('/'), API_PATH),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(&self, req: RequestBuilder, what: &str) -> Result<Response> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(map_status(status, what, &body))
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
        let text = resp.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    pub(crate) async fn get<A>(&self, path: &str) -> Result<Resource<A>>
    where
        A: DeserializeOwned + Default,
    {
        debug!(path, "GET");
        let resp = self.execute(self.http.get(self.url(path)), path).await?;
        let doc: Document<Resource<A>> = Self::decode(resp).await?;
        Ok(doc.data)
    }

    /// Fetch one page. `search_param` names the query parameter carrying
    /// `opts.search`; `filters` are appended verbatim.
    pub(crate) async fn list<A>(
        &self,
        path: &str,
        opts: &ListOptions,
        search_param: &str,
        filters: &[(&str, &str)],
    ) -> Result<Page<Resource<A>>>
    where
        A: DeserializeOwned + Default,
    {
        let mut query: Vec<(String, String)> = vec![
            ("page[number]".to_string(), opts.page_number.to_string()),
            ("page[size]".to_string(), opts.page_size.to_string()),
        ];
        if let Some(search) = &opts.search {
            query.push((search_param.to_string(), search.clone()));
        }
        for (k, v) in filters {
            query.push((k.to_string(), v.to_string()));
        }

        debug!(path, page = opts.page_number, "LIST");
        let resp = self
            .execute(self.http.get(self.url(path)).query(&query), path)
            .await?;
        let doc: Document<Vec<Resource<A>>> = Self::decode(resp).await?;
        let next_page = doc.next_page();
        Ok(Page {
            items: doc.data,
            next_page,
        })
    }

    pub(crate) async fn post<A>(&self, path: &str, body: &Value) -> Result<Resource<A>>
    where
        A: DeserializeOwned + Default,
    {
        debug!(path, "POST");
        let resp = self
            .execute(self.http.post(self.url(path)).json(body), path)
            .await?;
        let doc: Document<Resource<A>> = Self::decode(resp).await?;
        Ok(doc.data)
    }

    /// POST whose response body is irrelevant (actions, relationship edits).
    pub(crate) async fn post_action(&self, path: &str, body: Option<&Value>) -> Result<()> {
        debug!(path, "POST");
        let mut req = self.http.post(self.url(path));
        if let Some(body) = body {
            req = req.json(body);
        }
        self.execute(req, path).await?;
        Ok(())
    }

    pub(crate) async fn patch<A>(&self, path: &str, body: &Value) -> Result<Resource<A>>
    where
        A: DeserializeOwned + Default,
    {
        debug!(path, "PATCH");
        let resp = self
            .execute(self.http.patch(self.url(path)).json(body), path)
            .await?;
        let doc: Document<Resource<A>> = Self::decode(resp).await?;
        Ok(doc.data)
    }

    pub(crate) async fn patch_action(&self, path: &str, body: &Value) -> Result<()> {
        debug!(path, "PATCH");
        self.execute(self.http.patch(self.url(path)).json(body), path)
            .await?;
        Ok(())
    }

    pub(crate) async fn delete(&self, path: &str, body: Option<&Value>) -> Result<()> {
        debug!(path, "DELETE");
        let mut req = self.http.delete(self.url(path));
        if let Some(body) = body {
            req = req.json(body);
        }
        self.execute(req, path).await?;
        Ok(())
    }

    pub(crate) async fn put_archive(&self, url: &str, archive: Vec<u8>) -> Result<()> {
        debug!(bytes = archive.len(), "PUT configuration archive");
        let req = self
            .upload
            .put(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(archive);
        self.execute(req, "configuration upload").await?;
        Ok(())
    }
}

fn map_status(status: StatusCode, what: &str, body: &str) -> ClientError {
    let message = jsonapi::error_message(body).unwrap_or_else(|| what.to_string());
    match status {
        StatusCode::NOT_FOUND => ClientError::NotFound(what.to_string()),
        StatusCode::CONFLICT => ClientError::Conflict(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Unauthorized(message),
        StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimited,
        _ => ClientError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Builds an [`HttpClient`] per credential.
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    address: String,
    skip_tls_verify: bool,
}

impl HttpClientFactory {
    pub fn new(address: impl Into<String>, skip_tls_verify: bool) -> Self {
        Self {
            address: address.into(),
            skip_tls_verify,
        }
    }
}

impl ClientFactory for HttpClientFactory {
    fn connect(&self, token: &str) -> Result<Arc<dyn TfcApi>> {
        Ok(Arc::new(HttpClient::new(
            &self.address,
            token,
            self.skip_tls_verify,
        )?))
    }
}
