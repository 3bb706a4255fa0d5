use crate::filters::FilterState;
use crate::models::{LookupItem, ResultPage};
use crate::search::error::SearchError;
use crate::search::traits::SearchBackend;
use crate::search::types::{decode_lookup, decode_result_page, error_message, SearchRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, Request};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// REST client for the listing backend.
///
/// Stateless: no retries and no caching, each call is exactly one request.
pub struct HttpSearchClient {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpSearchClient {
    /// Create a client with the default 30 second request timeout
    pub fn new(base_url: Url) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(mut base_url: Url, timeout: Duration) -> Result<Self> {
        // `Url::join` replaces the last segment unless the base ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, SearchError> {
        self.base_url
            .join(path)
            .map_err(|err| SearchError::Transport(format!("invalid endpoint '{path}': {err}")))
    }

    /// Build (without sending) the `GET /properties` request for `request`
    pub fn build_search_request(&self, request: &SearchRequest) -> Result<Request, SearchError> {
        let url = self.endpoint("properties")?;
        let built = self
            .client
            .get(url)
            .query(&request.query_pairs())
            .header(ACCEPT, "application/json")
            .header(ACCEPT_LANGUAGE, request.locale.as_str())
            .build()?;
        Ok(built)
    }

    fn request_error(&self, err: reqwest::Error) -> SearchError {
        if err.is_timeout() {
            SearchError::Timeout(self.timeout)
        } else {
            err.into()
        }
    }

    async fn execute(&self, request: Request) -> Result<String, SearchError> {
        debug!("GET {}", request.url());

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|err| self.request_error(err))?;
        let status = response.status();
        let body = response.text().await.map_err(|err| self.request_error(err))?;

        if !status.is_success() {
            warn!("Backend returned status: {}", status);
            let message = error_message(&body).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
            return Err(SearchError::Status {
                status: status.as_u16(),
                message,
            });
        }

        debug!("Downloaded {} bytes", body.len());
        Ok(body)
    }

    async fn lookup(
        &self,
        path: &str,
        query: &[(&str, &str)],
        locale: &str,
    ) -> Result<Vec<LookupItem>, SearchError> {
        let request = self
            .client
            .get(self.endpoint(path)?)
            .query(query)
            .query(&[("lang", locale)])
            .header(ACCEPT, "application/json")
            .header(ACCEPT_LANGUAGE, locale)
            .build()?;

        let items = decode_lookup(&self.execute(request).await?)?;
        debug!("Lookup '{}' returned {} entries", path, items.len());
        Ok(items)
    }

    /// Areas whose name matches `search` (the location picker)
    pub async fn fetch_areas(&self, search: &str, locale: &str) -> Result<Vec<LookupItem>, SearchError> {
        self.lookup("areas", &[("search", search)], locale).await
    }

    pub async fn fetch_property_types(&self, locale: &str) -> Result<Vec<LookupItem>, SearchError> {
        self.lookup("property-types", &[], locale).await
    }

    pub async fn fetch_amenities(&self, locale: &str) -> Result<Vec<LookupItem>, SearchError> {
        self.lookup("amenities", &[], locale).await
    }
}

#[async_trait]
impl SearchBackend for HttpSearchClient {
    async fn fetch_page(
        &self,
        filters: &FilterState,
        page: u32,
        page_size: u32,
        locale: &str,
    ) -> Result<ResultPage, SearchError> {
        let request = SearchRequest::new(filters.clone(), page, page_size, locale);
        debug!(
            "Searching page {} ({} per page, locale {}, {} filters)",
            request.page,
            request.page_size,
            request.locale,
            filters.len()
        );

        let body = self.execute(self.build_search_request(&request)?).await?;
        let page = decode_result_page(&body)?;

        info!(
            "Fetched {} listings (page {}/{})",
            page.items.len(),
            page.pagination.current_page,
            page.pagination.last_page
        );
        Ok(page)
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}
