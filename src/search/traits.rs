use crate::filters::FilterState;
use crate::models::ResultPage;
use crate::search::error::SearchError;
use async_trait::async_trait;
use std::sync::Arc;

/// Anything that can answer a paged property search.
/// The HTTP client is the production implementation; tests plug in fakes.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Fetch one page of listings matching `filters`
    async fn fetch_page(
        &self,
        filters: &FilterState,
        page: u32,
        page_size: u32,
        locale: &str,
    ) -> Result<ResultPage, SearchError>;

    /// Get the name of the backend
    fn backend_name(&self) -> &'static str;
}

#[async_trait]
impl<T: SearchBackend + ?Sized> SearchBackend for Arc<T> {
    async fn fetch_page(
        &self,
        filters: &FilterState,
        page: u32,
        page_size: u32,
        locale: &str,
    ) -> Result<ResultPage, SearchError> {
        (**self).fetch_page(filters, page, page_size, locale).await
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}
