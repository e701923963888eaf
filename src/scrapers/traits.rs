use crate::scrapers::types::{RawComplexTable, RawCoordinates, RawListing, Vacancy};
use anyhow::Result;
use async_trait::async_trait;

/// Walks the search result pages of one area at a time
#[async_trait]
pub trait ResultPager: Send + Sync {
    /// Select every sub-area of `area` and land on its first result page
    async fn open_area(&self, area: &str) -> Result<()>;

    /// Detail links on the current result page; empty when the area has none
    async fn result_links(&self) -> Result<Vec<String>>;

    /// Complex page links on the current result page
    async fn complex_links(&self) -> Result<Vec<String>>;

    /// Follow the "next page" link; false when there is no further page
    async fn next_page(&self) -> Result<bool>;
}

/// Pulls raw field text out of individual detail pages
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Hard failure on navigation timeout or missing price element
    async fn extract_listing(&self, url: &str) -> Result<RawListing>;

    /// Coordinate markers of an arbitrary page (used for the map fallback)
    async fn extract_coordinates(&self, url: &str) -> Result<Option<RawCoordinates>>;

    async fn extract_complex(&self, url: &str) -> Result<RawComplexTable>;

    /// Heading name of a complex page
    async fn extract_complex_name(&self, url: &str) -> Result<String>;

    async fn check_vacancy(&self, url: &str) -> Result<Vacancy>;
}
