//! The rendered-page capability the collector drives.
//!
//! A concrete browser backend (CDP, WebDriver) implements [`PageDriver`]; the
//! collector never talks to a browser directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::threads::cookies::Cookie;

/// Errors reported by a page driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    /// The element was detached or replaced after it was enumerated.
    #[error("Stale element: {0}")]
    StaleElement(String),

    #[error("Element not found: {0}")]
    NotFound(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Driver error: {0}")]
    Driver(String),
}

/// Result type for page operations
pub type PageResult<T> = Result<T, PageError>;

/// Browser-like capability set used for scrolling and extraction.
///
/// Implementations are not expected to be usable from more than one task at a
/// time, every method takes `&mut self`.
#[async_trait]
pub trait PageDriver: Send {
    /// Opaque handle to a DOM element.
    type Element: Send + Sync;

    async fn navigate(&mut self, url: &str) -> PageResult<()>;

    async fn refresh(&mut self) -> PageResult<()>;

    async fn current_url(&mut self) -> PageResult<String>;

    /// Scrolls the viewport to the bottom of the document.
    async fn scroll_to_bottom(&mut self) -> PageResult<()>;

    /// Current `document.body.scrollHeight`.
    async fn scroll_height(&mut self) -> PageResult<u64>;

    /// Current vertical scroll offset of the viewport.
    async fn scroll_offset(&mut self) -> PageResult<u64>;

    /// Elements in the whole document matching a CSS selector.
    async fn find_elements(&mut self, selector: &str) -> PageResult<Vec<Self::Element>>;

    /// Descendants of `element` matching a CSS selector.
    async fn find_within(
        &mut self,
        element: &Self::Element,
        selector: &str,
    ) -> PageResult<Vec<Self::Element>>;

    async fn attribute(&mut self, element: &Self::Element, name: &str) -> PageResult<Option<String>>;

    async fn element_text(&mut self, element: &Self::Element) -> PageResult<String>;

    /// Visible text of the whole page.
    async fn page_text(&mut self) -> PageResult<String>;

    async fn cookies(&mut self) -> PageResult<Vec<Cookie>>;

    async fn add_cookie(&mut self, cookie: &Cookie) -> PageResult<()>;
}

/// Structural markers of a profile page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomContract {
    pub post_block_selector: String,
    pub image_selector: String,
    pub video_selector: String,
    pub source_attribute: String,
    pub author_selector: String,
    /// Texts that mean the feed has no more posts. Empty disables the check.
    #[serde(default)]
    pub end_markers: Vec<String>,
}

impl Default for DomContract {
    fn default() -> Self {
        Self {
            post_block_selector: ".x1xmf6yo".to_string(),
            image_selector: "[referrerpolicy=\"origin-when-cross-origin\"]".to_string(),
            video_selector: "[playsinline]".to_string(),
            source_attribute: "src".to_string(),
            author_selector: ".xcrlgei h1".to_string(),
            end_markers: Vec::new(),
        }
    }
}

impl DomContract {
    /// Whether `text` contains one of the end-of-content markers.
    pub fn shows_end_marker(&self, text: &str) -> bool {
        self.end_markers
            .iter()
            .filter(|marker| !marker.trim().is_empty())
            .any(|marker| text.contains(marker.as_str()))
    }
}

/// Display name of the profile currently open in `page`.
pub async fn author_name<P: PageDriver>(page: &mut P, contract: &DomContract) -> PageResult<String> {
    let headings = page.find_elements(&contract.author_selector).await?;
    let first = headings
        .first()
        .ok_or_else(|| PageError::NotFound(contract.author_selector.clone()))?;
    let name = page.element_text(first).await?.trim().to_string();
    if name.is_empty() {
        return Err(PageError::NotFound(format!(
            "{} (empty heading)",
            contract.author_selector
        )));
    }
    Ok(name)
}
