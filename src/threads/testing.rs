//! In-memory page and HTTP fakes for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;

use crate::threads::cookies::Cookie;
use crate::threads::fetch::{FetchError, FetchResponse, FetchResult, HttpFetch, SessionProvider};
use crate::threads::page::{DomContract, PageDriver, PageError, PageResult};

#[derive(Debug, Clone, Default)]
pub struct FakeBlock {
    images: Vec<String>,
    videos: Vec<String>,
    stale: bool,
}

impl FakeBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.images.push(url.into());
        self
    }

    pub fn video(mut self, url: impl Into<String>) -> Self {
        self.videos.push(url.into());
        self
    }

    /// The block disappears between enumeration and reading.
    pub fn stale(mut self) -> Self {
        self.stale = true;
        self
    }
}

/// What the page renders after a given number of scrolls.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    height: u64,
    blocks: Vec<FakeBlock>,
    text: String,
}

impl Snapshot {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            ..Self::default()
        }
    }

    pub fn block(mut self, block: FakeBlock) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

#[derive(Debug, Clone)]
pub enum FakeElement {
    Block(FakeBlock),
    Media(String),
    Heading(String),
}

#[derive(Debug, Clone, Default)]
struct FakeProfile {
    author: Option<String>,
    snapshots: Vec<Snapshot>,
}

#[derive(Debug, Default)]
pub struct FakePageBuilder {
    page: FakePage,
}

impl FakePageBuilder {
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.page.url = url.into();
        self
    }

    pub fn snapshot(mut self, snapshot: Snapshot) -> Self {
        self.page.current.snapshots.push(snapshot);
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.page.current.author = Some(author.into());
        self
    }

    /// Registers a profile shown after navigating to `url`.
    pub fn profile(mut self, url: impl Into<String>, author: &str, snapshots: Vec<Snapshot>) -> Self {
        self.page.profiles.insert(
            url.into(),
            FakeProfile {
                author: Some(author.to_string()),
                snapshots,
            },
        );
        self
    }

    pub fn reject_cookie(mut self, name: &str) -> Self {
        self.page.rejected_cookies.insert(name.to_string());
        self
    }

    pub fn browser_cookies(mut self, cookies: Vec<Cookie>) -> Self {
        self.page.browser_cookies = cookies;
        self
    }

    /// Height keeps growing with every scroll regardless of content.
    pub fn growing_height(mut self) -> Self {
        self.page.growing_height = true;
        self
    }

    /// Offset moves with every scroll while the height stays put.
    pub fn moving_offset(mut self) -> Self {
        self.page.moving_offset = true;
        self
    }

    pub fn failing_probes(mut self) -> Self {
        self.page.failing_probes = true;
        self
    }

    pub fn build(self) -> FakePage {
        self.page
    }
}

/// Scripted profile page. Every scroll reveals the next snapshot; the last
/// one stays once reached.
#[derive(Debug, Default)]
pub struct FakePage {
    url: String,
    current: FakeProfile,
    profiles: HashMap<String, FakeProfile>,
    index: usize,
    scrolls: usize,
    refreshes: usize,
    navigations: Vec<String>,
    added_cookies: Vec<Cookie>,
    browser_cookies: Vec<Cookie>,
    rejected_cookies: HashSet<String>,
    growing_height: bool,
    moving_offset: bool,
    failing_probes: bool,
    dom: DomContract,
}

impl FakePage {
    pub fn builder() -> FakePageBuilder {
        FakePageBuilder::default()
    }

    pub fn scroll_count(&self) -> usize {
        self.scrolls
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes
    }

    pub fn added_cookies(&self) -> &[Cookie] {
        &self.added_cookies
    }

    pub fn navigations(&self) -> &[String] {
        &self.navigations
    }

    fn snapshot(&self) -> Option<&Snapshot> {
        self.current.snapshots.get(self.index)
    }
}

#[async_trait]
impl PageDriver for FakePage {
    type Element = FakeElement;

    async fn navigate(&mut self, url: &str) -> PageResult<()> {
        self.navigations.push(url.to_string());
        self.url = url.to_string();
        if let Some(profile) = self.profiles.get(url) {
            self.current = profile.clone();
            self.index = 0;
        }
        Ok(())
    }

    async fn refresh(&mut self) -> PageResult<()> {
        self.refreshes += 1;
        Ok(())
    }

    async fn current_url(&mut self) -> PageResult<String> {
        Ok(self.url.clone())
    }

    async fn scroll_to_bottom(&mut self) -> PageResult<()> {
        self.scrolls += 1;
        if self.index + 1 < self.current.snapshots.len() {
            self.index += 1;
        }
        Ok(())
    }

    async fn scroll_height(&mut self) -> PageResult<u64> {
        if self.failing_probes {
            return Err(PageError::Script("height unavailable".to_string()));
        }
        let base = self.snapshot().map(|s| s.height).unwrap_or_default();
        if self.growing_height {
            return Ok(base + 100 * self.scrolls as u64);
        }
        Ok(base)
    }

    async fn scroll_offset(&mut self) -> PageResult<u64> {
        if self.moving_offset {
            return Ok(100 * self.scrolls as u64);
        }
        Ok(0)
    }

    async fn find_elements(&mut self, selector: &str) -> PageResult<Vec<FakeElement>> {
        if selector == self.dom.post_block_selector {
            let blocks = self
                .snapshot()
                .map(|s| s.blocks.iter().cloned().map(FakeElement::Block).collect())
                .unwrap_or_default();
            return Ok(blocks);
        }
        if selector == self.dom.author_selector {
            return Ok(self
                .current
                .author
                .iter()
                .cloned()
                .map(FakeElement::Heading)
                .collect());
        }
        Ok(Vec::new())
    }

    async fn find_within(&mut self, element: &FakeElement, selector: &str) -> PageResult<Vec<FakeElement>> {
        let FakeElement::Block(block) = element else {
            return Ok(Vec::new());
        };
        if block.stale {
            return Err(PageError::StaleElement("post block detached".to_string()));
        }
        let urls = if selector == self.dom.image_selector {
            &block.images
        } else if selector == self.dom.video_selector {
            &block.videos
        } else {
            return Ok(Vec::new());
        };
        Ok(urls.iter().cloned().map(FakeElement::Media).collect())
    }

    async fn attribute(&mut self, element: &FakeElement, name: &str) -> PageResult<Option<String>> {
        match element {
            FakeElement::Media(url) if name == "src" => Ok(Some(url.clone())),
            _ => Ok(None),
        }
    }

    async fn element_text(&mut self, element: &FakeElement) -> PageResult<String> {
        match element {
            FakeElement::Heading(text) => Ok(text.clone()),
            _ => Ok(String::new()),
        }
    }

    async fn page_text(&mut self) -> PageResult<String> {
        Ok(self.snapshot().map(|s| s.text.clone()).unwrap_or_default())
    }

    async fn cookies(&mut self) -> PageResult<Vec<Cookie>> {
        Ok(self.browser_cookies.clone())
    }

    async fn add_cookie(&mut self, cookie: &Cookie) -> PageResult<()> {
        if self.rejected_cookies.contains(&cookie.name) {
            return Err(PageError::Driver(format!("invalid cookie domain for {}", cookie.name)));
        }
        self.added_cookies.push(cookie.clone());
        Ok(())
    }
}

/// Scripted reply of the fake HTTP server.
#[derive(Debug, Clone)]
pub enum FakeReply {
    Status(u16, Vec<u8>),
    ConnectError,
    /// Sends the bytes, then fails mid-body.
    BrokenBody(Vec<u8>),
    /// Never answers.
    Hang,
}

impl FakeReply {
    pub fn ok(body: Vec<u8>) -> Self {
        FakeReply::Status(200, body)
    }

    pub fn status(status: u16) -> Self {
        FakeReply::Status(status, Vec::new())
    }
}

#[derive(Default)]
struct ServerState {
    routes: Mutex<HashMap<String, VecDeque<FakeReply>>>,
    requests: Mutex<HashMap<String, usize>>,
    total_requests: AtomicUsize,
    sessions: AtomicUsize,
}

/// Fake HTTP server. Unrouted URLs answer 200 with the URL as body; a routed
/// URL answers its queued replies in order and then 200.
#[derive(Clone, Default)]
pub struct FakeServer {
    state: Arc<ServerState>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: &str, replies: Vec<FakeReply>) {
        self.state.routes.lock().insert(url.to_string(), replies.into());
    }

    pub fn request_count(&self) -> usize {
        self.state.total_requests.load(Ordering::SeqCst)
    }

    pub fn requests_for(&self, url: &str) -> usize {
        self.state.requests.lock().get(url).copied().unwrap_or_default()
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.sessions.load(Ordering::SeqCst)
    }
}

impl SessionProvider for FakeServer {
    fn open_session(&self) -> FetchResult<Box<dyn HttpFetch>> {
        self.state.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            state: self.state.clone(),
        }))
    }
}

struct FakeSession {
    state: Arc<ServerState>,
}

#[async_trait]
impl HttpFetch for FakeSession {
    async fn get(&self, url: &str) -> FetchResult<FetchResponse> {
        self.state.total_requests.fetch_add(1, Ordering::SeqCst);
        *self.state.requests.lock().entry(url.to_string()).or_default() += 1;

        let reply = self
            .state
            .routes
            .lock()
            .get_mut(url)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| FakeReply::ok(url.as_bytes().to_vec()));

        match reply {
            FakeReply::Status(status, body) => {
                let chunks: Vec<FetchResult<Vec<u8>>> = body.chunks(4).map(|c| Ok(c.to_vec())).collect();
                Ok(FetchResponse {
                    status,
                    body: stream::iter(chunks).boxed(),
                })
            }
            FakeReply::ConnectError => Err(FetchError::Connect("connection reset by peer".to_string())),
            FakeReply::BrokenBody(partial) => Ok(FetchResponse {
                status: 200,
                body: stream::iter(vec![
                    Ok(partial),
                    Err(FetchError::Body("unexpected end of stream".to_string())),
                ])
                .boxed(),
            }),
            FakeReply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(FetchError::Timeout("fake hang".to_string()))
            }
        }
    }
}
