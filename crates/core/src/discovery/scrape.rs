use crate::discovery::blacklist::Blacklist;
use crate::discovery::strategy::{RemoteStrategy, StrategyContext, StrategyOutcome};
use crate::error::{Result, RoutingError};
use crate::prefix::ParentTree;
use crate::util::{base_url, depth, join_url, normalize};
use async_trait::async_trait;
use autoroute_api::{BoxError, RemoteClient, RemoteResponse};
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tokio_util::sync::CancellationToken;
use url::Url;

pub const SCRAPE_STRATEGY_ID: &str = "scrape";

static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a\s[^>]*href\s*=\s*["']([^"'#?]+)["']"#).expect("valid regex")
});

/// A fetched remote page.
#[derive(Debug, Clone)]
pub struct Page {
    pub path: String,
    pub response: RemoteResponse,
}

#[derive(Debug)]
struct Stop {
    success: bool,
    message: String,
    entries: Vec<String>,
}

/// State shared by the scrapers of one scrape run. The first scraper that
/// stops the context decides the run.
pub struct ScrapeContext {
    client: Arc<dyn RemoteClient>,
    remote_url: String,
    depth: usize,
    cancel: CancellationToken,
    root: Page,
    stop: Option<Stop>,
}

impl ScrapeContext {
    pub fn new(
        client: Arc<dyn RemoteClient>,
        remote_url: impl Into<String>,
        depth: usize,
        cancel: CancellationToken,
        root: Page,
    ) -> Self {
        Self {
            client,
            remote_url: remote_url.into(),
            depth,
            cancel,
            root,
            stop: None,
        }
    }

    pub fn remote_url(&self) -> &str {
        &self.remote_url
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn root_page(&self) -> &Page {
        &self.root
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Absolute URL of a page below the remote.
    pub fn page_url(&self, path: &str) -> Result<Url> {
        base_url(&self.remote_url)?
            .join(path.trim_start_matches('/'))
            .map_err(|e| RoutingError::InvalidArgument(format!("path '{path}': {e}")))
    }

    pub async fn fetch(&self, path: &str) -> Result<Page> {
        let url = join_url(&self.remote_url, path)?;
        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(RoutingError::Cancelled),
            response = self.client.get(&url) => response?,
        };
        Ok(Page {
            path: path.to_string(),
            response,
        })
    }

    pub fn stop_with_success(&mut self, entries: Vec<String>, message: impl Into<String>) {
        self.stop = Some(Stop {
            success: true,
            message: message.into(),
            entries,
        });
    }

    pub fn stop_with_failure(&mut self, message: impl Into<String>) {
        self.stop = Some(Stop {
            success: false,
            message: message.into(),
            entries: Vec::new(),
        });
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_some()
    }
}

/// One way of reading a remote's browsable pages.
#[async_trait]
pub trait Scraper: Send + Sync {
    fn id(&self) -> &str;

    fn priority(&self) -> i32;

    /// Leaves the context untouched when the remote is not recognized.
    async fn scrape(&self, ctx: &mut ScrapeContext) -> std::result::Result<(), BoxError>;
}

/// Scraper for plain directory index pages (web server autoindex and the like).
#[derive(Debug, Default, Clone)]
pub struct HtmlIndexScraper;

impl HtmlIndexScraper {
    /// Direct children linked from an index page, whatever form the href
    /// takes. Directories keep their trailing slash.
    fn links(page: &Url, body: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        HREF.captures_iter(body)
            .filter_map(|c| c.get(1))
            .filter_map(|m| page.join(m.as_str().trim()).ok())
            .filter_map(|url| Self::child_name(page, &url))
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }

    fn child_name(page: &Url, url: &Url) -> Option<String> {
        if url.scheme() != page.scheme()
            || url.host_str() != page.host_str()
            || url.port_or_known_default() != page.port_or_known_default()
        {
            return None;
        }
        let rest = url.path().strip_prefix(page.path())?;
        let name = rest.strip_suffix('/').unwrap_or(rest);
        if name.is_empty() || name.contains('/') || name.starts_with('.') {
            return None;
        }
        Some(rest.to_string())
    }
}

#[async_trait]
impl Scraper for HtmlIndexScraper {
    fn id(&self) -> &str {
        "html-index"
    }

    fn priority(&self) -> i32 {
        1000
    }

    async fn scrape(&self, ctx: &mut ScrapeContext) -> std::result::Result<(), BoxError> {
        let root = ctx.root_page();
        if !root.response.is_success() {
            return Ok(());
        }
        let root_links = Self::links(&ctx.page_url("/")?, &root.response.body_text());
        if root_links.is_empty() {
            return Ok(());
        }

        let mut tree = ParentTree::new();
        let mut pending = vec![("/".to_string(), root_links)];
        while let Some((base, links)) = pending.pop() {
            if ctx.is_cancelled() {
                return Ok(());
            }
            for link in links {
                let is_dir = link.ends_with('/');
                let name = link.trim_end_matches('/');
                let path = normalize(&format!("{base}/{name}"), usize::MAX);
                let path_depth = depth(&path);
                if !is_dir {
                    if path_depth == 1 {
                        tree.add_path(&path);
                    }
                    continue;
                }
                tree.add_path(&path);
                if path_depth < ctx.depth() {
                    let page_path = format!("{path}/");
                    let page = ctx.fetch(&page_path).await?;
                    if page.response.is_success() {
                        let page_url = ctx.page_url(&page_path)?;
                        pending.push((path, Self::links(&page_url, &page.response.body_text())));
                    }
                }
            }
        }

        tree.cut(ctx.depth());
        let entries = tree.leaf_paths();
        if entries.is_empty() {
            ctx.stop_with_failure("Remote index page lists no content.");
        } else {
            let message = format!("Remote scraped by {} scraper.", self.id());
            ctx.stop_with_success(entries, message);
        }
        Ok(())
    }
}

/// Crawls the remote's pages with the configured scrapers. Runs last.
pub struct ScrapeStrategy {
    scrapers: Vec<Arc<dyn Scraper>>,
    depth: usize,
    blacklist: Arc<Blacklist>,
}

impl ScrapeStrategy {
    pub fn new(mut scrapers: Vec<Arc<dyn Scraper>>, depth: usize, blacklist: Arc<Blacklist>) -> Self {
        scrapers.sort_by_key(|s| s.priority());
        Self {
            scrapers,
            depth,
            blacklist,
        }
    }
}

#[async_trait]
impl RemoteStrategy for ScrapeStrategy {
    fn id(&self) -> &str {
        SCRAPE_STRATEGY_ID
    }

    fn priority(&self) -> i32 {
        i32::MAX
    }

    async fn discover(&self, ctx: &StrategyContext<'_>) -> StrategyOutcome {
        let root = match ctx.fetch("/").await {
            Ok(root) => root,
            Err(e) => return StrategyOutcome::Errored(e),
        };
        if let Some(reason) = self.blacklist.check(&root) {
            return StrategyOutcome::Disabled(reason);
        }

        let mut scrape = ScrapeContext::new(
            ctx.client.clone(),
            ctx.proxy.remote_url.clone(),
            self.depth,
            ctx.cancel.clone(),
            Page {
                path: "/".to_string(),
                response: root,
            },
        );

        for scraper in &self.scrapers {
            if scrape.is_cancelled() {
                return StrategyOutcome::Errored(RoutingError::Cancelled);
            }
            if let Err(e) = scraper.scrape(&mut scrape).await {
                if scrape.is_cancelled() {
                    return StrategyOutcome::Errored(RoutingError::Cancelled);
                }
                tracing::debug!(
                    repository = %ctx.repository.id,
                    scraper = scraper.id(),
                    "Scraper failed: {}",
                    e
                );
                continue;
            }
            if let Some(stop) = scrape.stop.take() {
                if !stop.success {
                    return StrategyOutcome::Disabled(stop.message);
                }
                let mut seen = HashSet::new();
                let entries = stop
                    .entries
                    .iter()
                    .map(|e| normalize(e, self.depth))
                    .filter(|e| e != "/" && seen.insert(e.clone()))
                    .collect();
                return StrategyOutcome::Success {
                    message: stop.message,
                    entries,
                    last_modified: None,
                };
            }
        }
        if scrape.is_cancelled() {
            return StrategyOutcome::Errored(RoutingError::Cancelled);
        }
        StrategyOutcome::Failed(
            "No scraper was able to scrape remote (or remote prevents scraping).".to_string(),
        )
    }
}
