use std::collections::HashSet;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use tokio::sync::mpsc;
use url::Url;

use crate::cli::ParserMode;
use crate::fetch::{ChapterSource, PageFragment};

/// Reference `ChapterSource` that walks a chapter page by page over HTTP.
///
/// Traversal understands two markup conventions (site-specific selector
/// scraping stays behind the `ChapterSource` seam):
/// - `plain`: the whole `<body>` is the chapter; every page is the last.
/// - `paged`: a link or anchor with `rel="next"` points at the next page
///   of the same chapter, `rel="next-chapter"` at the following chapter;
///   the last page is the one without a `rel="next"` link.
#[derive(Debug, Clone)]
pub struct HttpChapterSource {
    client: reqwest::Client,
    mode: ParserMode,
    delay: Duration,
}

impl HttpChapterSource {
    pub fn new(mode: ParserMode, delay: Duration, page_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(page_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build chapter http client")?;

        Ok(Self {
            client,
            mode,
            delay,
        })
    }

    async fn fetch_page(&self, url: &Url) -> anyhow::Result<String> {
        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, "chapterbind/0.1")
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        if !response.status().is_success() {
            anyhow::bail!("GET {url}: status {}", response.status());
        }

        response
            .text()
            .await
            .with_context(|| format!("read body: {url}"))
    }

    async fn walk_chapter(&self, start: Url, tx: mpsc::Sender<PageFragment>) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        let mut current = start;
        let mut page_number = 1u32;

        loop {
            if !seen.insert(current.as_str().to_owned()) {
                anyhow::bail!("next-page link cycle at {current}");
            }

            let html = self.fetch_page(&current).await?;
            let parsed = parse_page(self.mode, &current, &html);
            let next_page = parsed.next_page;

            let fragment = PageFragment {
                page_number,
                content: parsed.content,
                is_last: next_page.is_none(),
                title: if page_number == 1 { parsed.title } else { None },
                next_chapter_url: parsed.next_chapter,
            };
            if tx.send(fragment).await.is_err() {
                // Receiver gave up (deadline elapsed); nobody is listening.
                return Ok(());
            }

            let Some(next) = next_page else {
                return Ok(());
            };
            current = current
                .join(&next)
                .with_context(|| format!("resolve next-page link: {next}"))?;
            page_number += 1;

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }
    }
}

#[async_trait]
impl ChapterSource for HttpChapterSource {
    async fn fetch_chapter(
        &self,
        key: &Url,
        tx: mpsc::Sender<PageFragment>,
    ) -> anyhow::Result<()> {
        let source = self.clone();
        let key = key.clone();

        tokio::spawn(async move {
            if let Err(err) = source.walk_chapter(key.clone(), tx).await {
                // Dropping tx without a last-page fragment is the failure
                // signal the waiter listens for.
                tracing::warn!(url = %key, error = ?err, "chapter fetch failed");
            }
        });

        Ok(())
    }
}

struct ParsedPage {
    content: String,
    title: Option<String>,
    next_page: Option<String>,
    next_chapter: Option<String>,
}

fn parse_page(mode: ParserMode, url: &Url, html: &str) -> ParsedPage {
    let content = extract_body_fragment(html);
    let title = extract_title(html);

    match mode {
        ParserMode::Plain => ParsedPage {
            content,
            title,
            next_page: None,
            next_chapter: None,
        },
        ParserMode::Paged => ParsedPage {
            content,
            title,
            next_page: find_rel_href(html, "next"),
            next_chapter: find_rel_href(html, "next-chapter")
                .and_then(|href| url.join(&href).ok())
                .map(|absolute| absolute.to_string()),
        },
    }
}

/// Returns the inner `<body>` when present, otherwise the whole document.
fn extract_body_fragment(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let Some(body_idx) = lower.find("<body") else {
        return html.trim().to_owned();
    };
    let Some(open_end) = lower[body_idx..].find('>') else {
        return html.trim().to_owned();
    };

    let start = body_idx + open_end + 1;
    match lower[start..].find("</body>") {
        Some(close) => html[start..start + close].trim().to_owned(),
        None => html[start..].trim().to_owned(),
    }
}

fn extract_title(html: &str) -> Option<String> {
    tag_text(html, "title").or_else(|| tag_text(html, "h1"))
}

fn tag_text(html: &str, tag: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    let open_idx = lower.find(&open)?;
    let content_start = open_idx + lower[open_idx..].find('>')? + 1;
    let content_end = content_start + lower[content_start..].find(&close)?;

    let text = html[content_start..content_end].trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_owned())
    }
}

/// Finds the `href` of the first tag whose `rel` attribute equals `rel`.
/// Attribute order within the tag is not assumed.
fn find_rel_href(html: &str, rel: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let needle = format!("rel=\"{rel}\"");

    let mut search_from = 0;
    while let Some(found) = lower[search_from..].find(&needle) {
        let rel_idx = search_from + found;
        let tag_start = lower[..rel_idx].rfind('<')?;
        let tag_end = rel_idx + lower[rel_idx..].find('>')?;

        // Byte offsets line up because ASCII lowercasing preserves length.
        if let Some(href) = attr_value(&html[tag_start..=tag_end], "href") {
            return Some(href);
        }
        search_from = tag_end + 1;
    }

    None
}

fn attr_value(tag: &str, name: &str) -> Option<String> {
    let lower = tag.to_ascii_lowercase();
    let needle = format!("{name}=\"");

    let start = lower.find(&needle)? + needle.len();
    let end = start + tag[start..].find('"')?;

    let value = tag[start..end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_owned())
    }
}
