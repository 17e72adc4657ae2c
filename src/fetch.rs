use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

/// One fetched page's parsed content plus completion metadata.
///
/// `title` is only meaningful on page 1 (the first page a site serves is
/// where the real chapter title shows up after parsing); `next_chapter_url`
/// is emitted by sites that expose chapter-to-chapter links inline.
#[derive(Debug, Clone, Default)]
pub struct PageFragment {
    pub page_number: u32,
    pub content: String,
    pub is_last: bool,
    pub title: Option<String>,
    pub next_chapter_url: Option<String>,
}

/// The fetch side of the pipeline. Implementations issue the actual
/// network requests and follow next-page links within a chapter on their
/// own; the orchestrator only triggers the first fetch.
#[async_trait]
pub trait ChapterSource: Send + Sync {
    /// Triggers the fetch for the chapter starting at `key` and returns
    /// once the fetch is underway. Fragments arrive on `tx` in whatever
    /// order the underlying requests resolve; dropping `tx` without a
    /// last-page fragment signals failure.
    async fn fetch_chapter(&self, key: &Url, tx: mpsc::Sender<PageFragment>)
    -> anyhow::Result<()>;
}

/// Chapter keys already claimed during this run. Protects against duplicate
/// traversal when the table of contents and an inline next-chapter link
/// both reach the same chapter.
#[derive(Debug, Default)]
pub struct VisitedUrls {
    seen: Mutex<HashSet<String>>,
}

impl VisitedUrls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key` for the caller. Returns false if another orchestration
    /// already claimed it.
    pub fn claim(&self, key: &Url) -> bool {
        self.seen
            .lock()
            .expect("visited url set lock is poisoned")
            .insert(key.as_str().to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::VisitedUrls;
    use url::Url;

    #[test]
    fn claim_is_first_come_first_served() {
        let visited = VisitedUrls::new();
        let url = Url::parse("https://example.com/ch1").unwrap();
        assert!(visited.claim(&url));
        assert!(!visited.claim(&url));
        assert!(visited.claim(&Url::parse("https://example.com/ch2").unwrap()));
    }
}
