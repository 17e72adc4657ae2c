use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::assemble::PageAssembler;
use crate::fetch::PageFragment;

/// Terminal state of one chapter attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A last-page fragment arrived.
    Done,
    /// No terminal signal arrived within the deadline.
    TimedOut,
    /// The fragment channel closed without a last-page fragment.
    Failed,
}

/// Everything the waiter gathered before reaching a terminal state.
#[derive(Debug)]
pub struct Collected {
    pub outcome: WaitOutcome,
    pub assembler: PageAssembler,
    /// Title override supplied by a fragment (page 1 carries the
    /// authoritative title once the site's markup has been parsed).
    pub title: Option<String>,
    /// Inline chapter-to-chapter link remembered for chaining.
    pub next_chapter_url: Option<String>,
}

/// Per-chapter deadline: a site-specific page timeout, optionally
/// multiplied to give slow sites more headroom per attempt.
pub fn chapter_deadline(page_timeout: Duration, multiplier: u32) -> Duration {
    page_timeout * multiplier.max(1)
}

/// Drains `rx` until a last-page fragment (`Done`), the channel closing
/// without one (`Failed`), or `deadline_in` elapsing (`TimedOut`). Each
/// received fragment is handed to a fresh assembler; the waiter is the
/// single rendezvous point that turns a stream of asynchronous events into
/// one definite outcome.
pub async fn collect(mut rx: mpsc::Receiver<PageFragment>, deadline_in: Duration) -> Collected {
    let deadline = Instant::now() + deadline_in;
    let mut assembler = PageAssembler::new();
    let mut title = None;
    let mut next_chapter_url = None;
    let mut last_page = None;

    let outcome = loop {
        let fragment = match tokio::time::timeout_at(deadline, rx.recv()).await {
            Err(_) => break WaitOutcome::TimedOut,
            Ok(None) => break WaitOutcome::Failed,
            Ok(Some(fragment)) => fragment,
        };

        tracing::debug!(
            page = fragment.page_number,
            is_last = fragment.is_last,
            "fragment received"
        );

        if let Some(t) = fragment.title.as_deref()
            && !t.trim().is_empty()
        {
            title = Some(t.trim().to_owned());
        }
        if let Some(next) = fragment.next_chapter_url.as_deref()
            && !next.trim().is_empty()
        {
            next_chapter_url = Some(next.trim().to_owned());
        }

        if fragment.is_last {
            last_page = Some(fragment.page_number);
        }
        assembler.insert(fragment);

        // The last-page flag alone is not enough: fragments resolve in any
        // order, so an earlier page may still be in flight when the
        // sentinel arrives. Done means sentinel seen and no gaps.
        if let Some(last) = last_page
            && assembler.is_complete(last)
        {
            break WaitOutcome::Done;
        }
    };

    Collected {
        outcome,
        assembler,
        title,
        next_chapter_url,
    }
}
