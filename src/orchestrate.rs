use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tokio::sync::mpsc;
use url::Url;

use crate::fetch::{ChapterSource, VisitedUrls};
use crate::formats::ResumeRecord;
use crate::resume::ResumeMap;
use crate::store;
use crate::waiter::{self, WaitOutcome};

/// Everything a chapter orchestration depends on, passed explicitly
/// instead of living in globals. Shared by all concurrent orchestrations;
/// the resume map is the only member with mutable state and it serializes
/// itself.
pub struct ChapterServices {
    pub resume: Arc<ResumeMap>,
    pub source: Arc<dyn ChapterSource>,
    pub visited: Arc<VisitedUrls>,
    pub out_dir: PathBuf,
    pub chapter_deadline: Duration,
}

/// One chapter slot from table-of-contents discovery. Immutable for the
/// duration of its download.
#[derive(Debug, Clone)]
pub struct ChapterDescriptor {
    pub volume_index: usize,
    /// 1-based index within the volume.
    pub chapter_index: usize,
    /// Total chapters in the volume; the chaining boundary.
    pub chapter_count: usize,
    pub title: String,
    pub key: Url,
    /// Volume directory, relative to the output root.
    pub volume_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterOutcome {
    Completed { file: PathBuf },
    Skipped,
    Failed,
    TimedOut,
}

/// Downloads `first` and then follows inline next-chapter links until the
/// volume boundary. Chaining is a loop, not recursion, so an arbitrarily
/// long chapter chain cannot grow the call stack.
pub async fn run_chain(
    services: &ChapterServices,
    first: ChapterDescriptor,
) -> anyhow::Result<Vec<ChapterOutcome>> {
    let mut outcomes = Vec::new();
    let mut next = Some(first);

    while let Some(chapter) = next.take() {
        let (outcome, chained) = download_chapter(services, &chapter).await?;
        outcomes.push(outcome);
        next = chained;
    }

    Ok(outcomes)
}

/// One chapter attempt: skip checks, fetch trigger, combined wait,
/// persistence, resume bookkeeping. Fetch failures and timeouts are
/// recorded via marker files and do not return an error; only persistence
/// problems propagate, leaving the resume map untouched so a later run
/// retries the chapter.
async fn download_chapter(
    services: &ChapterServices,
    chapter: &ChapterDescriptor,
) -> anyhow::Result<(ChapterOutcome, Option<ChapterDescriptor>)> {
    let key = &chapter.key;

    if key.scheme() != "http" && key.scheme() != "https" {
        tracing::debug!(url = %key, "unsupported chapter reference; skipping");
        return Ok((ChapterOutcome::Skipped, None));
    }
    if !services.visited.claim(key) {
        tracing::debug!(url = %key, "chapter already visited this run; skipping");
        return Ok((ChapterOutcome::Skipped, None));
    }

    // The map entry alone cannot prove the file survived an interrupted
    // run, so the skip check also requires the file on disk.
    if let Some(record) = services.resume.lookup(key.as_str()).await
        && services.out_dir.join(&record.file).exists()
    {
        tracing::info!(url = %key, file = %record.file, "already downloaded; skipping");
        return Ok((ChapterOutcome::Skipped, None));
    }

    tracing::info!(
        url = %key,
        volume = chapter.volume_index,
        chapter = chapter.chapter_index,
        "downloading chapter"
    );

    let volume_dir = services.out_dir.join(&chapter.volume_dir);
    let (tx, rx) = mpsc::channel(64);

    if let Err(err) = services.source.fetch_chapter(key, tx).await {
        tracing::warn!(url = %key, error = ?err, "request failed");
        store::write_failure_marker(&volume_dir, &chapter.title, key.as_str(), &format!("{err:#}"))
            .await
            .context("write failure marker")?;
        return Ok((ChapterOutcome::Failed, None));
    }

    let collected = waiter::collect(rx, services.chapter_deadline).await;
    match collected.outcome {
        WaitOutcome::Failed => {
            tracing::warn!(url = %key, "request failed");
            store::write_failure_marker(&volume_dir, &chapter.title, key.as_str(), "request failed")
                .await
                .context("write failure marker")?;
            return Ok((ChapterOutcome::Failed, None));
        }
        WaitOutcome::TimedOut => {
            tracing::warn!(url = %key, "download timeout");
            store::write_failure_marker(
                &volume_dir,
                &chapter.title,
                key.as_str(),
                "download timeout",
            )
            .await
            .context("write failure marker")?;
            return Ok((ChapterOutcome::TimedOut, None));
        }
        WaitOutcome::Done => {}
    }

    let title = collected.title.unwrap_or_else(|| chapter.title.clone());
    let file_name = store::chapter_file_name(chapter.chapter_index, chapter.chapter_count, &title);
    let path = volume_dir.join(&file_name);
    let pages = collected.assembler.len();
    let body = collected.assembler.flatten();
    store::write_chapter(&path, &title, &body)
        .await
        .with_context(|| format!("persist chapter: {}", path.display()))?;

    let relative = chapter.volume_dir.join(&file_name);
    services
        .resume
        .upsert(ResumeRecord {
            url: key.as_str().to_owned(),
            title: title.clone(),
            file: relative.to_string_lossy().into_owned(),
        })
        .await;
    services.resume.save().await.context("save resume map")?;
    tracing::info!(url = %key, file = %relative.display(), pages, "chapter completed");

    let chained = next_descriptor(chapter, collected.next_chapter_url.as_deref());
    Ok((ChapterOutcome::Completed { file: relative }, chained))
}

/// Builds the descriptor for an inline next-chapter link, or None at the
/// volume boundary. The title is a placeholder; page 1 of the chained
/// chapter supplies the real one.
fn next_descriptor(
    current: &ChapterDescriptor,
    next_url: Option<&str>,
) -> Option<ChapterDescriptor> {
    let next_url = next_url?;

    if current.chapter_index >= current.chapter_count {
        tracing::debug!(
            url = next_url,
            volume = current.volume_index,
            "volume boundary reached; not following next chapter"
        );
        return None;
    }

    let key = match Url::parse(next_url) {
        Ok(url) => url,
        Err(err) => {
            tracing::debug!(url = next_url, error = %err, "unparseable next-chapter link; ignoring");
            return None;
        }
    };

    let chapter_index = current.chapter_index + 1;
    Some(ChapterDescriptor {
        volume_index: current.volume_index,
        chapter_index,
        chapter_count: current.chapter_count,
        title: format!("Chapter {chapter_index}"),
        key,
        volume_dir: current.volume_dir.clone(),
    })
}
