use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use url::Url;

use crate::cli::{DownloadArgs, StatusArgs};
use crate::fetch::VisitedUrls;
use crate::http_source::HttpChapterSource;
use crate::orchestrate::{self, ChapterDescriptor, ChapterOutcome, ChapterServices};
use crate::queue::DownloadQueue;
use crate::resume::ResumeMap;
use crate::{store, toc, waiter};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub timed_out: usize,
}

/// Downloads every chapter the TOC lists (plus chained discoveries), one
/// orchestration per chapter. Per-chapter failures never abort the run;
/// they are counted and reported.
pub async fn run(args: DownloadArgs) -> anyhow::Result<RunSummary> {
    let toc_path = PathBuf::from(&args.toc);
    let out_dir = PathBuf::from(&args.out);

    let toc = toc::load(&toc_path).context("load toc")?;
    tokio::fs::create_dir_all(&out_dir)
        .await
        .with_context(|| format!("create output dir: {}", out_dir.display()))?;

    let resume_path = args
        .resume_file
        .map(PathBuf::from)
        .unwrap_or_else(|| out_dir.join("resume.json"));
    let resume = Arc::new(
        ResumeMap::load(&resume_path)
            .await
            .context("load resume map")?,
    );

    let page_timeout = Duration::from_secs(args.page_timeout_secs);
    let source = Arc::new(
        HttpChapterSource::new(args.parser, Duration::from_millis(args.delay_ms), page_timeout)
            .context("build chapter source")?,
    );

    let services = Arc::new(ChapterServices {
        resume,
        source,
        visited: Arc::new(VisitedUrls::new()),
        out_dir,
        chapter_deadline: waiter::chapter_deadline(page_timeout, args.timeout_multiplier),
    });

    tracing::info!(book = %toc.book_title, volumes = toc.volumes.len(), "starting download");

    let queue = DownloadQueue::new(args.concurrency);
    let mut handles = Vec::new();

    for (volume_pos, volume) in toc.volumes.iter().enumerate() {
        let volume_index = volume_pos + 1;
        let chapter_count = toc::volume_chapter_count(volume);
        let volume_dir = PathBuf::from(store::volume_dir_name(volume_index, &volume.title));

        for (chapter_pos, chapter) in volume.chapters.iter().enumerate() {
            let key = Url::parse(&chapter.url)
                .with_context(|| format!("parse chapter url: {}", chapter.url))?;
            let descriptor = ChapterDescriptor {
                volume_index,
                chapter_index: chapter_pos + 1,
                chapter_count,
                title: chapter.title.clone(),
                key,
                volume_dir: volume_dir.clone(),
            };

            let services = Arc::clone(&services);
            handles.push(queue.spawn(async move {
                let url = descriptor.key.clone();
                match orchestrate::run_chain(&services, descriptor).await {
                    Ok(outcomes) => outcomes,
                    Err(err) => {
                        tracing::error!(url = %url, error = ?err, "chapter orchestration failed");
                        vec![ChapterOutcome::Failed]
                    }
                }
            }));
        }
    }

    let mut summary = RunSummary::default();
    for handle in handles {
        for outcome in handle.await.context("join chapter task")? {
            match outcome {
                ChapterOutcome::Completed { .. } => summary.completed += 1,
                ChapterOutcome::Skipped => summary.skipped += 1,
                ChapterOutcome::Failed => summary.failed += 1,
                ChapterOutcome::TimedOut => summary.timed_out += 1,
            }
        }
    }

    tracing::info!(
        completed = summary.completed,
        skipped = summary.skipped,
        failed = summary.failed,
        timed_out = summary.timed_out,
        "run finished"
    );
    Ok(summary)
}

/// Lists the chapters the resume map records as completed.
pub async fn status(args: StatusArgs) -> anyhow::Result<()> {
    let resume = ResumeMap::load(PathBuf::from(&args.resume_file))
        .await
        .context("load resume map")?;

    let records = resume.records().await;
    if records.is_empty() {
        println!("no completed chapters recorded");
        return Ok(());
    }
    for record in records {
        println!("{}\t{}\t{}", record.url, record.title, record.file);
    }

    Ok(())
}
