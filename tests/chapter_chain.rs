use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use chapterbind::fetch::{ChapterSource, PageFragment, VisitedUrls};
use chapterbind::orchestrate::{ChapterDescriptor, ChapterOutcome, ChapterServices, run_chain};
use chapterbind::resume::ResumeMap;

#[derive(Clone)]
enum Script {
    /// Send the fragments, then close the channel.
    Pages(Vec<PageFragment>),
    /// Send the fragments, then keep the channel open without a sentinel.
    Stall(Vec<PageFragment>),
}

#[derive(Default)]
struct ScriptedSource {
    scripts: HashMap<String, Script>,
    fetches: AtomicUsize,
}

impl ScriptedSource {
    fn with(mut self, url: &str, script: Script) -> Self {
        self.scripts.insert(url.to_owned(), script);
        self
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChapterSource for ScriptedSource {
    async fn fetch_chapter(
        &self,
        key: &Url,
        tx: mpsc::Sender<PageFragment>,
    ) -> anyhow::Result<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.get(key.as_str()).cloned();

        tokio::spawn(async move {
            match script {
                // No script: drop tx immediately, i.e. the request failed.
                None => {}
                Some(Script::Pages(fragments)) => {
                    for fragment in fragments {
                        if tx.send(fragment).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Script::Stall(fragments)) => {
                    for fragment in fragments {
                        if tx.send(fragment).await.is_err() {
                            return;
                        }
                    }
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    drop(tx);
                }
            }
        });

        Ok(())
    }
}

fn page(page_number: u32, content: &str, is_last: bool) -> PageFragment {
    PageFragment {
        page_number,
        content: content.to_owned(),
        is_last,
        ..PageFragment::default()
    }
}

async fn services(
    out_dir: &Path,
    source: Arc<ScriptedSource>,
    deadline: Duration,
) -> ChapterServices {
    ChapterServices {
        resume: Arc::new(
            ResumeMap::load(out_dir.join("resume.json"))
                .await
                .expect("load resume map"),
        ),
        source,
        visited: Arc::new(VisitedUrls::new()),
        out_dir: out_dir.to_path_buf(),
        chapter_deadline: deadline,
    }
}

fn descriptor(url: &str, chapter_index: usize, chapter_count: usize) -> ChapterDescriptor {
    ChapterDescriptor {
        volume_index: 1,
        chapter_index,
        chapter_count,
        title: format!("Chapter {chapter_index}"),
        key: Url::parse(url).expect("parse chapter url"),
        volume_dir: PathBuf::from("v01 - Volume One"),
    }
}

#[tokio::test]
async fn out_of_order_two_page_chapter_completes_in_page_order() {
    let temp = tempfile::TempDir::new().unwrap();
    let mut first = page(1, "<p>page one</p>", false);
    first.title = Some("Intro".to_owned());
    let second = page(2, "<p>page two</p>", true);

    // Page 2 (the sentinel) is delivered before page 1.
    let source = Arc::new(
        ScriptedSource::default().with(
            "https://example.com/ch1",
            Script::Pages(vec![second, first]),
        ),
    );
    let services = services(temp.path(), Arc::clone(&source), Duration::from_secs(1)).await;

    let outcomes = run_chain(&services, descriptor("https://example.com/ch1", 1, 1))
        .await
        .unwrap();

    let expected_file = PathBuf::from("v01 - Volume One").join("01 - Intro.html");
    assert_eq!(
        outcomes,
        vec![ChapterOutcome::Completed {
            file: expected_file.clone()
        }]
    );

    let written = std::fs::read_to_string(temp.path().join(&expected_file)).unwrap();
    assert!(written.starts_with("<h1>Intro</h1>\n"), "got: {written}");
    let one = written.find("page one").unwrap();
    let two = written.find("page two").unwrap();
    assert!(one < two, "pages out of order: {written}");

    let record = services
        .resume
        .lookup("https://example.com/ch1")
        .await
        .expect("resume entry");
    assert_eq!(record.title, "Intro");
    assert!(temp.path().join("resume.json").exists());
}

#[tokio::test]
async fn completed_chapter_is_skipped_on_rerun() {
    let temp = tempfile::TempDir::new().unwrap();
    let source = Arc::new(ScriptedSource::default().with(
        "https://example.com/ch1",
        Script::Pages(vec![page(1, "<p>body</p>", true)]),
    ));

    let first_run = services(temp.path(), Arc::clone(&source), Duration::from_secs(1)).await;
    let outcomes = run_chain(&first_run, descriptor("https://example.com/ch1", 1, 1))
        .await
        .unwrap();
    assert!(matches!(outcomes[0], ChapterOutcome::Completed { .. }));
    assert_eq!(source.fetch_count(), 1);

    let file = temp
        .path()
        .join("v01 - Volume One")
        .join("01 - Chapter 1.html");
    let before = std::fs::read_to_string(&file).unwrap();

    // Fresh services reload the resume map, as a new invocation would.
    let second_run = services(temp.path(), Arc::clone(&source), Duration::from_secs(1)).await;
    let outcomes = run_chain(&second_run, descriptor("https://example.com/ch1", 1, 1))
        .await
        .unwrap();

    assert_eq!(outcomes, vec![ChapterOutcome::Skipped]);
    assert_eq!(source.fetch_count(), 1, "no fetch on skip");
    assert_eq!(std::fs::read_to_string(&file).unwrap(), before);
}

#[tokio::test]
async fn missing_file_forces_a_refetch_despite_resume_entry() {
    let temp = tempfile::TempDir::new().unwrap();
    let source = Arc::new(ScriptedSource::default().with(
        "https://example.com/ch1",
        Script::Pages(vec![page(1, "<p>body</p>", true)]),
    ));

    let first_run = services(temp.path(), Arc::clone(&source), Duration::from_secs(1)).await;
    run_chain(&first_run, descriptor("https://example.com/ch1", 1, 1))
        .await
        .unwrap();

    let file = temp
        .path()
        .join("v01 - Volume One")
        .join("01 - Chapter 1.html");
    std::fs::remove_file(&file).unwrap();

    let second_run = services(temp.path(), Arc::clone(&source), Duration::from_secs(1)).await;
    let outcomes = run_chain(&second_run, descriptor("https://example.com/ch1", 1, 1))
        .await
        .unwrap();

    assert!(matches!(outcomes[0], ChapterOutcome::Completed { .. }));
    assert_eq!(source.fetch_count(), 2);
    assert!(file.exists());
}

#[tokio::test]
async fn timeout_writes_marker_and_no_chapter_file() {
    let temp = tempfile::TempDir::new().unwrap();
    let source = Arc::new(ScriptedSource::default().with(
        "https://example.com/ch1",
        Script::Stall(vec![page(1, "<p>partial</p>", false)]),
    ));
    let services = services(temp.path(), source, Duration::from_millis(50)).await;

    let outcomes = run_chain(&services, descriptor("https://example.com/ch1", 1, 1))
        .await
        .unwrap();

    assert_eq!(outcomes, vec![ChapterOutcome::TimedOut]);
    let volume_dir = temp.path().join("v01 - Volume One");
    let marker = volume_dir.join("failed - Chapter 1.html.mark");
    assert!(marker.exists());
    let body = std::fs::read_to_string(&marker).unwrap();
    assert!(body.contains("download timeout"), "got: {body}");
    assert!(!volume_dir.join("01 - Chapter 1.html").exists());
    assert!(
        services
            .resume
            .lookup("https://example.com/ch1")
            .await
            .is_none()
    );
}

#[tokio::test]
async fn closed_channel_writes_request_failed_marker() {
    let temp = tempfile::TempDir::new().unwrap();
    // No script for the url: the source drops the sender immediately.
    let source = Arc::new(ScriptedSource::default());
    let services = services(temp.path(), source, Duration::from_secs(1)).await;

    let outcomes = run_chain(&services, descriptor("https://example.com/ch1", 1, 1))
        .await
        .unwrap();

    assert_eq!(outcomes, vec![ChapterOutcome::Failed]);
    let marker = temp
        .path()
        .join("v01 - Volume One")
        .join("failed - Chapter 1.html.mark");
    let body = std::fs::read_to_string(&marker).unwrap();
    assert!(body.contains("request failed"), "got: {body}");
}

#[tokio::test]
async fn chain_follows_next_chapter_links_until_the_volume_boundary() {
    let temp = tempfile::TempDir::new().unwrap();

    let mut ch1_page = page(1, "<p>one</p>", true);
    ch1_page.title = Some("First".to_owned());
    ch1_page.next_chapter_url = Some("https://example.com/ch2".to_owned());

    let mut ch2_page = page(1, "<p>two</p>", true);
    ch2_page.title = Some("Second".to_owned());
    // A link past the volume boundary; it must not be followed.
    ch2_page.next_chapter_url = Some("https://example.com/ch3".to_owned());

    let source = Arc::new(
        ScriptedSource::default()
            .with("https://example.com/ch1", Script::Pages(vec![ch1_page]))
            .with("https://example.com/ch2", Script::Pages(vec![ch2_page]))
            .with(
                "https://example.com/ch3",
                Script::Pages(vec![page(1, "<p>three</p>", true)]),
            ),
    );
    let services = services(temp.path(), Arc::clone(&source), Duration::from_secs(1)).await;

    let outcomes = run_chain(&services, descriptor("https://example.com/ch1", 1, 2))
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, ChapterOutcome::Completed { .. }))
    );
    assert_eq!(source.fetch_count(), 2, "boundary chapter must not chain");

    let volume_dir = temp.path().join("v01 - Volume One");
    assert!(volume_dir.join("01 - First.html").exists());
    assert!(volume_dir.join("02 - Second.html").exists());
    assert!(
        services
            .resume
            .lookup("https://example.com/ch3")
            .await
            .is_none()
    );
}

#[tokio::test]
async fn chained_chapter_already_visited_is_skipped() {
    let temp = tempfile::TempDir::new().unwrap();

    let mut ch1_page = page(1, "<p>one</p>", true);
    ch1_page.next_chapter_url = Some("https://example.com/ch2".to_owned());

    let source = Arc::new(
        ScriptedSource::default()
            .with("https://example.com/ch1", Script::Pages(vec![ch1_page]))
            .with(
                "https://example.com/ch2",
                Script::Pages(vec![page(1, "<p>two</p>", true)]),
            ),
    );
    let services = services(temp.path(), Arc::clone(&source), Duration::from_secs(1)).await;

    // Another discovery path claimed ch2 first.
    assert!(
        services
            .visited
            .claim(&Url::parse("https://example.com/ch2").unwrap())
    );

    let outcomes = run_chain(&services, descriptor("https://example.com/ch1", 1, 2))
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(matches!(outcomes[0], ChapterOutcome::Completed { .. }));
    assert_eq!(outcomes[1], ChapterOutcome::Skipped);
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn unsupported_scheme_is_a_silent_skip() {
    let temp = tempfile::TempDir::new().unwrap();
    let source = Arc::new(ScriptedSource::default());
    let services = services(temp.path(), Arc::clone(&source), Duration::from_secs(1)).await;

    let outcomes = run_chain(&services, descriptor("javascript:void(0)", 1, 1))
        .await
        .unwrap();

    assert_eq!(outcomes, vec![ChapterOutcome::Skipped]);
    assert_eq!(source.fetch_count(), 0);
}
