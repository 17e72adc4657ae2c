use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tokio::fs;

const MAX_NAME_CHARS: usize = 120;

/// Replaces filesystem-hostile characters so display titles can name
/// files and directories on any platform.
pub fn sanitize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut chars = 0;
    for ch in title.trim().chars() {
        if chars == MAX_NAME_CHARS {
            break;
        }
        out.push(match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        });
        chars += 1;
    }
    let trimmed = out.trim_end_matches([' ', '.']).to_owned();
    if trimmed.is_empty() {
        "_".to_owned()
    } else {
        trimmed
    }
}

/// `vNN - <title>` directory name for one volume.
pub fn volume_dir_name(volume_index: usize, volume_title: &str) -> String {
    format!("v{volume_index:02} - {}", sanitize_title(volume_title))
}

/// `NN - <title>.html`, zero-padded to the volume's chapter count so the
/// files list in reading order.
pub fn chapter_file_name(chapter_index: usize, chapter_count: usize, title: &str) -> String {
    let width = chapter_count.to_string().len().max(2);
    format!(
        "{chapter_index:0width$} - {}.html",
        sanitize_title(title)
    )
}

/// Sentinel recording a failed chapter attempt, placed beside where the
/// chapter file would have been written.
pub fn marker_file_name(title: &str) -> String {
    format!("failed - {}.html.mark", sanitize_title(title))
}

/// Writes the assembled chapter: a synthesized `<h1>` heading carrying the
/// resolved title, then the ordered page content. Overwriting is allowed
/// so a re-run can replace a stale partial file from a crashed run.
pub async fn write_chapter(path: &Path, title: &str, body: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create chapter dir: {}", parent.display()))?;
    }

    let html = format!("<h1>{}</h1>\n{body}", escape_html_text(title));
    fs::write(path, html)
        .await
        .with_context(|| format!("write chapter: {}", path.display()))?;
    Ok(())
}

/// Records a failed attempt so a later run (or a human) can triage it.
/// Returns the marker path.
pub async fn write_failure_marker(
    dir: &Path,
    title: &str,
    url: &str,
    reason: &str,
) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("create marker dir: {}", dir.display()))?;

    let path = dir.join(marker_file_name(title));
    let body = format!(
        "url: {url}\nerror: {reason}\nat: {}\n",
        chrono::Utc::now().to_rfc3339()
    );
    fs::write(&path, body)
        .await
        .with_context(|| format!("write failure marker: {}", path.display()))?;
    Ok(path)
}

fn escape_html_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}
