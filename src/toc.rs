use std::path::Path;

use anyhow::Context as _;
use url::Url;

use crate::formats::{Toc, TocVolume};

/// Reads and validates a `toc.yaml` produced by a table-of-contents
/// scrape: volumes in order, each listing its chapters' first-page URLs.
pub fn load(path: &Path) -> anyhow::Result<Toc> {
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("read toc: {}", path.display()))?;
    let toc: Toc =
        serde_yaml::from_str(&yaml).with_context(|| format!("parse toc: {}", path.display()))?;
    validate(&toc)?;
    Ok(toc)
}

/// Total chapter slots in the volume; never below the listed chapters.
pub fn volume_chapter_count(volume: &TocVolume) -> usize {
    volume
        .chapter_count
        .unwrap_or(volume.chapters.len())
        .max(volume.chapters.len())
}

fn validate(toc: &Toc) -> anyhow::Result<()> {
    if toc.book_title.trim().is_empty() {
        anyhow::bail!("toc book_title is empty");
    }
    if toc.volumes.is_empty() {
        anyhow::bail!("toc lists no volumes");
    }

    for (idx, volume) in toc.volumes.iter().enumerate() {
        let volume_number = idx + 1;
        if volume.chapters.is_empty() {
            anyhow::bail!("volume {volume_number} ({}) lists no chapters", volume.title);
        }
        if let Some(count) = volume.chapter_count
            && count < volume.chapters.len()
        {
            anyhow::bail!(
                "volume {volume_number} ({}) declares chapter_count {count} but lists {} chapters",
                volume.title,
                volume.chapters.len()
            );
        }
        for chapter in &volume.chapters {
            Url::parse(&chapter.url).with_context(|| {
                format!(
                    "parse chapter url in volume {volume_number}: {}",
                    chapter.url
                )
            })?;
        }
    }

    Ok(())
}
