use serde::{Deserialize, Serialize};

/// Durable record of one completed chapter: which URL it came from and
/// which file (relative to the output root) it was saved under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResumeRecord {
    pub url: String,
    pub title: String,
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toc {
    pub book_title: String,
    pub volumes: Vec<TocVolume>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TocVolume {
    pub title: String,

    /// Total chapters in this volume. Defaults to the listed chapters; a
    /// larger value leaves room for chapters discovered through inline
    /// next-chapter links.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_count: Option<usize>,

    pub chapters: Vec<TocChapter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TocChapter {
    pub title: String,
    pub url: String,
}
