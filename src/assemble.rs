use crate::fetch::PageFragment;

/// Ordered buffer of page fragments. Fragments may arrive in any order
/// because the underlying fetches are asynchronous; insertion keeps the
/// list sorted by page number so no separate sort step is needed.
#[derive(Debug, Default)]
pub struct PageAssembler {
    pages: Vec<PageFragment>,
}

impl PageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Places `fragment` at the position dictated by its page number. A
    /// fragment with an already-present page number replaces the old one
    /// (last write wins, so duplicate or retried fetches are harmless).
    pub fn insert(&mut self, fragment: PageFragment) {
        match self
            .pages
            .iter()
            .position(|page| page.page_number >= fragment.page_number)
        {
            Some(idx) if self.pages[idx].page_number == fragment.page_number => {
                self.pages[idx] = fragment;
            }
            Some(idx) => self.pages.insert(idx, fragment),
            None => self.pages.push(fragment),
        }
    }

    /// True when pages 1..=`last_page` are all present. The list is sorted
    /// and duplicate-free, so endpoints plus length prove contiguity.
    pub fn is_complete(&self, last_page: u32) -> bool {
        self.pages.len() as u32 == last_page
            && self.pages.first().is_some_and(|p| p.page_number == 1)
            && self.pages.last().is_some_and(|p| p.page_number == last_page)
    }

    /// Concatenates payloads in ascending page-number order. Called once,
    /// after completion is detected; the list is never touched again.
    pub fn flatten(self) -> String {
        let mut out = String::new();
        for page in &self.pages {
            out.push_str(&page.content);
            if !page.content.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }
}
