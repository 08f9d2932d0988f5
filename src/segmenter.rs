//! Locates the individual job postings inside an alert email.
//!
//! Every posting in an alert ends with a "N days ago" / "Just posted" line, so
//! the nearest `<tbody>` or `<table>` around such a line is taken to be one
//! posting.

use std::collections::HashSet;

use scraper::{ElementRef, Html};
use tracing::debug;

/// Lowercase markers that identify the age line of a posting.
pub const JOB_MARKERS: [&str; 3] = ["days ago", "day ago", "just posted"];

/// A table-like subtree believed to enclose exactly one posting.
#[derive(Debug, Clone, Copy)]
pub struct JobBlock<'a> {
    element: ElementRef<'a>,
}

impl<'a> JobBlock<'a> {
    #[must_use]
    pub const fn element(&self) -> ElementRef<'a> {
        self.element
    }

    /// Serialized markup of the block.
    #[must_use]
    pub fn html(&self) -> String {
        self.element.html()
    }
}

/// Whether a text node carries one of the [`JOB_MARKERS`].
#[must_use]
pub fn has_job_marker(text: &str) -> bool {
    let lowered = text.to_lowercase();
    JOB_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Finds the distinct job blocks of a parsed email, in first-seen order.
///
/// Containers are deduplicated by node identity, so two identical-looking
/// postings still produce two blocks. An empty result is not an error.
#[must_use]
pub fn find_job_blocks(document: &Html) -> Vec<JobBlock<'_>> {
    let mut seen = HashSet::new();
    let mut blocks = Vec::new();

    for node in document.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        if !has_job_marker(text) {
            continue;
        }

        let container = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|element| matches!(element.value().name(), "tbody" | "table"));

        if let Some(element) = container {
            if seen.insert(element.id()) {
                blocks.push(JobBlock { element });
            }
        }
    }

    debug!(blocks = blocks.len(), "Extracted job blocks");
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_match_is_case_insensitive() {
        assert!(has_job_marker("Just Posted"));
        assert!(has_job_marker("3 DAYS AGO"));
        assert!(has_job_marker("1 day ago"));
        assert!(!has_job_marker("Apply today"));
    }

    #[test]
    fn text_outside_tables_is_ignored() {
        let document = Html::parse_document("<html><body><p>3 days ago</p></body></html>");
        assert!(find_job_blocks(&document).is_empty());
    }
}
