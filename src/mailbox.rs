//! The mailbox collaborator and the labels the harvester keeps on it.

use async_trait::async_trait;

use crate::error::MailboxError;
use crate::models::RawMessage;

pub type MailboxResult<T> = std::result::Result<T, MailboxError>;

/// System label removed to mark a message read.
pub const UNREAD_LABEL: &str = "UNREAD";

/// What the harvester needs from a mailbox.
///
/// Every call may fail with a transient, permanent or auth [`MailboxError`];
/// only transient failures are retried by the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Refresh or reissue credentials. Called once per polling tick.
    async fn authenticate(&self) -> MailboxResult<()>;

    /// Ids of messages matching `query`, in mailbox order.
    async fn list_unread(&self, query: &str) -> MailboxResult<Vec<String>>;

    async fn get(&self, id: &str) -> MailboxResult<RawMessage>;

    /// Id of the label called `name`, creating it if it does not exist.
    async fn ensure_label(&self, name: &str) -> MailboxResult<String>;

    async fn modify_labels(&self, id: &str, add: &[String], remove: &[String]) -> MailboxResult<()>;

    async fn send(&self, to: &str, subject: &str, body: &str) -> MailboxResult<()>;
}

/// The six labels applied to processed alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKind {
    FetchedOk,
    FetchedFail,
    ScrapedOk,
    ScrapedFail,
    FinalOk,
    FinalFail,
}

impl LabelKind {
    pub const ALL: [Self; 6] = [
        Self::FetchedOk,
        Self::FetchedFail,
        Self::ScrapedOk,
        Self::ScrapedFail,
        Self::FinalOk,
        Self::FinalFail,
    ];

    /// Label name as shown in the mailbox.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::FetchedOk => "email fetched successfully",
            Self::FetchedFail => "failed fetching",
            Self::ScrapedOk => "successfully scraped",
            Self::ScrapedFail => "failed scraping",
            Self::FinalOk => "success",
            Self::FinalFail => "failure",
        }
    }
}

/// Resolved label ids for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    ids: [String; 6],
}

impl LabelSet {
    /// Builds a set from ids ordered like [`LabelKind::ALL`].
    #[must_use]
    pub const fn from_ids(ids: [String; 6]) -> Self {
        Self { ids }
    }

    #[must_use]
    pub fn id(&self, kind: LabelKind) -> &str {
        let index = LabelKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or_default();
        &self.ids[index]
    }

    /// Labels to add and remove when finalizing a message at `stage`.
    ///
    /// Every outcome removes `UNREAD`, so labeling and marking read happen
    /// in the same call.
    #[must_use]
    pub fn finalize_changes(&self, stage: Stage) -> (Vec<String>, Vec<String>) {
        let add: &[LabelKind] = match stage {
            Stage::Done => &[LabelKind::FetchedOk, LabelKind::ScrapedOk, LabelKind::FinalOk],
            Stage::Fetch => &[LabelKind::FetchedFail, LabelKind::FinalFail],
            Stage::Scrape => &[LabelKind::FetchedOk, LabelKind::ScrapedFail, LabelKind::FinalFail],
        };
        let mut remove = vec![UNREAD_LABEL.to_string()];
        if stage == Stage::Done {
            remove.push(self.id(LabelKind::FinalFail).to_string());
        }
        (add.iter().map(|kind| self.id(*kind).to_string()).collect(), remove)
    }
}

/// How far a message got before it was finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Fetching or decoding the message failed
    Fetch,
    /// Extraction or persistence failed
    Scrape,
    /// Fully processed
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> LabelSet {
        LabelSet::from_ids(["L1", "L2", "L3", "L4", "L5", "L6"].map(String::from))
    }

    #[test]
    fn success_adds_all_ok_labels_and_marks_read() {
        let (add, remove) = labels().finalize_changes(Stage::Done);
        assert_eq!(add, vec!["L1", "L3", "L5"]);
        assert_eq!(remove, vec!["UNREAD", "L6"]);
    }

    #[test]
    fn scrape_failure_keeps_fetch_ok() {
        let (add, remove) = labels().finalize_changes(Stage::Scrape);
        assert_eq!(add, vec!["L1", "L4", "L6"]);
        assert_eq!(remove, vec!["UNREAD"]);
    }
}
