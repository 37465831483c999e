//! Inbound push webhook payload.

use serde::{Deserialize, Serialize};

/// Why a push was rejected before any run started.
#[derive(Debug, thiserror::Error)]
pub enum PushRejection {
    #[error("parsing request: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("expecting 1 commit")]
    CommitCount(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    #[serde(rename = "Username", alias = "username", default)]
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushCommit {
    #[serde(rename = "Message", alias = "message", default)]
    pub message: String,

    #[serde(rename = "URL", alias = "url", default)]
    pub url: String,

    #[serde(rename = "Author", alias = "author", default)]
    pub author: CommitAuthor,
}

/// A repository push, as delivered by the forge webhook.
///
/// Both the capitalised field names and GitHub's lowercase ones are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "Ref", alias = "ref", default)]
    pub git_ref: String,

    #[serde(rename = "After", alias = "after", default)]
    pub after: String,

    #[serde(rename = "Commits", alias = "commits", default)]
    pub commits: Vec<PushCommit>,
}

impl PushEvent {
    /// Decode and validate a raw request body.
    ///
    /// A push is accepted only when it carries exactly one commit.
    pub fn from_body(body: &[u8]) -> Result<Self, PushRejection> {
        let event: PushEvent = serde_json::from_slice(body)?;
        if event.commits.len() != 1 {
            return Err(PushRejection::CommitCount(event.commits.len()));
        }
        Ok(event)
    }

    /// The single commit of an accepted push.
    pub fn head_commit(&self) -> Option<&PushCommit> {
        self.commits.first()
    }

    /// Short form of the pushed commit hash for log lines.
    pub fn short_sha(&self) -> &str {
        self.after.get(..12).unwrap_or(&self.after)
    }
}
