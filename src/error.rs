//! Error taxonomy for the ingestion pipeline.
//!
//! None of these are fatal to the process. Parse failures and policy
//! rejections route the file to quarantine, duplicates are tallied, backend
//! write failures are logged, and a colliding refresh trigger is dropped.

use std::path::PathBuf;

use crate::extract::ExtractError;

/// Why the policy filter refused a candidate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyRejection {
    #[error("file size {size} exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
    #[error("language '{language}' is not accepted")]
    Language { language: String },
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ExtractError,
    },

    #[error("{} rejected: {reason}", .path.display())]
    PolicyRejection {
        path: PathBuf,
        #[source]
        reason: PolicyRejection,
    },

    #[error("identity '{hash}' is already in the catalog ({})", .path.display())]
    DuplicateIdentity { hash: String, path: PathBuf },

    #[error("search backend rejected a batch of {records} records: {message}")]
    BackendWrite { records: usize, message: String },

    #[error("refresh already running")]
    RefreshAlreadyRunning,

    #[error("discovery failed: {0}")]
    Discovery(String),
}

impl IngestError {
    /// Parse failures and policy rejections both end up in quarantine.
    pub fn is_quarantined(&self) -> bool {
        matches!(
            self,
            IngestError::Parse { .. } | IngestError::PolicyRejection { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarantine_classification() {
        let parse = IngestError::Parse {
            path: PathBuf::from("a.epub"),
            source: ExtractError::MissingEntry("META-INF/container.xml".to_string()),
        };
        let rejected = IngestError::PolicyRejection {
            path: PathBuf::from("b.epub"),
            reason: PolicyRejection::Language {
                language: "fr".to_string(),
            },
        };
        assert!(parse.is_quarantined());
        assert!(rejected.is_quarantined());
        assert!(!IngestError::RefreshAlreadyRunning.is_quarantined());
    }

    #[test]
    fn messages_name_the_file() {
        let err = IngestError::PolicyRejection {
            path: PathBuf::from("big.epub"),
            reason: PolicyRejection::TooLarge { size: 20, limit: 10 },
        };
        let msg = err.to_string();
        assert!(msg.contains("big.epub"));
        assert!(msg.contains("exceeds limit of 10 bytes"));
    }
}
