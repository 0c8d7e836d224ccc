//! Size and language acceptance rules.

use crate::config::ScanConfig;
use crate::error::PolicyRejection;
use crate::models::Candidate;
use crate::normalize::normalize_language;

#[derive(Debug, Clone, Default)]
pub struct PolicyFilter {
    max_size_bytes: u64,
    accepted_languages: Vec<String>,
}

impl PolicyFilter {
    pub fn new(max_size_bytes: u64, accepted_languages: Vec<String>) -> Self {
        Self {
            max_size_bytes,
            accepted_languages,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.max_size, config.accepted_languages.clone())
    }

    /// Check a candidate. The language is normalized before the allowlist
    /// lookup, which ignores case.
    pub fn check(&self, candidate: &Candidate) -> Result<(), PolicyRejection> {
        if self.max_size_bytes > 0 && candidate.size > self.max_size_bytes {
            return Err(PolicyRejection::TooLarge {
                size: candidate.size,
                limit: self.max_size_bytes,
            });
        }

        if !self.accepted_languages.is_empty() {
            let language = normalize_language(&candidate.language);
            let accepted = self
                .accepted_languages
                .iter()
                .any(|l| l.eq_ignore_ascii_case(&language));
            if !accepted {
                return Err(PolicyRejection::Language { language });
            }
        }

        Ok(())
    }

    pub fn accept(&self, candidate: &Candidate) -> bool {
        self.check(candidate).is_ok()
    }
}
