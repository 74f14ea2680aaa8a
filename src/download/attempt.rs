//! Per-attempt transfer state.
//!
//! A [`TransferAttempt`] is created for the first attempt and replaced by
//! value for every following one, so each request is built from an explicit
//! snapshot (attempt number, resume offset, validator) instead of state
//! mutated across retries.

/// State of one attempt of a whole-file or part transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferAttempt {
    index: u32,
    resume_from: u64,
    validator: Option<String>,
}

impl TransferAttempt {
    /// First attempt, starting at byte zero.
    #[must_use]
    pub fn first(validator: Option<String>) -> Self {
        Self {
            index: 1,
            resume_from: 0,
            validator,
        }
    }

    /// First attempt of a call that continues a `.part` file of `offset` bytes.
    #[must_use]
    pub fn resuming(offset: u64, validator: Option<String>) -> Self {
        Self {
            index: 1,
            resume_from: offset,
            validator,
        }
    }

    /// The attempt following this one, resuming at `resume_from`.
    #[must_use]
    pub fn next(self, resume_from: u64) -> Self {
        Self {
            index: self.index.saturating_add(1),
            resume_from,
            validator: self.validator,
        }
    }

    /// Same attempt number, restarted from byte zero.
    #[must_use]
    pub fn restarted(self) -> Self {
        Self {
            resume_from: 0,
            ..self
        }
    }

    /// Replaces the validator if the server sent a new one.
    #[must_use]
    pub fn with_validator(self, validator: Option<String>) -> Self {
        match validator {
            Some(v) => Self {
                validator: Some(v),
                ..self
            },
            None => self,
        }
    }

    /// Attempt number, starting at 1.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[must_use]
    pub fn resume_from(&self) -> u64 {
        self.resume_from
    }

    #[must_use]
    pub fn validator(&self) -> Option<&str> {
        self.validator.as_deref()
    }

    #[must_use]
    pub fn is_resume(&self) -> bool {
        self.resume_from > 0
    }

    /// Open-ended `Range` header for a resumed whole-file transfer.
    #[must_use]
    pub fn range_header(&self) -> Option<String> {
        self.is_resume()
            .then(|| format!("bytes={}-", self.resume_from))
    }

    /// `If-Range` header accompanying [`Self::range_header`].
    #[must_use]
    pub fn if_range_header(&self) -> Option<&str> {
        if self.is_resume() {
            self.validator()
        } else {
            None
        }
    }
}
