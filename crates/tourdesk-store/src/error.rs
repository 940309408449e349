//! Storage errors

use tourdesk_core::CrmError;

/// Result alias for every store operation
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Domain rule refused the operation
    #[error(transparent)]
    Domain(#[from] CrmError),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row no longer decodes into a domain value
    #[error("corrupt row: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for StoreError {
    /// A lock held by another writer past the busy timeout reads as a conflict
    fn from(err: sqlx::Error) -> Self {
        if is_busy(&err) {
            return Self::Domain(CrmError::Conflict(
                "database is busy with another change, retry".to_string(),
            ));
        }
        Self::Database(err)
    }
}

/// `SQLITE_BUSY` or `SQLITE_LOCKED`, including their extended codes
fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
        _ => false,
    }
}

impl StoreError {
    #[must_use]
    pub fn domain(&self) -> Option<&CrmError> {
        match self {
            Self::Domain(err) => Some(err),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.domain().is_some_and(CrmError::is_not_found)
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.domain().is_some_and(CrmError::is_conflict)
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        self.domain().is_some_and(CrmError::is_validation)
    }

    /// Map a unique-index violation to a domain conflict; other errors pass through
    pub(crate) fn on_unique(err: sqlx::Error, conflict: impl FnOnce() -> CrmError) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Domain(conflict()),
            _ => err.into(),
        }
    }
}
