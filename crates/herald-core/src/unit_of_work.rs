//! Unit of work: one logical operation, one transaction.

use tracing::warn;

use crate::error::DomainError;
use crate::store::{EventStore, StoreTransaction};

/// Lifecycle of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfWorkState {
    /// Created, no transaction opened yet.
    NotStarted,
    /// A transaction is open; the only state in which writes are legal.
    Active,
    /// The transaction committed.
    Committed,
    /// The transaction rolled back.
    RolledBack,
}

/// Scoped transactional boundary around one operation.
///
/// `begin` opens a transaction, `success` commits it and `fail` rolls it back
/// and hands the error back to the caller. Beginning while `Active` is an
/// error; a closed unit of work may be begun again.
pub struct UnitOfWork {
    state: UnitOfWorkState,
    transaction: Option<Box<dyn StoreTransaction>>,
}

impl UnitOfWork {
    /// Creates a unit of work in `NotStarted`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: UnitOfWorkState::NotStarted,
            transaction: None,
        }
    }

    /// Creates a unit of work and begins it against `store`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StoreUnavailable` if no transaction can be opened.
    pub async fn begun<S: EventStore + ?Sized>(store: &S) -> Result<Self, DomainError> {
        let mut unit_of_work = Self::new();
        unit_of_work.begin(store).await?;
        Ok(unit_of_work)
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> UnitOfWorkState {
        self.state
    }

    /// Opens a transaction against `store`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnitOfWork` if already `Active`, or the store's
    /// error if the transaction cannot be opened.
    pub async fn begin<S: EventStore + ?Sized>(&mut self, store: &S) -> Result<(), DomainError> {
        if self.state == UnitOfWorkState::Active {
            return Err(self.illegal("begin"));
        }
        self.transaction = Some(store.begin().await?);
        self.state = UnitOfWorkState::Active;
        Ok(())
    }

    /// The open transaction, for writes.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnitOfWork` unless `Active`.
    pub fn transaction(&mut self) -> Result<&mut dyn StoreTransaction, DomainError> {
        let state = self.state;
        match self.transaction.as_deref_mut() {
            Some(transaction) if state == UnitOfWorkState::Active => Ok(transaction),
            _ => Err(DomainError::UnitOfWork {
                operation: "write in",
                state,
            }),
        }
    }

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnitOfWork` unless `Active`, or the commit
    /// error, in which case the unit of work ends `RolledBack`.
    pub async fn success(&mut self) -> Result<(), DomainError> {
        let Some(mut transaction) = self.take_active("commit")? else {
            return Err(self.illegal("commit"));
        };
        match transaction.commit().await {
            Ok(()) => {
                self.state = UnitOfWorkState::Committed;
                Ok(())
            }
            Err(err) => {
                self.state = UnitOfWorkState::RolledBack;
                Err(err)
            }
        }
    }

    /// Rolls back the transaction and returns `error` for re-raising.
    ///
    /// A rollback failure is logged; the original error still wins. Calling
    /// `fail` outside `Active` only returns `error`.
    pub async fn fail(&mut self, error: DomainError) -> DomainError {
        if let Ok(Some(mut transaction)) = self.take_active("roll back") {
            if let Err(rollback_err) = transaction.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            self.state = UnitOfWorkState::RolledBack;
        }
        error
    }

    fn take_active(
        &mut self,
        operation: &'static str,
    ) -> Result<Option<Box<dyn StoreTransaction>>, DomainError> {
        if self.state != UnitOfWorkState::Active {
            return Err(self.illegal(operation));
        }
        Ok(self.transaction.take())
    }

    fn illegal(&self, operation: &'static str) -> DomainError {
        DomainError::UnitOfWork {
            operation,
            state: self.state,
        }
    }
}

impl Default for UnitOfWork {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.state == UnitOfWorkState::Active {
            warn!("unit of work dropped while active; its writes are discarded");
        }
    }
}
