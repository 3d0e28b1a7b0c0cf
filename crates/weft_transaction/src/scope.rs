//! The thread's current transaction.
//!
//! A convenience for code at the API boundary. The engine never consults it;
//! every operation takes its transaction explicitly.

use std::cell::RefCell;

use crate::transaction::ClientTransaction;

thread_local! {
    static CURRENT: RefCell<Vec<ClientTransaction>> = const { RefCell::new(Vec::new()) };
}

/// Makes a transaction current for as long as the scope lives.
///
/// Scopes nest; dropping one restores the previously current transaction.
#[derive(Debug)]
#[must_use = "the transaction is only current while the scope is alive"]
pub struct TransactionScope {
    transaction: ClientTransaction,
}

impl TransactionScope {
    /// Enters a scope for `transaction`.
    pub fn enter(transaction: &ClientTransaction) -> Self {
        CURRENT.with(|stack| stack.borrow_mut().push(transaction.clone()));
        tracing::trace!(transaction = %transaction.id(), "scope entered");
        Self {
            transaction: transaction.clone(),
        }
    }

    /// The transaction this scope made current.
    #[must_use]
    pub fn transaction(&self) -> &ClientTransaction {
        &self.transaction
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        CURRENT.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(position) = stack
                .iter()
                .rposition(|tx| tx.id() == self.transaction.id())
            {
                stack.remove(position);
            }
        });
        tracing::trace!(transaction = %self.transaction.id(), "scope left");
    }
}

impl ClientTransaction {
    /// The innermost transaction made current by a [`TransactionScope`].
    #[must_use]
    pub fn current() -> Option<ClientTransaction> {
        CURRENT.with(|stack| stack.borrow().last().cloned())
    }

    /// Makes this transaction current until the returned scope is dropped.
    pub fn enter_scope(&self) -> TransactionScope {
        TransactionScope::enter(self)
    }
}
