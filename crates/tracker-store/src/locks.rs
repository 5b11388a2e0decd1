//! Named advisory locks.
//!
//! A named lock serializes work across every handle opened on the same
//! database, typically two overlapping scheduled ingestion runs. Each
//! [`Store`](crate::Store) handle owns a [`NamedLocks`] registry recording
//! which names it currently holds and until when:
//!
//! - Acquiring a name this handle already holds succeeds without a store
//!   round-trip while its lease is still running.
//! - Acquiring a name held by another handle fails at once; the wait budget
//!   only bounds how long the store may block while granting a free lock.
//! - A holder keeps a lock past its lease by renewing it. A holder that
//!   stops renewing, including a process that died without unwinding, loses
//!   the lock once the lease runs out.
//! - Every held name is released when the handle is dropped.
//!
//! The registry talks to the store through [`LockBackend`], which keeps the
//! bookkeeping testable without a database.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Error, LockOperation, Result};
use crate::store::Store;

/// Store-side primitives behind [`NamedLocks`].
pub trait LockBackend {
    /// How long a lock stays valid after it is obtained or renewed.
    fn lease(&self) -> Duration;

    /// Whether no live holder other than this one currently owns `name`.
    fn lock_is_free(&self, name: &str) -> rusqlite::Result<bool>;

    /// Try to take `name`, letting the store block for at most `timeout`.
    ///
    /// Returns `false` when the lock could not be obtained in time.
    fn obtain_lock(&self, name: &str, timeout: Duration) -> rusqlite::Result<bool>;

    /// Start a fresh lease on a lock this holder owns.
    ///
    /// Returns `false` when the store no longer records this holder as the owner.
    fn renew_lock(&self, name: &str) -> rusqlite::Result<bool>;

    /// Give `name` back. Returns `true` when the store confirmed the release.
    fn free_lock(&self, name: &str) -> rusqlite::Result<bool>;
}

/// The set of lock names held through one store handle.
///
/// Each name maps to the local deadline of its lease; `None` is a lease too
/// long to represent.
#[derive(Debug, Default)]
pub struct NamedLocks {
    held: RefCell<BTreeMap<String, Option<Instant>>>,
}

impl NamedLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `name`, returning whether it is now held by this handle.
    pub fn acquire<B: LockBackend + ?Sized>(
        &self,
        backend: &B,
        name: &str,
        timeout: Duration,
    ) -> Result<bool> {
        if let Some(deadline) = self.deadline(name) {
            if deadline.is_none_or(|d| Instant::now() < d) {
                debug!("Lock '{}' already held by this handle", name);
                return Ok(true);
            }
            warn!("Lease on lock '{}' ran out while held, acquiring again", name);
            self.held.borrow_mut().remove(name);
        }

        let free = backend
            .lock_is_free(name)
            .map_err(|source| lock_error(name, LockOperation::Check, source))?;
        if !free {
            debug!("Lock '{}' is held elsewhere", name);
            return Ok(false);
        }

        let requested = Instant::now();
        let obtained = backend
            .obtain_lock(name, timeout)
            .map_err(|source| lock_error(name, LockOperation::Acquire, source))?;
        if obtained {
            self.held
                .borrow_mut()
                .insert(name.to_string(), requested.checked_add(backend.lease()));
            debug!("Acquired lock '{}'", name);
        } else {
            debug!("Lock '{}' was taken before it could be obtained", name);
        }

        Ok(obtained)
    }

    /// Start a fresh lease on `name`.
    ///
    /// Returns `false` when this handle does not hold `name`, or when the
    /// store has handed it to someone else; the name is then forgotten.
    pub fn renew<B: LockBackend + ?Sized>(&self, backend: &B, name: &str) -> Result<bool> {
        if !self.is_held(name) {
            return Ok(false);
        }

        let requested = Instant::now();
        let renewed = backend
            .renew_lock(name)
            .map_err(|source| lock_error(name, LockOperation::Renew, source))?;
        if renewed {
            self.held
                .borrow_mut()
                .insert(name.to_string(), requested.checked_add(backend.lease()));
            debug!("Renewed lock '{}'", name);
        } else {
            self.held.borrow_mut().remove(name);
            warn!("Lock '{}' passed to another holder", name);
        }

        Ok(renewed)
    }

    /// Release `name` if this handle holds it.
    pub fn release<B: LockBackend + ?Sized>(&self, backend: &B, name: &str) -> Result<()> {
        if !self.is_held(name) {
            return Ok(());
        }

        let released = backend
            .free_lock(name)
            .map_err(|source| lock_error(name, LockOperation::Release, source))?;
        if released {
            self.held.borrow_mut().remove(name);
            debug!("Released lock '{}'", name);
        } else {
            warn!("Store did not confirm release of lock '{}'", name);
        }

        Ok(())
    }

    /// Release every held name.
    ///
    /// All names are attempted even if one fails; the first error is returned.
    pub fn release_all<B: LockBackend + ?Sized>(&self, backend: &B) -> Result<()> {
        let mut first_error = None;

        for name in self.held() {
            if let Err(e) = self.release(backend, &name) {
                warn!("{}", e);
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Whether this handle holds `name`.
    pub fn is_held(&self, name: &str) -> bool {
        self.held.borrow().contains_key(name)
    }

    /// Names currently held, in sorted order.
    pub fn held(&self) -> Vec<String> {
        self.held.borrow().keys().cloned().collect()
    }

    fn deadline(&self, name: &str) -> Option<Option<Instant>> {
        self.held.borrow().get(name).copied()
    }
}

fn lock_error(name: &str, operation: LockOperation, source: rusqlite::Error) -> Error {
    Error::Lock {
        name: name.to_string(),
        operation,
        source,
    }
}

/// Scoped ownership of a named lock, released on drop.
///
/// Obtained from [`Store::try_lock`]. Dropping the guard gives the lock
/// back; use [`LockGuard::release`] to observe release errors instead of
/// having them logged.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    store: &'a Store,
    name: String,
    released: bool,
}

impl<'a> LockGuard<'a> {
    pub(crate) fn new(store: &'a Store, name: &str) -> Self {
        Self {
            store,
            name: name.to_string(),
            released: false,
        }
    }

    /// Name of the held lock.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start a fresh lease on the lock.
    ///
    /// Returns `false` once the lock has been lost to another holder.
    pub fn renew(&self) -> Result<bool> {
        self.store.renew_lock(&self.name)
    }

    /// Release the lock now.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.store.release_lock(&self.name)
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.store.release_lock(&self.name)
        {
            warn!("Failed to release lock in guard drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Backend double counting round-trips.
    #[derive(Default)]
    struct CountingBackend {
        lease: Cell<Duration>,
        checks: Cell<u32>,
        obtains: Cell<u32>,
        renewals: Cell<u32>,
        frees: Cell<u32>,
        held_elsewhere: Cell<bool>,
        refuse_obtain: Cell<bool>,
        refuse_renew: Cell<bool>,
        refuse_free: Cell<bool>,
        fail: Cell<bool>,
    }

    impl CountingBackend {
        fn new() -> Self {
            let backend = Self::default();
            backend.lease.set(Duration::from_secs(60));
            backend
        }

        fn round_trips(&self) -> u32 {
            self.checks.get() + self.obtains.get() + self.renewals.get() + self.frees.get()
        }

        fn failure(&self) -> rusqlite::Result<()> {
            if self.fail.get() {
                Err(rusqlite::Error::InvalidQuery)
            } else {
                Ok(())
            }
        }
    }

    impl LockBackend for CountingBackend {
        fn lease(&self) -> Duration {
            self.lease.get()
        }

        fn lock_is_free(&self, _name: &str) -> rusqlite::Result<bool> {
            self.checks.set(self.checks.get() + 1);
            self.failure()?;
            Ok(!self.held_elsewhere.get())
        }

        fn obtain_lock(&self, _name: &str, _timeout: Duration) -> rusqlite::Result<bool> {
            self.obtains.set(self.obtains.get() + 1);
            self.failure()?;
            Ok(!self.refuse_obtain.get())
        }

        fn renew_lock(&self, _name: &str) -> rusqlite::Result<bool> {
            self.renewals.set(self.renewals.get() + 1);
            self.failure()?;
            Ok(!self.refuse_renew.get())
        }

        fn free_lock(&self, _name: &str) -> rusqlite::Result<bool> {
            self.frees.set(self.frees.get() + 1);
            self.failure()?;
            Ok(!self.refuse_free.get())
        }
    }

    const WAIT: Duration = Duration::from_secs(1);

    #[test]
    fn test_acquire_free_lock() {
        let backend = CountingBackend::new();
        let locks = NamedLocks::new();

        assert!(locks.acquire(&backend, "ingestion", WAIT).unwrap());
        assert!(locks.is_held("ingestion"));
        assert_eq!(backend.checks.get(), 1);
        assert_eq!(backend.obtains.get(), 1);
    }

    #[test]
    fn test_reacquire_skips_the_store() {
        let backend = CountingBackend::new();
        let locks = NamedLocks::new();

        assert!(locks.acquire(&backend, "ingestion", WAIT).unwrap());
        let trips = backend.round_trips();

        assert!(locks.acquire(&backend, "ingestion", WAIT).unwrap());
        assert_eq!(backend.round_trips(), trips);
    }

    #[test]
    fn test_reacquire_after_lease_ran_out_goes_to_the_store() {
        let backend = CountingBackend::new();
        backend.lease.set(Duration::ZERO);
        let locks = NamedLocks::new();

        assert!(locks.acquire(&backend, "ingestion", WAIT).unwrap());
        backend.held_elsewhere.set(true);

        // The lapsed lease may have been reclaimed, so the store decides
        assert!(!locks.acquire(&backend, "ingestion", WAIT).unwrap());
        assert_eq!(backend.checks.get(), 2);
        assert!(!locks.is_held("ingestion"));
    }

    #[test]
    fn test_renew_extends_the_local_lease() {
        let backend = CountingBackend::new();
        backend.lease.set(Duration::ZERO);
        let locks = NamedLocks::new();
        locks.acquire(&backend, "ingestion", WAIT).unwrap();

        backend.lease.set(Duration::from_secs(60));
        assert!(locks.renew(&backend, "ingestion").unwrap());
        let trips = backend.round_trips();

        assert!(locks.acquire(&backend, "ingestion", WAIT).unwrap());
        assert_eq!(backend.round_trips(), trips);
    }

    #[test]
    fn test_refused_renewal_forgets_the_name() {
        let backend = CountingBackend::new();
        let locks = NamedLocks::new();
        locks.acquire(&backend, "ingestion", WAIT).unwrap();

        backend.refuse_renew.set(true);
        assert!(!locks.renew(&backend, "ingestion").unwrap());
        assert!(!locks.is_held("ingestion"));

        // Nothing left to give back
        locks.release_all(&backend).unwrap();
        assert_eq!(backend.frees.get(), 0);
    }

    #[test]
    fn test_renew_unheld_skips_the_store() {
        let backend = CountingBackend::new();
        let locks = NamedLocks::new();

        assert!(!locks.renew(&backend, "ingestion").unwrap());
        assert_eq!(backend.round_trips(), 0);
    }

    #[test]
    fn test_renew_failure_is_a_lock_error() {
        let backend = CountingBackend::new();
        let locks = NamedLocks::new();
        locks.acquire(&backend, "ingestion", WAIT).unwrap();

        backend.fail.set(true);
        assert!(matches!(
            locks.renew(&backend, "ingestion").unwrap_err(),
            Error::Lock {
                operation: LockOperation::Renew,
                ..
            }
        ));
    }

    #[test]
    fn test_lock_held_elsewhere_fails_without_obtaining() {
        let backend = CountingBackend::new();
        backend.held_elsewhere.set(true);
        let locks = NamedLocks::new();

        assert!(!locks.acquire(&backend, "ingestion", WAIT).unwrap());
        assert!(!locks.is_held("ingestion"));
        assert_eq!(backend.obtains.get(), 0);
    }

    #[test]
    fn test_obtain_refused() {
        let backend = CountingBackend::new();
        backend.refuse_obtain.set(true);
        let locks = NamedLocks::new();

        assert!(!locks.acquire(&backend, "ingestion", WAIT).unwrap());
        assert!(locks.held().is_empty());
    }

    #[test]
    fn test_store_failure_is_a_lock_error() {
        let backend = CountingBackend::new();
        backend.fail.set(true);
        let locks = NamedLocks::new();

        let err = locks.acquire(&backend, "ingestion", WAIT).unwrap_err();
        match err {
            Error::Lock {
                name, operation, ..
            } => {
                assert_eq!(name, "ingestion");
                assert_eq!(operation, LockOperation::Check);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_release_unheld_is_noop() {
        let backend = CountingBackend::new();
        let locks = NamedLocks::new();

        locks.release(&backend, "ingestion").unwrap();
        assert_eq!(backend.round_trips(), 0);
    }

    #[test]
    fn test_release_keeps_name_until_confirmed() {
        let backend = CountingBackend::new();
        let locks = NamedLocks::new();
        locks.acquire(&backend, "ingestion", WAIT).unwrap();

        backend.refuse_free.set(true);
        locks.release(&backend, "ingestion").unwrap();
        assert!(locks.is_held("ingestion"));

        backend.refuse_free.set(false);
        locks.release(&backend, "ingestion").unwrap();
        assert!(!locks.is_held("ingestion"));
    }

    #[test]
    fn test_release_all() {
        let backend = CountingBackend::new();
        let locks = NamedLocks::new();
        locks.acquire(&backend, "ingestion", WAIT).unwrap();
        locks.acquire(&backend, "export", WAIT).unwrap();
        assert_eq!(locks.held(), vec!["export".to_string(), "ingestion".to_string()]);

        locks.release_all(&backend).unwrap();
        assert!(locks.held().is_empty());
        assert_eq!(backend.frees.get(), 2);
    }

    #[test]
    fn test_release_all_attempts_every_name() {
        let backend = CountingBackend::new();
        let locks = NamedLocks::new();
        locks.acquire(&backend, "a", WAIT).unwrap();
        locks.acquire(&backend, "b", WAIT).unwrap();

        backend.fail.set(true);
        let err = locks.release_all(&backend).unwrap_err();
        assert!(matches!(
            err,
            Error::Lock {
                operation: LockOperation::Release,
                ..
            }
        ));
        assert_eq!(backend.frees.get(), 2);
    }
}
