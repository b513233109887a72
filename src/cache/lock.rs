use std::sync::{LockResult, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

/// Read guard that survives a poisoned lock.
pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), source, op, "rwlock.read")
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), source, op, "rwlock.write")
}

fn recover<G>(
    result: LockResult<G>,
    source: &'static str,
    op: &'static str,
    lock_kind: &'static str,
) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            target = "quaderno::cache",
            op,
            source,
            lock_kind,
            result = "poisoned_recovered",
            "recovered from poisoned cache lock"
        );
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn poisoned_lock_is_recovered() {
        let lock = RwLock::new(1);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.write().expect("fresh lock");
            panic!("poison");
        }));
        assert!(lock.is_poisoned());

        *rw_write(&lock, "test", "write") = 2;
        assert_eq!(*rw_read(&lock, "test", "read"), 2);
    }
}
