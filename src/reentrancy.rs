//! Debug-only hook reentrancy guard.
//!
//! Hooks run while their table is locked. A hook that locks the same table
//! again would deadlock silently; in debug builds the attempt panics
//! instead. Tracking is per thread, since the lock is held by the thread
//! running the hook. In release builds this compiles to a no-op.

use crate::table::TableId;
use core::marker::PhantomData;

#[cfg(debug_assertions)]
use core::cell::RefCell;

#[cfg(debug_assertions)]
thread_local! {
    // Tables whose hooks are currently running on this thread.
    static IN_HOOK: RefCell<Vec<TableId>> = const { RefCell::new(Vec::new()) };
}

/// Mark `table`'s hooks as running until the guard drops.
#[inline]
pub(crate) fn enter(table: TableId) -> HookGuard {
    #[cfg(debug_assertions)]
    {
        IN_HOOK.with(|h| h.borrow_mut().push(table));
        return HookGuard {
            table,
            _nosend: PhantomData,
        };
    }

    #[cfg(not(debug_assertions))]
    {
        let _ = table;
        return HookGuard {
            _nosend: PhantomData,
        };
    }
}

/// Panics (debug builds) when called from inside one of `table`'s hooks.
#[inline]
pub(crate) fn assert_outside_hooks(table: TableId) {
    #[cfg(debug_assertions)]
    IN_HOOK.with(|h| {
        assert!(
            !h.borrow().contains(&table),
            "reentrancy detected: table {:?} locked from inside its own hook",
            table
        );
    });

    #[cfg(not(debug_assertions))]
    let _ = table;
}

/// RAII guard returned by [`enter`]. Bound to the thread that created it.
pub(crate) struct HookGuard {
    #[cfg(debug_assertions)]
    table: TableId,
    _nosend: PhantomData<*mut ()>,
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        IN_HOOK.with(|h| {
            let mut h = h.borrow_mut();
            let last = h.pop();
            debug_assert_eq!(last, Some(self.table));
        });
    }
}
