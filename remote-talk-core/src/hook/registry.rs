use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::target::{HookTarget, OriginalKey};
use crate::models::error::HookError;
use crate::models::state::InstallOutcome;

/// Process-wide interception state: which targets are installed and the
/// original entry every hook forwards to.
///
/// There is no uninstall. A hook may be mid-call on a host thread at any
/// moment, so `Installed` is terminal for the life of the process.
#[derive(Debug, Default)]
pub struct InterceptionRegistry {
    installed: Mutex<HashSet<HookTarget>>,
    originals: RwLock<HashMap<OriginalKey, usize>>,
}

impl InterceptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `target` once.
    ///
    /// `patch` performs the actual redirection and returns the entry it
    /// replaced. It runs under the registry lock, which serializes all
    /// patching. The replaced entry becomes the original for the target's
    /// function unless one is already known (the first install wins) or it
    /// is `hook_fn` itself.
    pub fn install<F>(&self, target: HookTarget, hook_fn: usize, patch: F) -> Result<InstallOutcome, HookError>
    where
        F: FnOnce() -> Result<usize, HookError>,
    {
        let mut installed = self.installed.lock();
        if installed.contains(&target) {
            return Ok(InstallOutcome::AlreadyInstalled);
        }

        let old = patch()?;
        if old != 0 && old != hook_fn {
            self.originals.write().entry(target.original_key()).or_insert(old);
        }
        log::debug!("installed hook {:?} (was {:#x})", target, old);
        installed.insert(target);
        Ok(InstallOutcome::Installed)
    }

    pub fn is_installed(&self, target: &HookTarget) -> bool {
        self.installed.lock().contains(target)
    }

    pub fn installed_count(&self) -> usize {
        self.installed.lock().len()
    }

    /// Original entry of a hooked function, if any install succeeded.
    pub fn original(&self, key: &OriginalKey) -> Option<usize> {
        self.originals.read().get(key).copied()
    }

    /// Original entry of a hooked symbol.
    pub fn original_symbol(&self, module: &str, symbol: &str) -> Option<usize> {
        self.original(&OriginalKey::symbol(module, symbol))
    }

    /// Original entry for dispatch slot `slot` of `object`'s table.
    ///
    /// # Safety
    /// `object` must point to a live object whose first word is its
    /// dispatch-table pointer.
    pub unsafe fn original_method(&self, object: usize, slot: usize) -> Option<usize> {
        if object == 0 {
            return None;
        }
        let table = *(object as *const usize);
        self.original(&OriginalKey::Method { table, slot })
    }
}

/// Ordered, append-only list of observers for one family of hooked calls.
///
/// Registration lasts for the life of the process; there is no removal.
/// Registration replaces a shared snapshot, so notifying takes no copy.
pub struct ObserverList<O: ?Sized> {
    observers: RwLock<Option<Arc<[Arc<O>]>>>,
}

impl<O: ?Sized> Default for ObserverList<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: ?Sized> ObserverList<O> {
    pub const fn new() -> Self {
        Self {
            observers: parking_lot::const_rwlock(None),
        }
    }

    pub fn add(&self, observer: Arc<O>) {
        let mut observers = self.observers.write();
        let mut next: Vec<Arc<O>> = observers.as_deref().map(<[Arc<O>]>::to_vec).unwrap_or_default();
        next.push(observer);
        *observers = Some(next.into());
    }

    pub fn len(&self) -> usize {
        self.observers.read().as_deref().map_or(0, <[Arc<O>]>::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `f` on every observer in registration order.
    ///
    /// Errors and panics are logged and swallowed; every observer runs.
    /// Observers registered during the call are notified from the next one.
    pub fn notify<F>(&self, call: &str, f: F)
    where
        F: Fn(&O) -> Result<(), HookError>,
    {
        let Some(snapshot) = self.observers.read().clone() else {
            return;
        };
        for observer in snapshot.iter() {
            match catch_unwind(AssertUnwindSafe(|| f(&**observer))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("observer error in {}: {}", call, e),
                Err(_) => log::error!("observer panicked in {}", call),
            }
        }
    }
}

/// Run an intercepted call: before-observers, the original, after-observers.
///
/// The original always runs and its result is always returned, whatever
/// the observers do.
pub fn dispatch<O, R, B, C, A>(observers: &ObserverList<O>, call: &str, before: B, original: C, after: A) -> R
where
    O: ?Sized,
    B: Fn(&O) -> Result<(), HookError>,
    C: FnOnce() -> R,
    A: Fn(&O, &R) -> Result<(), HookError>,
{
    observers.notify(call, before);
    let result = original();
    observers.notify(call, |o| after(o, &result));
    result
}
