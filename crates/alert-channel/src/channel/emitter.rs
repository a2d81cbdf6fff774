//! Typed listener lists with snapshot dispatch.
//!
//! [`Emitter::emit`] iterates a snapshot of the registrations taken before the
//! first call, so listeners may register, dispose or call back into the
//! channel while being notified. A registration disposed mid-cycle is skipped
//! for the remainder of that cycle.

use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;
use tracing::warn;

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

struct Registration<T> {
    id: u64,
    active: AtomicBool,
    callback: Callback<T>,
}

struct Registry<T> {
    next_id: u64,
    entries: Vec<Arc<Registration<T>>>,
}

/// Ordered list of callbacks for one event kind.
pub struct Emitter<T> {
    name: &'static str,
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> Emitter<T> {
    /// Create an empty emitter. `name` labels panic traces.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register `callback` at the end of the list.
    ///
    /// The same closure registered twice is delivered twice.
    pub fn on<F>(&self, callback: F) -> Disposer
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let registration = {
            let mut registry = self.registry.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            let registration = Arc::new(Registration {
                id,
                active: AtomicBool::new(true),
                callback: Box::new(callback),
            });
            registry.entries.push(Arc::clone(&registration));
            registration
        };

        let registry = Arc::downgrade(&self.registry);
        Disposer::new(move || {
            registration.active.store(false, Ordering::Release);
            if let Some(registry) = registry.upgrade() {
                registry.lock().entries.retain(|entry| entry.id != registration.id);
            }
        })
    }

    /// Deliver `event` to every active registration in order. Returns the
    /// number of callbacks that completed without panicking.
    pub fn emit(&self, event: &T) -> usize {
        let snapshot: Vec<Arc<Registration<T>>> = self.registry.lock().entries.clone();
        let mut delivered = 0;
        for registration in snapshot {
            if !registration.active.load(Ordering::Acquire) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| (registration.callback)(event))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_string());
                    warn!(
                        emitter = self.name,
                        listener = registration.id,
                        %reason,
                        "Listener panicked during dispatch"
                    );
                }
            }
        }
        delivered
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.registry.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("name", &self.name)
            .field("listeners", &self.registry.lock().entries.len())
            .finish()
    }
}

/// Removes one registration. Calling [`dispose`](Self::dispose) again, or from
/// another clone, is a no-op. Dropping a `Disposer` does not unregister.
#[derive(Clone)]
#[must_use = "listeners stay registered until the disposer is invoked"]
pub struct Disposer {
    dispose: Arc<dyn Fn() + Send + Sync>,
}

impl Disposer {
    fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            dispose: Arc::new(f),
        }
    }

    /// Unregister the callback.
    pub fn dispose(&self) {
        (self.dispose)();
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer").finish_non_exhaustive()
    }
}
