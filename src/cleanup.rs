use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

type DeferredFn = Box<dyn FnOnce() + Send>;

/// A single deferred action with a label for logging.
struct Deferred {
    label: String,
    action: DeferredFn,
}

/// Ordered list of deferred actions, run in reverse registration order.
#[derive(Default)]
pub struct CleanupContext {
    actions: Vec<Deferred>,
    done: bool,
}

impl CleanupContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action to run at cleanup time.
    pub fn defer<F>(&mut self, label: impl Into<String>, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let label = label.into();
        debug!("Deferring cleanup: {}", label);
        self.actions.push(Deferred {
            label,
            action: Box::new(action),
        });
    }

    /// Register a file or directory to delete at cleanup time.
    pub fn remove_path(&mut self, path: PathBuf) {
        let label = format!("remove {}", path.display());
        self.defer(label, move || remove_path_now(&path));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every registered action, newest first. Later calls are no-ops.
    pub fn run_all(&mut self) {
        if self.done {
            return;
        }
        self.done = true;

        while let Some(deferred) = self.actions.pop() {
            debug!("Cleaning up: {}", deferred.label);
            (deferred.action)();
        }
    }
}

fn remove_path_now(path: &Path) {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    if let Err(e) = result
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove {:?}: {}", path, e);
    }
}

/// Type alias for shared cleanup context
pub type SharedCleanupContext = Arc<Mutex<CleanupContext>>;

/// Create a new shared cleanup context
pub fn new_shared() -> SharedCleanupContext {
    Arc::new(Mutex::new(CleanupContext::new()))
}

/// Lock the shared context. A poisoned lock still yields the list so cleanup can run.
pub fn lock(ctx: &SharedCleanupContext) -> MutexGuard<'_, CleanupContext> {
    ctx.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
