use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::models::error::TalkError;

struct TaskShared<T> {
    result: Mutex<Option<Result<T, TalkError>>>,
    done: Condvar,
}

/// Completion handle for a named background task.
///
/// Cloneable; every clone observes the same result. A task that panics
/// completes with [`TalkError::TaskPanicked`] instead of leaving waiters
/// blocked.
pub struct TaskHandle<T> {
    name: String,
    shared: Arc<TaskShared<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl<T: Send + 'static> TaskHandle<T> {
    /// Run `f` on a new thread called `name`.
    pub fn spawn<F>(name: &str, f: F) -> Result<Self, TalkError>
    where
        F: FnOnce() -> Result<T, TalkError> + Send + 'static,
    {
        let shared = Arc::new(TaskShared {
            result: Mutex::new(None),
            done: Condvar::new(),
        });
        let task_shared = Arc::clone(&shared);
        let task_name = name.to_string();

        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
                    let message = panic_message(payload.as_ref());
                    log::error!("task {} panicked: {}", task_name, message);
                    Err(TalkError::TaskPanicked(message))
                });
                *task_shared.result.lock() = Some(result);
                task_shared.done.notify_all();
            })
            .map_err(|e| TalkError::TaskSpawn(format!("{}: {}", name, e)))?;

        Ok(Self {
            name: name.to_string(),
            shared,
        })
    }
}

impl<T> TaskHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.shared.result.lock().is_some()
    }

    /// Block until the task has finished.
    pub fn join(&self) {
        let mut result = self.shared.result.lock();
        while result.is_none() {
            self.shared.done.wait(&mut result);
        }
    }

    /// Block up to `timeout`. Returns `true` if the task has finished.
    pub fn join_timeout(&self, timeout: Duration) -> bool {
        let mut result = self.shared.result.lock();
        if result.is_none() {
            let _ = self.shared.done.wait_for(&mut result, timeout);
        }
        result.is_some()
    }
}

impl<T: Clone> TaskHandle<T> {
    /// Block until the task has finished and return its result.
    pub fn wait(&self) -> Result<T, TalkError> {
        let mut result = self.shared.result.lock();
        loop {
            if let Some(result) = result.as_ref() {
                return result.clone();
            }
            self.shared.done.wait(&mut result);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
