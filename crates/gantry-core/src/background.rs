//! Background work attached to a response.
//!
//! Tasks run after the response has been handed to the transport, in the
//! order they were added. A failing task is the task's own business: tasks
//! return `()`.

use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::trace;

/// A single deferred unit of work.
#[derive(Clone)]
pub struct BackgroundTask(Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>);

impl BackgroundTask {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(Arc::new(move || f().boxed()))
    }

    pub async fn run(&self) {
        (self.0)().await;
    }
}

impl fmt::Debug for BackgroundTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundTask").finish_non_exhaustive()
    }
}

/// An ordered group of background tasks.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    tasks: Vec<BackgroundTask>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a group holding one task.
    pub fn single(task: BackgroundTask) -> Self {
        Self { tasks: vec![task] }
    }

    pub fn add(mut self, task: BackgroundTask) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn push(&mut self, task: BackgroundTask) {
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Runs every task sequentially.
    pub async fn run(&self) {
        for (index, task) in self.tasks.iter().enumerate() {
            trace!(task_index = index, "Running background task");
            task.run().await;
        }
    }
}

impl From<BackgroundTask> for BackgroundTasks {
    fn from(task: BackgroundTask) -> Self {
        Self::single(task)
    }
}
