use tokio::task::JoinHandle;

/// Background tasks scoped to one live connection (reader pump, ping loop).
///
/// Aborting is idempotent, and aborting a task that already finished is harmless.
pub struct TaskManager {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    /// Spawn a task and track it under `name`
    pub fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.track(name, tokio::spawn(future));
    }

    /// Track a task spawned elsewhere
    pub fn track(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.handles.retain(|(_, handle)| !handle.is_finished());
        self.handles.push((name, handle));
    }

    /// Names of tasks still running
    pub fn running(&self) -> Vec<&'static str> {
        self.handles
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.running().is_empty()
    }

    /// Abort all tasks without waiting
    pub fn abort_all(&mut self) {
        for (name, handle) in self.handles.drain(..) {
            if !handle.is_finished() {
                tracing::debug!("Aborting {} task", name);
            }
            handle.abort();
        }
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.abort_all();
    }
}
