//! Task Registry — process-wide store of screening tasks.
//!
//! The map lock is only held to find or insert a record; each task sits behind
//! its own lock so a write to one task never blocks readers of another.
//! Readers always get an owned snapshot taken under the task's read lock, so a
//! half-applied update is never observable. Locks are never held across an
//! `.await`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use uuid::Uuid;

use crate::models::task::{Task, TaskId, TaskStateError};

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Task {0} not found")]
    NotFound(TaskId),

    #[error(transparent)]
    Transition(#[from] TaskStateError),
}

#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<TaskId, Arc<RwLock<Task>>>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new `Pending` task and returns its id.
    pub fn create(&self) -> TaskId {
        let id = Uuid::new_v4();
        let record = Arc::new(RwLock::new(Task::new(id)));
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, record);
        id
    }

    /// Snapshot of the task's current state.
    pub fn get(&self, id: &TaskId) -> Result<Task, RegistryError> {
        let record = self.record(id)?;
        let task = record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(task)
    }

    /// Applies `mutation` atomically. If the mutation fails the task is left
    /// exactly as it was.
    pub fn update<T, F>(&self, id: &TaskId, mutation: F) -> Result<T, RegistryError>
    where
        F: FnOnce(&mut Task) -> Result<T, TaskStateError>,
    {
        let record = self.record(id)?;
        let mut guard = record.write().unwrap_or_else(PoisonError::into_inner);
        let mut draft = guard.clone();
        let out = mutation(&mut draft)?;
        *guard = draft;
        Ok(out)
    }

    pub fn task_count(&self) -> usize {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn record(&self, id: &TaskId) -> Result<Arc<RwLock<Task>>, RegistryError> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or(RegistryError::NotFound(*id))
    }
}
