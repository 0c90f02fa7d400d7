use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    SaveLog,
    DeleteLog,
    SaveProfile,
    Chat,
    Report,
}

impl Action {
    fn label(self) -> &'static str {
        match self {
            Action::SaveLog => "A log save",
            Action::DeleteLog => "A log delete",
            Action::SaveProfile => "A profile save",
            Action::Chat => "A chat request",
            Action::Report => "A report",
        }
    }
}

/// Per-user single-flight tracker for mutating and model-backed requests.
#[derive(Clone, Default)]
pub struct InFlight {
    active: Arc<Mutex<HashSet<(Uuid, Action)>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `action` as pending for `user_id`. Fails with `Conflict` while an
    /// earlier guard for the same pair is alive.
    pub fn try_begin(&self, user_id: Uuid, action: Action) -> AppResult<InFlightGuard> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| anyhow::anyhow!("in-flight registry poisoned"))?;

        if !active.insert((user_id, action)) {
            tracing::debug!(user_id = %user_id, action = ?action, "Rejected duplicate submission");
            return Err(AppError::Conflict(format!(
                "{} is already in progress",
                action.label()
            )));
        }

        Ok(InFlightGuard {
            active: self.active.clone(),
            key: (user_id, action),
        })
    }
}

pub struct InFlightGuard {
    active: Arc<Mutex<HashSet<(Uuid, Action)>>>,
    key: (Uuid, Action),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.key);
        }
    }
}
