use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Service IDs with an upgrade currently in flight.
///
/// At most one upgrade (submission plus convergence) runs per service. The
/// claim is released when its [`FlightGuard`] is dropped, including when
/// the task holding it is abandoned.
#[derive(Debug, Default)]
pub struct InFlight {
    ids: Mutex<HashSet<String>>,
}

#[derive(Debug)]
pub struct FlightGuard {
    owner: Arc<InFlight>,
    id: String,
}

impl InFlight {
    pub fn claim(self: &Arc<Self>, id: &str) -> Option<FlightGuard> {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        if !ids.insert(id.to_string()) {
            return None;
        }
        Some(FlightGuard {
            owner: Arc::clone(self),
            id: id.to_string(),
        })
    }

}

impl FlightGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.owner
            .ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
