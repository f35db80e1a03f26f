//! Transaction handle for an in-progress download job.
//!
//! Workers register object names here for the duration of their fetch so
//! status readers can report what the target is downloading right now.

use std::collections::BTreeSet;
use std::sync::Mutex;

/// Side handle of the running operation; shared by the dispatcher, the
/// workers, and external status readers.
#[derive(Debug)]
pub struct Xact {
    id: String,
    in_flight: Mutex<BTreeSet<String>>,
}

impl Xact {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            in_flight: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn obj_started(&self, name: &str) {
        self.in_flight.lock().unwrap().insert(name.to_string());
    }

    pub fn obj_done(&self, name: &str) {
        self.in_flight.lock().unwrap().remove(name);
    }

    /// Names currently being fetched, sorted.
    pub fn currently_downloading(&self) -> Vec<String> {
        self.in_flight.lock().unwrap().iter().cloned().collect()
    }
}
