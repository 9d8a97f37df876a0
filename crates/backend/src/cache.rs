use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use floorgraph_shared::models::{Floor, GraphPayload};

/// Per-floor graph payloads, rebuilt lazily after invalidation.
#[derive(Default)]
pub struct GraphCache {
    floors: RwLock<HashMap<Floor, Arc<GraphPayload>>>,
}

impl GraphCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(
        &self,
        floor: Floor,
        build: impl FnOnce() -> Result<GraphPayload, String>,
    ) -> Result<Arc<GraphPayload>, String> {
        if let Some(hit) = self
            .floors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&floor)
        {
            return Ok(Arc::clone(hit));
        }
        let payload = Arc::new(build()?);
        self.floors
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(floor, Arc::clone(&payload));
        Ok(payload)
    }

    pub fn invalidate(&self, floors: impl IntoIterator<Item = Floor>) {
        let mut cached = self.floors.write().unwrap_or_else(|e| e.into_inner());
        for floor in floors {
            cached.remove(&floor);
        }
    }

    pub fn invalidate_all(&self) {
        self.floors
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
