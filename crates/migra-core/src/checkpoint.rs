//! Checkpoints: snapshots persistibles que habilitan pause/resume.
//!
//! Un checkpoint es aditivo: su `data` se fusiona por clave dentro del
//! estado del flujo durante el replay, nunca lo reemplaza por completo.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hashing::hash_value;
use crate::merge::merge_json;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub phase: String,
    pub created_at: DateTime<Utc>,
    /// Snapshot (objeto JSON) de las claves de estado relevantes a la fase.
    pub data: Value,
    /// Avance del flujo en [0, 1] al momento del snapshot.
    pub progress: f64,
    pub can_resume: bool,
}

impl Checkpoint {
    pub fn new(phase: impl Into<String>, data: Value, progress: f64, can_resume: bool) -> Self {
        Self { phase: phase.into(),
               created_at: Utc::now(),
               data,
               progress: progress.clamp(0.0, 1.0),
               can_resume }
    }

    /// Hash del contenido (fase + data canónica); metadato de auditoría, el
    /// timestamp no participa.
    pub fn fingerprint(&self) -> String {
        hash_value(&serde_json::json!({
            "phase": self.phase,
            "data": self.data,
        }))
    }
}

/// Fusiona el `data` de un checkpoint dentro del estado (union por clave).
pub fn merge_checkpoint(state: &mut IndexMap<String, Value>, cp: &Checkpoint) {
    if let Value::Object(map) = &cp.data {
        for (k, v) in map {
            let merged = match state.get(k) {
                Some(existing) => merge_json(existing, v),
                None => v.clone(),
            };
            state.insert(k.clone(), merged);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_is_additive_never_wholesale() {
        let mut state: IndexMap<String, Value> = IndexMap::new();
        state.insert("detected_platforms".into(), json!(["aws", "vmware"]));
        state.insert("collection_progress".into(), json!({"aws": 0.4, "vmware": 1.0}));

        let cp = Checkpoint::new("automated-collection",
                                 json!({"collection_progress": {"aws": 0.9}, "resume_token": "t-17"}),
                                 0.4,
                                 true);
        merge_checkpoint(&mut state, &cp);

        // Clave ajena al checkpoint se conserva
        assert_eq!(state["detected_platforms"], json!(["aws", "vmware"]));
        // Objeto anidado se fusiona por clave, no se reemplaza
        assert_eq!(state["collection_progress"], json!({"aws": 0.9, "vmware": 1.0}));
        assert_eq!(state["resume_token"], json!("t-17"));
    }

    #[test]
    fn progress_is_clamped() {
        let cp = Checkpoint::new("synthesis", json!({}), 1.7, false);
        assert_eq!(cp.progress, 1.0);
    }
}
