//! Tablas de rollback por tipo de flujo.
//!
//! Cada fase reversible declara qué claves del estado acumulado se limpian
//! al revertirla y cuáles se retienen explícitamente. La tabla es datos,
//! no código: el motor consulta el plan y registra en el evento
//! `RolledBack` exactamente qué claves eliminó.

use indexmap::IndexMap;

/// Plan de reversión para una fase concreta.
#[derive(Debug, Clone, Default)]
pub struct RollbackPlan {
    /// Claves del estado que se eliminan al revertir la fase.
    pub clear: Vec<String>,
    /// Claves que se conservan aunque la fase se revierta (datos caros de
    /// recolectar, evidencia de auditoría).
    pub retain: Vec<String>,
}

impl RollbackPlan {
    pub fn clearing(keys: &[&str]) -> Self {
        Self { clear: keys.iter().map(|k| k.to_string()).collect(), retain: vec![] }
    }

    pub fn retaining(mut self, keys: &[&str]) -> Self {
        self.retain = keys.iter().map(|k| k.to_string()).collect();
        self
    }
}

/// Tabla completa de un tipo de flujo: fase -> plan.
#[derive(Debug, Clone, Default)]
pub struct RollbackTable {
    per_phase: IndexMap<String, RollbackPlan>,
}

impl RollbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_phase(mut self, phase: &str, plan: RollbackPlan) -> Self {
        self.per_phase.insert(phase.to_string(), plan);
        self
    }

    pub fn plan_for(&self, phase: &str) -> Option<&RollbackPlan> {
        self.per_phase.get(phase)
    }

    /// Claves a limpiar al revertir el rango de fases `phases` (de la más
    /// reciente a la objetivo, inclusive), en orden estable y sin
    /// duplicados.
    pub fn keys_to_clear(&self, phases: &[&str]) -> Vec<String> {
        let mut out: Vec<String> = vec![];
        for phase in phases {
            if let Some(plan) = self.per_phase.get(*phase) {
                for key in &plan.clear {
                    if !out.contains(key) {
                        out.push(key.clone());
                    }
                }
            }
        }
        out
    }

    pub fn keys_to_retain(&self, phases: &[&str]) -> Vec<String> {
        let mut out: Vec<String> = vec![];
        for phase in phases {
            if let Some(plan) = self.per_phase.get(*phase) {
                for key in &plan.retain {
                    if !out.contains(key) {
                        out.push(key.clone());
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claves_sin_duplicados_y_en_orden() {
        let table = RollbackTable::new()
            .with_phase("analysis", RollbackPlan::clearing(&["gaps", "scores"]))
            .with_phase("collection", RollbackPlan::clearing(&["scores", "raw"]).retaining(&["inventory"]));

        let clear = table.keys_to_clear(&["analysis", "collection"]);
        assert_eq!(clear, vec!["gaps", "scores", "raw"]);
        assert_eq!(table.keys_to_retain(&["analysis", "collection"]), vec!["inventory"]);
    }
}
