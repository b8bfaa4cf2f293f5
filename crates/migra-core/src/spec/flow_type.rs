//! Definición inmutable de un tipo de flujo: secuencia ordenada de fases más
//! capacidades y handlers de ciclo de vida, todo referenciado por nombre.
//!
//! La superficie es enumerable para tooling de operador: nombre, metadatos de
//! presentación, lista de fases, flags, configuración por defecto y tags.

use serde_json::{json, Map, Value};

use super::phase::PhaseSpec;
use crate::hashing::hash_value;

/// Capacidades a nivel de flujo.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowCaps {
    pub pause_resume: bool,
    pub rollback: bool,
    pub checkpointing: bool,
    /// Ramas lógicas por re-ejecución con parámetros divergentes.
    pub branching: bool,
    /// Sub-unidades paralelas declaradas dentro de una fase (nunca fases
    /// enteras en paralelo).
    pub parallel_units: bool,
    pub max_iterations: u32,
}

impl Default for FlowCaps {
    fn default() -> Self {
        Self { pause_resume: false,
               rollback: false,
               checkpointing: true,
               branching: false,
               parallel_units: false,
               max_iterations: 1 }
    }
}

#[derive(Debug, Clone)]
pub struct FlowTypeSpec {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub phases: Vec<PhaseSpec>,
    pub caps: FlowCaps,
    pub init_handler: Option<String>,
    pub final_handler: Option<String>,
    /// Handler de error obligatorio: clasifica recoverable/fatal y decide la
    /// acción de recuperación que el motor aplica tal cual.
    pub error_handler: String,
    /// Configuración por defecto; se pasa a los validadores como `overrides`.
    pub defaults: Map<String, Value>,
    pub tags: Vec<String>,
}

impl FlowTypeSpec {
    pub fn new(name: impl Into<String>, error_handler: impl Into<String>) -> Self {
        let name = name.into();
        Self { display_name: name.clone(),
               name,
               description: String::new(),
               phases: vec![],
               caps: FlowCaps::default(),
               init_handler: None,
               final_handler: None,
               error_handler: error_handler.into(),
               defaults: Map::new(),
               tags: vec![] }
    }

    pub fn with_display(mut self, display_name: impl Into<String>, description: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self.description = description.into();
        self
    }

    pub fn with_phases(mut self, phases: Vec<PhaseSpec>) -> Self {
        self.phases = phases;
        self
    }

    pub fn with_caps(mut self, caps: FlowCaps) -> Self {
        self.caps = caps;
        self
    }

    pub fn with_init_handler(mut self, name: impl Into<String>) -> Self {
        self.init_handler = Some(name.into());
        self
    }

    pub fn with_final_handler(mut self, name: impl Into<String>) -> Self {
        self.final_handler = Some(name.into());
        self
    }

    pub fn with_defaults(mut self, defaults: Map<String, Value>) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Busca una fase por nombre, devolviendo también su índice.
    pub fn phase(&self, name: &str) -> Option<(usize, &PhaseSpec)> {
        self.phases.iter().enumerate().find(|(_, p)| p.name == name)
    }

    pub fn phase_names(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.name.as_str()).collect()
    }

    /// Hash estable de la definición (nombre + secuencia de fases). Entra en
    /// los fingerprints de fase y de flujo.
    pub fn definition_hash(&self) -> String {
        hash_value(&json!({
            "flow_type": self.name,
            "phases": self.phase_names(),
        }))
    }

    /// Nombres de handlers de ciclo de vida declarados (init/final/error).
    pub fn lifecycle_handler_names(&self) -> Vec<&str> {
        let mut names = vec![];
        if let Some(h) = &self.init_handler {
            names.push(h.as_str());
        }
        if let Some(h) = &self.final_handler {
            names.push(h.as_str());
        }
        names
    }
}
