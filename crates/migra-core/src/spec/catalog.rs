//! Catálogo de tipos de flujo: superficie enumerable para el motor y para
//! tooling de operador.

use indexmap::IndexMap;

use super::flow_type::FlowTypeSpec;
use crate::errors::FlowEngineError;

/// Mapa ordenado nombre → `FlowTypeSpec`, poblado una vez al arranque.
#[derive(Debug, Default)]
pub struct FlowCatalog {
    flows: IndexMap<String, FlowTypeSpec>,
}

impl FlowCatalog {
    pub fn new() -> Self {
        Self { flows: IndexMap::new() }
    }

    /// Registra un tipo de flujo. Nombres duplicados son un error de
    /// configuración, no un override silencioso.
    pub fn register(&mut self, spec: FlowTypeSpec) -> Result<(), FlowEngineError> {
        if self.flows.contains_key(&spec.name) {
            return Err(FlowEngineError::Internal(format!("duplicate flow type: {}", spec.name)));
        }
        self.flows.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FlowTypeSpec> {
        self.flows.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.flows.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlowTypeSpec> {
        self.flows.values()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut cat = FlowCatalog::new();
        cat.register(FlowTypeSpec::new("assessment", "default-errors")).unwrap();
        let err = cat.register(FlowTypeSpec::new("assessment", "default-errors"));
        assert!(err.is_err());
        assert_eq!(cat.names(), vec!["assessment"]);
    }
}
