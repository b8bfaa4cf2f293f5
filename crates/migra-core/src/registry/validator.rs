//! Registro de validadores de fase.
//!
//! Un validador examina el input y el estado acumulado ANTES de que la fase
//! consuma un intento de ejecución. Todos los validadores de una fase se
//! ejecutan siempre; los errores se agregan en un solo reporte.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

/// Resultado de un validador. `errors` bloquea la fase; `warnings` se
/// persiste junto al resultado pero no bloquea.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metadata: Value,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self { valid: true, errors: vec![], warnings: vec![], metadata: Value::Null }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self { valid: false, errors, warnings: vec![], metadata: Value::Null }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Contrato de validador. `overrides` permite ajustar umbrales por flujo
/// (p.ej. mínimos de calidad por tier) sin re-registrar el validador.
pub trait PhaseValidator: Send + Sync {
    fn validate(&self, input: &Value, flow_state: &Value, overrides: &Value) -> ValidationReport;
}

/// Registro nominal: los specs referencian validadores por nombre y la
/// resolución ocurre al arranque, nunca durante la ejecución.
#[derive(Default)]
pub struct ValidatorRegistry {
    inner: HashMap<String, Arc<dyn PhaseValidator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, validator: Arc<dyn PhaseValidator>) {
        self.inner.insert(name.to_string(), validator);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PhaseValidator>> {
        self.inner.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysOk;
    impl PhaseValidator for AlwaysOk {
        fn validate(&self, _: &Value, _: &Value, _: &Value) -> ValidationReport {
            ValidationReport::ok()
        }
    }

    #[test]
    fn registro_y_lookup_por_nombre() {
        let mut reg = ValidatorRegistry::new();
        reg.register("always-ok", Arc::new(AlwaysOk));
        assert!(reg.contains("always-ok"));
        assert!(!reg.contains("missing"));
        let report = reg.get("always-ok")
                        .unwrap()
                        .validate(&Value::Null, &Value::Null, &Value::Null);
        assert!(report.valid);
    }
}
