//! Contexto de aplicación: catálogo de flujos más registros resueltos.
//!
//! El contexto se construye una vez al arranque y se verifica completo
//! antes de aceptar flujos: toda referencia nominal de todo spec debe
//! resolver a un registro existente, y los faltantes se reportan todos
//! juntos, no hasta el primero.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::StartupValidationError;
use crate::executor::TaskExecutor;
use crate::registry::error_handler::ErrorHandlerRegistry;
use crate::registry::handler::HandlerRegistry;
use crate::registry::validator::ValidatorRegistry;
use crate::rollback::RollbackTable;
use crate::spec::FlowCatalog;

pub struct AppContext {
    pub catalog: FlowCatalog,
    pub validators: ValidatorRegistry,
    pub handlers: HandlerRegistry,
    pub error_handlers: ErrorHandlerRegistry,
    /// Tabla de rollback por tipo de flujo.
    pub rollback_tables: HashMap<String, RollbackTable>,
    pub executor: Arc<dyn TaskExecutor>,
}

impl AppContext {
    /// Verifica que cada nombre referenciado por el catálogo resuelva.
    /// Acumula TODOS los faltantes con el formato `clase:nombre`.
    pub fn verify(&self) -> Result<(), StartupValidationError> {
        let mut missing: Vec<String> = vec![];

        for spec in self.catalog.iter() {
            for phase in &spec.phases {
                for v in &phase.validators {
                    if !self.validators.contains(v) {
                        push_unique(&mut missing, format!("validator:{v}"));
                    }
                }
                for h in phase.handler_names() {
                    if !self.handlers.contains(h) {
                        push_unique(&mut missing, format!("handler:{h}"));
                    }
                }
            }
            for h in spec.lifecycle_handler_names() {
                if !self.handlers.contains(h) {
                    push_unique(&mut missing, format!("handler:{h}"));
                }
            }
            if !self.error_handlers.contains(&spec.error_handler) {
                push_unique(&mut missing, format!("error_handler:{}", spec.error_handler));
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(StartupValidationError { missing })
        }
    }
}

fn push_unique(list: &mut Vec<String>, entry: String) {
    if !list.contains(&entry) {
        list.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::NullExecutor;
    use crate::spec::{FlowTypeSpec, PhaseSpec, UnitOfWork};

    #[test]
    fn verify_acumula_todos_los_faltantes() {
        let mut catalog = FlowCatalog::new();
        let spec = FlowTypeSpec::new("demo", "eh-demo")
            .with_phases(vec![PhaseSpec::new("one", UnitOfWork::Handler("h-work".into()))
                                  .with_validators(["v-a", "v-b"])
                                  .with_pre_handlers(["h-pre"])]);
        catalog.register(spec).unwrap();

        let ctx = AppContext { catalog,
                               validators: ValidatorRegistry::new(),
                               handlers: HandlerRegistry::new(),
                               error_handlers: ErrorHandlerRegistry::new(),
                               rollback_tables: HashMap::new(),
                               executor: Arc::new(NullExecutor) };

        let err = ctx.verify().unwrap_err();
        assert_eq!(err.missing,
                   vec!["validator:v-a", "validator:v-b", "handler:h-pre", "handler:h-work",
                        "error_handler:eh-demo"]);
    }
}
