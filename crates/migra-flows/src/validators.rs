//! Validadores de fase registrados por nombre.
//!
//! Ninguno lanza: devuelven reportes con errores y advertencias agregados,
//! y el motor decide. Los umbrales ajustables llegan por `overrides` (la
//! configuración por defecto del tipo de flujo).

use serde_json::Value;

use migra_core::registry::{PhaseValidator, ValidationReport};

use crate::tiers::AutomationTier;

/// Valida los scores de calidad medidos contra el mínimo del nivel de
/// automatización. Bloquea en niveles 1-2, advierte en 3-4.
pub struct DataQualityValidator;

impl PhaseValidator for DataQualityValidator {
    fn validate(&self, _input: &Value, flow_state: &Value, overrides: &Value) -> ValidationReport {
        let tier = AutomationTier::from_overrides(overrides);
        let minimum = tier.min_quality();

        let scores = match flow_state.get("quality_scores").and_then(Value::as_object) {
            Some(map) if !map.is_empty() => map,
            _ => {
                return ValidationReport::failed(vec!["no hay scores de calidad medidos".to_string()]);
            }
        };

        let mut errors = vec![];
        let mut warnings = vec![];
        for (platform, score) in scores {
            let score = score.as_f64().unwrap_or(0.0);
            if score < minimum {
                let msg = format!("calidad de datos de {platform} es {score:.2}, bajo el mínimo {minimum:.2}");
                if tier.quality_is_blocking() {
                    errors.push(msg);
                } else {
                    warnings.push(msg);
                }
            }
        }

        if errors.is_empty() {
            ValidationReport::ok().with_warnings(warnings)
        } else {
            ValidationReport::failed(errors).with_warnings(warnings)
        }
    }
}

/// Exige credenciales para cada plataforma detectada antes de recolectar.
pub struct PlatformCredentialsValidator;

impl PhaseValidator for PlatformCredentialsValidator {
    fn validate(&self, _input: &Value, flow_state: &Value, _overrides: &Value) -> ValidationReport {
        let detected: Vec<&str> = flow_state.get("detected_platforms")
                                            .and_then(Value::as_array)
                                            .map(|a| a.iter().filter_map(Value::as_str).collect())
                                            .unwrap_or_default();
        let creds = flow_state.get("platform_credentials").and_then(Value::as_object);

        let mut errors = vec![];
        for platform in detected {
            let present = creds.map(|c| c.contains_key(platform)).unwrap_or(false);
            if !present {
                errors.push(format!("faltan credenciales para la plataforma {platform}"));
            }
        }

        if errors.is_empty() {
            ValidationReport::ok()
        } else {
            ValidationReport::failed(errors)
        }
    }
}

/// Valida la configuración de recolección (lotes y timeout positivos).
pub struct CollectionConfigValidator;

impl PhaseValidator for CollectionConfigValidator {
    fn validate(&self, _input: &Value, _flow_state: &Value, overrides: &Value) -> ValidationReport {
        let mut errors = vec![];
        if let Some(n) = overrides.get("batch_size").and_then(Value::as_i64) {
            if n <= 0 {
                errors.push(format!("batch_size debe ser positivo, recibido {n}"));
            }
        }
        if let Some(n) = overrides.get("timeout_ms").and_then(Value::as_i64) {
            if n <= 0 {
                errors.push(format!("timeout_ms debe ser positivo, recibido {n}"));
            }
        }
        if errors.is_empty() {
            ValidationReport::ok()
        } else {
            ValidationReport::failed(errors)
        }
    }
}
