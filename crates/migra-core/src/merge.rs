//! Utilidades para fusionar estado JSON de forma determinista.
//!
//! Merge "shallow": las claves de `b` reemplazan a las de `a` cuando ambos
//! son objetos; cuando alguno no es objeto, `b` tiene precedencia. Es la
//! única semántica de merge del motor: deltas de fase, checkpoints y
//! overrides de configuración se aplican todos con esta función, de modo que
//! un checkpoint nunca sobreescribe el estado completo (union por clave).

use serde_json::Value;

/// Merge shallow: keys from `b` override keys from `a` when both are objects.
pub fn merge_json(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Object(ma), Value::Object(mb)) => {
            let mut out = ma.clone();
            for (k, v) in mb.iter() {
                out.insert(k.clone(), v.clone());
            }
            Value::Object(out)
        }
        // Non-objects: override
        (_, other) => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_is_a_union_per_key() {
        let a = json!({"kept": 1, "replaced": "old"});
        let b = json!({"replaced": "new", "added": true});
        let m = merge_json(&a, &b);
        assert_eq!(m, json!({"kept": 1, "replaced": "new", "added": true}));
    }

    #[test]
    fn non_object_overrides() {
        assert_eq!(merge_json(&json!({"a": 1}), &json!(42)), json!(42));
    }
}
