// fields.rs
//
// Normalización de nombres de campo de respuestas y mapeo tipado hacia las
// columnas permitidas del registro de dominio. El write-back sólo escribe
// columnas de esta lista; todo lo demás cae en los canales laterales JSON.

use serde_json::Value;
use uuid::Uuid;

/// Canal lateral al que va un campo sin columna propia.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideChannel {
    TechnicalDetails,
    CustomAttributes,
}

/// Destino tipado de un campo normalizado. Lista cerrada: escribir una
/// columna arbitraria nunca es una opción.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTarget {
    Environment,
    Criticality,
    BusinessOwner,
    ApplicationName,
    OperatingSystem,
    CpuCores,
    MemoryGb,
    StorageGb,
    MonthlyCost,
    Dependencies,
    ComplianceScope,
    Side(SideChannel),
}

impl FieldTarget {
    pub fn is_numeric(&self) -> bool {
        matches!(self,
                 FieldTarget::CpuCores
                 | FieldTarget::MemoryGb
                 | FieldTarget::StorageGb
                 | FieldTarget::MonthlyCost)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, FieldTarget::Dependencies)
    }
}

/// Nombre de campo ya normalizado, con la pista de registro si el nombre
/// compuesto la traía.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedField {
    pub name: String,
    /// UUID extraído de un prefijo compuesto `"{recordID}__{field}"`.
    pub record_hint: Option<Uuid>,
    pub target: FieldTarget,
}

/// Normaliza un nombre de campo de respuesta:
/// 1. separa el prefijo compuesto `"{recordID}__{field}"` si existe;
/// 2. quita el prefijo de bolsa JSON con punto
///    (`customAttributes.stakeholderImpact` -> `stakeholderImpact`);
/// 3. resuelve el destino tipado contra la lista permitida.
pub fn normalize_field_name(raw: &str) -> NormalizedField {
    let (record_hint, rest) = match raw.split_once("__") {
        Some((prefix, rest)) => match Uuid::parse_str(prefix) {
            Ok(id) => (Some(id), rest),
            Err(_) => (None, raw),
        },
        None => (None, raw),
    };

    let (bag, name) = match rest.split_once('.') {
        Some((prefix, suffix)) => (Some(prefix), suffix),
        None => (None, rest),
    };

    let snake = to_snake(name);
    let target = match snake.as_str() {
        "environment" => FieldTarget::Environment,
        "criticality" => FieldTarget::Criticality,
        "business_owner" => FieldTarget::BusinessOwner,
        "application_name" => FieldTarget::ApplicationName,
        "operating_system" => FieldTarget::OperatingSystem,
        "cpu_cores" => FieldTarget::CpuCores,
        "memory_gb" => FieldTarget::MemoryGb,
        "storage_gb" => FieldTarget::StorageGb,
        "monthly_cost" => FieldTarget::MonthlyCost,
        "dependencies" => FieldTarget::Dependencies,
        "compliance_scope" => FieldTarget::ComplianceScope,
        _ => FieldTarget::Side(side_channel_for(bag, &snake)),
    };

    NormalizedField { name: snake, record_hint, target }
}

/// El prefijo de bolsa decide el canal; sin prefijo, los campos de aspecto
/// técnico van a `technical_details` y el resto a `custom_attributes`.
fn side_channel_for(bag: Option<&str>, snake: &str) -> SideChannel {
    match bag.map(to_snake).as_deref() {
        Some("technical_details") => SideChannel::TechnicalDetails,
        Some("custom_attributes") => SideChannel::CustomAttributes,
        _ => {
            const TECHNICAL: &[&str] = &["ip_address", "hostname", "middleware", "database_engine",
                                         "runtime", "framework", "network_zone"];
            if TECHNICAL.contains(&snake) {
                SideChannel::TechnicalDetails
            } else {
                SideChannel::CustomAttributes
            }
        }
    }
}

fn to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Primer número parseable dentro de un valor posiblemente multivaluado.
pub fn first_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_leading_number(s),
        Value::Array(items) => items.iter().find_map(first_number),
        _ => None,
    }
}

fn parse_leading_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if let Ok(n) = trimmed.parse::<f64>() {
        return Some(n);
    }
    // "16 vCPU" o "256 GB": toma el primer token numérico.
    trimmed.split_whitespace().find_map(|tok| tok.parse::<f64>().ok())
}

/// Aplana un valor a texto: listas unidas con `", "`, escalares tal cual.
pub fn flatten_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(flatten_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        _ => None,
    }
}

/// Preserva la estructura de lista: un escalar se envuelve, una lista se
/// aplana elemento a elemento.
pub fn as_text_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(flatten_text).collect(),
        other => flatten_text(other).map(|s| vec![s]).unwrap_or_default(),
    }
}
