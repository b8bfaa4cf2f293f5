// asset.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Registro de dominio evaluado: una aplicación o servidor dentro de un
/// engagement. Sólo el subsistema de write-back lo muta, y siempre bajo
/// predicados de tenant + engagement; los handlers de fase nunca lo tocan
/// directamente.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub engagement_id: Uuid,
    pub application_name: String,
    pub environment: Option<String>,
    pub criticality: Option<String>,
    pub business_owner: Option<String>,
    pub operating_system: Option<String>,
    pub cpu_cores: Option<i32>,
    pub memory_gb: Option<f64>,
    pub storage_gb: Option<f64>,
    pub monthly_cost: Option<f64>,
    pub dependencies: Vec<String>,
    /// Canal lateral JSON para campos técnicos sin columna propia.
    pub technical_details: Value,
    /// Canal lateral JSON para atributos de negocio sin columna propia.
    pub custom_attributes: Value,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    pub fn new(tenant_id: Uuid, engagement_id: Uuid, application_name: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4(),
               tenant_id,
               engagement_id,
               application_name: application_name.into(),
               environment: None,
               criticality: None,
               business_owner: None,
               operating_system: None,
               cpu_cores: None,
               memory_gb: None,
               storage_gb: None,
               monthly_cost: None,
               dependencies: vec![],
               technical_details: Value::Null,
               custom_attributes: Value::Null,
               updated_at: Utc::now() }
    }
}
