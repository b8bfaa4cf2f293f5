// response.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::DomainError;

/// Estado de validación de una respuesta recolectada manualmente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Pending,
    Validated,
    Rejected,
}

/// Una respuesta de cuestionario: el valor recolectado para un campo, con
/// enlace opcional al gap que la originó. El enlace puede faltar cuando los
/// datos llegan parcialmente vinculados; el write-back las considera igual.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionnaireResponse {
    id: Uuid,
    tenant_id: Uuid,
    engagement_id: Uuid,
    gap_id: Option<Uuid>,
    field_name: String,
    /// Valor crudo de la respuesta: string, número, lista de strings u
    /// objeto, según cómo se recolectó.
    value: Value,
    confidence: f64,
    status: ResponseStatus,
    /// Pista opcional de registro objetivo cuando la respuesta la trae.
    asset_hint: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl QuestionnaireResponse {
    pub fn new(tenant_id: Uuid,
               engagement_id: Uuid,
               gap_id: Option<Uuid>,
               field_name: impl Into<String>,
               value: Value,
               confidence: f64)
               -> Result<Self, DomainError> {
        let field_name = field_name.into();
        if field_name.trim().is_empty() {
            return Err(DomainError::ValidationError("El nombre de campo de una respuesta no puede estar vacío".to_string()));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(DomainError::ValidationError(format!("Confianza fuera de rango [0,1]: {confidence}")));
        }
        Ok(QuestionnaireResponse { id: Uuid::new_v4(),
                                   tenant_id,
                                   engagement_id,
                                   gap_id,
                                   field_name,
                                   value,
                                   confidence,
                                   status: ResponseStatus::Pending,
                                   asset_hint: None,
                                   created_at: Utc::now() })
    }

    /// Crea una nueva instancia con la pista de registro objetivo.
    pub fn with_asset_hint(&self, asset_id: Uuid) -> Self {
        let mut r = self.clone();
        r.asset_hint = Some(asset_id);
        r
    }

    /// Crea una nueva instancia con estado de validación modificado.
    pub fn with_status(&self, status: ResponseStatus) -> Self {
        let mut r = self.clone();
        r.status = status;
        r
    }

    /// ¿La respuesta carga un valor utilizable?
    pub fn has_value(&self) -> bool {
        match &self.value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Array(a) => !a.is_empty(),
            _ => true,
        }
    }

    /// Hash estable del contenido (campo + valor), para deduplicación y
    /// verificación de idempotencia. El timestamp no participa.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.field_name.as_bytes());
        hasher.update(self.value.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn engagement_id(&self) -> Uuid {
        self.engagement_id
    }

    pub fn gap_id(&self) -> Option<Uuid> {
        self.gap_id
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    pub fn asset_hint(&self) -> Option<Uuid> {
        self.asset_hint
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
