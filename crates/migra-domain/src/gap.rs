// gap.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::DomainError;

/// Estado de resolución de un gap. La transición es de una sola vía:
/// `Pending -> Resolved`, exactamente una vez.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapStatus {
    Pending,
    Resolved,
}

/// Prioridad de resolución del gap, usada para ordenar cuestionarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// Un dato faltante detectado durante el análisis de cobertura: qué campo
/// falta, en qué categoría y con qué pistas para localizar el registro de
/// dominio afectado.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gap {
    id: Uuid,
    tenant_id: Uuid,
    engagement_id: Uuid,
    field_name: String,
    category: String,
    priority: GapPriority,
    status: GapStatus,
    /// Pistas opcionales: `asset_id` (UUID explícito) y/o `application_name`
    /// (nombre legible) para resolver el registro objetivo.
    metadata: Value,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl Gap {
    pub fn new(tenant_id: Uuid,
               engagement_id: Uuid,
               field_name: impl Into<String>,
               category: impl Into<String>,
               priority: GapPriority,
               metadata: Value)
               -> Result<Self, DomainError> {
        let field_name = field_name.into();
        if field_name.trim().is_empty() {
            return Err(DomainError::ValidationError("El nombre de campo de un gap no puede estar vacío".to_string()));
        }
        Ok(Gap { id: Uuid::new_v4(),
                 tenant_id,
                 engagement_id,
                 field_name,
                 category: category.into(),
                 priority,
                 status: GapStatus::Pending,
                 metadata,
                 created_at: Utc::now(),
                 resolved_at: None })
    }

    /// Marca el gap como resuelto, creando una nueva instancia.
    ///
    /// # Errores
    /// Retorna `DomainError::InvalidTransition` si el gap ya fue resuelto:
    /// la transición ocurre exactamente una vez.
    pub fn resolve(&self) -> Result<Self, DomainError> {
        if self.status == GapStatus::Resolved {
            return Err(DomainError::InvalidTransition(format!("El gap {} ya está resuelto", self.id)));
        }
        let mut resolved = self.clone();
        resolved.status = GapStatus::Resolved;
        resolved.resolved_at = Some(Utc::now());
        Ok(resolved)
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

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn priority(&self) -> GapPriority {
        self.priority
    }

    pub fn status(&self) -> GapStatus {
        self.status
    }

    pub fn is_resolved(&self) -> bool {
        self.status == GapStatus::Resolved
    }

    pub fn metadata(&self) -> &Value {
        &self.metadata
    }

    /// Pista explícita de registro objetivo, si la hay.
    pub fn asset_hint(&self) -> Option<Uuid> {
        self.metadata
            .get("asset_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    /// Pista de nombre legible de aplicación, si la hay.
    pub fn application_hint(&self) -> Option<&str> {
        self.metadata.get("application_name").and_then(Value::as_str)
    }
}
