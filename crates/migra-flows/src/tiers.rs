//! Niveles de automatización y sus umbrales de calidad de datos.
//!
//! El nivel viene en la configuración por defecto del tipo de flujo
//! (`defaults.automation_tier`) y ajusta cuán estricta es la validación de
//! calidad: en los niveles altos un score bajo bloquea la fase; en los
//! bajos sólo advierte.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationTier {
    Tier1,
    Tier2,
    Tier3,
    Tier4,
}

impl AutomationTier {
    pub fn from_overrides(overrides: &Value) -> Self {
        match overrides.get("automation_tier").and_then(Value::as_u64) {
            Some(1) => AutomationTier::Tier1,
            Some(3) => AutomationTier::Tier3,
            Some(4) => AutomationTier::Tier4,
            // Nivel 2 es el punto de partida habitual de un engagement.
            _ => AutomationTier::Tier2,
        }
    }

    /// Score mínimo de calidad de datos exigido por el nivel.
    pub fn min_quality(&self) -> f64 {
        match self {
            AutomationTier::Tier1 => 0.95,
            AutomationTier::Tier2 => 0.85,
            AutomationTier::Tier3 => 0.70,
            AutomationTier::Tier4 => 0.55,
        }
    }

    /// En los niveles 1 y 2 un score insuficiente es error duro; en 3 y 4
    /// es sólo advertencia.
    pub fn quality_is_blocking(&self) -> bool {
        matches!(self, AutomationTier::Tier1 | AutomationTier::Tier2)
    }
}
