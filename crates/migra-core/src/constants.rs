//! Constantes del motor core.
//!
//! Este módulo agrupa valores estáticos que participan en el cálculo de
//! fingerprints y en la compatibilidad entre versiones del motor. Cambios en
//! estas constantes pueden afectar la reproducibilidad si forman parte del
//! input del hashing (por diseño, `ENGINE_VERSION` sí lo es).

/// Versión lógica del motor. Se incluye en el fingerprint de cada fase para
/// asegurar que un cambio de versión del engine invalide/recalcule
/// determinísticamente los fingerprints aunque la definición y los datos no
/// cambien. Mantener estable mientras no haya cambios incompatibles.
pub const ENGINE_VERSION: &str = "M1.0";

/// Tamaño de lote por defecto para el write-back de respuestas resueltas.
/// Los consumidores pueden sobreescribirlo por configuración de flujo.
pub const DEFAULT_WRITEBACK_BATCH_SIZE: usize = 50;
