//! Definición declarativa de una fase y su política de retry.
//!
//! Una `PhaseSpec` no contiene código ejecutable: validadores y handlers se
//! referencian por nombre estable y se resuelven contra los registries del
//! `AppContext` una sola vez al arranque del proceso.

use std::time::Duration;

/// Parámetros de reintento/backoff de una fase.
///
/// Invariantes: los intentos nunca superan `max_attempts`; la espera nunca
/// supera `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Política sin reintentos: un único intento.
    pub const fn none() -> Self {
        Self { max_attempts: 1,
               initial_delay: Duration::ZERO,
               backoff_multiplier: 1.0,
               max_delay: Duration::ZERO }
    }

    /// Espera previa al intento `attempt + 1`, tras fallar el intento
    /// `attempt` (1-based):
    /// `min(max_delay, initial_delay * multiplier^(attempt - 1))`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.powi(attempt as i32 - 1);
        let raw = self.initial_delay.as_secs_f64() * factor;
        let capped = raw.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3,
               initial_delay: Duration::from_millis(200),
               backoff_multiplier: 2.0,
               max_delay: Duration::from_secs(30) }
    }
}

/// Capacidades de una fase. Todo lo no habilitado es rechazado por el motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseCaps {
    pub can_pause: bool,
    pub can_skip: bool,
    pub can_rollback: bool,
}

/// Unidad de trabajo de la fase: lógica determinista registrada por nombre, o
/// el task executor externo (opaco) con su contrato de claves declarado.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOfWork {
    /// Handler registrado que produce el delta de estado de la fase.
    Handler(String),
    /// Executor externo: `inputs` son referencias con nombre dentro del
    /// estado del flujo; `required_outputs` son las claves cuya presencia el
    /// motor verifica en la respuesta. Nada más del executor es inspeccionado.
    Executor {
        inputs: Vec<String>,
        required_outputs: Vec<String>,
    },
}

/// Descripción declarativa e inmutable de una fase.
#[derive(Debug, Clone)]
pub struct PhaseSpec {
    pub name: String,
    pub required_inputs: Vec<String>,
    pub optional_inputs: Vec<String>,
    /// Nombres de validadores, en orden. Todos se ejecutan siempre; los
    /// errores se agregan (union, no first-wins).
    pub validators: Vec<String>,
    pub pre_handlers: Vec<String>,
    pub work: UnitOfWork,
    pub post_handlers: Vec<String>,
    pub completion_handler: Option<String>,
    pub retry: RetryPolicy,
    /// Presupuesto de ejecución de la fase; exceder es fallo reintentable.
    pub timeout: Option<Duration>,
    pub caps: PhaseCaps,
}

impl PhaseSpec {
    pub fn new(name: impl Into<String>, work: UnitOfWork) -> Self {
        Self { name: name.into(),
               required_inputs: vec![],
               optional_inputs: vec![],
               validators: vec![],
               pre_handlers: vec![],
               work,
               post_handlers: vec![],
               completion_handler: None,
               retry: RetryPolicy::default(),
               timeout: None,
               caps: PhaseCaps::default() }
    }

    pub fn with_required_inputs<I, S>(mut self, keys: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        self.required_inputs = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_optional_inputs<I, S>(mut self, keys: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        self.optional_inputs = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_validators<I, S>(mut self, names: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        self.validators = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_pre_handlers<I, S>(mut self, names: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        self.pre_handlers = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_post_handlers<I, S>(mut self, names: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        self.post_handlers = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_completion_handler(mut self, name: impl Into<String>) -> Self {
        self.completion_handler = Some(name.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_caps(mut self, caps: PhaseCaps) -> Self {
        self.caps = caps;
        self
    }

    /// Nombres de handlers que esta fase referencia (para verificación de
    /// completitud al arranque).
    pub fn handler_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.pre_handlers.iter().map(String::as_str).collect();
        if let UnitOfWork::Handler(h) = &self.work {
            names.push(h.as_str());
        }
        names.extend(self.post_handlers.iter().map(String::as_str));
        if let Some(c) = &self.completion_handler {
            names.push(c.as_str());
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_and_is_capped() {
        let p = RetryPolicy { max_attempts: 5,
                              initial_delay: Duration::from_millis(100),
                              backoff_multiplier: 2.0,
                              max_delay: Duration::from_millis(350) };
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        // 400ms superaría max_delay; queda acotado
        assert_eq!(p.delay_for(3), Duration::from_millis(350));
        assert_eq!(p.delay_for(4), Duration::from_millis(350));
    }

    #[test]
    fn no_retry_policy_has_single_attempt() {
        let p = RetryPolicy::none();
        assert_eq!(p.max_attempts, 1);
        assert_eq!(p.delay_for(1), Duration::ZERO);
    }

    #[test]
    fn handler_names_cover_all_slots() {
        let spec = PhaseSpec::new("synthesis", UnitOfWork::Handler("synthesize".into()))
            .with_pre_handlers(["snapshot-inputs"])
            .with_post_handlers(["publish-summary"])
            .with_completion_handler("notify-owner");
        assert_eq!(spec.handler_names(),
                   vec!["snapshot-inputs", "synthesize", "publish-summary", "notify-owner"]);
    }
}
