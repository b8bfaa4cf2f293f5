//! Vista de conveniencia sobre un flujo concreto: fija el `flow_id` y
//! delega en el motor.

use serde_json::Value;
use uuid::Uuid;

use super::core::{AdvanceOutcome, FlowEngine};
use crate::errors::FlowEngineError;
use crate::event::EventStore;
use crate::state::{FlowInstance, FlowRepository};

pub struct FlowCtx<'a, E: EventStore, R: FlowRepository> {
    engine: &'a mut FlowEngine<E, R>,
    flow_id: Uuid,
}

impl<'a, E: EventStore, R: FlowRepository> FlowCtx<'a, E, R> {
    pub fn new(engine: &'a mut FlowEngine<E, R>, flow_id: Uuid) -> Self {
        Self { engine, flow_id }
    }

    pub fn flow_id(&self) -> Uuid {
        self.flow_id
    }

    pub fn instance(&self) -> Result<FlowInstance, FlowEngineError> {
        self.engine.load(self.flow_id)
    }

    pub fn advance(&mut self) -> Result<AdvanceOutcome, FlowEngineError> {
        self.engine.advance(self.flow_id)
    }

    pub fn run_to_completion(&mut self) -> Result<FlowInstance, FlowEngineError> {
        self.engine.run_to_completion(self.flow_id)
    }

    pub fn pause(&mut self) -> Result<(), FlowEngineError> {
        self.engine.pause(self.flow_id)
    }

    pub fn resume(&mut self) -> Result<(), FlowEngineError> {
        self.engine.resume(self.flow_id)
    }

    pub fn provide_input(&mut self, source: &str, data: Value) -> Result<(), FlowEngineError> {
        self.engine.provide_input(self.flow_id, source, data)
    }
}
