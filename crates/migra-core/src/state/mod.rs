mod types;

pub use types::{flow_type_of, FlowInstance, FlowRepository, FlowStatus, InMemoryFlowRepository, PhaseSlot,
                PhaseStatus, TenantScope};
