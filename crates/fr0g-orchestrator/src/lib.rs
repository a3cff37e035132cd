pub mod error;
pub mod resources;
pub mod strategy;
pub mod types;
pub mod workflow;

pub use error::OrchestratorError;
pub use resources::ResourcePool;
pub use strategy::StrategyOrchestrator;
pub use types::{
    Condition, Strategy, StrategyAction, StrategyKind, Workflow, WorkflowStep, WorkflowTrigger,
};
pub use workflow::{OutboundDispatcher, WorkflowEngine};
