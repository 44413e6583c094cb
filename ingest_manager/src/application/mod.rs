//! Application layer: builds and runs pipelines from a
//! [`ingest_manager_domain::PipelineSpecification`] and exposes the
//! coordinator façade external callers use.

pub mod coordinator;
pub mod pipeline_builder;
pub mod pipeline_executor;

pub use coordinator::IngestCoordinator;
pub use pipeline_builder::{FanoutNode, OutputEntryPoint, PipelineBuilder, PipelineEntryPoint, TransformationEntryPoint};
pub use pipeline_executor::{AddContext, CheckRequest, PipelineExecutor};
