//! Entities and the pipeline specification/topology types built from them.

mod ingest_record;
mod pipeline_spec;
mod pipeline_topology;

pub use ingest_record::IngestRecord;
pub use pipeline_spec::{PipelineSpecification, PipelineStageKind, StageDescriptor};
pub use pipeline_topology::PipelineTopology;
