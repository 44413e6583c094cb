// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Builder
//!
//! Builds an executable fan-out tree from a [`PipelineTopology`], bottom-up:
//! start from one entry point per output stage, then repeatedly collapse
//! every fully-ready sibling group under its parent into a transformation
//! entry point wrapping a fan-out node, until only the root's direct
//! children remain.

use ingest_manager_domain::{
    IngestError, OutputConnector, PipelineSpecification, PipelineTopology, TransformationConnector, VersionContext,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One executable node of the pipeline: either an output leaf or a
/// transformation that fans out into its own children.
pub enum PipelineEntryPoint {
    Output(OutputEntryPoint),
    Transformation(TransformationEntryPoint),
}

impl PipelineEntryPoint {
    pub fn stage(&self) -> usize {
        match self {
            Self::Output(o) => o.stage,
            Self::Transformation(t) => t.stage,
        }
    }

    /// A transformation is active iff at least one descendant output leaf is
    /// active; an output leaf carries its own precomputed bit.
    pub fn is_active(&self) -> bool {
        match self {
            Self::Output(o) => o.active,
            Self::Transformation(t) => t.fanout.children.iter().any(Self::is_active),
        }
    }
}

pub struct OutputEntryPoint {
    pub stage: usize,
    pub connector: Arc<dyn OutputConnector>,
    pub description: VersionContext,
    /// Precomputed "needs reindex?" bit for add pipelines; always `true` for
    /// check pipelines (a check asks "indexable by at least one output",
    /// regardless of whether that output currently needs a resend).
    pub active: bool,
}

pub struct TransformationEntryPoint {
    pub stage: usize,
    pub connector: Arc<dyn TransformationConnector>,
    pub description: VersionContext,
    pub fanout: FanoutNode,
}

pub struct FanoutNode {
    pub children: Vec<PipelineEntryPoint>,
}

pub struct PipelineBuilder;

impl PipelineBuilder {
    /// Builds a check pipeline: every output stage is considered active.
    pub fn build_check(
        topology: &PipelineTopology,
        spec: &PipelineSpecification,
        output_connectors: &HashMap<usize, Arc<dyn OutputConnector>>,
        transformation_connectors: &HashMap<usize, Arc<dyn TransformationConnector>>,
    ) -> Result<FanoutNode, IngestError> {
        Self::build(topology, spec, output_connectors, transformation_connectors, None)
    }

    /// Builds an add pipeline: only the output stages named in
    /// `active_outputs` are marked active; an inactive output leaf is built
    /// (so the tree shape matches the topology) but is skipped at execution
    /// time and never counted toward the pipeline's accepted/rejected
    /// verdict.
    pub fn build_add(
        topology: &PipelineTopology,
        spec: &PipelineSpecification,
        output_connectors: &HashMap<usize, Arc<dyn OutputConnector>>,
        transformation_connectors: &HashMap<usize, Arc<dyn TransformationConnector>>,
        active_outputs: &HashSet<usize>,
    ) -> Result<FanoutNode, IngestError> {
        Self::build(topology, spec, output_connectors, transformation_connectors, Some(active_outputs))
    }

    fn build(
        topology: &PipelineTopology,
        spec: &PipelineSpecification,
        output_connectors: &HashMap<usize, Arc<dyn OutputConnector>>,
        transformation_connectors: &HashMap<usize, Arc<dyn TransformationConnector>>,
        active_outputs: Option<&HashSet<usize>>,
    ) -> Result<FanoutNode, IngestError> {
        let mut current: HashMap<usize, PipelineEntryPoint> = HashMap::new();

        for &stage in topology.output_stages() {
            let connector = output_connectors
                .get(&stage)
                .ok_or_else(|| IngestError::connector_absent(format!("no output connector for stage {stage}")))?
                .clone();
            let description = spec.description(stage).cloned().unwrap_or_default();
            let active = active_outputs.map(|set| set.contains(&stage)).unwrap_or(true);
            current.insert(stage, PipelineEntryPoint::Output(OutputEntryPoint { stage, connector, description, active }));
        }

        loop {
            let ready = (0..topology.stage_count()).find(|&stage| {
                !current.contains_key(&stage) && {
                    let children = topology.children_of(Some(stage));
                    !children.is_empty() && children.iter().all(|c| current.contains_key(c))
                }
            });
            let Some(parent) = ready else { break };

            let children_stages = topology.children_of(Some(parent));
            let children = children_stages
                .iter()
                .map(|c| current.remove(c).expect("checked present above"))
                .collect();

            let connector = transformation_connectors
                .get(&parent)
                .ok_or_else(|| IngestError::connector_absent(format!("no transformation connector for stage {parent}")))?
                .clone();
            let description = spec.description(parent).cloned().unwrap_or_default();
            current.insert(
                parent,
                PipelineEntryPoint::Transformation(TransformationEntryPoint {
                    stage: parent,
                    connector,
                    description,
                    fanout: FanoutNode { children },
                }),
            );
        }

        let root_stages = topology.children_of(None);
        let mut root_children = Vec::with_capacity(root_stages.len());
        for stage in &root_stages {
            let entry = current
                .remove(stage)
                .ok_or_else(|| IngestError::Invariant(format!("pipeline build did not converge on stage {stage}")))?;
            root_children.push(entry);
        }
        if !current.is_empty() {
            return Err(IngestError::Invariant("pipeline specification left unreachable stages".into()));
        }

        Ok(FanoutNode { children: root_children })
    }
}
