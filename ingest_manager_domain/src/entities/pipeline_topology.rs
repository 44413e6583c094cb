// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Topology
//!
//! The tree-shaped view of a [`PipelineSpecification`]: which stage is the
//! parent of which, and which stages are leaves (outputs). Built once from
//! a specification and then queried repeatedly by [`crate::services`] and by
//! the pipeline builder in the infrastructure layer.

use crate::entities::pipeline_spec::{PipelineSpecification, PipelineStageKind};
use crate::error::IngestError;
use crate::value_objects::VersionContext;

#[derive(Debug, Clone)]
pub struct PipelineTopology {
    parents: Vec<Option<usize>>,
    connection_names: Vec<String>,
    kinds: Vec<PipelineStageKind>,
    children: Vec<Vec<usize>>,
    output_stages: Vec<usize>,
}

impl PipelineTopology {
    /// Builds a topology from a specification, validating that the parent
    /// pointers form a rooted tree with no cycles and that every leaf is an
    /// output stage.
    pub fn build(spec: &PipelineSpecification) -> Result<Self, IngestError> {
        let stages = spec.stages();
        let n = stages.len();
        let mut parents = Vec::with_capacity(n);
        let mut connection_names = Vec::with_capacity(n);
        let mut kinds = Vec::with_capacity(n);
        let mut children = vec![Vec::new(); n];

        for (i, stage) in stages.iter().enumerate() {
            if let Some(p) = stage.parent {
                if p >= n {
                    return Err(IngestError::Invariant(format!(
                        "stage {i} has out-of-range parent {p}"
                    )));
                }
                children[p].push(i);
            }
            parents.push(stage.parent);
            connection_names.push(stage.connection_name.clone());
            kinds.push(stage.kind);
        }

        let output_stages: Vec<usize> = (0..n).filter(|&i| kinds[i] == PipelineStageKind::Output).collect();

        let topology = Self { parents, connection_names, kinds, children, output_stages };
        topology.validate_tree_shape()?;
        Ok(topology)
    }

    fn validate_tree_shape(&self) -> Result<(), IngestError> {
        for i in 0..self.stage_count() {
            if self.children[i].is_empty() && self.kinds[i] != PipelineStageKind::Output {
                return Err(IngestError::Invariant(format!(
                    "stage {i} is a leaf but is not an output stage"
                )));
            }
        }
        // Cycle check: following parent pointers from any stage must reach
        // the root within stage_count steps.
        for start in 0..self.stage_count() {
            let mut current = Some(start);
            let mut steps = 0;
            while let Some(s) = current {
                steps += 1;
                if steps > self.stage_count() {
                    return Err(IngestError::Invariant("pipeline specification contains a cycle".into()));
                }
                current = self.parents[s];
            }
        }
        Ok(())
    }

    pub fn stage_count(&self) -> usize {
        self.parents.len()
    }

    /// Children of `stage`, or of the virtual root when `stage` is `None`.
    pub fn children_of(&self, stage: Option<usize>) -> Vec<usize> {
        match stage {
            None => (0..self.stage_count()).filter(|&i| self.parents[i].is_none()).collect(),
            Some(s) => self.children[s].clone(),
        }
    }

    pub fn parent_of(&self, stage: usize) -> Option<usize> {
        self.parents[stage]
    }

    pub fn kind_of(&self, stage: usize) -> PipelineStageKind {
        self.kinds[stage]
    }

    pub fn connection_name(&self, stage: usize) -> &str {
        &self.connection_names[stage]
    }

    pub fn output_stage_count(&self) -> usize {
        self.output_stages.len()
    }

    pub fn output_stage_at(&self, index: usize) -> usize {
        self.output_stages[index]
    }

    pub fn output_stages(&self) -> &[usize] {
        &self.output_stages
    }

    pub fn is_output(&self, stage: usize) -> bool {
        self.kinds[stage] == PipelineStageKind::Output
    }

    /// Walks from `stage` up to the root, yielding each ancestor
    /// transformation stage in order (nearest first), paired with its
    /// description from `spec`. Used by `pack_transformations`.
    pub fn transformation_chain<'a>(
        &self,
        stage: usize,
        spec: &'a PipelineSpecification,
    ) -> Vec<(&str, Option<&'a VersionContext>)> {
        let mut chain = Vec::new();
        let mut current = self.parents[stage];
        while let Some(s) = current {
            chain.push((self.connection_name(s), spec.description(s)));
            current = self.parents[s];
        }
        chain
    }
}
