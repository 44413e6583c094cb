// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Specification
//!
//! A declarative description of the transformation/output stage tree a
//! document flows through. Three shapes carry progressively more
//! information, modeled as a sum type (rather than a runtime-polymorphic
//! interface table) so each caller only pays for the data it actually
//! supplies:
//!
//! - [`PipelineSpecification::Basic`] — just the tree shape, for
//!   check-only calls that need no per-output fingerprints.
//! - [`PipelineSpecification::WithDescriptions`] — adds each stage's
//!   connector-produced [`VersionContext`], needed to build an executable
//!   pipeline.
//! - [`PipelineSpecification::WithVersions`] — additionally carries the
//!   previously-stored fingerprints per output stage, letting
//!   [`crate::services::ChangeDecider`] decide without a database round
//!   trip.

use crate::value_objects::{DocumentIngestStatus, VersionContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStageKind {
    Transformation,
    Output,
}

/// One node of the stage tree. `parent = None` marks a direct child of the
/// virtual root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDescriptor {
    pub parent: Option<usize>,
    pub connection_name: String,
    pub kind: PipelineStageKind,
}

impl StageDescriptor {
    pub fn new(parent: Option<usize>, connection_name: impl Into<String>, kind: PipelineStageKind) -> Self {
        Self { parent, connection_name: connection_name.into(), kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineSpecification {
    Basic { stages: Vec<StageDescriptor> },
    WithDescriptions { stages: Vec<StageDescriptor>, descriptions: Vec<VersionContext> },
    WithVersions {
        stages: Vec<StageDescriptor>,
        descriptions: Vec<VersionContext>,
        /// Parallel to the stages that are outputs, in the order those
        /// output stages appear in `stages`.
        output_statuses: Vec<DocumentIngestStatus>,
    },
}

impl PipelineSpecification {
    pub fn stages(&self) -> &[StageDescriptor] {
        match self {
            Self::Basic { stages }
            | Self::WithDescriptions { stages, .. }
            | Self::WithVersions { stages, .. } => stages,
        }
    }

    pub fn stage_count(&self) -> usize {
        self.stages().len()
    }

    /// The connector-produced fingerprint for a stage, if this variant
    /// carries descriptions.
    pub fn description(&self, stage: usize) -> Option<&VersionContext> {
        match self {
            Self::Basic { .. } => None,
            Self::WithDescriptions { descriptions, .. } | Self::WithVersions { descriptions, .. } => {
                descriptions.get(stage)
            }
        }
    }

    /// The previously-stored fingerprints for the `nth` output stage
    /// (counting only output-kind stages, in tree order), if this variant
    /// carries them.
    pub fn output_status(&self, output_index: usize) -> Option<&DocumentIngestStatus> {
        match self {
            Self::WithVersions { output_statuses, .. } => output_statuses.get(output_index),
            _ => None,
        }
    }

    pub fn output_stage_indices(&self) -> Vec<usize> {
        self.stages()
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind == PipelineStageKind::Output)
            .map(|(i, _)| i)
            .collect()
    }
}
