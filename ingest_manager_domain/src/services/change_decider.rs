// /////////////////////////////////////////////////////////////////////////////
// Incremental Ingestion Manager
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Change Decider
//!
//! Decides, per output stage, whether a newly observed document version
//! requires a resend, and produces the packed transformation-chain
//! fingerprint recorded alongside a successful send.

use crate::entities::{PipelineSpecification, PipelineTopology};
use crate::value_objects::VersionContext;

pub struct ChangeDecider;

impl ChangeDecider {
    /// True if any output stage needs the document resent.
    ///
    /// An empty `new_doc_version` is the sentinel for "force refetch" and
    /// short-circuits to `true` regardless of stored state.
    pub fn needs_reindex(
        topology: &PipelineTopology,
        spec: &PipelineSpecification,
        new_doc_version: &str,
        new_param_version: &str,
        new_authority: &str,
    ) -> bool {
        if new_doc_version.is_empty() {
            return true;
        }
        (0..topology.output_stage_count())
            .any(|output_index| Self::output_needs_reindex(topology, spec, output_index, new_doc_version, new_param_version, new_authority))
    }

    /// Same decision as [`Self::needs_reindex`], restricted to a single
    /// output stage (counted among output stages, in tree order). Used by
    /// the coordinator to compute a per-leaf "active" bit before building an
    /// add pipeline.
    pub fn output_needs_reindex(
        topology: &PipelineTopology,
        spec: &PipelineSpecification,
        output_index: usize,
        new_doc_version: &str,
        new_param_version: &str,
        new_authority: &str,
    ) -> bool {
        if new_doc_version.is_empty() {
            return true;
        }
        let stage = topology.output_stage_at(output_index);
        let Some(status) = spec.output_status(output_index) else {
            return true;
        };
        let Some(stored_version) = status.last_version.as_deref() else {
            return true;
        };
        if stored_version != new_doc_version {
            return true;
        }
        if status.forced_params.as_deref().unwrap_or("") != new_param_version {
            return true;
        }
        if status.authority_name != new_authority {
            return true;
        }
        let stage_output_version = spec.description(stage).map(VersionContext::as_str).unwrap_or("");
        if status.last_output_version.as_deref().unwrap_or("") != stage_output_version {
            return true;
        }
        let new_transformation_version = Self::pack_transformations(topology, spec, stage);
        status.last_transformation_version.as_deref().unwrap_or("") != new_transformation_version
    }

    /// Packs the ordered chain of transformation connection names and
    /// descriptions from `output_stage` up to the root into a single,
    /// round-trippable string.
    ///
    /// Names are delimited by `+`, descriptions by `!`; within each element
    /// occurrences of the element's own delimiter or of `\` are escaped with
    /// a preceding `\`. The two packed lists are concatenated, so the
    /// encoding is a total, injective function of the ordered chain: equal
    /// chains pack identically and differing chains never collide, even
    /// when names or descriptions themselves contain `+`, `!`, or `\`.
    pub fn pack_transformations(topology: &PipelineTopology, spec: &PipelineSpecification, output_stage: usize) -> String {
        let chain = topology.transformation_chain(output_stage, spec);
        let names: Vec<&str> = chain.iter().map(|(name, _)| *name).collect();
        let descriptions: Vec<&str> =
            chain.iter().map(|(_, desc)| desc.map(VersionContext::as_str).unwrap_or("")).collect();

        let mut packed = pack_list(&names, '+');
        packed.push_str(&pack_list(&descriptions, '!'));
        packed
    }
}

fn pack_list(items: &[&str], delimiter: char) -> String {
    let mut out = String::new();
    for item in items {
        for c in item.chars() {
            if c == delimiter || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push(delimiter);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{PipelineStageKind, StageDescriptor};
    use crate::value_objects::DocumentIngestStatus;

    fn chain_spec() -> (PipelineTopology, PipelineSpecification) {
        let stages = vec![
            StageDescriptor::new(None, "tika", PipelineStageKind::Transformation),
            StageDescriptor::new(Some(0), "solr", PipelineStageKind::Output),
        ];
        let spec = PipelineSpecification::WithDescriptions {
            stages,
            descriptions: vec![VersionContext::new("tika-v1"), VersionContext::new("solr-v1")],
        };
        let topo = PipelineTopology::build(&spec).unwrap();
        (topo, spec)
    }

    #[test]
    fn empty_new_version_always_forces_reindex() {
        let (topo, spec) = chain_spec();
        assert!(ChangeDecider::needs_reindex(&topo, &spec, "", "p", "auth"));
    }

    #[test]
    fn missing_status_forces_reindex() {
        let (topo, spec) = chain_spec();
        assert!(ChangeDecider::needs_reindex(&topo, &spec, "v1", "p", "auth"));
    }

    #[test]
    fn identical_fingerprints_do_not_force_reindex() {
        let stages = vec![
            StageDescriptor::new(None, "tika", PipelineStageKind::Transformation),
            StageDescriptor::new(Some(0), "solr", PipelineStageKind::Output),
        ];
        let descriptions = vec![VersionContext::new("tika-v1"), VersionContext::new("solr-v1")];
        let packed = {
            let probe_spec = PipelineSpecification::WithDescriptions {
                stages: stages.clone(),
                descriptions: descriptions.clone(),
            };
            let probe_topo = PipelineTopology::build(&probe_spec).unwrap();
            ChangeDecider::pack_transformations(&probe_topo, &probe_spec, 1)
        };
        let status = DocumentIngestStatus {
            last_version: Some("v1".to_string()),
            last_transformation_version: Some(packed),
            last_output_version: Some("solr-v1".to_string()),
            forced_params: Some("p".to_string()),
            authority_name: "auth".to_string(),
        };
        let spec = PipelineSpecification::WithVersions {
            stages,
            descriptions,
            output_statuses: vec![status],
        };
        let topo = PipelineTopology::build(&spec).unwrap();
        assert!(!ChangeDecider::needs_reindex(&topo, &spec, "v1", "p", "auth"));
        assert!(ChangeDecider::needs_reindex(&topo, &spec, "v2", "p", "auth"));
    }

    #[test]
    fn pack_transformations_is_injective_across_delimiter_collisions() {
        let spec_a = PipelineSpecification::WithDescriptions {
            stages: vec![
                StageDescriptor::new(None, "a+b", PipelineStageKind::Transformation),
                StageDescriptor::new(Some(0), "c", PipelineStageKind::Transformation),
                StageDescriptor::new(Some(1), "out", PipelineStageKind::Output),
            ],
            descriptions: vec![
                VersionContext::new("v!1"),
                VersionContext::new("d\\e"),
                VersionContext::new("ignored"),
            ],
        };
        let spec_b = PipelineSpecification::WithDescriptions {
            stages: vec![
                StageDescriptor::new(None, "a", PipelineStageKind::Transformation),
                StageDescriptor::new(Some(0), "c", PipelineStageKind::Transformation),
                StageDescriptor::new(Some(1), "out", PipelineStageKind::Output),
            ],
            descriptions: vec![
                VersionContext::new("b+v!1"),
                VersionContext::new("d\\e"),
                VersionContext::new("ignored"),
            ],
        };
        let topo_a = PipelineTopology::build(&spec_a).unwrap();
        let topo_b = PipelineTopology::build(&spec_b).unwrap();
        let packed_a = ChangeDecider::pack_transformations(&topo_a, &spec_a, 2);
        let packed_b = ChangeDecider::pack_transformations(&topo_b, &spec_b, 2);
        assert_ne!(packed_a, packed_b);
    }

    #[test]
    fn pack_transformations_is_deterministic() {
        let (topo, spec) = chain_spec();
        let first = ChangeDecider::pack_transformations(&topo, &spec, 1);
        let second = ChangeDecider::pack_transformations(&topo, &spec, 1);
        assert_eq!(first, second);
    }
}
