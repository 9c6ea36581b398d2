// pass.rs — Pass descriptors: metadata, dependency resolution, artifact IDs
//
// Declares the construction passes, their dependency edges and the artifacts
// they produce. The pipeline runner uses this to compute the minimal pass
// list for a `--stop-after` target.

use std::collections::HashSet;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    ParseInstructions,
    ParseDomains,
    AssembleKernel,
    CheckInameDeps,
    CheckReductionDuplication,
    TagReductionInames,
    CreateTemporaries,
    ExpandCses,
    CheckBoundWriters,
    CheckDuplicateNames,
    CheckWrittenVariables,
}

/// Each maps to one field of the construction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Statements, // Vec<Statement>
    Domains,    // Vec<BasicSet>
    Kernel,     // Kernel
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a construction pass.
pub struct PassDescriptor {
    /// Name used by `--stop-after` and in log lines.
    pub name: &'static str,
    /// Passes whose outputs this pass consumes.
    pub inputs: &'static [PassId],
    pub outputs: &'static [ArtifactId],
    /// Inputs whose change invalidates this pass's output.
    pub invalidation_key: &'static str,
    /// What holds once the pass has succeeded.
    pub invariants: &'static str,
}

pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::ParseInstructions => PassDescriptor {
            name: "parse_instructions",
            inputs: &[],
            outputs: &[ArtifactId::Statements],
            invalidation_key: "instructions + defines",
            invariants: "every line is one instruction or substitution rule",
        },
        PassId::ParseDomains => PassDescriptor {
            name: "parse_domains",
            inputs: &[PassId::ParseInstructions],
            outputs: &[ArtifactId::Domains],
            invalidation_key: "domains + defines + args + statements",
            invariants: "dimensions named, each iname introduced once",
        },
        PassId::AssembleKernel => PassDescriptor {
            name: "assemble_kernel",
            inputs: &[PassId::ParseDomains],
            outputs: &[ArtifactId::Kernel],
            invalidation_key: "statements + domains + args + options",
            invariants: "instruction ids unique and assigned",
        },
        PassId::CheckInameDeps => PassDescriptor {
            name: "check_iname_deps",
            inputs: &[PassId::AssembleKernel],
            outputs: &[ArtifactId::Kernel],
            invalidation_key: "kernel",
            invariants: "forced iname deps name existing inames",
        },
        PassId::CheckReductionDuplication => PassDescriptor {
            name: "check_reduction_duplication",
            inputs: &[PassId::AssembleKernel],
            outputs: &[ArtifactId::Kernel],
            invalidation_key: "kernel",
            invariants: "no '@' reduction inames",
        },
        PassId::TagReductionInames => PassDescriptor {
            name: "tag_reduction_inames",
            inputs: &[PassId::CheckInameDeps, PassId::CheckReductionDuplication],
            outputs: &[ArtifactId::Kernel],
            invalidation_key: "kernel",
            invariants: "reduction inames carry non-parallel tags",
        },
        PassId::CreateTemporaries => PassDescriptor {
            name: "create_temporaries",
            inputs: &[PassId::TagReductionInames],
            outputs: &[ArtifactId::Kernel],
            invalidation_key: "kernel",
            invariants: "typed assignees are temporaries, no temp_var_type left",
        },
        PassId::ExpandCses => PassDescriptor {
            name: "expand_cses",
            inputs: &[PassId::CreateTemporaries],
            outputs: &[ArtifactId::Kernel],
            invalidation_key: "kernel",
            invariants: "no cse() nodes remain",
        },
        PassId::CheckBoundWriters => PassDescriptor {
            name: "check_bound_writers",
            inputs: &[PassId::ExpandCses],
            outputs: &[ArtifactId::Kernel],
            invalidation_key: "kernel",
            invariants: "temporary loop bounds have one writer",
        },
        PassId::CheckDuplicateNames => PassDescriptor {
            name: "check_duplicate_names",
            inputs: &[PassId::CheckBoundWriters],
            outputs: &[ArtifactId::Kernel],
            invalidation_key: "kernel",
            invariants: "iname/argument/temporary/substitution names disjoint",
        },
        PassId::CheckWrittenVariables => PassDescriptor {
            name: "check_written_variables",
            inputs: &[PassId::CheckDuplicateNames],
            outputs: &[ArtifactId::Kernel],
            invalidation_key: "kernel",
            invariants: "every assignee is an argument or temporary",
        },
    }
}

impl PassId {
    /// Look a pass up by its descriptor name.
    pub fn from_name(name: &str) -> Option<PassId> {
        ALL_PASSES
            .iter()
            .copied()
            .find(|&p| descriptor(p).name == name)
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in declaration order.
pub const ALL_PASSES: [PassId; 11] = [
    PassId::ParseInstructions,
    PassId::ParseDomains,
    PassId::AssembleKernel,
    PassId::CheckInameDeps,
    PassId::CheckReductionDuplication,
    PassId::TagReductionInames,
    PassId::CreateTemporaries,
    PassId::ExpandCses,
    PassId::CheckBoundWriters,
    PassId::CheckDuplicateNames,
    PassId::CheckWrittenVariables,
];

/// The pass that finishes construction.
pub const FINAL_PASS: PassId = PassId::CheckWrittenVariables;

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_pass_runs_everything_in_declaration_order() {
        assert_eq!(required_passes(FINAL_PASS), ALL_PASSES.to_vec());
    }

    #[test]
    fn assemble_is_minimal() {
        assert_eq!(
            required_passes(PassId::AssembleKernel),
            vec![
                PassId::ParseInstructions,
                PassId::ParseDomains,
                PassId::AssembleKernel
            ]
        );
    }

    #[test]
    fn early_check_skips_its_sibling() {
        let passes = required_passes(PassId::CheckInameDeps);
        assert!(!passes.contains(&PassId::CheckReductionDuplication));
        assert_eq!(passes.last(), Some(&PassId::CheckInameDeps));
    }

    #[test]
    fn temporaries_before_cse_before_final_checks() {
        let passes = required_passes(FINAL_PASS);
        let pos = |p| passes.iter().position(|&q| q == p).unwrap();
        assert!(pos(PassId::TagReductionInames) < pos(PassId::CreateTemporaries));
        assert!(pos(PassId::CreateTemporaries) < pos(PassId::ExpandCses));
        assert!(pos(PassId::ExpandCses) < pos(PassId::CheckWrittenVariables));
    }

    #[test]
    fn names_round_trip() {
        for pass in ALL_PASSES {
            assert_eq!(PassId::from_name(descriptor(pass).name), Some(pass));
        }
        assert_eq!(PassId::from_name("codegen"), None);
    }

    #[test]
    fn inputs_precede_pass_in_declaration_order() {
        for (index, pass) in ALL_PASSES.iter().enumerate() {
            for dep in descriptor(*pass).inputs {
                let dep_index = ALL_PASSES.iter().position(|p| p == dep).unwrap();
                assert!(dep_index < index, "{:?} depends on later {:?}", pass, dep);
            }
        }
    }
}
