// check.rs — Consistency checks on an assembled kernel
//
// Each check inspects the kernel and either passes or reports the first
// violation. None of them changes the kernel.
//
// Preconditions: instruction ids are assigned; domains are parsed.
// Postconditions: `Ok(())` means the checked property holds kernel-wide.
// Failure modes: E0300, E0500, E0501, E0600, E0602.
// Side effects: none.

use std::collections::BTreeMap;

use crate::diag::{codes, Diagnostic, Result};
use crate::expr::Expr;
use crate::kernel::Kernel;

// ── Iname references ────────────────────────────────────────────────────────

/// Forced iname dependencies must name declared inames.
pub fn check_for_nonexistent_iname_deps(kernel: &Kernel) -> Result<()> {
    let inames = kernel.all_inames();
    for insn in &kernel.instructions {
        let missing: Vec<&str> = insn
            .forced_iname_deps
            .iter()
            .filter(|i| !inames.contains(*i))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(Diagnostic::new(
                codes::E0500,
                format!(
                    "instruction '{}' refers to non-existent iname(s) '{}'",
                    insn.id_or_empty(),
                    missing.join(", ")
                ),
            ));
        }
    }
    Ok(())
}

/// The `@iname` reduction syntax is no longer supported.
pub fn check_for_reduction_inames_duplication_requests(kernel: &Kernel) -> Result<()> {
    let bodies = kernel
        .instructions
        .iter()
        .map(|i| &i.expression)
        .chain(kernel.substitutions.values().map(|r| &r.expression));

    for body in bodies {
        let mut offending = None;
        body.walk(&mut |node| {
            if let Expr::Reduction { inames, .. } = node {
                if let Some(iname) = inames.iter().find(|i| i.starts_with('@')) {
                    offending.get_or_insert_with(|| iname.clone());
                }
            }
        });
        if let Some(iname) = offending {
            return Err(Diagnostic::new(
                codes::E0602,
                format!("reduction iname duplication with '{}' is no longer supported", iname),
            )
            .with_hint("use explicit iname duplication instead of the '@' prefix"));
        }
    }
    Ok(())
}

// ── Writers ─────────────────────────────────────────────────────────────────

/// A temporary used as a loop bound must be written exactly once.
pub fn check_for_multiple_writes_to_loop_bounds(kernel: &Kernel) -> Result<()> {
    let writers = kernel.writer_map();
    for param in kernel.domain_parameters() {
        if !kernel.temporary_variables.contains_key(&param) {
            continue;
        }
        let count = writers.get(&param).map_or(0, |w| w.len());
        if count != 1 {
            return Err(Diagnostic::new(
                codes::E0600,
                format!(
                    "loop bound '{}' may only be written exactly once (found {} writers)",
                    param, count
                ),
            ));
        }
    }
    Ok(())
}

/// Every assignee must be an argument or a temporary.
pub fn check_written_variable_names(kernel: &Kernel) -> Result<()> {
    for insn in &kernel.instructions {
        let Some(var) = insn.assignee_var_name() else {
            return Err(Diagnostic::new(
                codes::E0103,
                format!(
                    "instruction '{}' has an invalid assignee '{}'",
                    insn.id_or_empty(),
                    insn.assignee
                ),
            ));
        };
        if kernel.arg(var).is_none() && !kernel.temporary_variables.contains_key(var) {
            return Err(Diagnostic::new(
                codes::E0501,
                format!(
                    "instruction '{}' writes to '{}', which is neither an argument nor a temporary",
                    insn.id_or_empty(),
                    var
                ),
            )
            .with_hint(format!("declare '{}' as an argument or annotate the instruction with <type>", var)));
        }
    }
    Ok(())
}

// ── Names ───────────────────────────────────────────────────────────────────

/// Inames, arguments, temporaries and substitution rules share one namespace.
pub fn check_for_duplicate_names(kernel: &Kernel) -> Result<()> {
    let inames = kernel.all_inames();
    let roles = inames
        .iter()
        .map(|n| (n.as_str(), "iname"))
        .chain(kernel.args.iter().map(|a| (a.name.as_str(), "argument")))
        .chain(
            kernel
                .temporary_variables
                .keys()
                .map(|n| (n.as_str(), "temporary")),
        )
        .chain(
            kernel
                .substitutions
                .keys()
                .map(|n| (n.as_str(), "substitution")),
        );

    let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
    for (name, role) in roles {
        if let Some(first) = seen.insert(name, role) {
            return Err(Diagnostic::new(
                codes::E0300,
                format!("name '{}' is used as both {} and {}", name, first, role),
            ));
        }
    }
    Ok(())
}
