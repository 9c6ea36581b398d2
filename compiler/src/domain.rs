// domain.rs — Loop-domain construction
//
// Turns domain inputs (text or pre-built sets) into the kernel's ordered
// domain list. Text domains are macro-expanded in single-valued mode and,
// when they lack a parameter prefix, get one listing every known parameter
// name they mention.
//
// Preconditions: `available` holds the names usable as domain parameters.
// Postconditions: every returned set lives in `ctx`; each iname is
//   introduced by exactly one domain and every dimension is named.
// Failure modes: E0200 (list define), E0402 (parse), E0403 (foreign
//   context), E0400 (unnamed dimension), E0401 (iname redefined).
// Side effects: parsing registers sets with `ctx`.

use std::collections::BTreeSet;

use log::debug;

use crate::diag::{codes, Diagnostic, Result};
use crate::macros::{expand_single, gather_identifiers, Defines};
use crate::polyset::{BasicSet, SetContext};

/// One element of the domain list as supplied by the caller.
#[derive(Debug, Clone)]
pub enum DomainInput {
    Text(String),
    Set(BasicSet),
}

impl From<&str> for DomainInput {
    fn from(text: &str) -> Self {
        DomainInput::Text(text.to_string())
    }
}

impl From<String> for DomainInput {
    fn from(text: String) -> Self {
        DomainInput::Text(text)
    }
}

impl From<BasicSet> for DomainInput {
    fn from(set: BasicSet) -> Self {
        DomainInput::Set(set)
    }
}

/// Context to parse in: that of the first pre-built set, else a fresh one.
pub fn context_for(domains: &[DomainInput]) -> SetContext {
    domains
        .iter()
        .find_map(|d| match d {
            DomainInput::Set(set) => Some(set.context().clone()),
            DomainInput::Text(_) => None,
        })
        .unwrap_or_default()
}

fn with_parameter_prefix(text: &str, available: &BTreeSet<String>) -> String {
    if text.trim_start().starts_with('[') {
        return text.to_string();
    }
    let params: Vec<String> = gather_identifiers(text)
        .into_iter()
        .filter(|id| available.contains(id))
        .collect();
    format!("[{}] -> {}", params.join(", "), text)
}

pub fn parse_domains(
    ctx: &SetContext,
    available: &BTreeSet<String>,
    domains: &[DomainInput],
    defines: &Defines,
) -> Result<Vec<BasicSet>> {
    let mut result: Vec<BasicSet> = Vec::with_capacity(domains.len());
    let mut seen_inames: BTreeSet<String> = BTreeSet::new();
    // Inames of earlier domains may parametrize later ones.
    let mut available = available.clone();

    for (index, input) in domains.iter().enumerate() {
        let set = match input {
            DomainInput::Text(text) => {
                let wrap = |e: Diagnostic| e.with_context(format!("parsing domain '{}'", text));
                let expanded = expand_single(text, defines).map_err(wrap)?;
                let full = with_parameter_prefix(&expanded, &available);
                debug!("domain {}: {}", index, full);
                BasicSet::parse(ctx, &full).map_err(wrap)?
            }
            DomainInput::Set(set) => {
                if !set.context().same_as(ctx) {
                    return Err(Diagnostic::new(
                        codes::E0403,
                        format!("domain {} belongs to a different set context", index),
                    )
                    .with_hint("build all pre-parsed domains in one SetContext"));
                }
                set.clone()
            }
        };

        for dim in set.dims() {
            let name = dim.as_deref().ok_or_else(|| {
                Diagnostic::new(
                    codes::E0400,
                    format!("domain {} has an unnamed dimension: {}", index, set),
                )
            })?;
            if !seen_inames.insert(name.to_string()) {
                return Err(Diagnostic::new(
                    codes::E0401,
                    format!("domain {} redefines iname '{}'", index, name),
                ));
            }
            available.insert(name.to_string());
        }

        result.push(set);
    }

    Ok(result)
}
