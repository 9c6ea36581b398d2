// reduction.rs — Sequential tagging of reduction inames
//
// Preconditions: no reduction uses the '@' duplication prefix.
// Postconditions: every iname reduced over somewhere in the kernel carries
//   a non-parallel tag; untagged ones become `ForceSequential`.
// Failure modes: E0601 when a reduction iname is already tagged parallel.
// Side effects: none.

use std::collections::BTreeSet;

use log::debug;

use crate::diag::{codes, Diagnostic, Result};
use crate::expr::Expr;
use crate::kernel::{InameTag, Kernel};

/// Every iname some reduction in the kernel ranges over, in first-seen order.
fn reduction_inames(kernel: &Kernel) -> Vec<String> {
    let mut found = Vec::new();
    let bodies = kernel
        .instructions
        .iter()
        .map(|i| &i.expression)
        .chain(kernel.substitutions.values().map(|r| &r.expression));
    for body in bodies {
        body.walk(&mut |node| {
            if let Expr::Reduction { inames, .. } = node {
                found.extend(inames.iter().cloned());
            }
        });
    }
    found
}

pub fn tag_reduction_inames_as_sequential(kernel: &Kernel) -> Result<Kernel> {
    let mut to_tag = BTreeSet::new();

    for iname in reduction_inames(kernel) {
        match kernel.iname_to_tag.get(&iname) {
            Some(tag) if tag.is_parallel() => {
                return Err(Diagnostic::new(
                    codes::E0601,
                    format!(
                        "inconsistency detected: reduction iname '{}' has a parallel tag '{}'",
                        iname, tag
                    ),
                ))
            }
            Some(_) => {}
            None => {
                to_tag.insert(iname);
            }
        }
    }

    if !to_tag.is_empty() {
        debug!("forcing sequential: {:?}", to_tag);
    }
    let mut iname_to_tag = kernel.iname_to_tag.clone();
    for iname in to_tag {
        iname_to_tag.insert(iname, InameTag::ForceSequential);
    }
    Ok(Kernel {
        iname_to_tag,
        ..kernel.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::KernelOptions;
    use crate::pipeline::{assemble, KernelInputs};

    fn assembled(domain: &str, insns: &[&str], options: KernelOptions) -> Kernel {
        let inputs = KernelInputs::new([domain], insns.iter().copied()).with_options(options);
        match assemble(&inputs) {
            Ok(k) => k,
            Err(d) => panic!("assembly failed: {}", d),
        }
    }

    #[test]
    fn untagged_reduction_iname_forced_sequential() {
        let k = assembled(
            "{[i, k]: 0<=i,k<8}",
            &["out[i] = sum(k, a[i, k])"],
            KernelOptions::default(),
        );
        let k = tag_reduction_inames_as_sequential(&k).unwrap();
        assert_eq!(k.iname_to_tag.get("k"), Some(&InameTag::ForceSequential));
        assert_eq!(k.iname_to_tag.get("i"), None);
    }

    #[test]
    fn existing_sequential_tag_kept() {
        let mut options = KernelOptions::default();
        options.iname_to_tag.insert("k".to_string(), InameTag::Unroll);
        let k = assembled("{[i, k]: 0<=i,k<8}", &["out[i] = sum(k, a[i, k])"], options);
        let k = tag_reduction_inames_as_sequential(&k).unwrap();
        assert_eq!(k.iname_to_tag.get("k"), Some(&InameTag::Unroll));
    }

    #[test]
    fn parallel_reduction_iname_rejected() {
        let mut options = KernelOptions::default();
        options.iname_to_tag.insert("k".to_string(), InameTag::LocalAxis(0));
        let k = assembled("{[i, k]: 0<=i,k<8}", &["out[i] = sum(k, a[i, k])"], options);
        let err = tag_reduction_inames_as_sequential(&k).unwrap_err();
        assert_eq!(err.code, codes::E0601);
    }

    #[test]
    fn substitution_rules_are_scanned() {
        let k = assembled(
            "{[i, k]: 0<=i,k<8}",
            &["rowsum(r) := sum(k, a[r, k])", "out[i] = rowsum(i)"],
            KernelOptions::default(),
        );
        let k = tag_reduction_inames_as_sequential(&k).unwrap();
        assert_eq!(k.iname_to_tag.get("k"), Some(&InameTag::ForceSequential));
    }
}
