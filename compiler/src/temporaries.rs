// temporaries.rs — Temporaries from typed instructions
//
// An instruction written `<type> x[i, j] = ...` declares `x` as a temporary.
// Its shape and base indices come from the bounds of the inames used to
// index it: base = lower bound, extent = upper - lower + 1.
//
// Preconditions: domains are parsed; iname tags are final.
// Postconditions: no instruction carries `temp_var_type`; each typed
//   assignee has a `TemporaryVariable`.
// Failure modes: E0503 (already exists), E0502 (index is not an iname),
//   E0404 (bounds cannot be determined), E0103 (malformed assignee).
// Side effects: none.

use log::debug;

use crate::diag::{codes, Diagnostic, Result};
use crate::kernel::{Instruction, Kernel, TemporaryVariable};
use crate::polyset::{BasicSet, DimBounds};

/// Bounds of `iname` over the domains up to the one introducing it.
pub fn iname_bounds(kernel: &Kernel, iname: &str) -> Result<DimBounds> {
    let governing = kernel.governing_domain(iname).ok_or_else(|| {
        Diagnostic::new(codes::E0404, format!("'{}' is not an iname", iname))
    })?;
    let combined = BasicSet::combine(&kernel.ctx, &kernel.domains[..=governing]);
    combined.dim_bounds(iname).map_err(|why| {
        Diagnostic::new(
            codes::E0404,
            format!("cannot determine bounds of iname '{}': {}", iname, why),
        )
    })
}

pub fn create_temporaries(kernel: &Kernel) -> Result<Kernel> {
    let inames = kernel.all_inames();
    let mut temporaries = kernel.temporary_variables.clone();
    let mut instructions: Vec<Instruction> = Vec::with_capacity(kernel.instructions.len());

    for insn in &kernel.instructions {
        let Some(dtype) = insn.temp_var_type else {
            instructions.push(insn.clone());
            continue;
        };

        let name = insn.assignee_var_name().ok_or_else(|| {
            Diagnostic::new(
                codes::E0103,
                format!("invalid assignee '{}' for a temporary", insn.assignee),
            )
        })?;
        if temporaries.contains_key(name) || kernel.arg(name).is_some() {
            return Err(Diagnostic::new(
                codes::E0503,
                format!("cannot create temporary variable '{}': already exists", name),
            ));
        }

        let mut base_indices = Vec::new();
        let mut shape = Vec::new();
        for index in insn.assignee_indices() {
            let iname = index
                .as_variable()
                .filter(|v| inames.contains(*v))
                .ok_or_else(|| {
                    Diagnostic::new(
                        codes::E0502,
                        format!(
                            "cannot create temporary '{}': index '{}' is not an iname",
                            name, index
                        ),
                    )
                    .with_hint("temporaries may only be indexed by inames")
                })?;
            let bounds = iname_bounds(kernel, iname)
                .map_err(|e| e.with_context(format!("sizing temporary '{}'", name)))?;
            base_indices.push(bounds.lower.to_expr());
            shape.push(bounds.extent.to_expr());
        }

        debug!("temporary {}: {} over {} dims", name, dtype, shape.len());
        temporaries.insert(
            name.to_string(),
            TemporaryVariable {
                name: name.to_string(),
                dtype,
                shape,
                base_indices,
                is_local: None,
            },
        );
        instructions.push(Instruction {
            temp_var_type: None,
            ..insn.clone()
        });
    }

    Ok(Kernel {
        instructions,
        temporary_variables: temporaries,
        ..kernel.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::{ElementType, TypeSpec};
    use crate::expr::Expr;
    use crate::pipeline::{assemble, KernelInputs};

    fn create(domains: &[&str], insns: &[&str]) -> Result<Kernel> {
        let inputs = KernelInputs::new(domains.iter().copied(), insns.iter().copied());
        create_temporaries(&assemble(&inputs)?)
    }

    #[test]
    fn shape_from_parametric_domain() {
        let k = create(&["[n] -> {[i]: 0<=i<n}"], &["<float64> tmp[i] = 1"]).unwrap();
        let tv = &k.temporary_variables["tmp"];
        assert_eq!(tv.dtype, TypeSpec::Explicit(ElementType::Float64));
        assert_eq!(tv.shape, vec![Expr::var("n")]);
        assert_eq!(tv.base_indices, vec![Expr::Int(0)]);
        assert_eq!(k.instructions[0].temp_var_type, None);
    }

    #[test]
    fn offset_domain_sets_base() {
        let k = create(&["{[i, j]: 2<=i<10 and 0<=j<3}"], &["<> t[i, j] = 0"]).unwrap();
        let tv = &k.temporary_variables["t"];
        assert_eq!(tv.dtype, TypeSpec::Deferred);
        assert_eq!(tv.base_indices, vec![Expr::Int(2), Expr::Int(0)]);
        assert_eq!(tv.shape, vec![Expr::Int(8), Expr::Int(3)]);
    }

    #[test]
    fn scalar_temporary() {
        let k = create(&["{[i]: 0<=i<4}"], &["<int32> acc = 0"]).unwrap();
        assert!(k.temporary_variables["acc"].shape.is_empty());
    }

    #[test]
    fn second_declaration_fails() {
        let err = create(&["{[i]: 0<=i<4}"], &["<int32> acc = 0", "<int32> acc = 1"]).unwrap_err();
        assert_eq!(err.code, codes::E0503);
    }

    #[test]
    fn argument_cannot_become_temporary() {
        let inputs = KernelInputs::new(["{[i]: 0<=i<4}"], ["<float32> out[i] = 0"]).with_args(
            vec![crate::kernel::KernelArgument::array("out", ElementType::Float32)],
        );
        let err = create_temporaries(&assemble(&inputs).unwrap()).unwrap_err();
        assert_eq!(err.code, codes::E0503);
    }

    #[test]
    fn non_iname_index_fails() {
        let err = create(&["{[i]: 0<=i<4}"], &["<float32> t[i + 1] = 0"]).unwrap_err();
        assert_eq!(err.code, codes::E0502);
    }

    #[test]
    fn unbounded_iname_fails() {
        let err = create(&["{[i]: 0<=i}"], &["<float32> t[i] = 0"]).unwrap_err();
        assert_eq!(err.code, codes::E0404);
    }

    #[test]
    fn nested_domain_bounds_use_outer_dims() {
        let k = create(
            &["[n] -> {[i]: 0<=i<n}", "{[j]: 0<=j<=i}"],
            &["<float32> t[j] = 0"],
        )
        .unwrap();
        assert_eq!(k.temporary_variables["t"].shape, vec![Expr::var("n")]);
    }
}
