// cse.rs — Common-subexpression hoisting
//
// Each `cse(e)` node becomes a fresh scalar temporary assigned by a new
// instruction placed immediately before its first consumer. One memo spans
// the whole pass, so structurally equal CSE children share one temporary
// across every instruction of the kernel.
//
// Preconditions: temporaries from typed instructions already exist.
// Postconditions: no `CommonSubexpression` node remains in any instruction.
// Failure modes: none.
// Side effects: none.

use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::dtype::TypeSpec;
use crate::expr::Expr;
use crate::kernel::{Instruction, Kernel, TemporaryVariable};
use crate::names::NameRegistry;

struct CseExpander<'a> {
    var_names: &'a mut NameRegistry,
    insn_ids: &'a mut NameRegistry,
    temporaries: &'a mut BTreeMap<String, TemporaryVariable>,
    /// Hoisted assignments for the instruction being rewritten.
    hoisted: Vec<Instruction>,
    /// Untagged child -> materialized replacement, kept for the whole pass.
    memo: HashMap<Expr, Expr>,
}

impl CseExpander<'_> {
    fn hoist(&mut self, prefix: Option<&str>, dtype: TypeSpec, value: Expr) -> Expr {
        let name = self.var_names.generate(prefix.unwrap_or("var"));
        let id = self.insn_ids.generate("insn");
        debug!("cse: {} = {} ({})", name, value, id);
        self.temporaries
            .insert(name.clone(), TemporaryVariable::scalar(name.clone(), dtype));
        self.hoisted
            .push(Instruction::new(Expr::var(name.clone()), value).with_id(id));
        Expr::var(name)
    }

    fn rewrite(&mut self, expr: &Expr) -> Expr {
        match expr {
            Expr::CommonSubexpression {
                child,
                prefix,
                dtype,
            } => {
                if let Some(done) = self.memo.get(child.as_ref()) {
                    return done.clone();
                }
                let value = self.rewrite(child);
                let result = if value.as_variable().is_some() {
                    value
                } else {
                    self.hoist(prefix.as_deref(), TypeSpec::from(*dtype), value)
                };
                self.memo.insert(child.as_ref().clone(), result.clone());
                result
            }
            _ => expr.map_children(|c| self.rewrite(c)),
        }
    }
}

pub fn expand_cses(kernel: &Kernel) -> Kernel {
    let mut var_names = kernel.name_registry();
    let mut insn_ids = NameRegistry::with_names(kernel.instruction_ids());
    let mut temporaries = kernel.temporary_variables.clone();
    let mut instructions = Vec::with_capacity(kernel.instructions.len());

    let mut expander = CseExpander {
        var_names: &mut var_names,
        insn_ids: &mut insn_ids,
        temporaries: &mut temporaries,
        hoisted: Vec::new(),
        memo: HashMap::new(),
    };
    for insn in &kernel.instructions {
        let expression = expander.rewrite(&insn.expression);
        instructions.append(&mut expander.hoisted);
        instructions.push(Instruction {
            expression,
            ..insn.clone()
        });
    }

    Kernel {
        instructions,
        temporary_variables: temporaries,
        ..kernel.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::ElementType;
    use crate::pipeline::{assemble, KernelInputs};

    fn expand(insns: &[&str]) -> Kernel {
        let inputs = KernelInputs::new(["{[i]: 0<=i<4}"], insns.iter().copied());
        match assemble(&inputs) {
            Ok(k) => expand_cses(&k),
            Err(d) => panic!("assembly failed: {}", d),
        }
    }

    fn lines(k: &Kernel) -> Vec<String> {
        k.instructions.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn hoists_before_consumer() {
        let k = expand(&["out[i] = cse(a[i] + b[i])*2"]);
        assert_eq!(
            lines(&k),
            vec!["var = a[i] + b[i] {id=insn_0}", "out[i] = var*2 {id=insn}"]
        );
        let tv = &k.temporary_variables["var"];
        assert!(tv.shape.is_empty());
        assert_eq!(tv.dtype, TypeSpec::Deferred);
    }

    #[test]
    fn prefix_and_type_are_used() {
        let k = expand(&["out[i] = cse(a[i]*a[i], sq, float32) + 1"]);
        assert_eq!(
            k.temporary_variables["sq"].dtype,
            TypeSpec::Explicit(ElementType::Float32)
        );
        assert_eq!(lines(&k)[1], "out[i] = sq + 1 {id=insn}");
    }

    #[test]
    fn equal_children_share_a_temporary() {
        let k = expand(&["out[i] = cse(a[i] + 1, t) * cse(a[i] + 1, t)"]);
        assert_eq!(k.instructions.len(), 2);
        assert_eq!(lines(&k)[1], "out[i] = t*t {id=insn}");
    }

    #[test]
    fn memo_spans_instructions() {
        let k = expand(&["out[i] = cse(a[i] + 1, t)", "out2[i] = cse(a[i] + 1, t)*2"]);
        assert_eq!(
            lines(&k),
            vec![
                "t = a[i] + 1 {id=insn_1}",
                "out[i] = t {id=insn}",
                "out2[i] = t*2 {id=insn_0}",
            ]
        );
        let names: Vec<&String> = k.temporary_variables.keys().collect();
        assert_eq!(names, vec!["t"]);
    }

    #[test]
    fn bare_variable_is_not_hoisted() {
        let k = expand(&["out[i] = cse(x) + 1"]);
        assert_eq!(k.instructions.len(), 1);
        assert_eq!(lines(&k)[0], "out[i] = x + 1 {id=insn}");
    }

    #[test]
    fn nested_cses_hoist_inner_first() {
        let k = expand(&["out[i] = cse(cse(a[i] + 1, u)*2, v)"]);
        assert_eq!(
            lines(&k),
            vec![
                "u = a[i] + 1 {id=insn_0}",
                "v = u*2 {id=insn_1}",
                "out[i] = v {id=insn}",
            ]
        );
    }

    #[test]
    fn generated_names_avoid_existing_ones() {
        // `var` is already read by the kernel, so the temporary becomes `var_0`.
        let k = expand(&["out[i] = var + cse(a[i] + 1)"]);
        assert!(k.temporary_variables.contains_key("var_0"));
    }
}
