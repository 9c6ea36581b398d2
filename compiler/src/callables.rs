// callables.rs — Built-in call targets and their type rules
//
// Argument slots are numbered from 0; result slots use the mirrored negative
// index (result `k` of a call lives at `-k-1`).
//
// Preconditions: none.
// Postconditions: `with_types` never removes a known argument type except for
//   `indexof*`, which drops unknown slots.
// Failure modes: none; unknown identifiers resolve to `None`.
// Side effects: none.

use std::collections::BTreeMap;

use crate::dtype::ElementType;
use crate::expr::ReductionOp;
use crate::kernel::Kernel;

/// Slot id to element type; `None` means not yet inferred.
pub type TypeMap = BTreeMap<i32, Option<ElementType>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgDescriptor {
    /// Passed and returned by value.
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableKind {
    MakeTuple,
    IndexOf,
    IndexOfVec,
    Reduction(ReductionOp),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarCallable {
    pub name: String,
    pub kind: CallableKind,
    /// Name to emit in generated code, once decided.
    pub name_in_target: Option<String>,
    pub arg_id_to_dtype: Option<TypeMap>,
    pub arg_id_to_descr: Option<BTreeMap<i32, ArgDescriptor>>,
}

/// Look up a built-in call target by name.
pub fn resolve_callable(identifier: &str) -> Option<ScalarCallable> {
    let kind = match identifier {
        "make_tuple" => CallableKind::MakeTuple,
        "indexof" => CallableKind::IndexOf,
        "indexof_vec" => CallableKind::IndexOfVec,
        other => CallableKind::Reduction(ReductionOp::from_name(other)?),
    };
    Some(ScalarCallable {
        name: identifier.to_string(),
        kind,
        name_in_target: None,
        arg_id_to_dtype: None,
        arg_id_to_descr: None,
    })
}

fn mirror(id: i32) -> i32 {
    -id - 1
}

impl ScalarCallable {
    /// Specialize to the known argument types, filling in result types.
    pub fn with_types(&self, arg_types: &TypeMap, kernel: &Kernel) -> ScalarCallable {
        let mut types = arg_types.clone();
        let mut name_in_target = self.name_in_target.clone();

        match self.kind {
            CallableKind::MakeTuple => {
                for (&id, &ty) in arg_types.range(0..) {
                    if ty.is_some() {
                        types.insert(mirror(id), ty);
                    }
                }
                name_in_target = Some("loopy_make_tuple".to_string());
            }
            CallableKind::IndexOf | CallableKind::IndexOfVec => {
                types.retain(|_, ty| ty.is_some());
                types.insert(-1, Some(kernel.index_dtype()));
            }
            CallableKind::Reduction(_) => {
                if let Some(&Some(ty)) = arg_types.get(&0) {
                    types.insert(-1, Some(ty));
                }
            }
        }

        ScalarCallable {
            name_in_target,
            arg_id_to_dtype: Some(types),
            ..self.clone()
        }
    }

    /// Every argument and its mirrored result slot are passed by value.
    pub fn with_descrs(&self, arg_ids: impl IntoIterator<Item = i32>) -> ScalarCallable {
        let descrs = arg_ids
            .into_iter()
            .flat_map(|id| [(id, ArgDescriptor::Value), (mirror(id), ArgDescriptor::Value)])
            .collect();
        ScalarCallable {
            arg_id_to_descr: Some(descrs),
            ..self.clone()
        }
    }

    /// Types are final once every slot, argument and result, is known.
    pub fn is_ready_for_codegen(&self) -> bool {
        self.arg_id_to_dtype
            .as_ref()
            .is_some_and(|t| t.contains_key(&-1) && t.values().all(Option::is_some))
            && self.arg_id_to_descr.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{assemble, KernelInputs};

    fn kernel() -> Kernel {
        assemble(&KernelInputs::new(["{[i]: 0<=i<4}"], ["out[i] = 0"])).unwrap()
    }

    fn types(entries: &[(i32, Option<ElementType>)]) -> TypeMap {
        entries.iter().copied().collect()
    }

    #[test]
    fn resolves_known_identifiers() {
        assert_eq!(resolve_callable("make_tuple").unwrap().kind, CallableKind::MakeTuple);
        assert_eq!(resolve_callable("indexof_vec").unwrap().kind, CallableKind::IndexOfVec);
        assert_eq!(
            resolve_callable("max").unwrap().kind,
            CallableKind::Reduction(ReductionOp::Max)
        );
        assert!(resolve_callable("sin").is_none());
    }

    #[test]
    fn make_tuple_mirrors_known_types() {
        let c = resolve_callable("make_tuple").unwrap().with_types(
            &types(&[(0, Some(ElementType::Float32)), (1, None)]),
            &kernel(),
        );
        let t = c.arg_id_to_dtype.unwrap();
        assert_eq!(t[&-1], Some(ElementType::Float32));
        assert!(!t.contains_key(&-2));
        assert_eq!(t[&1], None);
        assert_eq!(c.name_in_target.as_deref(), Some("loopy_make_tuple"));
    }

    #[test]
    fn indexof_returns_index_type() {
        let c = resolve_callable("indexof").unwrap().with_types(
            &types(&[(0, Some(ElementType::Float64)), (1, None)]),
            &kernel(),
        );
        let t = c.arg_id_to_dtype.unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t[&-1], Some(ElementType::Int32));
        assert!(!t.contains_key(&1));
    }

    #[test]
    fn reduction_result_follows_operand() {
        let c = resolve_callable("sum")
            .unwrap()
            .with_types(&types(&[(0, Some(ElementType::Int64))]), &kernel());
        assert_eq!(c.arg_id_to_dtype.unwrap()[&-1], Some(ElementType::Int64));
    }

    #[test]
    fn descriptors_cover_mirrored_slots() {
        let c = resolve_callable("make_tuple").unwrap().with_descrs([0, 1]);
        let d = c.arg_id_to_descr.unwrap();
        let ids: Vec<i32> = d.keys().copied().collect();
        assert_eq!(ids, vec![-2, -1, 0, 1]);
    }

    #[test]
    fn readiness_needs_types_and_descriptors() {
        let c = resolve_callable("indexof").unwrap();
        assert!(!c.is_ready_for_codegen());
        let c = c
            .with_types(&types(&[(0, Some(ElementType::Int32))]), &kernel())
            .with_descrs([0]);
        assert!(c.is_ready_for_codegen());
    }
}
