// options.rs — Kernel construction options
//
// Preconditions: none.
// Postconditions: `validate` succeeds only if every key is recognized.
// Failure modes: E0700 (internal-only key), E0701 (unknown key).
// Side effects: none.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::diag::{codes, Diagnostic, Result};
use crate::kernel::{InameTag, TemporaryVariable};
use crate::macros::{Defines, MacroValue};

/// Keys that only construction itself may set.
const INTERNAL_KEYS: [&str; 5] = [
    "substitutions",
    "iname_slab_increments",
    "applied_iname_rewrites",
    "cache_manager",
    "isl_context",
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KernelOptions {
    pub name: Option<String>,
    pub defines: Defines,
    /// Pre-declared temporaries; the map key is the temporary's name.
    pub temporary_variables: BTreeMap<String, TemporaryVariable>,
    pub iname_to_tag: BTreeMap<String, InameTag>,
    /// Keys not listed above, kept so `validate` can report them.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl KernelOptions {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_define(mut self, name: impl Into<String>, value: impl Into<MacroValue>) -> Self {
        self.defines.insert(name.into(), value.into());
        self
    }

    pub fn with_temporary(mut self, temporary: TemporaryVariable) -> Self {
        self.temporary_variables
            .insert(temporary.name.clone(), temporary);
        self
    }

    pub fn with_tag(mut self, iname: impl Into<String>, tag: InameTag) -> Self {
        self.iname_to_tag.insert(iname.into(), tag);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(key) = self
            .extra
            .keys()
            .find(|k| INTERNAL_KEYS.contains(&k.as_str()))
        {
            return Err(Diagnostic::new(
                codes::E0700,
                format!("option '{}' is for internal use only", key),
            ));
        }
        if let Some(key) = self.extra.keys().next() {
            return Err(Diagnostic::new(
                codes::E0701,
                format!("unknown kernel option '{}'", key),
            )
            .with_hint("recognized options: name, defines, temporary_variables, iname_to_tag"));
        }
        Ok(())
    }
}
