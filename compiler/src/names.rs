// names.rs — Unique name registry
//
// Tracks every identifier in use and hands out fresh ones. The registry is
// an explicit value threaded through the passes that allocate names; there
// is no process-wide table.

use std::collections::BTreeSet;

use crate::diag::{codes, Diagnostic, Result};

/// Candidate names for `base`: `base`, `base_0`, `base_1`, ...
fn candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(base.to_string()).chain((0u64..).map(move |n| format!("{}_{}", base, n)))
}

/// Set of reserved identifiers with fresh-name allocation.
#[derive(Debug, Clone, Default)]
pub struct NameRegistry {
    used: BTreeSet<String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with `names`. Duplicates in the seed are tolerated.
    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NameRegistry {
            used: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    /// Reserve `name`, failing if it is already taken.
    pub fn add_name(&mut self, name: &str) -> Result<()> {
        if !self.used.insert(name.to_string()) {
            return Err(Diagnostic::new(
                codes::E0301,
                format!("name '{}' conflicts with existing names", name),
            ));
        }
        Ok(())
    }

    pub fn add_names<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for name in names {
            self.add_name(name)?;
        }
        Ok(())
    }

    /// Return the first free candidate for `base` and reserve it.
    pub fn generate(&mut self, base: &str) -> String {
        let name = candidates(base)
            .find(|c| !self.used.contains(c))
            .expect("candidate sequence is unbounded");
        self.used.insert(name.clone());
        name
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}
