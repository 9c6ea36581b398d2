// kernel.rs — Kernel data model
//
// The value produced by kernel construction: domains, instructions,
// arguments, temporaries, substitution rules and iname tags. Every pass
// takes a `&Kernel` and returns a new one; nothing mutates a kernel that
// another stage can still observe.
//
// Preconditions: none (types only).
// Postconditions: `Kernel` serializes to canonical JSON (ordered maps,
//   expressions as text) so equal kernels have equal fingerprints.
// Failure modes: `InameTag` parsing rejects unknown tags (E0702).
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::diag::{codes, Diagnostic};
use crate::dtype::{ElementType, TypeSpec, INDEX_TYPE};
use crate::expr::Expr;
use crate::names::NameRegistry;
use crate::polyset::{BasicSet, SetContext};

pub const DEFAULT_KERNEL_NAME: &str = "loopy_kernel";

// ── Iname tags ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InameTag {
    /// Plain sequential loop.
    Sequential,
    /// Sequential, and must stay so (reduction inames).
    ForceSequential,
    GroupAxis(u8),
    LocalAxis(u8),
    AutoLocal,
    Ilp,
    Unroll,
}

impl InameTag {
    pub fn is_parallel(self) -> bool {
        matches!(
            self,
            InameTag::GroupAxis(_) | InameTag::LocalAxis(_) | InameTag::AutoLocal | InameTag::Ilp
        )
    }
}

impl FromStr for InameTag {
    type Err = Diagnostic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Diagnostic::new(codes::E0702, format!("invalid iname tag '{}'", s));
        let axis = |n: &str| n.parse::<u8>().map_err(|_| invalid());
        match s.trim() {
            "for" | "seq" => Ok(InameTag::Sequential),
            "forceseq" => Ok(InameTag::ForceSequential),
            "l.auto" => Ok(InameTag::AutoLocal),
            "ilp" => Ok(InameTag::Ilp),
            "unr" => Ok(InameTag::Unroll),
            t => {
                if let Some(n) = t.strip_prefix("g.") {
                    Ok(InameTag::GroupAxis(axis(n)?))
                } else if let Some(n) = t.strip_prefix("l.") {
                    Ok(InameTag::LocalAxis(axis(n)?))
                } else {
                    Err(invalid())
                }
            }
        }
    }
}

impl TryFrom<String> for InameTag {
    type Error = Diagnostic;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<InameTag> for String {
    fn from(tag: InameTag) -> String {
        tag.to_string()
    }
}

impl fmt::Display for InameTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InameTag::Sequential => f.write_str("for"),
            InameTag::ForceSequential => f.write_str("forceseq"),
            InameTag::GroupAxis(n) => write!(f, "g.{}", n),
            InameTag::LocalAxis(n) => write!(f, "l.{}", n),
            InameTag::AutoLocal => f.write_str("l.auto"),
            InameTag::Ilp => f.write_str("ilp"),
            InameTag::Unroll => f.write_str("unr"),
        }
    }
}

// ── Instructions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    /// Unique within a kernel once construction has assigned ids.
    pub id: Option<String>,
    pub insn_deps: BTreeSet<String>,
    pub forced_iname_deps: BTreeSet<String>,
    pub priority: i64,
    pub assignee: Expr,
    pub expression: Expr,
    /// Present when the assignee should be created as a temporary.
    pub temp_var_type: Option<TypeSpec>,
}

impl Instruction {
    pub fn new(assignee: Expr, expression: Expr) -> Self {
        Instruction {
            id: None,
            insn_deps: BTreeSet::new(),
            forced_iname_deps: BTreeSet::new(),
            priority: 0,
            assignee,
            expression,
            temp_var_type: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_temp_var_type(mut self, ty: TypeSpec) -> Self {
        self.temp_var_type = Some(ty);
        self
    }

    pub fn id_or_empty(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }

    /// Name of the written variable, if the assignee has a legal shape.
    pub fn assignee_var_name(&self) -> Option<&str> {
        match &self.assignee {
            Expr::Variable(name) => Some(name),
            Expr::Subscript { aggregate, .. } => aggregate.as_variable(),
            _ => None,
        }
    }

    pub fn assignee_indices(&self) -> &[Expr] {
        match &self.assignee {
            Expr::Subscript { index, .. } => index,
            _ => &[],
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.temp_var_type {
            Some(TypeSpec::Explicit(ty)) => write!(f, "<{}> ", ty)?,
            Some(TypeSpec::Deferred) => f.write_str("<> ")?,
            None => {}
        }
        write!(f, "{} = {}", self.assignee, self.expression)?;
        let mut opts = Vec::new();
        if let Some(id) = &self.id {
            opts.push(format!("id={}", id));
        }
        if self.priority != 0 {
            opts.push(format!("priority={}", self.priority));
        }
        if !self.insn_deps.is_empty() {
            let deps: Vec<&str> = self.insn_deps.iter().map(String::as_str).collect();
            opts.push(format!("dep={}", deps.join(":")));
        }
        if !opts.is_empty() {
            write!(f, " {{{}}}", opts.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubstitutionRule {
    pub name: String,
    pub arguments: Vec<String>,
    pub expression: Expr,
}

impl fmt::Display for SubstitutionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.arguments.is_empty() {
            write!(f, "{} := {}", self.name, self.expression)
        } else {
            write!(
                f,
                "{}({}) := {}",
                self.name,
                self.arguments.join(", "),
                self.expression
            )
        }
    }
}

// ── Arguments and temporaries ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    #[default]
    Value,
    Array,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelArgument {
    pub name: String,
    #[serde(default)]
    pub kind: ArgKind,
    #[serde(default)]
    pub dtype: Option<ElementType>,
    /// Array extents; `None` when not (yet) known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<Expr>>,
}

impl KernelArgument {
    pub fn value(name: impl Into<String>, dtype: ElementType) -> Self {
        KernelArgument {
            name: name.into(),
            kind: ArgKind::Value,
            dtype: Some(dtype),
            shape: None,
        }
    }

    pub fn array(name: impl Into<String>, dtype: ElementType) -> Self {
        KernelArgument {
            name: name.into(),
            kind: ArgKind::Array,
            dtype: Some(dtype),
            shape: None,
        }
    }

    pub fn with_shape(mut self, shape: Vec<Expr>) -> Self {
        self.shape = Some(shape);
        self
    }
}

impl fmt::Display for KernelArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ArgKind::Value => "value",
            ArgKind::Array => "array",
        };
        write!(f, "{}: {}", self.name, kind)?;
        if let Some(ty) = self.dtype {
            write!(f, " {}", ty)?;
        }
        if let Some(shape) = &self.shape {
            write!(f, " shape={}", index_tuple(shape))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporaryVariable {
    /// Filled from the map key when given as a kernel option.
    #[serde(default)]
    pub name: String,
    pub dtype: TypeSpec,
    #[serde(default)]
    pub shape: Vec<Expr>,
    #[serde(default)]
    pub base_indices: Vec<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_local: Option<bool>,
}

impl TemporaryVariable {
    pub fn scalar(name: impl Into<String>, dtype: TypeSpec) -> Self {
        TemporaryVariable {
            name: name.into(),
            dtype,
            shape: Vec::new(),
            base_indices: Vec::new(),
            is_local: None,
        }
    }
}

fn index_tuple(items: &[Expr]) -> String {
    let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
    if parts.len() == 1 {
        format!("({},)", parts[0])
    } else {
        format!("({})", parts.join(", "))
    }
}

impl fmt::Display for TemporaryVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} shape={} base={}",
            self.name,
            self.dtype,
            index_tuple(&self.shape),
            index_tuple(&self.base_indices)
        )?;
        if let Some(local) = self.is_local {
            write!(f, " local={}", local)?;
        }
        Ok(())
    }
}

// ── Kernel ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Kernel {
    pub name: String,
    pub device: String,
    pub domains: Vec<BasicSet>,
    pub iname_to_tag: BTreeMap<String, InameTag>,
    pub instructions: Vec<Instruction>,
    pub args: Vec<KernelArgument>,
    pub temporary_variables: BTreeMap<String, TemporaryVariable>,
    pub substitutions: BTreeMap<String, SubstitutionRule>,
    #[serde(skip)]
    pub ctx: SetContext,
}

impl Kernel {
    /// Every dimension name across all domains.
    pub fn all_inames(&self) -> BTreeSet<String> {
        self.domains
            .iter()
            .flat_map(|d| d.dim_names().map(str::to_string))
            .collect()
    }

    pub fn arg(&self, name: &str) -> Option<&KernelArgument> {
        self.args.iter().find(|a| a.name == name)
    }

    /// Parameters referenced by any domain, excluding inames.
    pub fn domain_parameters(&self) -> BTreeSet<String> {
        let inames = self.all_inames();
        self.domains
            .iter()
            .flat_map(|d| d.params().iter().cloned())
            .filter(|p| !inames.contains(p))
            .collect()
    }

    /// Index of the domain that introduces `iname`.
    pub fn governing_domain(&self, iname: &str) -> Option<usize> {
        self.domains
            .iter()
            .position(|d| d.dim_names().any(|n| n == iname))
    }

    /// Written variable name to the ids of the instructions writing it.
    pub fn writer_map(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut writers: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for insn in &self.instructions {
            if let Some(var) = insn.assignee_var_name() {
                writers
                    .entry(var.to_string())
                    .or_default()
                    .insert(insn.id_or_empty().to_string());
            }
        }
        writers
    }

    pub fn instruction_ids(&self) -> BTreeSet<String> {
        self.instructions
            .iter()
            .filter_map(|i| i.id.clone())
            .collect()
    }

    /// Registry seeded with every name the kernel defines or reads.
    pub fn name_registry(&self) -> NameRegistry {
        let mut names: BTreeSet<String> = self.all_inames();
        names.extend(self.domain_parameters());
        names.extend(self.args.iter().map(|a| a.name.clone()));
        names.extend(self.temporary_variables.keys().cloned());
        names.extend(self.substitutions.keys().cloned());
        for insn in &self.instructions {
            names.extend(insn.assignee_var_name().map(str::to_string));
            names.extend(insn.expression.dependencies());
        }
        NameRegistry::with_names(names)
    }

    /// Element type of loop indices and index-valued results.
    pub fn index_dtype(&self) -> ElementType {
        INDEX_TYPE
    }

    /// SHA-256 of the kernel's canonical JSON form, hex encoded.
    pub fn fingerprint(&self) -> serde_json::Result<String> {
        let json = serde_json::to_string(self)?;
        let digest = Sha256::digest(json.as_bytes());
        Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "kernel {} (device {})", self.name, self.device)?;
        if !self.args.is_empty() {
            writeln!(f, "arguments:")?;
            for arg in &self.args {
                writeln!(f, "  {}", arg)?;
            }
        }
        writeln!(f, "domains:")?;
        for domain in &self.domains {
            writeln!(f, "  {}", domain)?;
        }
        if !self.iname_to_tag.is_empty() {
            writeln!(f, "iname tags:")?;
            for (iname, tag) in &self.iname_to_tag {
                writeln!(f, "  {}: {}", iname, tag)?;
            }
        }
        if !self.temporary_variables.is_empty() {
            writeln!(f, "temporaries:")?;
            for tv in self.temporary_variables.values() {
                writeln!(f, "  {}", tv)?;
            }
        }
        if !self.substitutions.is_empty() {
            writeln!(f, "substitutions:")?;
            for rule in self.substitutions.values() {
                writeln!(f, "  {}", rule)?;
            }
        }
        writeln!(f, "instructions:")?;
        for insn in &self.instructions {
            writeln!(f, "  {}", insn)?;
        }
        Ok(())
    }
}
