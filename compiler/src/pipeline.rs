// pipeline.rs — Construction state and pass orchestration
//
// Holds every pass artifact in one state struct and runs the minimal set of
// passes for a given terminal PassId. A full run is `make_kernel`.
//
// Preconditions: none; options are validated before the first pass.
// Postconditions: artifacts for all required passes are populated, or the
//   first failing pass's diagnostic is returned.
// Failure modes: any pass failing; invalid options (E0700, E0701).
// Side effects: calls on_pass_complete after each pass that produced or
//   checked a kernel; logs per-pass timings at debug level.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::check;
use crate::cse::expand_cses;
use crate::diag::{codes, Diagnostic, Result};
use crate::domain::{context_for, parse_domains, DomainInput};
use crate::grammar::{parse_statements, InstructionInput, Statement};
use crate::expr::Expr;
use crate::kernel::{
    ArgKind, Instruction, Kernel, KernelArgument, SubstitutionRule, TemporaryVariable,
    DEFAULT_KERNEL_NAME,
};
use crate::macros::{expand_in_expr, Defines};
use crate::names::NameRegistry;
use crate::options::KernelOptions;
use crate::pass::{descriptor, required_passes, PassId, FINAL_PASS};
use crate::polyset::{BasicSet, SetContext};
use crate::reduction::tag_reduction_inames_as_sequential;
use crate::temporaries::create_temporaries;

// ── Inputs ─────────────────────────────────────────────────────────────────

/// Everything a caller supplies to build one kernel.
#[derive(Debug, Clone)]
pub struct KernelInputs {
    pub device: String,
    pub domains: Vec<DomainInput>,
    /// Each text element may hold several newline-separated statements.
    pub instructions: Vec<InstructionInput>,
    pub args: Vec<KernelArgument>,
    pub options: KernelOptions,
}

impl KernelInputs {
    pub fn new<D, S>(
        domains: impl IntoIterator<Item = D>,
        instructions: impl IntoIterator<Item = S>,
    ) -> Self
    where
        D: Into<DomainInput>,
        S: Into<InstructionInput>,
    {
        KernelInputs {
            device: "cpu".to_string(),
            domains: domains.into_iter().map(Into::into).collect(),
            instructions: instructions.into_iter().map(Into::into).collect(),
            args: Vec::new(),
            options: KernelOptions::default(),
        }
    }

    pub fn with_args(mut self, args: Vec<KernelArgument>) -> Self {
        self.args = args;
        self
    }

    pub fn with_options(mut self, options: KernelOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }
}

// ── Artifact storage ───────────────────────────────────────────────────────

/// Artifacts produced so far. Each pass fills or replaces one field.
pub struct ConstructionState {
    pub ctx: SetContext,
    pub statements: Option<Vec<Statement>>,
    pub domains: Option<Vec<BasicSet>>,
    pub kernel: Option<Kernel>,
}

impl ConstructionState {
    pub fn new(inputs: &KernelInputs) -> Self {
        ConstructionState {
            ctx: context_for(&inputs.domains),
            statements: None,
            domains: None,
            kernel: None,
        }
    }

    fn kernel(&self) -> &Kernel {
        self.kernel
            .as_ref()
            .expect("internal: kernel requested before assembly")
    }
}

// ── Passes before the kernel exists ────────────────────────────────────────

fn parse_instructions(inputs: &KernelInputs) -> Result<Vec<Statement>> {
    let mut statements = Vec::new();
    for input in &inputs.instructions {
        match input {
            InstructionInput::Text(text) => {
                statements.extend(parse_statements(text, &inputs.options.defines)?)
            }
            InstructionInput::Built(insn) => statements.push(Statement::Instruction(insn.clone())),
        }
    }
    Ok(statements)
}

/// Names a domain may use as parameters: value arguments, pre-declared
/// temporaries and assignees of typed instructions.
fn available_parameters(inputs: &KernelInputs, statements: &[Statement]) -> BTreeSet<String> {
    let mut names: BTreeSet<String> = inputs
        .args
        .iter()
        .filter(|a| a.kind == ArgKind::Value)
        .map(|a| a.name.clone())
        .collect();
    names.extend(inputs.options.temporary_variables.keys().cloned());
    for statement in statements {
        if let Statement::Instruction(insn) = statement {
            if insn.temp_var_type.is_some() {
                names.extend(insn.assignee_var_name().map(str::to_string));
            }
        }
    }
    names
}

fn expand_shape(shape: &[Expr], defines: &Defines) -> Result<Vec<Expr>> {
    shape.iter().map(|e| expand_in_expr(e, defines)).collect()
}

fn assemble_kernel(
    inputs: &KernelInputs,
    ctx: &SetContext,
    statements: &[Statement],
    domains: Vec<BasicSet>,
) -> Result<Kernel> {
    let mut instructions: Vec<Instruction> = Vec::new();
    let mut substitutions: BTreeMap<String, SubstitutionRule> = BTreeMap::new();
    let mut explicit_ids: BTreeSet<String> = BTreeSet::new();

    for statement in statements {
        match statement {
            Statement::Instruction(insn) => {
                if let Some(id) = &insn.id {
                    if !explicit_ids.insert(id.clone()) {
                        return Err(Diagnostic::new(
                            codes::E0302,
                            format!("instruction id '{}' is used more than once", id),
                        ));
                    }
                }
                instructions.push(insn.clone());
            }
            Statement::Substitution(rule) => {
                if substitutions.contains_key(&rule.name) {
                    return Err(Diagnostic::new(
                        codes::E0300,
                        format!("substitution rule '{}' is defined more than once", rule.name),
                    ));
                }
                substitutions.insert(rule.name.clone(), rule.clone());
            }
        }
    }

    let mut ids = NameRegistry::with_names(explicit_ids);
    for insn in instructions.iter_mut().filter(|i| i.id.is_none()) {
        insn.id = Some(ids.generate("insn"));
    }

    let defines = &inputs.options.defines;
    let args = inputs
        .args
        .iter()
        .map(|arg| {
            let shape = match &arg.shape {
                Some(shape) => Some(expand_shape(shape, defines)?),
                None => None,
            };
            Ok(KernelArgument {
                shape,
                ..arg.clone()
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut temporary_variables = BTreeMap::new();
    for (name, tv) in &inputs.options.temporary_variables {
        temporary_variables.insert(
            name.clone(),
            TemporaryVariable {
                name: name.clone(),
                shape: expand_shape(&tv.shape, defines)?,
                base_indices: expand_shape(&tv.base_indices, defines)?,
                ..tv.clone()
            },
        );
    }

    Ok(Kernel {
        name: inputs
            .options
            .name
            .clone()
            .unwrap_or_else(|| DEFAULT_KERNEL_NAME.to_string()),
        device: inputs.device.clone(),
        domains,
        iname_to_tag: inputs.options.iname_to_tag.clone(),
        instructions,
        args,
        temporary_variables,
        substitutions,
        ctx: ctx.clone(),
    })
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Per-pass post-processing: callback, then a timing line.
fn finish_pass(
    state: &ConstructionState,
    pass_id: PassId,
    elapsed: Duration,
    on_pass_complete: &mut impl FnMut(PassId, &Kernel),
) {
    if let Some(kernel) = &state.kernel {
        on_pass_complete(pass_id, kernel);
    }
    debug!(
        "pkc: {} complete, {:.1}ms",
        descriptor(pass_id).name,
        elapsed.as_secs_f64() * 1000.0
    );
}

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute → on_pass_complete(callback) → timing log.
/// The callback only fires once a kernel exists (from `AssembleKernel` on).
pub fn run_pipeline(
    inputs: &KernelInputs,
    terminal: PassId,
    mut on_pass_complete: impl FnMut(PassId, &Kernel),
) -> Result<ConstructionState> {
    inputs.options.validate()?;
    let mut state = ConstructionState::new(inputs);

    for pass_id in required_passes(terminal) {
        let t = Instant::now();
        match pass_id {
            PassId::ParseInstructions => {
                state.statements = Some(parse_instructions(inputs)?);
            }
            PassId::ParseDomains => {
                let statements = state.statements.as_deref().unwrap_or_default();
                let available = available_parameters(inputs, statements);
                state.domains = Some(parse_domains(
                    &state.ctx,
                    &available,
                    &inputs.domains,
                    &inputs.options.defines,
                )?);
            }
            PassId::AssembleKernel => {
                let statements = state.statements.as_deref().unwrap_or_default();
                let domains = state.domains.take().unwrap_or_default();
                state.kernel = Some(assemble_kernel(inputs, &state.ctx, statements, domains)?);
            }
            PassId::CheckInameDeps => check::check_for_nonexistent_iname_deps(state.kernel())?,
            PassId::CheckReductionDuplication => {
                check::check_for_reduction_inames_duplication_requests(state.kernel())?
            }
            PassId::TagReductionInames => {
                state.kernel = Some(tag_reduction_inames_as_sequential(state.kernel())?);
            }
            PassId::CreateTemporaries => {
                state.kernel = Some(create_temporaries(state.kernel())?);
            }
            PassId::ExpandCses => {
                state.kernel = Some(expand_cses(state.kernel()));
            }
            PassId::CheckBoundWriters => {
                check::check_for_multiple_writes_to_loop_bounds(state.kernel())?
            }
            PassId::CheckDuplicateNames => check::check_for_duplicate_names(state.kernel())?,
            PassId::CheckWrittenVariables => check::check_written_variable_names(state.kernel())?,
        }
        finish_pass(&state, pass_id, t.elapsed(), &mut on_pass_complete);
    }

    if let Some(kernel) = &state.kernel {
        info!(
            "pkc: kernel '{}': {} domain(s), {} instruction(s), {} temporar{}",
            kernel.name,
            kernel.domains.len(),
            kernel.instructions.len(),
            kernel.temporary_variables.len(),
            if kernel.temporary_variables.len() == 1 { "y" } else { "ies" }
        );
    }
    Ok(state)
}

/// Parse and assemble without running any check or transformation.
pub fn assemble(inputs: &KernelInputs) -> Result<Kernel> {
    let state = run_pipeline(inputs, PassId::AssembleKernel, |_, _| {})?;
    Ok(state
        .kernel
        .expect("internal: assembly produced no kernel"))
}

/// Build a fully validated kernel.
pub fn make_kernel(inputs: &KernelInputs) -> Result<Kernel> {
    let state = run_pipeline(inputs, FINAL_PASS, |_, _| {})?;
    Ok(state
        .kernel
        .expect("internal: construction produced no kernel"))
}
