// grammar.rs — Instruction and substitution-rule text
//
// Line grammar (each line is one statement):
//
//   [<type>] lhs = rhs [{options}]     assignment instruction
//   name[(args)] := rhs                substitution rule
//
// Both grammars are anchored regular expressions. The `=` of an assignment
// is the first one whose left-hand side does not end in `:`. The options
// block must be the last `{...}` on the line and contain only word
// characters, whitespace, `=`, `,` and `:`.
//
// Preconditions: none.
// Postconditions: assignees are a variable or a subscripted variable;
//   substitution arguments are plain variables.
// Failure modes: E0100..E0110 (see `diag::codes`), E0200 via macros.
// Side effects: none.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::diag::{codes, Diagnostic, Result};
use crate::dtype::TypeSpec;
use crate::expr::Expr;
use crate::kernel::{Instruction, SubstitutionRule};
use crate::macros::{expand_text, Defines, ExpansionMode};
use crate::parser::parse_expr;

/// One parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Instruction(Instruction),
    Substitution(SubstitutionRule),
}

/// An element of the instruction list as supplied by the caller.
#[derive(Debug, Clone)]
pub enum InstructionInput {
    Text(String),
    Built(Instruction),
}

impl From<&str> for InstructionInput {
    fn from(text: &str) -> Self {
        InstructionInput::Text(text.to_string())
    }
}

impl From<String> for InstructionInput {
    fn from(text: String) -> Self {
        InstructionInput::Text(text)
    }
}

impl From<Instruction> for InstructionInput {
    fn from(insn: Instruction) -> Self {
        InstructionInput::Built(insn)
    }
}

// ── Line matching ──

fn assignment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"^\s*(?:<(?P<temp_var_type>.*?)>)?",
            r"\s*(?P<lhs>.*?[^:\s])\s*=\s*(?P<rhs>.+?)",
            r"\s*?(?:\{(?P<options>[\s\w=,:]+)\}\s*)?$",
        ))
        .expect("assignment pattern")
    })
}

fn substitution_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?P<lhs>.+?)\s*:=\s*(?P<rhs>.+?)\s*$").expect("substitution pattern")
    })
}

struct AssignmentParts<'a> {
    type_annotation: Option<&'a str>,
    lhs: &'a str,
    rhs: &'a str,
    options: Option<&'a str>,
}

fn match_assignment(line: &str) -> Option<AssignmentParts<'_>> {
    let caps = assignment_re().captures(line)?;
    Some(AssignmentParts {
        type_annotation: caps.name("temp_var_type").map(|m| m.as_str()),
        lhs: caps.name("lhs")?.as_str(),
        rhs: caps.name("rhs")?.as_str().trim(),
        options: caps.name("options").map(|m| m.as_str()),
    })
}

fn match_substitution(line: &str) -> Option<(&str, &str)> {
    let caps = substitution_re().captures(line)?;
    Some((caps.name("lhs")?.as_str(), caps.name("rhs")?.as_str()))
}

// ── Statement parsing ──

fn parse_options(insn: &mut Instruction, options: &str) -> Result<()> {
    for token in options.split(',') {
        let token = token.trim();
        if token.is_empty() {
            return Err(Diagnostic::new(
                codes::E0105,
                "empty option supplied to instruction",
            ));
        }
        let (key, value) = match token.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (token, None),
        };
        match key {
            "id" => insn.id = value.map(str::to_string),
            "priority" => {
                let value = value.ok_or_else(|| missing_value("priority"))?;
                insn.priority = value.parse().map_err(|_| {
                    Diagnostic::new(
                        codes::E0106,
                        format!("instruction priority '{}' is not an integer", value),
                    )
                })?;
            }
            "dep" => {
                let value = value.ok_or_else(|| missing_value("dep"))?;
                insn.insn_deps = value
                    .split(':')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string)
                    .collect::<BTreeSet<_>>();
            }
            other => {
                return Err(Diagnostic::new(
                    codes::E0107,
                    format!("unrecognized instruction option '{}'", other),
                )
                .with_hint("valid options are id, priority, dep"))
            }
        }
    }
    Ok(())
}

fn missing_value(key: &str) -> Diagnostic {
    Diagnostic::new(
        codes::E0110,
        format!("instruction option '{}' requires a value", key),
    )
}

fn parse_assignment(parts: &AssignmentParts<'_>) -> Result<Instruction> {
    let assignee = parse_expr(parts.lhs)?;
    let expression = parse_expr(parts.rhs)?;
    let mut insn = Instruction::new(assignee, expression);

    if let Some(options) = parts.options {
        parse_options(&mut insn, options)?;
    }
    if let Some(annotation) = parts.type_annotation {
        insn.temp_var_type = Some(TypeSpec::from_annotation(annotation)?);
    }

    let valid = match &insn.assignee {
        Expr::Variable(_) => true,
        Expr::Subscript { aggregate, .. } => aggregate.as_variable().is_some(),
        _ => false,
    };
    if !valid {
        return Err(Diagnostic::new(
            codes::E0103,
            format!(
                "left hand side of assignment '{}' must be a variable or a subscript",
                insn.assignee
            ),
        ));
    }
    Ok(insn)
}

fn parse_substitution(lhs: &str, rhs: &str) -> Result<SubstitutionRule> {
    let invalid = || {
        Diagnostic::new(
            codes::E0104,
            format!("invalid left hand side '{}' for substitution rule", lhs),
        )
    };
    let (name, arguments) = match parse_expr(lhs)? {
        Expr::Variable(name) => (name, Vec::new()),
        Expr::Call {
            function,
            parameters,
        } => {
            let name = function.as_variable().ok_or_else(invalid)?.to_string();
            let arguments = parameters
                .iter()
                .map(|p| p.as_variable().map(str::to_string).ok_or_else(invalid))
                .collect::<Result<Vec<_>>>()?;
            (name, arguments)
        }
        _ => return Err(invalid()),
    };
    Ok(SubstitutionRule {
        name,
        arguments,
        expression: parse_expr(rhs)?,
    })
}

/// Parse one statement line.
pub fn parse_statement(line: &str) -> Result<Statement> {
    match (match_assignment(line), match_substitution(line)) {
        (Some(_), Some(_)) => Err(Diagnostic::new(
            codes::E0100,
            format!("instruction parse error: '{}' is ambiguous", line),
        )),
        (None, None) => Err(Diagnostic::new(
            codes::E0101,
            format!("instruction parse error: '{}' is not understood", line),
        )
        .with_hint("expected 'lhs = rhs' or 'name(args) := rhs'")),
        (Some(parts), None) => parse_assignment(&parts).map(Statement::Instruction),
        (None, Some((lhs, rhs))) => parse_substitution(lhs, rhs).map(Statement::Substitution),
    }
}

/// Parse a multi-line instruction block, expanding defines per line.
///
/// `#` starts a comment. Each line forks once per macro expansion, and each
/// variant is parsed on its own.
pub fn parse_statements(text: &str, defines: &Defines) -> Result<Vec<Statement>> {
    let mut statements = Vec::new();
    for raw in text.split('\n') {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        for variant in expand_text(line, defines, ExpansionMode::MultiValued)? {
            let statement = parse_statement(&variant)
                .map_err(|e| e.with_context(format!("parsing instruction '{}'", variant)))?;
            statements.push(statement);
        }
    }
    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::ElementType;
    use crate::macros::MacroValue;

    fn insn(line: &str) -> Instruction {
        match parse_statement(line) {
            Ok(Statement::Instruction(i)) => i,
            other => panic!("expected instruction for {:?}, got {:?}", line, other),
        }
    }

    fn err(line: &str) -> Diagnostic {
        parse_statement(line).unwrap_err()
    }

    #[test]
    fn plain_assignment() {
        let i = insn("out[i] = 2*a[i]");
        assert_eq!(i.assignee.to_string(), "out[i]");
        assert_eq!(i.expression.to_string(), "2*a[i]");
        assert_eq!(i.id, None);
        assert_eq!(i.temp_var_type, None);
    }

    #[test]
    fn options_block() {
        let i = insn("out[i] = a[i] {id=init, priority=5, dep=a:b}");
        assert_eq!(i.id.as_deref(), Some("init"));
        assert_eq!(i.priority, 5);
        let deps: Vec<_> = i.insn_deps.iter().map(String::as_str).collect();
        assert_eq!(deps, vec!["a", "b"]);
        assert_eq!(i.expression.to_string(), "a[i]");
    }

    #[test]
    fn type_annotation() {
        let i = insn("<float32> tmp = a[i]");
        assert_eq!(
            i.temp_var_type,
            Some(TypeSpec::Explicit(ElementType::Float32))
        );
        let i = insn("<> tmp = a[i]");
        assert_eq!(i.temp_var_type, Some(TypeSpec::Deferred));
    }

    #[test]
    fn brace_block_with_operators_is_not_options() {
        // `{c+d}` fails the option character class and stays in the rhs.
        assert_eq!(err("a = b {c+d}").code, codes::E0102);
    }

    #[test]
    fn substitution_rule() {
        match parse_statement("f(x, y) := x*y + 1").unwrap() {
            Statement::Substitution(rule) => {
                assert_eq!(rule.name, "f");
                assert_eq!(rule.arguments, vec!["x", "y"]);
                assert_eq!(rule.expression.to_string(), "x*y + 1");
            }
            other => panic!("expected substitution, got {:?}", other),
        }
        match parse_statement("c := 3").unwrap() {
            Statement::Substitution(rule) => assert!(rule.arguments.is_empty()),
            other => panic!("expected substitution, got {:?}", other),
        }
    }

    #[test]
    fn neither_grammar() {
        assert_eq!(err("just words").code, codes::E0101);
        // An `=` right after a `:` never splits an assignment.
        assert_eq!(err("x : = 1").code, codes::E0101);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let i = insn("   <>  t[i]=a[i]   {id=load}   ");
        assert_eq!(i.assignee.to_string(), "t[i]");
        assert_eq!(i.expression.to_string(), "a[i]");
        assert_eq!(i.id.as_deref(), Some("load"));
        assert_eq!(i.temp_var_type, Some(TypeSpec::Deferred));
    }

    #[test]
    fn both_grammars() {
        assert_eq!(err("a = b := c").code, codes::E0100);
    }

    #[test]
    fn option_errors() {
        assert_eq!(err("a = b {id=x,,priority=1}").code, codes::E0105);
        assert_eq!(err("a = b {priority=high}").code, codes::E0106);
        assert_eq!(err("a = b {color=red}").code, codes::E0107);
        assert_eq!(err("a = b {priority}").code, codes::E0110);
    }

    #[test]
    fn bad_assignee() {
        assert_eq!(err("a + b = c").code, codes::E0103);
        assert_eq!(err("f(x) = c").code, codes::E0103);
    }

    #[test]
    fn bad_substitution_lhs() {
        assert_eq!(err("f(x + 1) := x").code, codes::E0104);
    }

    #[test]
    fn unknown_type_annotation() {
        assert_eq!(err("<quad> t = 1").code, codes::E0108);
    }

    #[test]
    fn block_comments_and_blank_lines() {
        let text = "
            # leading comment
            a[i] = 1   # trailing comment

            b[i] = a[i]
        ";
        let stmts = parse_statements(text, &Defines::new()).unwrap();
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn block_fans_out_over_defines() {
        let mut defines = Defines::new();
        defines.insert("v".to_string(), MacroValue::from(vec!["x", "y"]));
        let stmts = parse_statements("out_v[i] = v[i]", &defines).unwrap();
        let lines: Vec<String> = stmts
            .iter()
            .map(|s| match s {
                Statement::Instruction(i) => i.to_string(),
                Statement::Substitution(r) => r.to_string(),
            })
            .collect();
        assert_eq!(lines, vec!["out_v[i] = x[i]", "out_v[i] = y[i]"]);
    }

    #[test]
    fn block_errors_carry_the_line() {
        let err = parse_statements("a = b {bogus}", &Defines::new()).unwrap_err();
        assert_eq!(err.code, codes::E0107);
        assert_eq!(err.context, vec!["parsing instruction 'a = b {bogus}'".to_string()]);
    }
}
