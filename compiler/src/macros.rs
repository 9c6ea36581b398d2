// macros.rs — Textual macro substitution with Cartesian fan-out
//
// Placeholders are `${name}` or a bare word `name` bound in the defines
// table. A define bound to a list forks the text once per element; several
// list-valued placeholders produce the Cartesian product, enumerated lazily
// with the last placeholder varying fastest.
//
// Preconditions: none.
// Postconditions: substituted values are never re-scanned for placeholders.
// Failure modes: a list value where a single value is required is E0200.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer};

use crate::diag::{codes, Diagnostic, Result};
use crate::expr::Expr;
use crate::parser::parse_expr;

/// Value bound to a define name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroValue {
    Single(String),
    List(Vec<String>),
}

pub type Defines = BTreeMap<String, MacroValue>;

impl From<&str> for MacroValue {
    fn from(s: &str) -> Self {
        MacroValue::Single(s.to_string())
    }
}

impl From<String> for MacroValue {
    fn from(s: String) -> Self {
        MacroValue::Single(s)
    }
}

impl From<i64> for MacroValue {
    fn from(n: i64) -> Self {
        MacroValue::Single(n.to_string())
    }
}

impl<T: ToString> From<Vec<T>> for MacroValue {
    fn from(items: Vec<T>) -> Self {
        MacroValue::List(items.iter().map(ToString::to_string).collect())
    }
}

fn scalar_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// JSON defines are written as plain scalars or lists of scalars.
impl<'de> Deserialize<'de> for MacroValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        if let serde_json::Value::Array(items) = &value {
            return items
                .iter()
                .map(|item| {
                    scalar_text(item).ok_or_else(|| {
                        serde::de::Error::custom(format!("invalid define element {}", item))
                    })
                })
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(MacroValue::List);
        }
        scalar_text(&value)
            .map(MacroValue::Single)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid define value {}", value)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionMode {
    SingleValued,
    MultiValued,
}

// ── Placeholder scanning ──

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([a-zA-Z0-9_]+)\}|\b([a-zA-Z0-9_]+)\b").expect("placeholder pattern")
    })
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([a-zA-Z_][a-zA-Z0-9_]*)\b").expect("identifier pattern"))
}

/// A define referenced by the text, in one syntactic form.
#[derive(Debug, Clone)]
struct Placeholder {
    braced: bool,
    name: String,
    choices: Vec<String>,
}

fn find_placeholders(text: &str, defines: &Defines, mode: ExpansionMode) -> Result<Vec<Placeholder>> {
    let mut braced = Vec::new();
    let mut bare = Vec::new();
    for caps in placeholder_re().captures_iter(text) {
        let (is_braced, m) = match (caps.get(1), caps.get(2)) {
            (Some(m), _) => (true, m),
            (None, Some(m)) => (false, m),
            (None, None) => continue,
        };
        let name = m.as_str();
        let slot = if is_braced { &mut braced } else { &mut bare };
        if slot.iter().any(|p: &Placeholder| p.name == name) {
            continue;
        }
        let choices = match defines.get(name) {
            None => continue,
            Some(MacroValue::Single(v)) => vec![v.clone()],
            Some(MacroValue::List(vs)) => {
                if mode == ExpansionMode::SingleValued {
                    return Err(multi_valued_error(name));
                }
                vs.clone()
            }
        };
        slot.push(Placeholder {
            braced: is_braced,
            name: name.to_string(),
            choices,
        });
    }
    braced.extend(bare);
    Ok(braced)
}

fn multi_valued_error(name: &str) -> Diagnostic {
    Diagnostic::new(
        codes::E0200,
        format!(
            "multi-valued macro expansion not allowed in this context (when expanding '{}')",
            name
        ),
    )
}

// ── Expansion ──

/// Lazy enumeration of every substitution of a text.
#[derive(Debug, Clone)]
pub struct Expansions {
    text: String,
    placeholders: Vec<Placeholder>,
    counters: Vec<usize>,
    done: bool,
}

impl Expansions {
    fn render(&self) -> String {
        let chosen = |braced: bool, name: &str| {
            self.placeholders
                .iter()
                .zip(&self.counters)
                .find(|(p, _)| p.braced == braced && p.name == name)
                .map(|(p, &i)| p.choices[i].clone())
        };
        placeholder_re()
            .replace_all(&self.text, |caps: &Captures| {
                let whole = caps[0].to_string();
                match (caps.get(1), caps.get(2)) {
                    (Some(m), _) => chosen(true, m.as_str()).unwrap_or(whole),
                    (None, Some(m)) => chosen(false, m.as_str()).unwrap_or(whole),
                    (None, None) => whole,
                }
            })
            .into_owned()
    }

    /// Advance the odometer; the last placeholder turns fastest.
    fn advance(&mut self) {
        for pos in (0..self.counters.len()).rev() {
            self.counters[pos] += 1;
            if self.counters[pos] < self.placeholders[pos].choices.len() {
                return;
            }
            self.counters[pos] = 0;
        }
        self.done = true;
    }
}

impl Iterator for Expansions {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        let out = self.render();
        self.advance();
        Some(out)
    }
}

/// Expand the placeholders of `text`.
///
/// In single-valued mode the iterator yields exactly one string.
pub fn expand_text(text: &str, defines: &Defines, mode: ExpansionMode) -> Result<Expansions> {
    let placeholders = find_placeholders(text, defines, mode)?;
    let done = placeholders.iter().any(|p| p.choices.is_empty());
    Ok(Expansions {
        text: text.to_string(),
        counters: vec![0; placeholders.len()],
        placeholders,
        done,
    })
}

/// Single-valued expansion to one string.
pub fn expand_single(text: &str, defines: &Defines) -> Result<String> {
    Ok(expand_text(text, defines, ExpansionMode::SingleValued)?
        .next()
        .unwrap_or_default())
}

/// Substitute defines inside an already-parsed expression.
pub fn expand_in_expr(expr: &Expr, defines: &Defines) -> Result<Expr> {
    match expr {
        Expr::Variable(name) => match defines.get(name) {
            None => Ok(expr.clone()),
            Some(MacroValue::Single(value)) => parse_expr(value)
                .map_err(|e| e.with_context(format!("expanding define '{}'", name))),
            Some(MacroValue::List(_)) => Err(multi_valued_error(name)),
        },
        _ => expr.try_map_children(|child| expand_in_expr(child, defines)),
    }
}

/// Every identifier-like word in `text`.
pub fn gather_identifiers(text: &str) -> BTreeSet<String> {
    identifier_re()
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}
