// Parser for expression and integer-set text.
//
// Parses a token stream (from the lexer) into an `Expr`, or into the raw
// syntax of a basic integer set. Uses chumsky combinators.
//
// Expression precedence, loosest first: `+ -`, `* / // %`, unary `-`,
// `**` (right operand may carry its own sign), postfix call/subscript.
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: expressions come back with special forms already lifted
//   (`sum`, `product`, `max`, `min`, `reduce`, `cse`).
// Failure modes: lex or syntax errors become one `Diagnostic` (E0102 for
//   expressions, E0402 for sets); malformed special forms are E0109.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::diag::{codes, DiagCode, Diagnostic, Result};
use crate::dtype::ElementType;
use crate::expr::{BinOp, Expr, FloatLit, ReductionOp};
use crate::lexer::Token;

type ParserExtra<'tokens> = extra::Err<Rich<'tokens, Token, SimpleSpan>>;

// ── Set syntax ──

/// Comparison operator inside a set constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

/// One link of a (possibly chained) comparison: `left op right`.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub left: Expr,
    pub op: CmpOp,
    pub right: Expr,
}

/// Syntax of `[params] -> { [dims] : constraints }` before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct SetSyntax {
    pub params: Vec<String>,
    pub dims: Vec<String>,
    pub constraints: Vec<Comparison>,
}

// ── Public API ──

/// Parse expression text, lifting special call forms.
pub fn parse_expr(source: &str) -> Result<Expr> {
    let tokens = lex_checked(source, codes::E0102)?;
    let len = source.len();
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(tokens.into_iter()).map(eoi, |(t, s): (_, _)| (t, s));

    let (expr, errors) = expr_parser()
        .then_ignore(end())
        .parse(stream)
        .into_output_errors();
    match expr {
        Some(expr) if errors.is_empty() => lift_special_forms(&expr),
        _ => Err(syntax_error(codes::E0102, "expression", source, &errors)),
    }
}

/// Parse the textual form of one basic integer set.
pub fn parse_set_syntax(source: &str) -> Result<SetSyntax> {
    let tokens = lex_checked(source, codes::E0402)?;
    let len = source.len();
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(tokens.into_iter()).map(eoi, |(t, s): (_, _)| (t, s));

    let (set, errors) = set_parser()
        .then_ignore(end())
        .parse(stream)
        .into_output_errors();
    match set {
        Some(set) if errors.is_empty() => Ok(set),
        _ => Err(syntax_error(codes::E0402, "domain", source, &errors)),
    }
}

fn lex_checked(source: &str, code: DiagCode) -> Result<Vec<(Token, SimpleSpan)>> {
    let lex_result = crate::lexer::lex(source);
    if let Some(err) = lex_result.errors.first() {
        return Err(Diagnostic::new(
            code,
            format!("cannot parse '{}': {}", source, err.message),
        ));
    }
    Ok(lex_result
        .tokens
        .into_iter()
        .map(|(tok, span)| (tok, SimpleSpan::from(span.start..span.end)))
        .collect())
}

fn syntax_error(
    code: DiagCode,
    what: &str,
    source: &str,
    errors: &[Rich<'_, Token, SimpleSpan>],
) -> Diagnostic {
    let detail = errors
        .iter()
        .map(|e| e.clone().into_owned().to_string())
        .collect::<Vec<_>>()
        .join("; ");
    Diagnostic::new(code, format!("cannot parse {} '{}': {}", what, source, detail))
}

// ── Expression grammar ──

enum Postfix {
    Call(Vec<Expr>),
    Index(Vec<Expr>),
}

fn expr_parser<'tokens, I>() -> impl Parser<'tokens, I, Expr, ParserExtra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let literal = select! {
            Token::Int(n) => Expr::Int(n),
            Token::Float(x) => Expr::Float(FloatLit(x)),
            Token::Ident(name) => Expr::Variable(name),
        };

        let items = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>();

        // `(a)` groups, `(a, b)` builds a tuple.
        let parenthesized = items
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .map(|mut items: Vec<Expr>| {
                if items.len() == 1 {
                    items.remove(0)
                } else {
                    Expr::Tuple(items)
                }
            });

        let atom = literal.or(parenthesized);

        let call_args = items
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .map(Postfix::Call);
        let index = expr
            .clone()
            .separated_by(just(Token::Comma))
            .at_least(1)
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map(Postfix::Index);

        let postfix = atom.foldl(call_args.or(index).repeated(), |base, suffix| match suffix {
            Postfix::Call(parameters) => Expr::Call {
                function: Box::new(base),
                parameters,
            },
            Postfix::Index(index) => Expr::subscript(base, index),
        });

        let signed_postfix = just(Token::Minus)
            .repeated()
            .foldr(postfix.clone(), |_, e| Expr::Neg(Box::new(e)));

        let power = postfix
            .then(just(Token::StarStar).ignore_then(signed_postfix).or_not())
            .map(|(base, exponent)| match exponent {
                Some(exponent) => Expr::binary(BinOp::Pow, base, exponent),
                None => base,
            });

        let unary = just(Token::Minus)
            .repeated()
            .foldr(power, |_, e| Expr::Neg(Box::new(e)));

        let product_op = select! {
            Token::Star => BinOp::Mul,
            Token::Slash => BinOp::Div,
            Token::SlashSlash => BinOp::FloorDiv,
            Token::Percent => BinOp::Rem,
        };
        let product = unary
            .clone()
            .foldl(product_op.then(unary).repeated(), |left, (op, right)| {
                Expr::binary(op, left, right)
            });

        let sum_op = select! {
            Token::Plus => BinOp::Add,
            Token::Minus => BinOp::Sub,
        };
        product
            .clone()
            .foldl(sum_op.then(product).repeated(), |left, (op, right)| {
                Expr::binary(op, left, right)
            })
    })
}

// ── Set grammar ──

fn set_parser<'tokens, I>() -> impl Parser<'tokens, I, SetSyntax, ParserExtra<'tokens>>
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let ident = select! { Token::Ident(name) => name };

    let names = ident
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBracket), just(Token::RBracket));

    let cmp_op = select! {
        Token::Lt => CmpOp::Lt,
        Token::Le => CmpOp::Le,
        Token::Gt => CmpOp::Gt,
        Token::Ge => CmpOp::Ge,
        Token::Eq => CmpOp::Eq,
        Token::EqEq => CmpOp::Eq,
    };

    // `0 <= i < n` is two comparisons sharing the middle operand; each
    // operand may be a comma list, `0 <= i, j < n`, meaning every pairing.
    let operands = expr_parser()
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>();

    let chain = operands
        .clone()
        .then(
            cmp_op
                .then(operands)
                .repeated()
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .map(|(first, rest)| {
            let mut links = Vec::new();
            let mut lefts = first;
            for (op, rights) in rest {
                for left in &lefts {
                    for right in &rights {
                        links.push(Comparison {
                            left: left.clone(),
                            op,
                            right: right.clone(),
                        });
                    }
                }
                lefts = rights;
            }
            links
        });

    let conjunction = chain
        .separated_by(just(Token::And))
        .at_least(1)
        .collect::<Vec<_>>()
        .map(|chains| chains.into_iter().flatten().collect::<Vec<_>>());

    let params = names
        .clone()
        .then_ignore(just(Token::Arrow))
        .or_not()
        .map(Option::unwrap_or_default);

    let body = names
        .then(just(Token::Colon).ignore_then(conjunction).or_not())
        .delimited_by(just(Token::LBrace), just(Token::RBrace));

    params
        .then(body)
        .map(|(params, (dims, constraints))| SetSyntax {
            params,
            dims,
            constraints: constraints.unwrap_or_default(),
        })
}

// ── Special forms ──
//
// `sum(i, e)`, `reduce(op, (i, j), e)` and `cse(e[, prefix[, type]])` parse
// as ordinary calls and are rewritten here into dedicated nodes. A tuple
// that survives outside a reduction's iname slot is an error.

fn special_form_error(message: impl Into<String>) -> Diagnostic {
    Diagnostic::new(codes::E0109, message)
}

fn iname_list(expr: &Expr) -> Result<Vec<String>> {
    let as_name = |e: &Expr| {
        e.as_variable()
            .map(str::to_string)
            .ok_or_else(|| special_form_error(format!("'{}' is not an iname", e)))
    };
    match expr {
        Expr::Tuple(items) => items.iter().map(as_name).collect(),
        other => Ok(vec![as_name(other)?]),
    }
}

fn reduction(op: ReductionOp, inames: &Expr, body: &Expr) -> Result<Expr> {
    Ok(Expr::Reduction {
        op,
        inames: iname_list(inames)?,
        expr: Box::new(lift_special_forms(body)?),
    })
}

fn lift_call(name: &str, parameters: &[Expr]) -> Result<Option<Expr>> {
    if let Some(op) = ReductionOp::from_name(name) {
        // `max(a, b)` with a non-iname first operand stays an ordinary call.
        if let [inames, body] = parameters {
            if iname_list(inames).is_ok() {
                return reduction(op, inames, body).map(Some);
            }
        }
        return Ok(None);
    }

    match name {
        "reduce" => match parameters {
            [op, inames, body] => {
                let op = op
                    .as_variable()
                    .and_then(ReductionOp::from_name)
                    .ok_or_else(|| special_form_error(format!("unknown reduction '{}'", op)))?;
                reduction(op, inames, body).map(Some)
            }
            _ => Err(special_form_error("reduce() takes (operation, inames, expression)")),
        },
        "cse" => {
            if parameters.is_empty() || parameters.len() > 3 {
                return Err(special_form_error("cse() takes 1 to 3 arguments"));
            }
            let child = lift_special_forms(&parameters[0])?;
            let prefix = match parameters.get(1) {
                Some(p) => Some(
                    p.as_variable()
                        .ok_or_else(|| special_form_error(format!("invalid cse prefix '{}'", p)))?
                        .to_string(),
                ),
                None => None,
            };
            let dtype = match parameters.get(2) {
                Some(t) => Some(
                    t.as_variable()
                        .ok_or_else(|| special_form_error(format!("invalid cse type '{}'", t)))?
                        .parse::<ElementType>()?,
                ),
                None => None,
            };
            Ok(Some(Expr::CommonSubexpression {
                child: Box::new(child),
                prefix,
                dtype,
            }))
        }
        _ => Ok(None),
    }
}

pub(crate) fn lift_special_forms(expr: &Expr) -> Result<Expr> {
    match expr {
        Expr::Call {
            function,
            parameters,
        } => {
            if let Some(name) = function.as_variable() {
                if let Some(lifted) = lift_call(name, parameters)? {
                    return Ok(lifted);
                }
            }
            expr.try_map_children(lift_special_forms)
        }
        Expr::Tuple(_) => Err(special_form_error(format!(
            "tuple '{}' is only allowed as a reduction iname list",
            expr
        ))),
        _ => expr.try_map_children(lift_special_forms),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Expr {
        match parse_expr(source) {
            Ok(e) => e,
            Err(d) => panic!("unexpected error for {:?}: {}", source, d),
        }
    }

    fn var(name: &str) -> Expr {
        Expr::var(name)
    }

    // ── Expressions ──

    #[test]
    fn precedence_product_over_sum() {
        assert_eq!(
            parse_ok("a + b*c"),
            Expr::binary(
                BinOp::Add,
                var("a"),
                Expr::binary(BinOp::Mul, var("b"), var("c"))
            )
        );
    }

    #[test]
    fn sum_is_left_associative() {
        assert_eq!(
            parse_ok("a - b - c"),
            Expr::binary(
                BinOp::Sub,
                Expr::binary(BinOp::Sub, var("a"), var("b")),
                var("c")
            )
        );
    }

    #[test]
    fn power_binds_tighter_than_negation() {
        assert_eq!(
            parse_ok("-x**2"),
            Expr::Neg(Box::new(Expr::binary(BinOp::Pow, var("x"), Expr::Int(2))))
        );
        assert_eq!(
            parse_ok("x**-1"),
            Expr::binary(BinOp::Pow, var("x"), Expr::Neg(Box::new(Expr::Int(1))))
        );
    }

    #[test]
    fn subscript_and_call() {
        assert_eq!(
            parse_ok("a[i, j+1]"),
            Expr::subscript(
                var("a"),
                vec![var("i"), Expr::binary(BinOp::Add, var("j"), Expr::Int(1))]
            )
        );
        assert_eq!(
            parse_ok("sqrt(x)"),
            Expr::Call {
                function: Box::new(var("sqrt")),
                parameters: vec![var("x")],
            }
        );
    }

    #[test]
    fn floor_div_and_rem() {
        assert_eq!(
            parse_ok("i // 2 % 3"),
            Expr::binary(
                BinOp::Rem,
                Expr::binary(BinOp::FloorDiv, var("i"), Expr::Int(2)),
                Expr::Int(3)
            )
        );
    }

    #[test]
    fn float_literal() {
        assert_eq!(parse_ok("2.5"), Expr::Float(FloatLit(2.5)));
    }

    #[test]
    fn syntax_error_is_e0102() {
        let err = parse_expr("a +").unwrap_err();
        assert_eq!(err.code, codes::E0102);
        let err = parse_expr("a $ b").unwrap_err();
        assert_eq!(err.code, codes::E0102);
    }

    // ── Special forms ──

    #[test]
    fn sum_becomes_reduction() {
        assert_eq!(
            parse_ok("sum(k, a[k])"),
            Expr::Reduction {
                op: ReductionOp::Sum,
                inames: vec!["k".to_string()],
                expr: Box::new(Expr::subscript(var("a"), vec![var("k")])),
            }
        );
    }

    #[test]
    fn reduce_with_iname_tuple() {
        match parse_ok("reduce(max, (i, j), a[i, j])") {
            Expr::Reduction { op, inames, .. } => {
                assert_eq!(op, ReductionOp::Max);
                assert_eq!(inames, vec!["i", "j"]);
            }
            other => panic!("expected reduction, got {:?}", other),
        }
    }

    #[test]
    fn binary_max_stays_a_call() {
        assert!(matches!(parse_ok("max(a + 1, b)"), Expr::Call { .. }));
    }

    #[test]
    fn cse_with_prefix_and_type() {
        assert_eq!(
            parse_ok("cse(a*b, prod, float32)"),
            Expr::CommonSubexpression {
                child: Box::new(Expr::binary(BinOp::Mul, var("a"), var("b"))),
                prefix: Some("prod".to_string()),
                dtype: Some(ElementType::Float32),
            }
        );
    }

    #[test]
    fn stray_tuple_is_rejected() {
        let err = parse_expr("(a, b) + 1").unwrap_err();
        assert_eq!(err.code, codes::E0109);
    }

    #[test]
    fn bad_cse_type() {
        let err = parse_expr("cse(a, t, quad)").unwrap_err();
        assert_eq!(err.code, codes::E0108);
    }

    // ── Sets ──

    #[test]
    fn set_with_params_and_chain() {
        let set = parse_set_syntax("[n] -> {[i,j]: 0<=i<n and 0<=j<=i}").unwrap();
        assert_eq!(set.params, vec!["n"]);
        assert_eq!(set.dims, vec!["i", "j"]);
        assert_eq!(set.constraints.len(), 4);
        assert_eq!(set.constraints[1].op, CmpOp::Lt);
        assert_eq!(set.constraints[1].left, var("i"));
        assert_eq!(set.constraints[1].right, var("n"));
    }

    #[test]
    fn set_with_operand_lists() {
        let set = parse_set_syntax("[n] -> {[i,j]: 0<=i,j<n}").unwrap();
        assert_eq!(set.constraints.len(), 4);
        assert_eq!(set.constraints[3].left, var("j"));
        assert_eq!(set.constraints[3].right, var("n"));
    }

    #[test]
    fn set_without_params_or_constraints() {
        let set = parse_set_syntax("{ [i] }").unwrap();
        assert!(set.params.is_empty());
        assert_eq!(set.dims, vec!["i"]);
        assert!(set.constraints.is_empty());
    }

    #[test]
    fn set_syntax_error_is_e0402() {
        let err = parse_set_syntax("{[i]: 0 <= i <}").unwrap_err();
        assert_eq!(err.code, codes::E0402);
    }
}
