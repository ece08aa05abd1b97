//! Postfix utilities
//!
//! Token classification and independence detection for space-delimited postfix
//! (reverse Polish) expressions. The reduction scheduler uses these to find the
//! binary operations that can be computed right now, and to fold computed values
//! back into the token sequence.
//!
//! # Ready triples
//!
//! A triple at position `i` is *ready* when `tokens[i]` and `tokens[i + 1]` are
//! numeric literals and `tokens[i + 2]` is an arithmetic operator. Parentheses are
//! classified as operators by [`is_operator`] but never complete a ready triple.
//!
//! ```
//! use calcfarm::postfix::{scan_ready_triples, tokenize};
//!
//! let tokens = tokenize("2 3 + 4 5 + *");
//! let ready = scan_ready_triples(&tokens);
//! assert_eq!(ready.len(), 2);
//! assert_eq!(ready[0].task_id, 1);
//! assert_eq!(ready[1].position, 3);
//! ```

pub mod infix;

use crate::task::ComputeError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Decimal places used when a computed value is written back into an expression
pub const VALUE_PRECISION: usize = 6;

/// Arithmetic operator of a binary sub-operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operator {
    /// All operators, in the order their latencies are configured
    pub const ALL: [Operator; 4] = [
        Operator::Add,
        Operator::Subtract,
        Operator::Multiply,
        Operator::Divide,
    ];

    /// Token form of the operator
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
        }
    }

    /// Parse an arithmetic operator token (parentheses are not arithmetic)
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "+" => Some(Operator::Add),
            "-" => Some(Operator::Subtract),
            "*" => Some(Operator::Multiply),
            "/" => Some(Operator::Divide),
            _ => None,
        }
    }

    /// Apply the operator to two operands
    ///
    /// Division by zero and results that overflow to infinity are reported as
    /// [`ComputeError`] instead of leaking `inf`/`NaN` into the expression.
    pub fn apply(self, lhs: f64, rhs: f64) -> Result<f64, ComputeError> {
        let value = match self {
            Operator::Add => lhs + rhs,
            Operator::Subtract => lhs - rhs,
            Operator::Multiply => lhs * rhs,
            Operator::Divide => {
                if rhs == 0.0 {
                    return Err(ComputeError::DivisionByZero { dividend: lhs });
                }
                lhs / rhs
            }
        };

        if !value.is_finite() {
            return Err(ComputeError::NonFinite {
                operator: self.symbol().to_string(),
                lhs,
                rhs,
            });
        }

        Ok(value)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::from_token(s).ok_or_else(|| ComputeError::UnknownOperator(s.to_string()))
    }
}

/// Returns true if the token parses as a floating-point number
#[inline]
pub fn is_numeric_literal(token: &str) -> bool {
    token.parse::<f64>().is_ok()
}

/// Returns true if the token is one of `+ - * / ( )`
#[inline]
pub fn is_operator(token: &str) -> bool {
    matches!(token, "+" | "-" | "*" | "/" | "(" | ")")
}

/// Split a postfix expression into tokens on whitespace
///
/// Runs of whitespace never produce empty tokens, so a persisted checkpoint can
/// be re-read without picking up empty markers.
pub fn tokenize(expr: &str) -> Vec<String> {
    expr.split_whitespace().map(str::to_string).collect()
}

/// Join tokens back into a postfix expression, skipping empty markers
pub fn join(tokens: &[String]) -> String {
    tokens
        .iter()
        .filter(|t| !t.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format a computed value the way it is written back into an expression
pub fn format_value(value: f64) -> String {
    format!("{:.*}", VALUE_PRECISION, value)
}

/// A binary operation that can be computed independently in the current round
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyTriple {
    /// Sub-task id, assigned 1, 2, 3, ... in scan order
    pub task_id: i64,

    /// Index of the triple's first token
    pub position: usize,

    pub lhs: f64,
    pub rhs: f64,
    pub operator: Operator,
}

/// Find every ready triple, left to right
///
/// Ready triples can never overlap (the third slot of one would have to be a
/// number for the next), so the scan resumes after each match. Ids depend only
/// on position, which makes the result identical for identical input.
pub fn scan_ready_triples(tokens: &[String]) -> Vec<ReadyTriple> {
    let mut ready = Vec::new();
    let mut i = 0;

    while i + 2 < tokens.len() {
        if let Some(triple) = ready_triple_at(tokens, i, ready.len() as i64 + 1) {
            ready.push(triple);
            i += 3;
        } else {
            i += 1;
        }
    }

    ready
}

fn ready_triple_at(tokens: &[String], i: usize, task_id: i64) -> Option<ReadyTriple> {
    let (lhs, rhs, op) = (&tokens[i], &tokens[i + 1], &tokens[i + 2]);
    if !is_numeric_literal(lhs) || !is_numeric_literal(rhs) || !is_operator(op) {
        return None;
    }

    // Parentheses classify as operators but have no arithmetic
    let operator = Operator::from_token(op)?;

    Some(ReadyTriple {
        task_id,
        position: i,
        lhs: lhs.parse().ok()?,
        rhs: rhs.parse().ok()?,
        operator,
    })
}

/// Substitute computed values into the token sequence
///
/// The first slot of each triple takes the formatted value and the other two
/// become empty markers, which are then compacted away so the next scan sees a
/// dense sequence. Returns `None` if any triple has no value, leaving the
/// caller's tokens untouched.
pub fn substitute(
    tokens: &[String],
    triples: &[ReadyTriple],
    values: &HashMap<i64, f64>,
) -> Option<Vec<String>> {
    let mut next = tokens.to_vec();

    for triple in triples {
        let value = values.get(&triple.task_id)?;
        next[triple.position] = format_value(*value);
        next[triple.position + 1].clear();
        next[triple.position + 2].clear();
    }

    next.retain(|t| !t.is_empty());
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        tokenize(s)
    }

    #[test]
    fn test_is_numeric_literal() {
        assert!(is_numeric_literal("3"));
        assert!(is_numeric_literal("-2.5"));
        assert!(is_numeric_literal("7.000000"));
        assert!(!is_numeric_literal("+"));
        assert!(!is_numeric_literal("("));
        assert!(!is_numeric_literal(""));
        assert!(!is_numeric_literal("abc"));
    }

    #[test]
    fn test_is_operator() {
        for op in ["+", "-", "*", "/", "(", ")"] {
            assert!(is_operator(op), "{} should be an operator", op);
        }
        assert!(!is_operator("3"));
        assert!(!is_operator("++"));
        assert!(!is_operator(""));
    }

    #[test]
    fn test_scan_assigns_ids_in_order() {
        let ready = scan_ready_triples(&toks("2 3 + 4 5 + *"));

        assert_eq!(ready.len(), 2);
        assert_eq!(ready[0].task_id, 1);
        assert_eq!(ready[0].position, 0);
        assert_eq!((ready[0].lhs, ready[0].rhs), (2.0, 3.0));
        assert_eq!(ready[0].operator, Operator::Add);
        assert_eq!(ready[1].task_id, 2);
        assert_eq!(ready[1].position, 3);
        assert_eq!((ready[1].lhs, ready[1].rhs), (4.0, 5.0));
    }

    #[test]
    fn test_scan_is_deterministic() {
        let tokens = toks("1 2 + 3 4 - 5 6 * 7 8 / + + +");
        let first = scan_ready_triples(&tokens);
        let second = scan_ready_triples(&tokens);

        assert_eq!(first, second);
        let ids: Vec<i64> = first.iter().map(|t| t.task_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_parenthesis_never_completes_triple() {
        assert!(scan_ready_triples(&toks("1 2 (")).is_empty());
        assert!(scan_ready_triples(&toks("1 2 )")).is_empty());
    }

    #[test]
    fn test_scan_skips_non_numeric_operands() {
        assert!(scan_ready_triples(&toks("x 2 +")).is_empty());
        assert!(scan_ready_triples(&toks("2 + 3")).is_empty());

        let ready = scan_ready_triples(&toks("abc 1 2 * ( 3 4 -"));
        assert_eq!(ready.len(), 2);
        assert_eq!((ready[0].position, ready[0].operator), (1, Operator::Multiply));
        assert_eq!((ready[1].position, ready[1].operator), (5, Operator::Subtract));
    }

    #[test]
    fn test_nested_operand_not_ready() {
        // Only the innermost operation is ready
        let ready = scan_ready_triples(&toks("1 2 3 + +"));
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].position, 1);
    }

    #[test]
    fn test_substitute_compacts_tokens() {
        let tokens = toks("2 3 + 4 5 + *");
        let ready = scan_ready_triples(&tokens);
        let values = HashMap::from([(1, 5.0), (2, 9.0)]);

        let next = substitute(&tokens, &ready, &values).unwrap();
        assert_eq!(join(&next), "5.000000 9.000000 *");
        assert!(next.iter().all(|t| !t.is_empty()));
    }

    #[test]
    fn test_substitute_missing_value() {
        let tokens = toks("2 3 + 4 5 + *");
        let ready = scan_ready_triples(&tokens);
        let values = HashMap::from([(1, 5.0)]);

        assert!(substitute(&tokens, &ready, &values).is_none());
    }

    #[test]
    fn test_rescan_never_spans_cleared_slot() {
        // Three levels deep: the second round must see a dense sequence
        let tokens = toks("1 2 + 3 * 4 -");
        let ready = scan_ready_triples(&tokens);
        assert_eq!(ready.len(), 1);

        let next = substitute(&tokens, &ready, &HashMap::from([(1, 3.0)])).unwrap();
        assert_eq!(join(&next), "3.000000 3 * 4 -");

        let ready = scan_ready_triples(&next);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].position, 0);
        assert_eq!(ready[0].operator, Operator::Multiply);
    }

    #[test]
    fn test_join_skips_empty_markers() {
        let tokens = vec!["7.000000".to_string(), String::new(), String::new(), "2".to_string(), "*".to_string()];
        assert_eq!(join(&tokens), "7.000000 2 *");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(14.0), "14.000000");
        assert_eq!(format_value(-0.5), "-0.500000");
        assert_eq!(format_value(1.0 / 3.0), "0.333333");
    }

    #[test]
    fn test_operator_apply() {
        assert_eq!(Operator::Add.apply(2.0, 3.0).unwrap(), 5.0);
        assert_eq!(Operator::Subtract.apply(2.0, 3.0).unwrap(), -1.0);
        assert_eq!(Operator::Multiply.apply(2.0, 3.0).unwrap(), 6.0);
        assert_eq!(Operator::Divide.apply(3.0, 2.0).unwrap(), 1.5);
    }

    #[test]
    fn test_division_by_zero_is_classified() {
        let err = Operator::Divide.apply(5.0, 0.0).unwrap_err();
        assert_eq!(err, ComputeError::DivisionByZero { dividend: 5.0 });
    }

    #[test]
    fn test_overflow_is_classified() {
        let err = Operator::Multiply.apply(f64::MAX, 2.0).unwrap_err();
        assert!(matches!(err, ComputeError::NonFinite { .. }));
    }

    #[test]
    fn test_operator_from_str() {
        assert_eq!("*".parse::<Operator>().unwrap(), Operator::Multiply);
        assert_eq!(
            "%".parse::<Operator>().unwrap_err(),
            ComputeError::UnknownOperator("%".to_string())
        );
        assert!(Operator::from_token("(").is_none());
    }
}
