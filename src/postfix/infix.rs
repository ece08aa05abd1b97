//! Infix to postfix conversion
//!
//! Shunting-yard conversion of user-facing infix expressions into the
//! space-delimited postfix form the scheduler reduces. Supports decimal numbers,
//! `+ - * /`, parentheses and unary minus. A unary minus directly before a number
//! is folded into the literal (`-3`); before a parenthesised group it becomes a
//! subtraction from zero that binds tighter than any binary operator.

use super::Operator;
use thiserror::Error;

/// Infix parse failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expression is empty")]
    Empty,

    #[error("unexpected character {ch:?} at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },

    #[error("invalid number {literal:?} at position {position}")]
    InvalidNumber { literal: String, position: usize },

    #[error("mismatched parenthesis at position {position}")]
    MismatchedParenthesis { position: usize },

    #[error("missing operand at position {position}")]
    MissingOperand { position: usize },

    #[error("missing operator at position {position}")]
    MissingOperator { position: usize },
}

#[derive(Debug, Clone, PartialEq)]
enum Lexeme {
    Number(String),
    Op(Operator),
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    Op(Operator),
    Negate,
    LParen,
}

impl Pending {
    fn precedence(self) -> u8 {
        match self {
            Pending::Op(Operator::Add) | Pending::Op(Operator::Subtract) => 1,
            Pending::Op(Operator::Multiply) | Pending::Op(Operator::Divide) => 2,
            Pending::Negate => 3,
            Pending::LParen => 0,
        }
    }

    fn emit(self) -> &'static str {
        match self {
            Pending::Op(op) => op.symbol(),
            Pending::Negate => "-",
            Pending::LParen => "(",
        }
    }
}

/// Convert an infix expression to space-delimited postfix
///
/// ```
/// use calcfarm::postfix::infix::to_postfix;
///
/// assert_eq!(to_postfix("(2 + 3) * (4 + 5)").unwrap(), "2 3 + 4 5 + *");
/// ```
pub fn to_postfix(expr: &str) -> Result<String, ParseError> {
    let lexemes = lex(expr)?;
    if lexemes.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut output: Vec<String> = Vec::with_capacity(lexemes.len());
    let mut stack: Vec<Pending> = Vec::new();
    let mut expect_operand = true;
    let mut idx = 0;

    while idx < lexemes.len() {
        let (position, lexeme) = &lexemes[idx];
        let position = *position;

        match lexeme {
            Lexeme::Number(literal) => {
                if !expect_operand {
                    return Err(ParseError::MissingOperator { position });
                }
                output.push(literal.clone());
                expect_operand = false;
            }
            Lexeme::LParen => {
                if !expect_operand {
                    return Err(ParseError::MissingOperator { position });
                }
                stack.push(Pending::LParen);
            }
            Lexeme::RParen => {
                if expect_operand {
                    return Err(ParseError::MissingOperand { position });
                }
                loop {
                    match stack.pop() {
                        Some(Pending::LParen) => break,
                        Some(pending) => output.push(pending.emit().to_string()),
                        None => return Err(ParseError::MismatchedParenthesis { position }),
                    }
                }
            }
            Lexeme::Op(Operator::Subtract) if expect_operand => {
                // Unary minus
                match lexemes.get(idx + 1) {
                    Some((_, Lexeme::Number(literal))) => {
                        output.push(format!("-{}", literal));
                        expect_operand = false;
                        idx += 1;
                    }
                    Some((_, Lexeme::LParen)) => {
                        output.push("0".to_string());
                        stack.push(Pending::Negate);
                    }
                    _ => return Err(ParseError::MissingOperand { position }),
                }
            }
            Lexeme::Op(op) => {
                if expect_operand {
                    return Err(ParseError::MissingOperand { position });
                }
                let incoming = Pending::Op(*op);
                while let Some(top) = stack.last().copied() {
                    if matches!(top, Pending::LParen) || top.precedence() < incoming.precedence() {
                        break;
                    }
                    stack.pop();
                    output.push(top.emit().to_string());
                }
                stack.push(incoming);
                expect_operand = true;
            }
        }

        idx += 1;
    }

    if expect_operand {
        return Err(ParseError::MissingOperand { position: expr.len() });
    }

    while let Some(pending) = stack.pop() {
        if matches!(pending, Pending::LParen) {
            return Err(ParseError::MismatchedParenthesis { position: expr.len() });
        }
        output.push(pending.emit().to_string());
    }

    Ok(output.join(" "))
}

fn lex(expr: &str) -> Result<Vec<(usize, Lexeme)>, ParseError> {
    let mut lexemes = Vec::new();
    let mut chars = expr.char_indices().peekable();

    while let Some(&(position, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch.is_ascii_digit() || ch == '.' {
            let mut literal = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_digit() || c == '.' {
                    literal.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            if literal.parse::<f64>().is_err() {
                return Err(ParseError::InvalidNumber { literal, position });
            }
            lexemes.push((position, Lexeme::Number(literal)));
            continue;
        }

        let lexeme = match ch {
            '(' => Lexeme::LParen,
            ')' => Lexeme::RParen,
            _ => match Operator::from_token(ch.encode_utf8(&mut [0u8; 4])) {
                Some(op) => Lexeme::Op(op),
                None => return Err(ParseError::UnexpectedCharacter { ch, position }),
            },
        };
        lexemes.push((position, lexeme));
        chars.next();
    }

    Ok(lexemes)
}
