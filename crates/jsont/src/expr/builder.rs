/*
 * builder.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Shunting-yard conversion of infix tokens into postfix statements.

use super::tokens::{Assoc, OpKind, Token};

/// Append one postfix statement per statement to `out`. Statements end at
/// `;` or at a `,` outside parentheses. Empty statements are skipped. On a parenthesis mismatch the statements
/// built so far are kept and the error message is returned.
pub(crate) fn build(tokens: &[Token], out: &mut Vec<Vec<Token>>) -> Result<(), String> {
    let mut queue: Vec<Token> = Vec::new();
    let mut ops: Vec<Token> = Vec::new();

    for token in tokens {
        let Some(op) = token.operator() else {
            match token {
                Token::Call(_) => {
                    queue.push(Token::Args);
                    ops.push(token.clone());
                }
                _ => queue.push(token.clone()),
            }
            continue;
        };

        match op.kind {
            OpKind::Semicolon => {
                flush(&mut queue, &mut ops, out)?;
            }
            OpKind::LeftParen => ops.push(token.clone()),
            // Outside any parenthesis a comma ends the statement.
            OpKind::Comma if !ops.iter().any(|t| t.is_op(OpKind::LeftParen)) => {
                flush(&mut queue, &mut ops, out)?;
            }
            OpKind::Comma => {
                while let Some(top) = ops.last() {
                    if !is_plain_operator(top) {
                        break;
                    }
                    queue.extend(ops.pop());
                }
            }
            OpKind::RightParen => {
                loop {
                    match ops.last() {
                        None => return Err(mismatched("right parenthesis")),
                        Some(top) if top.is_op(OpKind::LeftParen) => break,
                        Some(_) => queue.extend(ops.pop()),
                    }
                }
                ops.pop();
                if matches!(ops.last(), Some(Token::Call(_))) {
                    queue.extend(ops.pop());
                }
            }
            _ => {
                while let Some(top) = ops.last().and_then(Token::operator) {
                    if top.kind == OpKind::LeftParen {
                        break;
                    }
                    let yields = top.prec > op.prec || (top.prec == op.prec && op.assoc == Assoc::Left);
                    if !yields {
                        break;
                    }
                    queue.extend(ops.pop());
                }
                ops.push(token.clone());
            }
        }
    }
    flush(&mut queue, &mut ops, out)
}

fn is_plain_operator(token: &Token) -> bool {
    token.operator().is_some_and(|o| o.kind != OpKind::LeftParen)
}

/// Move the remaining operators into the queue and finish the statement.
fn flush(
    queue: &mut Vec<Token>,
    ops: &mut Vec<Token>,
    out: &mut Vec<Vec<Token>>,
) -> Result<(), String> {
    while let Some(top) = ops.pop() {
        if top.is_op(OpKind::LeftParen) || top.is_op(OpKind::RightParen) {
            return Err(mismatched("left parenthesis"));
        }
        queue.push(top);
    }
    if !queue.is_empty() {
        out.push(std::mem::take(queue));
    }
    Ok(())
}

fn mismatched(desc: &str) -> String {
    format!("Mismatched operator found: {}", desc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::lexer::Lexer;
    use crate::expr::tokens::debug_statements;

    fn postfix(src: &str) -> Result<String, String> {
        let mut lexer = Lexer::new(src, 0);
        lexer.tokenize();
        let (tokens, errors) = lexer.finish();
        assert!(errors.is_empty(), "{:?}", errors);
        let mut out = Vec::new();
        build(&tokens, &mut out)?;
        Ok(debug_statements(&out))
    }

    #[test]
    fn test_precedence_and_calls() {
        assert_eq!(
            postfix("@a = 2 * 3 / max(c, d)").unwrap(),
            "[[@a 2 3 <multiply> <args> c d max() <divide> <assign>]]"
        );
        assert_eq!(postfix("1 + 2 * 3").unwrap(), "[[1 2 3 <multiply> <add>]]");
        assert_eq!(postfix("(1 + 2) * 3").unwrap(), "[[1 2 <add> 3 <multiply>]]");
    }

    #[test]
    fn test_right_associative() {
        assert_eq!(postfix("2 ** 3 ** 2").unwrap(), "[[2 3 2 <exponent> <exponent>]]");
        assert_eq!(postfix("--1").unwrap(), "[[1 <unary minus> <unary minus>]]");
    }

    #[test]
    fn test_statements() {
        assert_eq!(postfix("1; ;2").unwrap(), "[[1], [2]]");
        assert_eq!(postfix(";;").unwrap(), "[]");
        assert_eq!(postfix("1, 2").unwrap(), "[[1], [2]]");
        assert_eq!(
            postfix("@a = 1, @b = max(1, 2)").unwrap(),
            "[[@a 1 <assign>], [@b <args> 1 2 max() <assign>]]"
        );
    }

    #[test]
    fn test_mismatched_parens() {
        assert_eq!(
            postfix("1 + 2)").unwrap_err(),
            "Mismatched operator found: right parenthesis"
        );
        assert_eq!(
            postfix("(1 + 2").unwrap_err(),
            "Mismatched operator found: left parenthesis"
        );
    }
}
