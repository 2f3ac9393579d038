//! `[[ expression ]]` parser — spec §4.2 conditional command.
//!
//! Built as its own small precedence chain over the same token stream as
//! the main parser (`||` < `&&` < `!` < primary), reusing word parsing for
//! operands so `[[ -n "$x" ]]` etc. expand the same way regular words do.

use super::Parser;
use crate::ast::*;
use crate::error::BashboxError;
use crate::lexer::Token;

pub fn parse_cond(p: &mut Parser) -> Result<CondExpr, BashboxError> {
    let expr = parse_or(p)?;
    expect_close(p)?;
    Ok(expr)
}

fn expect_close(p: &mut Parser) -> Result<(), BashboxError> {
    match p.bump()?.value {
        Token::Word(w) if w == "]]" => Ok(()),
        other => Err(p.err(format!("expected ']]', found {other:?}"))),
    }
}

fn parse_or(p: &mut Parser) -> Result<CondExpr, BashboxError> {
    let mut left = parse_and(p)?;
    while p.peek_is_op("||")? {
        p.bump()?;
        let right = parse_and(p)?;
        left = CondExpr::Or(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_and(p: &mut Parser) -> Result<CondExpr, BashboxError> {
    let mut left = parse_unary(p)?;
    while p.peek_is_op("&&")? {
        p.bump()?;
        let right = parse_unary(p)?;
        left = CondExpr::And(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_unary(p: &mut Parser) -> Result<CondExpr, BashboxError> {
    if p.peek_is_word("!")? {
        p.bump()?;
        return Ok(CondExpr::Not(Box::new(parse_unary(p)?)));
    }
    if p.peek_is_op("(")? {
        p.bump()?;
        let inner = parse_or(p)?;
        p.expect_op(")")?;
        return Ok(CondExpr::Group(Box::new(inner)));
    }
    if let Token::Word(w) = &p.peek()?.value {
        if let Some(op) = unary_file_op(w) {
            p.bump()?;
            let operand = p.next_word()?;
            return Ok(CondExpr::Unary(op, operand));
        }
        if w == "-z" {
            p.bump()?;
            return Ok(CondExpr::Unary(CondUnaryOp::StringZero, p.next_word()?));
        }
        if w == "-n" {
            p.bump()?;
            return Ok(CondExpr::Unary(CondUnaryOp::StringLen, p.next_word()?));
        }
        if w == "-v" {
            p.bump()?;
            return Ok(CondExpr::Unary(CondUnaryOp::IsVarSet, p.next_word()?));
        }
        if w == "-R" {
            p.bump()?;
            return Ok(CondExpr::Unary(CondUnaryOp::IsNameRef, p.next_word()?));
        }
    }
    parse_primary(p)
}

fn unary_file_op(w: &str) -> Option<CondUnaryOp> {
    Some(match w {
        "-e" => CondUnaryOp::Exists,
        "-b" => CondUnaryOp::IsBlock,
        "-c" => CondUnaryOp::IsChar,
        "-d" => CondUnaryOp::IsDir,
        "-f" => CondUnaryOp::IsRegular,
        "-g" => CondUnaryOp::IsSetGid,
        "-h" | "-L" => CondUnaryOp::IsSymlink,
        "-k" => CondUnaryOp::IsSticky,
        "-r" => CondUnaryOp::IsReadable,
        "-s" => CondUnaryOp::IsSize,
        "-t" => CondUnaryOp::IsTerminal,
        "-u" => CondUnaryOp::IsSetUid,
        "-w" => CondUnaryOp::IsWritable,
        "-x" => CondUnaryOp::IsExecutable,
        "-S" => CondUnaryOp::IsSocket,
        _ => return None,
    })
}

fn parse_primary(p: &mut Parser) -> Result<CondExpr, BashboxError> {
    let lhs = p.next_word()?;
    if let Token::Word(w) = &p.peek()?.value {
        if let Some(op) = binary_word_op(w) {
            p.bump()?;
            let rhs = p.next_word()?;
            return Ok(CondExpr::Binary(op, lhs, rhs));
        }
    }
    match &p.peek()?.value {
        Token::Operator("<") => {
            p.bump()?;
            let rhs = p.next_word()?;
            Ok(CondExpr::Binary(CondBinOp::StrLt, lhs, rhs))
        }
        Token::Operator(">") => {
            p.bump()?;
            let rhs = p.next_word()?;
            Ok(CondExpr::Binary(CondBinOp::StrGt, lhs, rhs))
        }
        Token::Operator("=") => {
            p.bump()?;
            let rhs = p.next_word()?;
            Ok(CondExpr::Binary(CondBinOp::StrEq, lhs, rhs))
        }
        _ => Ok(CondExpr::Word(lhs)),
    }
}

fn binary_word_op(w: &str) -> Option<CondBinOp> {
    Some(match w {
        "=" | "==" => CondBinOp::StrEqEq,
        "!=" => CondBinOp::StrNe,
        "=~" => CondBinOp::StrMatch,
        "-eq" => CondBinOp::NumEq,
        "-ne" => CondBinOp::NumNe,
        "-lt" => CondBinOp::NumLt,
        "-le" => CondBinOp::NumLe,
        "-gt" => CondBinOp::NumGt,
        "-ge" => CondBinOp::NumGe,
        "-nt" => CondBinOp::NewerThan,
        "-ot" => CondBinOp::OlderThan,
        "-ef" => CondBinOp::SameFile,
        _ => return None,
    })
}
