//! Per-category opcode codegen.
//!
//! One function per [Category], each consuming the operand tokens that
//! follow the mnemonic and producing a [Node::Code]. Grounded in
//! `spec.md` §4.3's per-category operand tables and `cocas.py`'s
//! `asmline` opcode branches.

use crate::assembler::context::Context;
use crate::assembler::error::Error;
use crate::assembler::expr::{eval_expr, external_ref};
use crate::assembler::node::Node;
use crate::assembler::token::{Token, TokenKind};

fn pad3(tokens: &[Token]) -> Vec<Token> {
    let mut v = tokens.to_vec();
    while v.len() < 3 {
        v.push(Token { kind: TokenKind::End, col: 0, value: crate::assembler::token::TokenValue::None });
    }
    v
}

/// `BINARY`: `base + 4*rd + rs`, one byte.
pub fn emit_binary(
    base: u8,
    label: Option<String>,
    line_no: usize,
    source: &str,
    ops: &[Token],
) -> Result<Node, Error> {
    let rd = ops.first().filter(|t| t.kind == TokenKind::Reg).and_then(Token::as_reg);
    let comma = ops.get(1).filter(|t| t.kind == TokenKind::Comma);
    let rs = ops.get(2).filter(|t| t.kind == TokenKind::Reg).and_then(Token::as_reg);
    let (rd, rs) = match (rd, comma, rs) {
        (Some(rd), Some(_), Some(rs)) => (rd, rs),
        _ => return Err(Error::syntax(line_no, ops.first().map(|t| t.col), source, "Expecting register, comma, register")),
    };
    Ok(Node::Code { label, bytes: vec![base + 4 * rd + rs], rel_offsets: vec![], ext_refs: vec![] })
}

/// `UNARY` (plain): `base + r`, one byte.
pub fn emit_unary(
    base: u8,
    label: Option<String>,
    line_no: usize,
    source: &str,
    ops: &[Token],
) -> Result<Node, Error> {
    let r = ops.first().filter(|t| t.kind == TokenKind::Reg).and_then(Token::as_reg);
    let r = r.ok_or_else(|| Error::syntax(line_no, ops.first().map(|t| t.col), source, "Expecting a register"))?;
    Ok(Node::Code { label, bytes: vec![base + r], rel_offsets: vec![], ext_refs: vec![] })
}

/// `UNARY` with `ldi`/`ldsa`: register, comma, operand (string char,
/// template field, or expression). Two bytes; the second resolved at
/// pass 2.
pub fn emit_unary_operand(
    ctx: &Context,
    base: u8,
    label: Option<String>,
    line_no: usize,
    source: &str,
    ops: &[Token],
    is_ldsa: bool,
) -> Result<Node, Error> {
    let r = ops.first().filter(|t| t.kind == TokenKind::Reg).and_then(Token::as_reg);
    let r = r.ok_or_else(|| Error::syntax(line_no, ops.first().map(|t| t.col), source, "Expecting a register"))?;
    if ops.get(1).map(|t| t.kind) != Some(TokenKind::Comma) {
        return Err(Error::syntax(line_no, ops.get(1).map(|t| t.col), source, "Expecting a comma"));
    }
    let rest = &ops[2..];

    if let Some(tok) = rest.first() {
        if tok.kind == TokenKind::Str {
            if is_ldsa {
                return Err(Error::syntax(line_no, Some(tok.col), source, "ldsa cannot take a string literal"));
            }
            let s = tok.as_str().unwrap();
            if s.len() != 1 {
                return Err(Error::syntax(line_no, Some(tok.col), source, "Expecting a single character"));
            }
            return Ok(Node::Code { label, bytes: vec![base + r, s.as_bytes()[0]], rel_offsets: vec![], ext_refs: vec![] });
        }
    }

    // Template.field: id dot id
    if rest.len() >= 3 && rest[0].kind == TokenKind::Id && rest[1].kind == TokenKind::Dot && rest[2].kind == TokenKind::Id {
        let tname = rest[0].as_str().unwrap();
        let fname = rest[2].as_str().unwrap();
        let offset = ctx
            .tpls
            .get(tname)
            .and_then(|fields| fields.get(fname))
            .ok_or_else(|| Error::syntax(line_no, Some(rest[0].col), source, format!("Unknown template field {}.{}", tname, fname)))?;
        return Ok(Node::Code { label, bytes: vec![base + r, (*offset % 256) as u8], rel_offsets: vec![], ext_refs: vec![] });
    }

    let padded = pad3(rest);
    let ext_refs = match external_ref(ctx, &padded) {
        Some(name) => vec![(name.to_string(), 1)],
        None => vec![],
    };
    let (value, relocatable) = eval_expr(ctx, line_no, source, &padded, false)?;
    let mut rel_offsets = Vec::new();
    if relocatable && ctx.rel_context() {
        rel_offsets.push(1);
    }
    Ok(Node::Code { label, bytes: vec![base + r, value], rel_offsets, ext_refs })
}

/// `ZERO`: no operand, one byte.
pub fn emit_zero(base: u8, label: Option<String>) -> Node {
    Node::Code { label, bytes: vec![base], rel_offsets: vec![], ext_refs: vec![] }
}

/// `BRANCH`: `(base, address)`, two bytes; `lchk` is a zero-sized no-op.
pub fn emit_branch(
    ctx: &Context,
    base: u8,
    label: Option<String>,
    line_no: usize,
    source: &str,
    ops: &[Token],
    is_lchk: bool,
) -> Result<Node, Error> {
    if is_lchk {
        return Ok(Node::Code { label, bytes: vec![], rel_offsets: vec![], ext_refs: vec![] });
    }
    let padded = pad3(ops);
    let ext_refs = match external_ref(ctx, &padded) {
        Some(name) => vec![(name.to_string(), 1)],
        None => vec![],
    };
    let (value, relocatable) = eval_expr(ctx, line_no, source, &padded, false)?;
    let mut rel_offsets = Vec::new();
    if relocatable && ctx.rel_context() {
        rel_offsets.push(1);
    }
    Ok(Node::Code { label, bytes: vec![base, value], rel_offsets, ext_refs })
}

/// `SPMOVE` (`addsp`/`setsp`): optional `-`, then number or template field.
pub fn emit_spmove(
    ctx: &Context,
    base: u8,
    label: Option<String>,
    line_no: usize,
    source: &str,
    ops: &[Token],
) -> Result<Node, Error> {
    let padded = pad3(ops);
    let (value, _) = eval_expr(ctx, line_no, source, &padded, true)?;
    Ok(Node::Code { label, bytes: vec![base, value], rel_offsets: vec![], ext_refs: vec![] })
}

/// `OSIX`: a single numeric literal as the second byte.
pub fn emit_osix(
    base: u8,
    label: Option<String>,
    line_no: usize,
    source: &str,
    ops: &[Token],
) -> Result<Node, Error> {
    let n = ops.first().filter(|t| t.kind == TokenKind::Num).and_then(Token::as_num);
    let n = n.ok_or_else(|| Error::syntax(line_no, ops.first().map(|t| t.col), source, "Expecting a numeric literal"))?;
    Ok(Node::Code { label, bytes: vec![base, n], rel_offsets: vec![], ext_refs: vec![] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::token::lex_line;

    fn ops(s: &str) -> Vec<Token> {
        let mut t = lex_line(1, s).unwrap();
        t.pop(); // drop trailing End; callers re-pad as needed
        t
    }

    #[test]
    fn binary_encodes_both_registers() {
        let toks = ops("r1, r2");
        let n = emit_binary(0x10, None, 1, "add r1, r2", &toks).unwrap();
        match n {
            Node::Code { bytes, .. } => assert_eq!(bytes, vec![0x10 + 4 * 1 + 2]),
            _ => panic!("expected code node"),
        }
    }

    #[test]
    fn unary_rejects_missing_register() {
        let toks = ops("5");
        assert!(emit_unary(0x88, None, 1, "dec 5", &toks).is_err());
    }

    #[test]
    fn zero_emits_bare_opcode() {
        let n = emit_zero(0xD4, None);
        match n {
            Node::Code { bytes, .. } => assert_eq!(bytes, vec![0xD4]),
            _ => panic!("expected code node"),
        }
    }

    #[test]
    fn osix_takes_numeric_literal() {
        let toks = ops("0x2A");
        let n = emit_osix(0xD0, None, 1, "osix 0x2A", &toks).unwrap();
        match n {
            Node::Code { bytes, .. } => assert_eq!(bytes, vec![0xD0, 0x2A]),
            _ => panic!("expected code node"),
        }
    }
}
