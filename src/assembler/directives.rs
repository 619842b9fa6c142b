//! Assembler directive handlers (`asect`, `rsect`, `tplate`, `ext`, `ds`,
//! `dc`, `set`, `end`).
//!
//! Grounded in `cocas.py`'s corresponding `asmline` branches; see
//! `spec.md` §4.3.

use crate::assembler::context::Context;
use crate::assembler::error::Error;
use crate::assembler::expr::{eval_expr, external_ref};
use crate::assembler::node::Node;
use crate::assembler::token::{Token, TokenKind, TokenValue};

fn pad3(tokens: &[Token]) -> Vec<Token> {
    let mut v = tokens.to_vec();
    while v.len() < 3 {
        v.push(Token { kind: TokenKind::End, col: 0, value: TokenValue::None });
    }
    v
}

fn close_active_section(ctx: &mut Context) {
    if ctx.tpl {
        ctx.tpls.entry(ctx.tpl_name.clone()).or_default().insert("_".to_string(), ctx.counter);
    } else if let Some(name) = ctx.sect_name.clone() {
        if name != "$abs" {
            ctx.rsects.insert(name, ctx.counter);
        }
    }
    ctx.tpl = false;
}

/// `asect N` — close any active rsect/template, set section to `$abs`.
pub fn asect(
    ctx: &mut Context,
    line_no: usize,
    source: &str,
    ops: &[Token],
) -> Result<Node, Error> {
    close_active_section(ctx);
    let padded = pad3(ops);
    let (addr, _) = eval_expr(ctx, line_no, source, &padded, true)?;
    ctx.sect_name = Some("$abs".to_string());
    ctx.rel = false;
    ctx.counter = addr as u32;
    Ok(Node::Asect { name: "$abs".to_string() })
}

/// `rsect name` — (re-)enter a relocatable section.
pub fn rsect(
    ctx: &mut Context,
    _line_no: usize,
    _source: &str,
    ops: &[Token],
    passno: u8,
) -> Result<Node, Error> {
    close_active_section(ctx);
    let name = ops[0].as_str().unwrap().to_string();
    if passno == 1 && !ctx.labels.contains_key(&name) {
        ctx.labels.insert(name.clone(), std::collections::HashMap::new());
        ctx.ents.insert(name.clone(), std::collections::HashMap::new());
    }
    ctx.counter = *ctx.rsects.get(&name).unwrap_or(&0);
    ctx.sect_name = Some(name.clone());
    ctx.rel = true;
    Ok(Node::Rsect { name })
}

/// `tplate name` — open a template block; only `ds`/`dc` are legal inside.
pub fn tplate(
    ctx: &mut Context,
    line_no: usize,
    source: &str,
    ops: &[Token],
    passno: u8,
) -> Result<Node, Error> {
    let name = ops[0].as_str().unwrap().to_string();
    if passno == 1 && ctx.tpls.contains_key(&name) {
        return Err(Error::syntax(line_no, Some(ops[0].col), source, format!("Template {} already defined", name)));
    }
    close_active_section(ctx);
    if passno == 1 {
        ctx.tpls.insert(name.clone(), std::collections::HashMap::new());
    }
    ctx.tpl = true;
    ctx.tpl_name = name.clone();
    ctx.counter = 0;
    ctx.sect_name = None;
    ctx.rel = false;
    Ok(Node::Tplate { name })
}

/// `ext name` — the label on this line is declared external. A dummy
/// placeholder is registered into the current section's label table so
/// later operand expressions can resolve `name` the same as any other
/// label; the real address is patched in by the linker via `ctx.exts`.
pub fn ext(ctx: &mut Context, label: &str, passno: u8) -> Result<Node, Error> {
    if passno == 1 {
        ctx.exts.entry(label.to_string()).or_default();
        if let Some(sect) = ctx.sect_name.clone() {
            ctx.labels.entry(sect).or_default().insert(label.to_string(), 0);
        }
    }
    Ok(Node::Ext { name: label.to_string() })
}

/// `ds N` — reserve N absolute-valued zero bytes.
pub fn ds(
    ctx: &mut Context,
    label: Option<String>,
    line_no: usize,
    source: &str,
    ops: &[Token],
) -> Result<Node, Error> {
    let padded = pad3(ops);
    let (count, _) = eval_expr(ctx, line_no, source, &padded, true)?;
    Ok(Node::Space { label, count: count as u32 })
}

/// `dc v1, v2, …` — comma-separated literal/expression byte list.
pub fn dc(
    ctx: &Context,
    label: Option<String>,
    line_no: usize,
    source: &str,
    ops: &[Token],
) -> Result<Node, Error> {
    let mut bytes = Vec::new();
    let mut rel_offsets = Vec::new();
    let mut ext_refs = Vec::new();
    for group in split_on_comma(ops) {
        if group.len() == 1 && group[0].kind == TokenKind::Str {
            for b in group[0].as_str().unwrap().bytes() {
                bytes.push(b);
            }
            continue;
        }
        let padded = pad3(group);
        if let Some(name) = external_ref(ctx, &padded) {
            ext_refs.push((name.to_string(), bytes.len() as u32));
        }
        let (value, relocatable) = eval_expr(ctx, line_no, source, &padded, false)?;
        if relocatable && ctx.rel_context() {
            rel_offsets.push(bytes.len() as u32);
        }
        bytes.push(value);
    }
    Ok(Node::Code { label, bytes, rel_offsets, ext_refs })
}

fn split_on_comma(tokens: &[Token]) -> Vec<&[Token]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for (i, t) in tokens.iter().enumerate() {
        if t.kind == TokenKind::Comma {
            groups.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    groups.push(&tokens[start..]);
    groups
}

/// `name = expr` — an absolute alias (the `set` directive). The
/// redefinition check and the insertion into `abses` only happen on
/// pass 1; pass 2 trusts the binding pass 1 already made.
pub fn set(
    ctx: &mut Context,
    name: &str,
    line_no: usize,
    source: &str,
    ops: &[Token],
    passno: u8,
) -> Result<Node, Error> {
    if passno == 1 && ctx.abses.contains_key(name) {
        return Err(Error::syntax(line_no, None, source, format!("{} already defined", name)));
    }
    let padded = pad3(ops);
    let (value, _) = eval_expr(ctx, line_no, source, &padded, true)?;
    if passno == 1 {
        ctx.abses.insert(name.to_string(), value as u32);
    }
    Ok(Node::Set { label: name.to_string(), value })
}

/// `end` — terminates translation of the current file.
pub fn end(ctx: &mut Context) -> Node {
    close_active_section(ctx);
    ctx.sect_name = None;
    Node::End
}
