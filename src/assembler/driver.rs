//! Two-pass orchestration: pass 1 collects symbols and expands macros
//! in place, pass 2 walks the now-stable line buffer and emits bytes.
//!
//! Grounded in `cocas.py`'s `asm()`; see `spec.md` §4.5.

use crate::assembler::context::Context;
use crate::assembler::error::Error;
use crate::assembler::macros;
use crate::assembler::node::Node;
use crate::assembler::statement::{assemble_line, Parsed};

/// One pass-2 emission: `(visible line, address, bytes, section)`.
/// `section` is empty for template-reference emissions (listing-only).
#[derive(Debug, Clone)]
pub struct Emission {
    pub line: usize,
    pub address: u32,
    pub bytes: Vec<u8>,
    pub section: String,
}

fn register_label(ctx: &mut Context, line_no: usize, source: &str, node: &Node, address: u32) -> Result<(), Error> {
    let Some(label) = node.label() else { return Ok(()) };
    if ctx.tpl {
        let entry = ctx.tpls.entry(ctx.tpl_name.clone()).or_default();
        if entry.contains_key(label) {
            return Err(Error::syntax(line_no, None, source, format!("Label {} already defined in template", label)));
        }
        entry.insert(label.to_string(), address);
        return Ok(());
    }
    let Some(section) = ctx.sect_name.clone() else {
        return Err(Error::syntax(line_no, None, source, "Label outside any section"));
    };
    let table = ctx.labels.entry(section.clone()).or_default();
    if table.contains_key(label) {
        return Err(Error::syntax(line_no, None, source, format!("Label {} already defined", label)));
    }
    table.insert(label.to_string(), address);
    if section == "$abs" {
        ctx.abses.insert(label.to_string(), address);
    }
    Ok(())
}

fn node_size(node: &Node) -> u32 {
    match node {
        Node::Code { bytes, .. } => bytes.len() as u32,
        Node::Space { count, .. } => *count,
        _ => 0,
    }
}

/// Run both passes over `ctx.text` (already populated by the caller) and
/// return the pass-2 emission list.
pub fn run(ctx: &mut Context) -> Result<Vec<Emission>, Error> {
    pass1(ctx)?;

    ctx.rsects.clear();
    ctx.counter = 0;
    ctx.sect_name = None;
    ctx.rel = false;
    ctx.tpl = false;

    pass2(ctx)
}

fn pass1(ctx: &mut Context) -> Result<(), Error> {
    let mut i = 0;
    let mut visible_line = 0usize;
    let mut ended = false;
    let mut macro_body: Vec<String> = Vec::new();

    while i < ctx.text.len() {
        if !ctx.generated[i] {
            visible_line += 1;
        }
        let line_no = visible_line;
        let source = ctx.text[i].clone();

        if ctx.macdef {
            match assemble_line(ctx, line_no, &source, 1) {
                Ok(Parsed::MacroDefEnd) => {
                    let key = format!("{}/{}", ctx.mname, ctx.marity);
                    ctx.macros.insert(key, std::mem::take(&mut macro_body));
                    ctx.macdef = false;
                }
                Ok(_) => macro_body.push(source),
                Err(e) if e.is_syntax() => macro_body.push(source),
                Err(e) => return Err(e),
            }
            i += 1;
            continue;
        }

        if macros::macro_stack_directive(ctx, line_no, &source)? {
            i += 1;
            continue;
        }

        match assemble_line(ctx, line_no, &source, 1)? {
            Parsed::Node(node) => {
                let address = ctx.counter;
                if node_size(&node) > 0 && !ctx.tpl && ctx.sect_name.is_none() {
                    return Err(Error::syntax(line_no, None, &source, "'asect' or 'rsect' expected"));
                }
                register_label(ctx, line_no, &source, &node, address)?;
                if matches!(node, Node::End) {
                    ended = true;
                }
                ctx.counter += node_size(&node);
            }
            Parsed::MacroDefBegin { name, arity } => {
                ctx.macdef = true;
                ctx.mname = name;
                ctx.marity = arity;
                macro_body = Vec::new();
            }
            Parsed::MacroDefEnd => {
                return Err(Error::syntax(line_no, None, &source, "mend without matching macro"));
            }
            Parsed::MacroInvoke { label, is_entry, name, args } => {
                let expanded = macros::expand_call(ctx, line_no, &source, &name, &args, label, is_entry)?;
                for (k, text) in expanded.into_iter().enumerate() {
                    ctx.text.insert(i + 1 + k, text);
                    ctx.generated.insert(i + 1 + k, true);
                }
            }
        }
        i += 1;
    }

    if !ended {
        return Err(Error::syntax(visible_line, None, "", "file ends before end of program"));
    }
    Ok(())
}

fn pass2(ctx: &mut Context) -> Result<Vec<Emission>, Error> {
    let mut emissions = Vec::new();
    let mut i = 0;
    let mut visible_line = 0usize;

    while i < ctx.text.len() {
        if !ctx.generated[i] {
            visible_line += 1;
        }
        let line_no = visible_line;
        let source = ctx.text[i].clone();

        if ctx.macdef {
            if let Ok(Parsed::MacroDefEnd) = assemble_line(ctx, line_no, &source, 2) {
                ctx.macdef = false;
            }
            i += 1;
            continue;
        }

        if macros::macro_stack_directive(ctx, line_no, &source)? {
            i += 1;
            continue;
        }

        match assemble_line(ctx, line_no, &source, 2)? {
            Parsed::Node(node) => {
                let address = ctx.counter;
                if node_size(&node) > 0 && !ctx.tpl && ctx.sect_name.is_none() {
                    return Err(Error::syntax(line_no, None, &source, "'asect' or 'rsect' expected"));
                }
                let section = ctx.sect_name.clone().unwrap_or_default();
                if let Node::Code { bytes, rel_offsets, ext_refs, .. } = &node {
                    if !bytes.is_empty() && !ctx.tpl {
                        for off in rel_offsets {
                            ctx.rel_list.entry(section.clone()).or_default().push(address + off);
                        }
                        for (name, off) in ext_refs {
                            ctx.exts.entry(name.clone()).or_default().push((section.clone(), address + off));
                        }
                        emissions.push(Emission { line: line_no, address, bytes: bytes.clone(), section: section.clone() });
                    }
                }
                ctx.counter += node_size(&node);
            }
            Parsed::MacroDefBegin { name, arity } => {
                ctx.macdef = true;
                ctx.mname = name;
                ctx.marity = arity;
            }
            Parsed::MacroDefEnd => ctx.macdef = false,
            Parsed::MacroInvoke { .. } => {
                // already expanded during pass 1; unreachable on pass 2's
                // stable buffer unless the macro table changed, which
                // cannot happen after pass 1 completes.
            }
        }
        i += 1;
    }
    Ok(emissions)
}
