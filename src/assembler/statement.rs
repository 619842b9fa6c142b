//! Per-line dispatcher: turns one already-lexed source line into a [Node].
//!
//! Mirrors `cocas.py`'s `asmline`. Mnemonic lookup is deliberately
//! case-sensitive against lowercase keys only — the original never
//! lowercases the opcode before lookup, and this keeps faithful behavior.

use crate::assembler::context::{Category, Context};
use crate::assembler::directives;
use crate::assembler::error::Error;
use crate::assembler::instructions;
use crate::assembler::node::Node;
use crate::assembler::token::{lex_line, Token, TokenKind};

/// What a successfully-parsed line turned out to be, beyond a plain
/// [Node] — the driver needs to know about macro invocations and
/// definition markers to manage its own line-buffer splicing.
pub enum Parsed {
    Node(Node),
    /// `macro name / arity` — begin capturing a macro body.
    MacroDefBegin { name: String, arity: usize },
    /// `mend` — close the macro body.
    MacroDefEnd,
    /// Invocation of a user-defined macro: head identifier plus the raw
    /// argument tokens, to be expanded by the macro processor.
    MacroInvoke { label: Option<String>, is_entry: bool, name: String, args: Vec<Token> },
}

fn operand_slice(tokens: &[Token]) -> &[Token] {
    let end = tokens.iter().position(|t| t.kind == TokenKind::End).unwrap_or(tokens.len());
    &tokens[..end]
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

/// Parse one source line into a [Parsed] result.
pub fn assemble_line(ctx: &mut Context, line_no: usize, source: &str, passno: u8) -> Result<Parsed, Error> {
    let tokens = lex_line(line_no, source)?;

    if tokens[0].kind == TokenKind::Empty {
        return Ok(Parsed::Node(Node::Empty));
    }

    let mut idx = 0;
    let mut label: Option<String> = None;
    let mut is_entry = false;
    if tokens[idx].kind == TokenKind::Id && matches!(tokens.get(idx + 1).map(|t| t.kind), Some(TokenKind::Colon) | Some(TokenKind::Greater)) {
        label = Some(tokens[idx].as_str().unwrap().to_string());
        is_entry = tokens[idx + 1].kind == TokenKind::Greater;
        idx += 2;
    }

    if tokens[idx].kind == TokenKind::End {
        return match label {
            Some(label) => Ok(Parsed::Node(Node::Label { label })),
            None => Ok(Parsed::Node(Node::Empty)),
        };
    }

    if tokens[idx].kind != TokenKind::Id {
        return Err(Error::syntax(line_no, Some(tokens[idx].col), source, "Expecting a mnemonic"));
    }
    let mnemonic = tokens[idx].as_str().unwrap().to_string();
    idx += 1;
    let ops = operand_slice(&tokens[idx..]);

    if mnemonic == "macro" {
        let groups = split_on_comma(ops);
        if groups.len() != 1 || groups[0].len() < 3 || groups[0][0].kind != TokenKind::Id || groups[0][1].kind != TokenKind::Solidus || groups[0][2].kind != TokenKind::Num {
            return Err(Error::syntax(line_no, Some(tokens[idx.min(tokens.len() - 1)].col), source, "Expecting name / arity"));
        }
        let name = groups[0][0].as_str().unwrap().to_string();
        let arity = groups[0][2].as_num().unwrap() as usize;
        return Ok(Parsed::MacroDefBegin { name, arity });
    }
    if mnemonic == "mend" {
        return Ok(Parsed::MacroDefEnd);
    }

    if let Some((base, category)) = ctx.iset.get(&mnemonic).copied() {
        if ctx.v3 && matches!(mnemonic.as_str(), "ldsa" | "addsp" | "setsp" | "pushall" | "popall") {
            return Err(Error::syntax(line_no, Some(tokens[0].col), source, format!("{} is not legal in v3 mode", mnemonic)));
        }
        if ctx.tpl && is_entry {
            return Err(Error::syntax(line_no, Some(tokens[0].col), source, "entries are not allowed inside a template"));
        }
        if ctx.tpl && category != Category::Spec {
            return Err(Error::syntax(line_no, Some(tokens[0].col), source, "only dc/ds allowed in templates"));
        }
        let node = match category {
            Category::Binary => instructions::emit_binary(base, label, line_no, source, ops)?,
            Category::Unary if mnemonic == "ldi" || mnemonic == "ldsa" => {
                instructions::emit_unary_operand(ctx, base, label, line_no, source, ops, mnemonic == "ldsa")?
            }
            Category::Unary => instructions::emit_unary(base, label, line_no, source, ops)?,
            Category::Zero => instructions::emit_zero(base, label),
            Category::Branch => instructions::emit_branch(ctx, base, label, line_no, source, ops, mnemonic == "lchk")?,
            Category::SpMove => instructions::emit_spmove(ctx, base, label, line_no, source, ops)?,
            Category::Osix => instructions::emit_osix(base, label, line_no, source, ops)?,
            Category::MacroCtl | Category::MacroInstr => unreachable!(),
            Category::Spec => match mnemonic.as_str() {
                "asect" => directives::asect(ctx, line_no, source, ops)?,
                "rsect" => directives::rsect(ctx, line_no, source, ops, passno)?,
                "tplate" => directives::tplate(ctx, line_no, source, ops, passno)?,
                "ext" => {
                    let label = label
                        .clone()
                        .ok_or_else(|| Error::syntax(line_no, Some(tokens[0].col), source, "ext requires a label"))?;
                    directives::ext(ctx, &label, passno)?
                }
                "ds" => directives::ds(ctx, label, line_no, source, ops)?,
                "dc" => directives::dc(ctx, label, line_no, source, ops)?,
                "set" => {
                    if ops.len() < 2 || ops[0].kind != TokenKind::Id || ops[1].kind != TokenKind::Equal {
                        return Err(Error::syntax(line_no, Some(tokens[0].col), source, "Expecting name = expr"));
                    }
                    let name = ops[0].as_str().unwrap().to_string();
                    directives::set(ctx, &name, line_no, source, &ops[2..], passno)?
                }
                "end" => directives::end(ctx),
                _ => unreachable!(),
            },
        };
        if is_entry {
            if let Some(section) = ctx.sect_name.clone() {
                if let Some(l) = node.label() {
                    if passno == 1 {
                        if ctx.exts.contains_key(l) {
                            return Err(Error::syntax(line_no, Some(tokens[0].col), source, "A label cannot be both entry and ext"));
                        }
                        ctx.ents.entry(section).or_default().insert(l.to_string(), ctx.counter);
                    }
                }
            }
        }
        return Ok(Parsed::Node(node));
    }

    Ok(Parsed::MacroInvoke { label, is_entry, name: mnemonic, args: ops.to_vec() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_only_line() {
        let mut ctx = Context::new(false);
        let p = assemble_line(&mut ctx, 1, "start:", 1).unwrap();
        match p {
            Parsed::Node(Node::Label { label }) => assert_eq!(label, "start"),
            _ => panic!(),
        }
    }

    #[test]
    fn binary_instruction_dispatches() {
        let mut ctx = Context::new(false);
        ctx.sect_name = Some("$abs".to_string());
        let p = assemble_line(&mut ctx, 1, "add r0, r1", 2).unwrap();
        match p {
            Parsed::Node(Node::Code { bytes, .. }) => assert_eq!(bytes, vec![0x10 + 1]),
            _ => panic!(),
        }
    }

    #[test]
    fn uppercase_mnemonic_is_not_an_opcode() {
        let mut ctx = Context::new(false);
        let p = assemble_line(&mut ctx, 1, "ADD r0, r1", 2).unwrap();
        assert!(matches!(p, Parsed::MacroInvoke { .. }));
    }

    #[test]
    fn unknown_mnemonic_is_treated_as_macro_invoke() {
        let mut ctx = Context::new(false);
        let p = assemble_line(&mut ctx, 1, "dup 5", 1).unwrap();
        match p {
            Parsed::MacroInvoke { name, args, .. } => {
                assert_eq!(name, "dup");
                assert_eq!(args.len(), 1);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn macro_def_begin_parses_name_and_arity() {
        let mut ctx = Context::new(false);
        let p = assemble_line(&mut ctx, 1, "macro dup/1", 1).unwrap();
        match p {
            Parsed::MacroDefBegin { name, arity } => {
                assert_eq!(name, "dup");
                assert_eq!(arity, 1);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn instruction_inside_template_is_rejected() {
        let mut ctx = Context::new(false);
        ctx.tpl = true;
        let err = assemble_line(&mut ctx, 1, "add r0, r1", 1).unwrap_err();
        assert!(err.to_string().contains("only dc/ds allowed in templates"));
    }

    #[test]
    fn ds_inside_template_is_accepted() {
        let mut ctx = Context::new(false);
        ctx.tpl = true;
        let p = assemble_line(&mut ctx, 1, "field: ds 2", 1).unwrap();
        assert!(matches!(p, Parsed::Node(Node::Space { .. })));
    }

    #[test]
    fn entry_label_inside_template_is_rejected() {
        let mut ctx = Context::new(false);
        ctx.tpl = true;
        let err = assemble_line(&mut ctx, 1, "field> ds 2", 1).unwrap_err();
        assert!(err.to_string().contains("entries are not allowed inside a template"));
    }
}
