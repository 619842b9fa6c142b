//! Expression evaluator: resolves a 3-token operand to `(byte, relocatable?)`
//!
//! Grounded in `cocas.py`'s `parse_exp` closure; see `spec.md` §4.2 for the
//! case table this implements.

use crate::assembler::context::Context;
use crate::assembler::error::Error;
use crate::assembler::token::{Token, TokenKind};

/// If `tokens` is a single bare identifier naming a declared external,
/// return its name — callers use this to record a linker fix-up site
/// distinct from the placeholder `(0, false)` [eval_expr] returns for it.
pub fn external_ref<'a>(ctx: &Context, tokens: &'a [Token]) -> Option<&'a str> {
    if tokens[0].kind == TokenKind::Id && matches!(tokens[1].kind, TokenKind::End) {
        let name = tokens[0].as_str().unwrap();
        if ctx.exts.contains_key(name) {
            return Some(name);
        }
    }
    None
}

/// Evaluate a 3-token operand expression.
///
/// `tokens` must be at least 3 long (callers pad with [TokenKind::End]).
/// `only_absolute` rejects a relocatable result (used by `ds`/`set`).
pub fn eval_expr(
    ctx: &Context,
    line_no: usize,
    source: &str,
    tokens: &[Token],
    only_absolute: bool,
) -> Result<(u8, bool), Error> {
    let rel_context = ctx.rel_context();

    if tokens[0].kind == TokenKind::Num && tokens[1].kind == TokenKind::End {
        return Ok((tokens[0].as_num().unwrap(), false));
    }

    if tokens[0].kind == TokenKind::Id {
        let lbl = tokens[0].as_str().unwrap();
        let (value, mut got_rel) = if let Some(v) = ctx.sect_name.as_ref().and_then(|s| ctx.labels.get(s)).and_then(|l| l.get(lbl)) {
            let is_ext = ctx.exts.contains_key(lbl);
            (*v, rel_context && !is_ext)
        } else if let Some(v) = ctx.abses.get(lbl) {
            (*v, false)
        } else if lbl == "*" {
            (ctx.counter, rel_context)
        } else {
            return Err(Error::syntax(line_no, Some(tokens[0].col), source, format!("Label {} not found", lbl)));
        };

        if tokens[1].kind == TokenKind::End || tokens[1].kind == TokenKind::Colon {
            if only_absolute && got_rel {
                return Err(Error::syntax(line_no, Some(tokens[0].col), source, "Only absolute labels allowed here"));
            }
            return Ok(((value % 256) as u8, got_rel));
        }

        let sign: i32 = match tokens[1].kind {
            TokenKind::Plus => 1,
            TokenKind::Minus => -1,
            _ => return Err(Error::syntax(line_no, Some(tokens[1].col), source, "Only + or - allowed here")),
        };

        if tokens[2].kind == TokenKind::Id {
            let lbl2 = tokens[2].as_str().unwrap();
            if ctx.exts.contains_key(lbl2) {
                return Err(Error::syntax(
                    line_no,
                    Some(tokens[2].col),
                    source,
                    format!("External label {} can't be used as displacement", lbl2),
                ));
            }
            let value2 = if lbl2 == "*" {
                Some(ctx.counter)
            } else {
                ctx.sect_name.as_ref().and_then(|s| ctx.labels.get(s)).and_then(|l| l.get(lbl2)).copied()
            };
            if let Some(value2) = value2 {
                if rel_context && !ctx.exts.contains_key(lbl2) && got_rel {
                    if sign == 1 {
                        return Err(Error::syntax(line_no, Some(tokens[2].col), source, "Relocatables can only be subtracted"));
                    }
                    got_rel = false;
                }
                if got_rel && only_absolute {
                    return Err(Error::syntax(line_no, Some(tokens[0].col), source, "Only absolute result is acceptable here"));
                }
                let result = (((value as i64) + sign as i64 * value2 as i64).rem_euclid(256)) as u8;
                return Ok((result, got_rel));
            }
            if let Some(value2) = ctx.abses.get(lbl2) {
                if got_rel && only_absolute {
                    return Err(Error::syntax(line_no, Some(tokens[0].col), source, "Only absolute result is acceptable here"));
                }
                let result = (((value as i64) + sign as i64 * *value2 as i64).rem_euclid(256)) as u8;
                return Ok((result, got_rel));
            }
            return Err(Error::syntax(line_no, Some(tokens[2].col), source, format!("Label {} not found", lbl2)));
        } else if tokens[2].kind == TokenKind::Num {
            if only_absolute && got_rel {
                return Err(Error::syntax(line_no, Some(tokens[0].col), source, "Only absolute labels allowed here"));
            }
            let value2 = tokens[2].as_num().unwrap() as i64;
            let result = (((value as i64) + sign as i64 * value2).rem_euclid(256)) as u8;
            return Ok((result, got_rel));
        } else {
            return Err(Error::syntax(line_no, Some(tokens[2].col), source, "Expecting a number or a label here"));
        }
    }

    if tokens[0].kind == TokenKind::Minus && tokens[1].kind == TokenKind::Num && tokens[2].kind == TokenKind::End {
        let value = tokens[1].as_num().unwrap();
        if value > 128 {
            return Err(Error::syntax(line_no, Some(tokens[1].col), source, "Negative out of range"));
        }
        return Ok((((value ^ 0xFF) as u16 + 1) as u8, false));
    }

    Err(Error::syntax(line_no, Some(tokens[0].col), source, "Label or number expected"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::token::lex_line;
    use std::collections::HashMap as HashMapFrom;

    fn eval(ctx: &Context, s: &str, only_absolute: bool) -> Result<(u8, bool), Error> {
        let toks = lex_line(1, s).unwrap();
        eval_expr(ctx, 1, s, &toks, only_absolute)
    }

    #[test]
    fn plain_number() {
        let ctx = Context::new(false);
        assert_eq!(eval(&ctx, "42", false).unwrap(), (42, false));
    }

    #[test]
    fn negative_literal_twos_complement() {
        let ctx = Context::new(false);
        assert_eq!(eval(&ctx, "-1", false).unwrap(), (0xFF, false));
        assert_eq!(eval(&ctx, "-128", false).unwrap(), (0x80, false));
        assert!(eval(&ctx, "-129", false).is_err());
    }

    #[test]
    fn absolute_alias_lookup() {
        let mut ctx = Context::new(false);
        ctx.abses.insert("foo".to_string(), 7);
        assert_eq!(eval(&ctx, "foo", false).unwrap(), (7, false));
    }

    #[test]
    fn relocatable_label_in_section() {
        let mut ctx = Context::new(false);
        ctx.sect_name = Some("main".to_string());
        ctx.labels.insert("main".to_string(), HashMapFrom::from([("start".to_string(), 3u32)]));
        assert_eq!(eval(&ctx, "start", false).unwrap(), (3, true));
    }

    #[test]
    fn two_relocatables_subtract_to_absolute() {
        let mut ctx = Context::new(false);
        ctx.sect_name = Some("main".to_string());
        ctx.labels.insert(
            "main".to_string(),
            HashMapFrom::from([("a".to_string(), 10u32), ("b".to_string(), 4u32)]),
        );
        let (v, rel) = eval(&ctx, "a-b", false).unwrap();
        assert_eq!(v, 6);
        assert!(!rel);
    }

    #[test]
    fn external_ref_detects_bare_external_identifier() {
        let mut ctx = Context::new(false);
        ctx.exts.insert("x".to_string(), Vec::new());
        let toks = lex_line(1, "x").unwrap();
        assert_eq!(external_ref(&ctx, &toks), Some("x"));
    }

    #[test]
    fn external_ref_ignores_non_external_identifier() {
        let mut ctx = Context::new(false);
        ctx.sect_name = Some("main".to_string());
        ctx.labels.insert("main".to_string(), HashMapFrom::from([("start".to_string(), 3u32)]));
        let toks = lex_line(1, "start").unwrap();
        assert_eq!(external_ref(&ctx, &toks), None);
    }

    #[test]
    fn two_relocatables_cannot_add() {
        let mut ctx = Context::new(false);
        ctx.sect_name = Some("main".to_string());
        ctx.labels.insert(
            "main".to_string(),
            HashMapFrom::from([("a".to_string(), 10u32), ("b".to_string(), 4u32)]),
        );
        assert!(eval(&ctx, "a+b", false).is_err());
    }
}
