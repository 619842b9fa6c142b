//! Macro processor: definition capture, invocation expansion, the
//! lexical-hygiene sigils (`$n`, `!name`, `?name`, `'`), the six-deep
//! macro-parameter stack, and `unique`.
//!
//! Grounded in `cocas.py`'s `mxpand`, `unptoken`/`commasep`, and
//! `ismstack`; see `spec.md` §4.4.

use crate::assembler::context::{Category, Context};
use crate::assembler::error::Error;
use crate::assembler::token::{lex_line, Token, TokenKind};

/// Sentinel appended to every macro-generated line so the listing
/// formatter can fold it back under its invocation line by default.
pub const GENERATED_SUFFIX: &str = " #\x01";

/// Render one argument token back to canonical source text.
fn render_token(t: &Token) -> String {
    match t.kind {
        TokenKind::Id => t.as_str().unwrap().to_string(),
        TokenKind::Reg => format!("r{}", t.as_reg().unwrap()),
        TokenKind::Num => format!("0x{:02x}", t.as_num().unwrap()),
        TokenKind::Str => {
            let s = t.as_str().unwrap();
            let escaped: String = s.chars().flat_map(|c| match c {
                '\\' => vec!['\\', '\\'],
                '"' => vec!['\\', '"'],
                other => vec![other],
            }).collect();
            format!("\"{}\"", escaped)
        }
        _ => String::new(),
    }
}

/// Split raw argument tokens on commas and render each group back to
/// text (a group of three — `id . id` — renders as a template field).
pub fn comma_separate(args: &[Token]) -> Vec<String> {
    let mut groups: Vec<&[Token]> = Vec::new();
    let mut start = 0;
    for (i, t) in args.iter().enumerate() {
        if t.kind == TokenKind::Comma {
            groups.push(&args[start..i]);
            start = i + 1;
        }
    }
    groups.push(&args[start..]);
    groups
        .into_iter()
        .filter(|g| !g.is_empty())
        .map(|g| {
            if g.len() == 3 && g[0].kind == TokenKind::Id && g[1].kind == TokenKind::Dot && g[2].kind == TokenKind::Id {
                format!("{}.{}", render_token(&g[0]), render_token(&g[2]))
            } else {
                g.iter().map(render_token).collect::<Vec<_>>().join("")
            }
        })
        .collect()
}

/// Substitute `$n`/`!name`/`?name`/`'` sigils into one macro-body line.
/// Quoted strings pass through verbatim (only `\\`/`\"` recognized).
fn substitute(ctx: &Context, line_no: usize, source: &str, line: &str, pars: &[String], nonce: u32) -> Result<String, Error> {
    let bytes = line.as_bytes();
    let mut out = String::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                out.push('"');
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' && i + 1 < bytes.len() {
                        out.push(bytes[i] as char);
                        out.push(bytes[i + 1] as char);
                        i += 2;
                    } else {
                        out.push(bytes[i] as char);
                        i += 1;
                    }
                }
                if i < bytes.len() {
                    out.push('"');
                    i += 1;
                }
            }
            b'$' if i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit() && bytes[i + 1] != b'0' => {
                let n = (bytes[i + 1] - b'0') as usize;
                if n > pars.len() {
                    return Err(Error::macro_err(line_no, None, source, format!("Macro has no parameter ${}", n), false));
                }
                out.push_str(&pars[n - 1]);
                i += 2;
            }
            b'\'' => {
                out.push_str(&nonce.to_string());
                i += 1;
            }
            b'!' | b'?' => {
                let double = bytes[i] == b'?';
                i += 1;
                let name_start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                let name = &line[name_start..i];
                let value = ctx
                    .mvars
                    .get(name)
                    .ok_or_else(|| Error::macro_err(line_no, None, source, format!("Macro variable {} not set", name), false))?
                    .clone();
                if double {
                    let value2 = ctx
                        .mvars
                        .get(&value)
                        .ok_or_else(|| Error::macro_err(line_no, None, source, format!("Macro variable {} not set", value), false))?;
                    out.push_str(value2);
                } else {
                    out.push_str(&value);
                }
            }
            c => {
                out.push(c as char);
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Expand one macro invocation into its generated source lines.
///
/// Each returned line carries [GENERATED_SUFFIX]; the first gets the
/// invocation's label/entry prefix re-attached.
pub fn expand_call(
    ctx: &mut Context,
    line_no: usize,
    source: &str,
    name: &str,
    args: &[Token],
    label: Option<String>,
    is_entry: bool,
) -> Result<Vec<String>, Error> {
    let pars = comma_separate(args);
    let key = format!("{}/{}", name, pars.len());
    let body = ctx
        .macros
        .get(&key)
        .cloned()
        .ok_or_else(|| Error::syntax(line_no, None, source, format!("Unknown mnemonic or macro {}", name)))?;

    ctx.mcalls += 1;
    if ctx.mcalls > crate::assembler::context::MAX_MACRO_EXPANSIONS {
        return Err(Error::macro_err(line_no, None, source, "Macro expansion limit (800) exceeded", false));
    }
    ctx.mvars.clear();
    let nonce = ctx.mcount;
    ctx.mcount += 1;

    let mut out = Vec::with_capacity(body.len());
    for (i, raw) in body.iter().enumerate() {
        let expanded = substitute(ctx, line_no, source, raw, &pars, nonce)?;
        let prefixed = if i == 0 {
            match (&label, is_entry) {
                (Some(l), true) => format!("{}> {}", l, expanded),
                (Some(l), false) => format!("{}: {}", l, expanded),
                (None, _) => expanded,
            }
        } else {
            expanded
        };
        out.push(format!("{}{}", prefixed, GENERATED_SUFFIX));
    }
    Ok(out)
}

/// Recognize and execute a macro-stack directive (`mpush`/`mpop`/
/// `mread`/`unique`) on an already-expanded line. Returns `Ok(true)` if
/// the line was one of these and has been fully handled.
pub fn macro_stack_directive(ctx: &mut Context, line_no: usize, source: &str) -> Result<bool, Error> {
    let tokens = lex_line(line_no, source)?;
    if tokens[0].kind == TokenKind::Empty {
        return Ok(false);
    }
    let mut idx = 0;
    let mut stack_idx = 0usize;
    if tokens[0].kind == TokenKind::Num {
        stack_idx = tokens[0].as_num().unwrap() as usize;
        if stack_idx > 5 {
            return Err(Error::macro_err(line_no, Some(tokens[0].col), source, "Stack index must be 0..=5", false));
        }
        idx = 1;
    }
    if tokens.get(idx).map(|t| t.kind) != Some(TokenKind::Id) {
        return Ok(false);
    }
    let head = tokens[idx].as_str().unwrap().to_string();
    if !matches!(head.as_str(), "mpush" | "mpop" | "mread" | "unique") {
        return Ok(false);
    }
    idx += 1;
    let rest = &tokens[idx..tokens.len() - 1];
    let groups = split_groups(rest);

    match head.as_str() {
        "mpush" => {
            let values: Vec<String> = groups.iter().map(|g| render_group(g)).collect();
            for v in values.into_iter().rev() {
                ctx.mstack[stack_idx].push(v);
            }
        }
        "mpop" => {
            for g in &groups {
                let err_msg = g.iter().find(|t| t.kind == TokenKind::Str).and_then(|t| t.as_str()).map(|s| s.to_string());
                let value = ctx.mstack[stack_idx].pop();
                match value {
                    Some(v) => {
                        let varname = render_group(g);
                        ctx.mvars.insert(varname, v);
                    }
                    None => {
                        let msg = err_msg.unwrap_or_else(|| "Macro stack is empty".to_string());
                        return Err(Error::macro_err(line_no, None, source, msg, true));
                    }
                }
            }
        }
        "mread" => {
            for (i, g) in groups.iter().enumerate() {
                let value = ctx.mstack[stack_idx].get(ctx.mstack[stack_idx].len().wrapping_sub(1).wrapping_sub(i));
                match value {
                    Some(v) => {
                        let varname = render_group(g);
                        ctx.mvars.insert(varname, v.clone());
                    }
                    None => return Err(Error::macro_err(line_no, None, source, "Macro stack is empty", false)),
                }
            }
        }
        "unique" => unique(ctx, line_no, source, &groups)?,
        _ => unreachable!(),
    }
    Ok(true)
}

fn split_groups(tokens: &[Token]) -> Vec<&[Token]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for (i, t) in tokens.iter().enumerate() {
        if t.kind == TokenKind::Comma {
            groups.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    groups.push(&tokens[start..]);
    groups.into_iter().filter(|g| !g.is_empty()).collect()
}

fn render_group(group: &[Token]) -> String {
    group.iter().map(render_token).collect::<Vec<_>>().join("")
}

/// `unique a, b, c, d` — assign free registers r0..r3 to named macro
/// variables. Registers mentioned explicitly are reserved first.
fn unique(ctx: &mut Context, line_no: usize, source: &str, groups: &[&[Token]]) -> Result<(), Error> {
    if groups.len() > 4 {
        return Err(Error::macro_err(line_no, None, source, "More than 4 operands specified", false));
    }
    let mut taken = [false; 4];
    let mut varnames = Vec::new();
    // Reserve explicit register operands first, rejecting a register
    // named twice in the same call.
    for g in groups {
        if g.len() == 1 && g[0].kind == TokenKind::Reg {
            let r = g[0].as_reg().unwrap() as usize;
            if taken[r] {
                return Err(Error::macro_err(line_no, None, source, format!("r{} occurs more than once", r), false));
            }
            taken[r] = true;
        } else {
            varnames.push(render_group(g));
        }
    }
    // Pre-clear this call's variable names so the duplicate check below
    // is scoped to this call, not to bindings left over from earlier
    // `unique` calls in the same or another macro expansion.
    for v in &varnames {
        ctx.mvars.insert(v.clone(), String::new());
    }
    for v in &varnames {
        let free = taken.iter().position(|t| !t).ok_or_else(|| Error::macro_err(line_no, None, source, "No free registers left", false))?;
        taken[free] = true;
        if ctx.mvars.get(v).map(String::as_str) != Some("") {
            return Err(Error::macro_err(line_no, None, source, format!("macro var '{}' occurs more than once", v), false));
        }
        ctx.mvars.insert(v.clone(), format!("r{}", free));
    }
    Ok(())
}

/// `standard.mlb`-style macro library: `*name/arity` starts a
/// definition that runs until the next line starting with `*`.
pub fn load_library(ctx: &mut Context, text: &str) {
    let mut current: Option<(String, Vec<String>)> = None;
    for line in text.lines() {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix('*') {
            if let Some((key, body)) = current.take() {
                ctx.macros.insert(key, body);
            }
            current = Some((rest.trim().to_string(), Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line.to_string());
        }
    }
    if let Some((key, body)) = current {
        ctx.macros.insert(key, body);
    }
    let _ = Category::MacroInstr;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollar_substitution() {
        let ctx = Context::new(false);
        let out = substitute(&ctx, 1, "dc $1,$1", "dc $1,$1", &["5".to_string()], 0).unwrap();
        assert_eq!(out, "dc 5,5");
    }

    #[test]
    fn nonce_substitution_is_stable_per_expansion() {
        let ctx = Context::new(false);
        let out = substitute(&ctx, 1, "l':", "l':", &[], 7).unwrap();
        assert_eq!(out, "l7:");
    }

    #[test]
    fn expand_dup_macro() {
        let mut ctx = Context::new(false);
        ctx.macros.insert("dup/1".to_string(), vec!["dc $1,$1".to_string()]);
        let args = lex_line(1, "5").unwrap();
        let lines = expand_call(&mut ctx, 1, "dup 5", "dup", &args[..args.len() - 1], None, false).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("dc 5,5"));
    }

    #[test]
    fn unique_rejects_fifth_operand() {
        let mut ctx = Context::new(false);
        let a = lex_line(1, "a").unwrap();
        let b = lex_line(1, "b").unwrap();
        let c = lex_line(1, "c").unwrap();
        let d = lex_line(1, "d").unwrap();
        let e = lex_line(1, "e").unwrap();
        let groups: Vec<&[Token]> = vec![&a[..1], &b[..1], &c[..1], &d[..1], &e[..1]];
        assert!(unique(&mut ctx, 1, "unique a,b,c,d,e", &groups).is_err());
    }

    #[test]
    fn unique_reserves_explicit_register_first() {
        let mut ctx = Context::new(false);
        let a = lex_line(1, "a").unwrap();
        let b = lex_line(1, "b").unwrap();
        let r0 = lex_line(1, "r0").unwrap();
        let groups: Vec<&[Token]> = vec![&a[..1], &b[..1], &r0[..1]];
        unique(&mut ctx, 1, "unique a,b,r0", &groups).unwrap();
        assert_ne!(ctx.mvars["a"], "r0");
        assert_ne!(ctx.mvars["b"], "r0");
        assert_ne!(ctx.mvars["a"], ctx.mvars["b"]);
    }

    #[test]
    fn unique_rejects_repeated_explicit_register() {
        let mut ctx = Context::new(false);
        let r0a = lex_line(1, "r0").unwrap();
        let r0b = lex_line(1, "r0").unwrap();
        let groups: Vec<&[Token]> = vec![&r0a[..1], &r0b[..1]];
        let err = unique(&mut ctx, 1, "unique r0,r0", &groups).unwrap_err();
        assert!(err.to_string().contains("r0 occurs more than once"));
    }

    #[test]
    fn unique_allows_same_varname_across_separate_calls() {
        let mut ctx = Context::new(false);
        let a = lex_line(1, "a").unwrap();
        unique(&mut ctx, 1, "unique a", &[&a[..1]]).unwrap();
        let a_again = lex_line(1, "a").unwrap();
        // Reusing "a" in a later, unrelated `unique` call is legal: the
        // duplicate check is scoped to a single call's operand list.
        unique(&mut ctx, 2, "unique a", &[&a_again[..1]]).unwrap();
    }

    #[test]
    fn unique_rejects_repeated_varname_in_same_call() {
        let mut ctx = Context::new(false);
        let a1 = lex_line(1, "a").unwrap();
        let a2 = lex_line(1, "a").unwrap();
        let groups: Vec<&[Token]> = vec![&a1[..1], &a2[..1]];
        let err = unique(&mut ctx, 1, "unique a,a", &groups).unwrap_err();
        assert!(err.to_string().contains("occurs more than once"));
    }
}
