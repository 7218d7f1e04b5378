use super::{
    AllocaInst, CallInst, Func, Inst, IrOrdering, Item, Line, MemInst, MemKind, Module,
};
use lazy_static::lazy_static;
use regex::Regex;
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;

//
// Public Interface
//

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot read module: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {msg}")]
    Malformed { line: usize, msg: String },
}

/// Parses a textual LLVM-IR module from a file.
pub fn parse_file(path: &Path) -> Result<Module, ParseError> {
    parse_str(&fs::read_to_string(path)?)
}

/// Parses a textual LLVM-IR module. Lines that are not interpreted are kept
/// verbatim and round-trip unchanged.
pub fn parse_str(text: &str) -> Result<Module, ParseError> {
    let mut module = Module::new();
    let mut lines = text.lines().enumerate();

    while let Some((n, line)) = lines.next() {
        if line.starts_with("define") {
            let mut func = parse_func_header(n, line)?;
            let mut closed = false;
            for (n, line) in lines.by_ref() {
                if line == "}" {
                    func.body.push(Line::Raw(line.to_string()));
                    closed = true;
                    break;
                }
                func.body.push(parse_body_line(n, line)?);
            }
            if !closed {
                return Err(ParseError::Malformed {
                    line: n + 1,
                    msg: format!("function @{} is never closed", func.name),
                });
            }
            module.push_func(func);
        } else {
            let item = module.items.len();
            if let Some(id) = metadata_id(line) {
                module.index_metadata(id, item);
            }
            module.items.push(Item::Raw(line.to_string()));
        }
    }
    Ok(module)
}

/// Splits on `, ` at bracket depth zero; LLVM types nest `()`, `[]`, `{}`
/// and `<>`.
pub fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' | b'{' | b'<' => depth += 1,
            b')' | b']' | b'}' | b'>' => depth -= 1,
            b',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    if start < s.len() || !parts.is_empty() {
        parts.push(s[start..].trim());
    }
    parts
}

/// Last `%`- or `@`-prefixed value token within the text, with decorations
/// stripped.
pub fn last_value_token(s: &str) -> Option<String> {
    s.split(|c: char| c.is_whitespace() || c == ',' || c == '(' || c == ')')
        .filter(|t| t.starts_with('%') || t.starts_with('@'))
        .last()
        .map(|t| t.to_string())
}

//
// Private Implementation
//

lazy_static! {
    static ref RE_METADATA: Regex = Regex::new(r"^!(\d+) = ").unwrap();
    static ref RE_DBG: Regex = Regex::new(r"!dbg !(\d+)").unwrap();
    static ref RE_DEFINE: Regex = Regex::new(r#"define .*?@([-\w$.]+|"[^"]+")\("#).unwrap();
    static ref RE_CALLEE: Regex = Regex::new(r#"@([-\w$.]+|"[^"]+")\s*\("#).unwrap();
    static ref RE_INDIRECT: Regex = Regex::new(r"(?:call|invoke)\b[^=]*?%[-\w$.]+\(").unwrap();
}

fn metadata_id(line: &str) -> Option<u64> {
    RE_METADATA
        .captures(line)
        .and_then(|c| c[1].parse().ok())
}

fn dbg_id(line: &str) -> Option<u64> {
    RE_DBG.captures(line).and_then(|c| c[1].parse().ok())
}

fn parse_func_header(n: usize, line: &str) -> Result<Func, ParseError> {
    let caps = RE_DEFINE.captures(line).ok_or_else(|| ParseError::Malformed {
        line: n + 1,
        msg: "cannot find function name in define".to_string(),
    })?;
    let name = caps[1].trim_matches('"').to_string();
    let open = caps.get(0).unwrap().end();
    let close = matching_paren(line, open - 1).ok_or_else(|| ParseError::Malformed {
        line: n + 1,
        msg: "unbalanced parameter list".to_string(),
    })?;
    let params = split_top_level(&line[open..close])
        .into_iter()
        .filter_map(|p| {
            p.rsplit(|c: char| c.is_whitespace())
                .next()
                .filter(|t| t.starts_with('%'))
                .map(|t| t.to_string())
        })
        .collect();
    Ok(Func {
        name,
        header: line.to_string(),
        params,
        dbg: dbg_id(line),
        body: Vec::new(),
    })
}

// Index of the `)` matching the `(` at `open`.
fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0;
    for (i, b) in s.bytes().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_body_line(n: usize, line: &str) -> Result<Line, ParseError> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with(';') {
        return Ok(Line::Raw(line.to_string()));
    }

    // split off the result assignment, keeping the indentation
    let (prefix, rest, result) = match trimmed.split_once(" = ") {
        Some((res, rest)) if res.starts_with('%') => {
            let cut = line.len() - rest.len();
            (&line[..cut], rest, Some(res.to_string()))
        }
        _ => {
            let cut = line.len() - trimmed.len();
            (&line[..cut], trimmed, None)
        }
    };

    let opcode = rest.split_whitespace().next().unwrap_or("");
    let inst = match opcode {
        "load" => Some(parse_load_store(n, MemKind::Load, prefix, rest)?),
        "store" => Some(parse_load_store(n, MemKind::Store, prefix, rest)?),
        "fence" => Some(parse_fence(n, prefix, rest)?),
        "cmpxchg" => Some(parse_cmpxchg(n, prefix, rest)?),
        "atomicrmw" => Some(parse_rmw(n, prefix, rest)?),
        "call" | "tail" | "musttail" | "notail" => parse_call(line),
        "alloca" => result.map(|name| {
            Inst::Alloca(AllocaInst {
                raw: line.to_string(),
                name,
            })
        }),
        _ => None,
    };

    Ok(match inst {
        Some(inst) => Line::Inst(Rc::new(RefCell::new(inst))),
        None => Line::Raw(line.to_string()),
    })
}

// Splits `rest` into the part before any `, align`/`, !…` clause, the align
// clause, and the trailing metadata suffix.
fn split_suffix(rest: &str) -> (&str, Option<String>, String) {
    let align_at = rest.find(", align ");
    let md_at = rest.find(", !");
    match (align_at, md_at) {
        (Some(a), _) => {
            let tail = &rest[a..];
            let (align, suffix) = match tail[2..].find(", ") {
                Some(c) => (&tail[2..c + 2], tail[c + 2..].to_string()),
                None => (&tail[2..], String::new()),
            };
            (&rest[..a], Some(align.to_string()), suffix)
        }
        (None, Some(m)) => (&rest[..m], None, rest[m..].to_string()),
        (None, None) => (rest, None, String::new()),
    }
}

// Strips trailing `[syncscope("…")] <ordering>…` tokens from the operand
// text; `count` is the number of ordering tokens expected at the end.
fn strip_orderings(
    mid: &str,
    count: usize,
) -> (String, Option<String>, Vec<IrOrdering>) {
    let mut mid = mid.trim().to_string();
    let mut orderings = Vec::new();
    for _ in 0..count {
        let at = mid.rfind(char::is_whitespace);
        let token = match at {
            Some(at) => &mid[at + 1..],
            None => &mid[..],
        };
        let Ok(o) = token.parse::<IrOrdering>() else {
            break;
        };
        orderings.insert(0, o);
        mid.truncate(at.unwrap_or(0));
        mid.truncate(mid.trim_end().len());
    }
    let mut syncscope = None;
    let at = mid.rfind(char::is_whitespace);
    let token = match at {
        Some(at) => &mid[at + 1..],
        None => &mid[..],
    };
    if token.starts_with("syncscope(") {
        syncscope = Some(token.to_string());
        mid.truncate(at.map_or(0, |a| a));
        mid.truncate(mid.trim_end().len());
    }
    (mid, syncscope, orderings)
}

fn parse_load_store(
    n: usize,
    kind: MemKind,
    prefix: &str,
    rest: &str,
) -> Result<Inst, ParseError> {
    let mut rem = rest
        .strip_prefix(if kind == MemKind::Load { "load" } else { "store" })
        .unwrap()
        .trim_start();
    let atomic = match rem.strip_prefix("atomic ") {
        Some(r) => {
            rem = r;
            true
        }
        None => false,
    };
    let volatile = match rem.strip_prefix("volatile ") {
        Some(r) => {
            rem = r;
            true
        }
        None => false,
    };

    let (mid, align, suffix) = split_suffix(rem);
    let want = usize::from(atomic);
    let (operands, syncscope, orderings) = strip_orderings(mid, want);
    if atomic && orderings.is_empty() {
        return Err(ParseError::Malformed {
            line: n + 1,
            msg: format!("atomic {:?} without ordering", kind),
        });
    }

    let segments = split_top_level(&operands);
    let (referent, value_operand, access_ty) = match kind {
        MemKind::Load => (
            segments.last().and_then(|s| last_value_token(s)),
            None,
            segments.first().map_or(String::new(), |s| s.to_string()),
        ),
        _ => (
            segments.last().and_then(|s| last_value_token(s)),
            segments.first().and_then(|s| last_value_token(s)),
            segments
                .first()
                .and_then(|s| s.split_whitespace().next())
                .map_or(String::new(), |s| s.to_string()),
        ),
    };

    Ok(Inst::Mem(MemInst {
        kind,
        prefix: prefix.to_string(),
        volatile,
        weak: false,
        rmw_op: None,
        operands,
        access_ty,
        syncscope,
        atomic,
        ordering: orderings.first().copied(),
        failure_ordering: None,
        align,
        dbg: dbg_id(&suffix),
        suffix,
        referent,
        value_operand,
    }))
}

fn parse_fence(n: usize, prefix: &str, rest: &str) -> Result<Inst, ParseError> {
    let rem = rest.strip_prefix("fence").unwrap().trim_start();
    let (mid, _, suffix) = split_suffix(rem);
    let (_, syncscope, orderings) = strip_orderings(mid, 1);
    if orderings.is_empty() {
        return Err(ParseError::Malformed {
            line: n + 1,
            msg: "fence without ordering".to_string(),
        });
    }
    Ok(Inst::Mem(MemInst {
        kind: MemKind::Fence,
        prefix: prefix.to_string(),
        volatile: false,
        weak: false,
        rmw_op: None,
        operands: String::new(),
        access_ty: String::new(),
        syncscope,
        atomic: true,
        ordering: orderings.first().copied(),
        failure_ordering: None,
        align: None,
        dbg: dbg_id(&suffix),
        suffix,
        referent: None,
        value_operand: None,
    }))
}

fn parse_cmpxchg(n: usize, prefix: &str, rest: &str) -> Result<Inst, ParseError> {
    let mut rem = rest.strip_prefix("cmpxchg").unwrap().trim_start();
    let weak = match rem.strip_prefix("weak ") {
        Some(r) => {
            rem = r;
            true
        }
        None => false,
    };
    let volatile = match rem.strip_prefix("volatile ") {
        Some(r) => {
            rem = r;
            true
        }
        None => false,
    };
    let (mid, align, suffix) = split_suffix(rem);
    let (operands, syncscope, orderings) = strip_orderings(mid, 2);
    if orderings.len() != 2 {
        return Err(ParseError::Malformed {
            line: n + 1,
            msg: "cmpxchg without success/failure orderings".to_string(),
        });
    }
    let referent = split_top_level(&operands)
        .first()
        .and_then(|s| last_value_token(s));
    Ok(Inst::Mem(MemInst {
        kind: MemKind::Cmpxchg,
        prefix: prefix.to_string(),
        volatile,
        weak,
        rmw_op: None,
        operands,
        access_ty: String::new(),
        syncscope,
        atomic: true,
        ordering: Some(orderings[0]),
        failure_ordering: Some(orderings[1]),
        align,
        dbg: dbg_id(&suffix),
        suffix,
        referent,
        value_operand: None,
    }))
}

fn parse_rmw(n: usize, prefix: &str, rest: &str) -> Result<Inst, ParseError> {
    let mut rem = rest.strip_prefix("atomicrmw").unwrap().trim_start();
    let volatile = match rem.strip_prefix("volatile ") {
        Some(r) => {
            rem = r;
            true
        }
        None => false,
    };
    let (rmw_op, rem) = match rem.split_once(' ') {
        Some((op, r)) => (op.to_string(), r),
        None => {
            return Err(ParseError::Malformed {
                line: n + 1,
                msg: "atomicrmw without operation".to_string(),
            })
        }
    };
    let (mid, align, suffix) = split_suffix(rem);
    let (operands, syncscope, orderings) = strip_orderings(mid, 1);
    if orderings.is_empty() {
        return Err(ParseError::Malformed {
            line: n + 1,
            msg: "atomicrmw without ordering".to_string(),
        });
    }
    let referent = split_top_level(&operands)
        .first()
        .and_then(|s| last_value_token(s));
    Ok(Inst::Mem(MemInst {
        kind: MemKind::Rmw,
        prefix: prefix.to_string(),
        volatile,
        weak: false,
        rmw_op: Some(rmw_op),
        operands,
        access_ty: String::new(),
        syncscope,
        atomic: true,
        ordering: orderings.first().copied(),
        failure_ordering: None,
        align,
        dbg: dbg_id(&suffix),
        suffix,
        referent,
        value_operand: None,
    }))
}

fn parse_call(line: &str) -> Option<Inst> {
    let (callee, callee_at, args) = match RE_CALLEE.captures(line) {
        Some(caps) => {
            let m = caps.get(0).unwrap();
            let open = m.end() - 1;
            let close = matching_paren(line, open)?;
            let args = split_top_level(&line[open + 1..close])
                .into_iter()
                .filter(|a| !a.is_empty())
                .map(|a| a.to_string())
                .collect();
            (
                Some(caps[1].trim_matches('"').to_string()),
                Some(m.start()),
                args,
            )
        }
        None if RE_INDIRECT.is_match(line) => (None, None, Vec::new()),
        None => return None,
    };
    Some(Inst::Call(CallInst::new(
        line.to_string(),
        callee,
        callee_at,
        args,
        dbg_id(line),
    )))
}
