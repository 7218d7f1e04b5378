//! Textual model of an LLVM-IR module.
//!
//! The model keeps every input line; only the five instruction kinds whose
//! attributes the optimizer mutates (load, store, fence, cmpxchg, atomicrmw)
//! plus calls and allocas are parsed into structure. Re-emitting a module
//! reproduces the input text except for instructions whose atomic flag or
//! ordering was changed.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

pub mod metadata;
pub mod parser;

pub use metadata::Loc;
pub use parser::ParseError;

pub type InstRef = Rc<RefCell<Inst>>;

//
// Public Interface
//

#[derive(Debug)]
pub struct Module {
    pub items: Vec<Item>,
    /// Numeric metadata definitions, id → index into `items`.
    md_index: BTreeMap<u64, usize>,
}

#[derive(Debug)]
pub enum Item {
    Raw(String),
    Func(Func),
}

#[derive(Debug)]
pub struct Func {
    /// Global name, without the leading `@`.
    pub name: String,
    /// The full `define …` line, including the opening brace.
    pub header: String,
    /// Local value names of the parameters, e.g. `%argc`.
    pub params: Vec<String>,
    /// `!dbg` attachment on the header, if any.
    pub dbg: Option<u64>,
    /// Body lines between the header and the closing brace.
    pub body: Vec<Line>,
}

#[derive(Debug)]
pub enum Line {
    Raw(String),
    Inst(InstRef),
}

#[derive(Clone, Debug)]
pub enum Inst {
    Mem(MemInst),
    Call(CallInst),
    Alloca(AllocaInst),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemKind {
    Load,
    Store,
    Fence,
    Cmpxchg,
    Rmw,
}

/// Memory ordering token as written in the IR.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrOrdering {
    Unordered,
    Monotonic,
    Acquire,
    Release,
    AcqRel,
    SeqCst,
}

/// A memory-access or synchronization instruction, split into the pieces
/// needed to re-render it with a different atomic flag and ordering.
#[derive(Clone, Debug)]
pub struct MemInst {
    pub kind: MemKind,
    /// Indentation plus the optional `%r = ` result assignment.
    pub prefix: String,
    pub volatile: bool,
    /// `weak` marker of a cmpxchg.
    pub weak: bool,
    /// Operation token of an atomicrmw (`add`, `xchg`, …).
    pub rmw_op: Option<String>,
    /// Operand text between the keywords and the ordering tokens.
    pub operands: String,
    /// First type token of the access, used to derive an alignment when an
    /// instruction becomes atomic and the input carried none.
    pub access_ty: String,
    pub syncscope: Option<String>,
    pub atomic: bool,
    /// Current ordering; success ordering for cmpxchg; `None` on plain
    /// accesses.
    pub ordering: Option<IrOrdering>,
    /// Failure ordering of a cmpxchg.
    pub failure_ordering: Option<IrOrdering>,
    /// `align N` clause, without the leading comma.
    pub align: Option<String>,
    /// Trailing metadata attachments, starting with `, `.
    pub suffix: String,
    pub dbg: Option<u64>,
    /// Pointer operand of a load/store (`@g` or `%p`).
    pub referent: Option<String>,
    /// Value operand of a store, when it is a named value.
    pub value_operand: Option<String>,
}

#[derive(Clone, Debug)]
pub struct CallInst {
    pub raw: String,
    /// Direct callee global name, without `@`; `None` for indirect calls.
    pub callee: Option<String>,
    /// Byte offset of the callee's `@` within `raw`, for retargeting.
    callee_at: Option<usize>,
    /// Top-level argument texts.
    pub args: Vec<String>,
    pub dbg: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct AllocaInst {
    pub raw: String,
    /// Result name, e.g. `%x`.
    pub name: String,
}

impl Module {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            md_index: BTreeMap::new(),
        }
    }

    /// Looks up a defined function by global name.
    pub fn func(&self, name: &str) -> Option<&Func> {
        self.items.iter().find_map(|item| match item {
            Item::Func(f) if f.name == name => Some(f),
            _ => None,
        })
    }

    /// Returns the raw definition line of a numeric metadata node.
    pub fn metadata(&self, id: u64) -> Option<&str> {
        self.md_index.get(&id).map(|&i| match &self.items[i] {
            Item::Raw(line) => line.as_str(),
            Item::Func(_) => unreachable!("metadata index points at a function"),
        })
    }

    /// First unused numeric metadata id.
    pub fn next_metadata_id(&self) -> u64 {
        self.md_index.keys().last().map_or(0, |&id| id + 1)
    }

    /// Appends a numeric metadata definition line.
    pub fn push_metadata(&mut self, id: u64, line: String) {
        self.md_index.insert(id, self.items.len());
        self.items.push(Item::Raw(line));
    }

    pub fn push_func(&mut self, f: Func) {
        self.items.push(Item::Func(f));
    }

    pub(crate) fn index_metadata(&mut self, id: u64, item: usize) {
        self.md_index.insert(id, item);
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for item in &self.items {
            match item {
                Item::Raw(line) => writeln!(f, "{}", line)?,
                Item::Func(func) => func.write(f)?,
            }
        }
        Ok(())
    }
}

impl Func {
    fn write(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.header)?;
        for line in &self.body {
            match line {
                Line::Raw(raw) => writeln!(f, "{}", raw)?,
                Line::Inst(inst) => {
                    let text = inst.borrow().render();
                    if !text.is_empty() {
                        writeln!(f, "{}", text)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Deep-copies the function under a new global name. Instruction nodes
    /// are fresh; the header keeps all attributes apart from the name and,
    /// when `dbg` is given, the `!dbg` attachment.
    pub fn clone_as(&self, clone_name: &str, dbg: Option<u64>) -> Func {
        let mut header = self
            .header
            .replacen(&format!("@{}(", self.name), &format!("@{}(", clone_name), 1);
        if let (Some(old), Some(new)) = (self.dbg, dbg) {
            header = header.replacen(&format!("!dbg !{}", old), &format!("!dbg !{}", new), 1);
        }
        Func {
            name: clone_name.to_string(),
            header,
            params: self.params.clone(),
            dbg: dbg.or(self.dbg),
            body: self
                .body
                .iter()
                .map(|line| match line {
                    Line::Raw(raw) => Line::Raw(raw.clone()),
                    Line::Inst(inst) => {
                        Line::Inst(Rc::new(RefCell::new(inst.borrow().clone())))
                    }
                })
                .collect(),
        }
    }
}

impl Inst {
    pub fn render(&self) -> String {
        match self {
            Inst::Mem(m) => m.render(),
            Inst::Call(c) => c.raw.clone(),
            Inst::Alloca(a) => a.raw.clone(),
        }
    }

    pub fn as_mem(&self) -> &MemInst {
        match self {
            Inst::Mem(m) => m,
            _ => panic!("expected memory instruction"),
        }
    }

    pub fn as_mem_mut(&mut self) -> &mut MemInst {
        match self {
            Inst::Mem(m) => m,
            _ => panic!("expected memory instruction"),
        }
    }

    pub fn as_call_mut(&mut self) -> &mut CallInst {
        match self {
            Inst::Call(c) => c,
            _ => panic!("expected call instruction"),
        }
    }
}

impl MemInst {
    /// Renders the instruction text from its current fields. A relaxed
    /// fence renders empty, which deletes the line on emission.
    pub fn render(&self) -> String {
        let mut s = String::with_capacity(self.operands.len() + self.suffix.len() + 32);
        s.push_str(&self.prefix);
        match self.kind {
            MemKind::Load | MemKind::Store => {
                s.push_str(if self.kind == MemKind::Load {
                    "load "
                } else {
                    "store "
                });
                if self.atomic {
                    s.push_str("atomic ");
                }
                if self.volatile {
                    s.push_str("volatile ");
                }
                s.push_str(&self.operands);
                if self.atomic {
                    if let Some(scope) = &self.syncscope {
                        s.push(' ');
                        s.push_str(scope);
                    }
                    s.push(' ');
                    s.push_str(self.ordering.unwrap_or(IrOrdering::SeqCst).token());
                    s.push_str(", ");
                    match &self.align {
                        Some(a) => s.push_str(a),
                        None => s.push_str(&format!("align {}", align_of_type(&self.access_ty))),
                    }
                } else if let Some(a) = &self.align {
                    s.push_str(", ");
                    s.push_str(a);
                }
                s.push_str(&self.suffix);
            }
            MemKind::Fence => {
                if self.ordering == Some(IrOrdering::Monotonic) {
                    return String::new();
                }
                s.push_str("fence ");
                if let Some(scope) = &self.syncscope {
                    s.push_str(scope);
                    s.push(' ');
                }
                s.push_str(self.ordering.unwrap_or(IrOrdering::SeqCst).token());
                s.push_str(&self.suffix);
            }
            MemKind::Cmpxchg => {
                s.push_str("cmpxchg ");
                if self.weak {
                    s.push_str("weak ");
                }
                if self.volatile {
                    s.push_str("volatile ");
                }
                s.push_str(&self.operands);
                if let Some(scope) = &self.syncscope {
                    s.push(' ');
                    s.push_str(scope);
                }
                let success = self.ordering.unwrap_or(IrOrdering::SeqCst);
                let failure = self.failure_ordering.unwrap_or(success.cmpxchg_failure());
                s.push(' ');
                s.push_str(success.token());
                s.push(' ');
                s.push_str(failure.token());
                if let Some(a) = &self.align {
                    s.push_str(", ");
                    s.push_str(a);
                }
                s.push_str(&self.suffix);
            }
            MemKind::Rmw => {
                s.push_str("atomicrmw ");
                if self.volatile {
                    s.push_str("volatile ");
                }
                if let Some(op) = &self.rmw_op {
                    s.push_str(op);
                    s.push(' ');
                }
                s.push_str(&self.operands);
                if let Some(scope) = &self.syncscope {
                    s.push(' ');
                    s.push_str(scope);
                }
                s.push(' ');
                s.push_str(self.ordering.unwrap_or(IrOrdering::SeqCst).token());
                if let Some(a) = &self.align {
                    s.push_str(", ");
                    s.push_str(a);
                }
                s.push_str(&self.suffix);
            }
        }
        s
    }
}

impl CallInst {
    /// Redirects a direct call to another global, patching the raw text.
    pub fn retarget(&mut self, clone_name: &str) {
        let (Some(callee), Some(at)) = (&self.callee, self.callee_at) else {
            panic!("cannot retarget indirect call");
        };
        let end = at + 1 + callee.len();
        self.raw.replace_range(at + 1..end, clone_name);
        self.callee = Some(clone_name.to_string());
    }

    pub(crate) fn new(
        raw: String,
        callee: Option<String>,
        callee_at: Option<usize>,
        args: Vec<String>,
        dbg: Option<u64>,
    ) -> Self {
        Self {
            raw,
            callee,
            callee_at,
            args,
            dbg,
        }
    }
}

impl IrOrdering {
    pub fn token(self) -> &'static str {
        match self {
            IrOrdering::Unordered => "unordered",
            IrOrdering::Monotonic => "monotonic",
            IrOrdering::Acquire => "acquire",
            IrOrdering::Release => "release",
            IrOrdering::AcqRel => "acq_rel",
            IrOrdering::SeqCst => "seq_cst",
        }
    }

    /// Failure ordering derived from a success ordering: release parts are
    /// dropped, as the failure path performs no store.
    pub fn cmpxchg_failure(self) -> IrOrdering {
        match self {
            IrOrdering::Release => IrOrdering::Monotonic,
            IrOrdering::AcqRel => IrOrdering::Acquire,
            o => o,
        }
    }
}

impl FromStr for IrOrdering {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unordered" => Ok(IrOrdering::Unordered),
            "monotonic" => Ok(IrOrdering::Monotonic),
            "acquire" => Ok(IrOrdering::Acquire),
            "release" => Ok(IrOrdering::Release),
            "acq_rel" => Ok(IrOrdering::AcqRel),
            "seq_cst" => Ok(IrOrdering::SeqCst),
            _ => Err(()),
        }
    }
}

//
// Private Implementation
//

// Natural alignment of the access type, for plain instructions promoted to
// atomic whose input carried no align clause.
fn align_of_type(ty: &str) -> u64 {
    match ty {
        "i1" | "i8" => 1,
        "i16" | "half" => 2,
        "i32" | "float" => 4,
        _ => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(atomic: bool, ordering: Option<IrOrdering>) -> MemInst {
        MemInst {
            kind: MemKind::Load,
            prefix: "  %3 = ".to_string(),
            volatile: false,
            weak: false,
            rmw_op: None,
            operands: "i32, ptr @x".to_string(),
            access_ty: "i32".to_string(),
            syncscope: None,
            atomic,
            ordering,
            failure_ordering: None,
            align: Some("align 4".to_string()),
            suffix: ", !dbg !21".to_string(),
            dbg: Some(21),
            referent: Some("@x".to_string()),
            value_operand: None,
        }
    }

    #[test]
    fn render_load() {
        assert_eq!(
            load(true, Some(IrOrdering::SeqCst)).render(),
            "  %3 = load atomic i32, ptr @x seq_cst, align 4, !dbg !21"
        );
        assert_eq!(
            load(false, None).render(),
            "  %3 = load i32, ptr @x, align 4, !dbg !21"
        );
    }

    #[test]
    fn render_plain_to_atomic_derives_align() {
        let mut m = load(false, None);
        m.align = None;
        m.atomic = true;
        m.ordering = Some(IrOrdering::SeqCst);
        assert_eq!(
            m.render(),
            "  %3 = load atomic i32, ptr @x seq_cst, align 4, !dbg !21"
        );
    }

    #[test]
    fn render_relaxed_fence_deletes() {
        let f = MemInst {
            kind: MemKind::Fence,
            prefix: "  ".to_string(),
            volatile: false,
            weak: false,
            rmw_op: None,
            operands: String::new(),
            access_ty: String::new(),
            syncscope: None,
            atomic: true,
            ordering: Some(IrOrdering::Monotonic),
            failure_ordering: None,
            align: None,
            suffix: ", !dbg !30".to_string(),
            dbg: Some(30),
            referent: None,
            value_operand: None,
        };
        assert_eq!(f.render(), "");
        let mut acq = f;
        acq.ordering = Some(IrOrdering::Acquire);
        assert_eq!(acq.render(), "  fence acquire, !dbg !30");
    }

    #[test]
    fn cmpxchg_failure_derivation() {
        assert_eq!(
            IrOrdering::Release.cmpxchg_failure(),
            IrOrdering::Monotonic
        );
        assert_eq!(IrOrdering::AcqRel.cmpxchg_failure(), IrOrdering::Acquire);
        assert_eq!(IrOrdering::SeqCst.cmpxchg_failure(), IrOrdering::SeqCst);
    }

    #[test]
    fn retarget_call() {
        let raw = "  call void @vatomic32_write(ptr noundef @x, i32 noundef 1), !dbg !5";
        let at = raw.find("@vatomic32_write").unwrap();
        let mut call = CallInst::new(
            raw.to_string(),
            Some("vatomic32_write".to_string()),
            Some(at),
            vec![
                "ptr noundef @x".to_string(),
                "i32 noundef 1".to_string(),
            ],
            Some(5),
        );
        call.retarget("vatomic32_write__vsyncer_expand_0");
        assert_eq!(
            call.raw,
            "  call void @vatomic32_write__vsyncer_expand_0(ptr noundef @x, i32 noundef 1), !dbg !5"
        );
    }
}
