//! Wrapper around a parsed LLVM-IR module. A wrapped module knows the
//! memory-access instructions reachable from the entry functions, assigns
//! each a stable id, and can re-emit the module text with mutated atomic
//! flags and memory orderings.

pub mod analyzer;
pub mod config;
pub mod expander;
pub mod history;
pub mod mutator;
pub mod report;
pub mod visitor;

pub use config::Config;
pub use history::History;

use crate::core::{
    Assignment, AtomicOp, Bitseq, BitseqError, Ordering, Selection,
};
use crate::ir::{self, InstRef, IrOrdering, Loc, MemKind};
use log::warn;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

//
// Public Interface
//

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error(transparent)]
    Parse(#[from] ir::ParseError),

    #[error("could not find entry function '{0}'")]
    EntryNotFound(String),

    #[error("could not find function '{0}'")]
    FuncNotFound(String),

    #[error(transparent)]
    Bitseq(#[from] BitseqError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error("cannot write module: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("bitseq length {got} does not match {expected} bits for selection {sel}")]
    LengthMismatch {
        sel: Selection,
        expected: usize,
        got: usize,
    },

    #[error("bitseq with an invalid ordering for operation: {op}")]
    InvalidOrdering { op: AtomicOp },
}

/// Atomicity and ordering of one instruction at one point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderState {
    pub ordering: Ordering,
    pub atomic: bool,
}

/// One traversed memory-access instruction: the parsed instruction node,
/// its enclosing function, the `!dbg` chain at discovery, and the state
/// read from the module (`before`) next to the currently desired state
/// (`after`). `before` never changes after analysis.
#[derive(Debug)]
pub struct Record {
    id: usize,
    inst: InstRef,
    func: String,
    stack: Vec<u64>,
    before: OrderState,
    after: OrderState,
    orig: OrigFields,
}

// Parsed instruction fields as loaded, restored after every emission.
#[derive(Clone, Debug)]
struct OrigFields {
    atomic: bool,
    ordering: Option<IrOrdering>,
    failure_ordering: Option<IrOrdering>,
}

/// Per-ordering operation counts of a selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BarrierCount {
    pub relaxed: usize,
    pub acquire: usize,
    pub release: usize,
    pub seq_cst: usize,
}

/// A parsed and analyzed module with its id-keyed instruction records.
#[derive(Debug)]
pub struct WrapModule {
    module: ir::Module,
    imap: BTreeMap<usize, Record>,
    // held across mutate and emit to tolerate unintended concurrent callers
    lock: Mutex<()>,
}

impl WrapModule {
    /// Parses and analyzes a module file.
    pub fn load(path: &Path, cfg: &Config) -> Result<Self, ModuleError> {
        let module = ir::parser::parse_file(path)?;
        let imap = analyzer::analyze(&module, cfg)?;
        Ok(Self {
            module,
            imap,
            lock: Mutex::new(()),
        })
    }

    /// Reads the assignment currently desired for a selection.
    pub fn assignment(&self, sel: Selection) -> Assignment {
        Assignment::new(self.bitseq(sel, true), sel)
    }

    /// Encodes the state of the records matched by `sel` as a bit
    /// sequence; `after` picks the desired state over the loaded one.
    pub fn bitseq(&self, sel: Selection, after: bool) -> Bitseq {
        let records = self.get(sel, after);
        if sel.is_binary() {
            let mut bs = Bitseq::new(records.len());
            for (i, rec) in records.iter().enumerate() {
                if rec.state(after).atomic {
                    bs = bs.set(&[i]);
                }
            }
            bs
        } else {
            let mut bs = Bitseq::new(records.len() * 2);
            for (i, rec) in records.iter().enumerate() {
                let o = rec.state(after).ordering;
                match rec.op().code_of(o) {
                    Some(code) => {
                        let mut bits = Vec::new();
                        if code & 0b01 != 0 {
                            bits.push(2 * i);
                        }
                        if code & 0b10 != 0 {
                            bits.push(2 * i + 1);
                        }
                        bs = bs.set(&bits);
                    }
                    None => warn!(
                        "cannot encode ordering {} for {} operation, assuming relaxed",
                        o,
                        rec.op()
                    ),
                }
            }
            bs
        }
    }

    /// Number of records matched by a selection.
    pub fn count(&self, sel: Selection, after: bool) -> usize {
        self.get(sel, after).len()
    }

    /// Ordering histogram of the records matched by a selection.
    pub fn barrier_count(&self, sel: Selection, after: bool) -> BarrierCount {
        let mut bc = BarrierCount::default();
        for rec in self.get(sel, after) {
            match rec.state(after).ordering {
                Ordering::Relaxed => bc.relaxed += 1,
                Ordering::Acquire => bc.acquire += 1,
                Ordering::Release => bc.release += 1,
                Ordering::SeqCst => bc.seq_cst += 1,
                Ordering::Invalid => {}
            }
        }
        bc
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.imap.values()
    }

    /// Resolves the source location of a record from its discovery stack,
    /// preferring the deepest location outside the atomics library.
    pub fn loc_of(&self, rec: &Record) -> Loc {
        for &dbg in rec.stack.iter().rev() {
            let loc = Loc::resolve(&self.module, dbg);
            if loc.is_known() && !loc.filename.contains("vsync/atomic") {
                return loc;
            }
        }
        Loc::default()
    }

    //
    // Private Implementation
    //

    // id-sorted records matching the expanded selection
    fn get(&self, sel: Selection, after: bool) -> Vec<&Record> {
        let group = sel.group();
        self.imap
            .values()
            .filter(|rec| group.contains(&rec.selection(after)))
            .collect()
    }

    fn get_ids(&self, sel: Selection, after: bool) -> Vec<usize> {
        self.get(sel, after).iter().map(|r| r.id).collect()
    }
}

impl fmt::Display for WrapModule {
    /// Emits the module text with the desired instruction states. Mutated
    /// instructions are temporarily rewritten and restored afterwards, so
    /// the parsed representation always reflects the loaded file.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mutated: Vec<&Record> = self.imap.values().filter(|r| r.is_mutation()).collect();
        for rec in &mutated {
            rec.apply();
        }
        let result = write!(f, "{}", self.module);
        for rec in &mutated {
            rec.restore();
        }
        result
    }
}

impl Record {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn func_name(&self) -> &str {
        &self.func
    }

    pub fn before(&self) -> OrderState {
        self.before
    }

    pub fn after(&self) -> OrderState {
        self.after
    }

    pub fn is_mutation(&self) -> bool {
        self.before != self.after
    }

    /// The operation kind of the underlying instruction.
    pub fn op(&self) -> AtomicOp {
        match self.inst.borrow().as_mem().kind {
            MemKind::Load => AtomicOp::Load,
            MemKind::Store => AtomicOp::Store,
            MemKind::Fence => AtomicOp::Fence,
            MemKind::Cmpxchg => AtomicOp::Cmpxchg,
            MemKind::Rmw => AtomicOp::RMW,
        }
    }

    //
    // Private Implementation
    //

    pub(crate) fn new(
        id: usize,
        inst: InstRef,
        func: String,
        stack: Vec<u64>,
        before: OrderState,
    ) -> Self {
        let orig = {
            let m = inst.borrow();
            let m = m.as_mem();
            OrigFields {
                atomic: m.atomic,
                ordering: m.ordering,
                failure_ordering: m.failure_ordering,
            }
        };
        Self {
            id,
            inst,
            func,
            stack,
            before,
            after: before,
            orig,
        }
    }

    fn state(&self, after: bool) -> OrderState {
        if after {
            self.after
        } else {
            self.before
        }
    }

    pub(crate) fn set_ordering(&mut self, o: Ordering) {
        self.after.ordering = o;
    }

    pub(crate) fn set_atomic(&mut self, atomic: bool) {
        self.after.atomic = atomic;
    }

    fn selection(&self, after: bool) -> Selection {
        match self.inst.borrow().as_mem().kind {
            MemKind::Rmw | MemKind::Cmpxchg => Selection::RMWs,
            MemKind::Fence => Selection::Fences,
            MemKind::Load => {
                if self.state(after).atomic {
                    Selection::AtomicLoads
                } else {
                    Selection::PlainLoads
                }
            }
            MemKind::Store => {
                if self.state(after).atomic {
                    Selection::AtomicStores
                } else {
                    Selection::PlainStores
                }
            }
        }
    }

    // Writes the desired state into the instruction fields.
    fn apply(&self) {
        let (ordering, atomic) = if !self.after.atomic {
            (None, false)
        } else if self.after.ordering == Ordering::Invalid {
            (Some(IrOrdering::SeqCst), true)
        } else {
            (to_ir_ordering(self.after.ordering), true)
        };
        let mut inst = self.inst.borrow_mut();
        let m = inst.as_mem_mut();
        m.atomic = atomic;
        m.ordering = ordering;
        if m.kind == MemKind::Cmpxchg {
            m.failure_ordering = ordering.map(IrOrdering::cmpxchg_failure);
        }
    }

    // Restores the instruction fields read from the loaded file.
    fn restore(&self) {
        let mut inst = self.inst.borrow_mut();
        let m = inst.as_mem_mut();
        m.atomic = self.orig.atomic;
        m.ordering = self.orig.ordering;
        m.failure_ordering = self.orig.failure_ordering;
    }
}

/// Maps an IR ordering token to the optimizer's ordering lattice; tokens
/// outside the lattice (unordered, acq_rel) map to `Invalid`.
pub fn from_ir_ordering(o: Option<IrOrdering>) -> Ordering {
    match o {
        Some(IrOrdering::Monotonic) => Ordering::Relaxed,
        Some(IrOrdering::Acquire) => Ordering::Acquire,
        Some(IrOrdering::Release) => Ordering::Release,
        Some(IrOrdering::SeqCst) => Ordering::SeqCst,
        _ => Ordering::Invalid,
    }
}

pub fn to_ir_ordering(o: Ordering) -> Option<IrOrdering> {
    match o {
        Ordering::Relaxed => Some(IrOrdering::Monotonic),
        Ordering::Acquire => Some(IrOrdering::Acquire),
        Ordering::Release => Some(IrOrdering::Release),
        Ordering::SeqCst => Some(IrOrdering::SeqCst),
        Ordering::Invalid => None,
    }
}
