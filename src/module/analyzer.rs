use super::visitor::visit_module;
use super::{from_ir_ordering, Config, ModuleError, OrderState, Record};
use crate::ir::{self, Inst, InstRef, MemKind};
use log::debug;
use std::collections::{BTreeMap, HashSet};

//
// Public Interface
//

/// Walks the module from the entry functions and registers every relevant
/// memory-access instruction under the next stable id. Ids are contiguous
/// from 1 in visit order; this order is the canonical order every bit
/// sequence against the module uses.
pub fn analyze(
    module: &ir::Module,
    cfg: &Config,
) -> Result<BTreeMap<usize, Record>, ModuleError> {
    let mut analyzer = Analyzer::default();
    let mut imap = BTreeMap::new();

    visit_module(module, cfg, &mut |inst, f, stack| {
        if let Some(rec) = analyzer.inspect(inst, f, stack) {
            debug!("adding {}: {}", rec.id(), inst.borrow().render());
            imap.insert(rec.id(), rec);
        }
        Ok(())
    })?;
    Ok(imap)
}

//
// Private Implementation
//

type Key = (String, String); // (function, local value name)

#[derive(Default)]
struct Analyzer {
    is_declared: HashSet<Key>,
    is_alloca: HashSet<Key>,
    is_param: HashSet<Key>,
    count: usize,
}

impl Analyzer {
    fn inspect(&mut self, inst: &InstRef, f: &ir::Func, stack: &[u64]) -> Option<Record> {
        let before = {
            let borrowed = inst.borrow();
            match &*borrowed {
                Inst::Alloca(a) => {
                    self.is_alloca.insert(key(f, &a.name));
                    return None;
                }
                Inst::Call(c) => {
                    self.inst_call(c, f);
                    return None;
                }
                Inst::Mem(m) => match m.kind {
                    MemKind::Load | MemKind::Store => {
                        if !self.relevant_access(m, f) {
                            return None;
                        }
                        OrderState {
                            ordering: from_ir_ordering(m.ordering),
                            atomic: m.atomic,
                        }
                    }
                    // fences, cmpxchgs and RMWs are always atomic
                    _ => OrderState {
                        ordering: from_ir_ordering(m.ordering),
                        atomic: true,
                    },
                },
            }
        };
        self.count += 1;
        Some(Record::new(
            self.count,
            inst.clone(),
            f.name.clone(),
            stack.to_vec(),
            before,
        ))
    }

    // Collects local variables declared through debug intrinsics; such
    // allocas become eligible for ordering mutation.
    fn inst_call(&mut self, c: &ir::CallInst, f: &ir::Func) {
        let is_declare = c
            .callee
            .as_deref()
            .map_or(false, |name| {
                name.contains("llvm.dbg.declare") || name.contains("llvm.dbg.addr")
            });
        if !is_declare {
            return;
        }
        if let Some(local) = c.args.first().and_then(|a| ir::parser::last_value_token(a)) {
            self.is_declared.insert(key(f, &local));
        }
    }

    // A load or store is only considered when it carries a source location
    // and its referent is a global, or a declared alloca that is not backed
    // by a function parameter.
    fn relevant_access(&mut self, m: &ir::MemInst, f: &ir::Func) -> bool {
        if m.dbg.is_none() {
            // a parameter stored to an alloca disqualifies that alloca,
            // even when it is declared
            if m.kind == MemKind::Store {
                let is_param_value = m
                    .value_operand
                    .as_deref()
                    .map_or(false, |v| f.params.iter().any(|p| p == v));
                if is_param_value {
                    if let Some(dst) = &m.referent {
                        self.is_param.insert(key(f, dst));
                    }
                }
            }
            return false;
        }

        if let Some(referent) = &m.referent {
            let k = key(f, referent);
            if self.is_alloca.contains(&k) && !self.is_declared.contains(&k) {
                return false;
            }
            if self.is_param.contains(&k) {
                return false;
            }
        }
        true
    }
}

fn key(f: &ir::Func, local: &str) -> Key {
    (f.name.clone(), local.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Ordering, Selection};
    use crate::ir::parser::parse_str;
    use crate::module::WrapModule;

    const MODULE: &str = r#"@flag = dso_local global i32 0, align 4, !dbg !0

define dso_local ptr @run(ptr noundef %arg) #0 !dbg !10 {
entry:
  %arg.addr = alloca ptr, align 8
  %tmp = alloca i32, align 4
  %seen = alloca i32, align 4
  store ptr %arg, ptr %arg.addr, align 8
  call void @llvm.dbg.declare(metadata ptr %arg.addr, metadata !14, metadata !DIExpression()), !dbg !20
  call void @llvm.dbg.declare(metadata ptr %seen, metadata !15, metadata !DIExpression()), !dbg !20
  %0 = load atomic i32, ptr @flag acquire, align 4, !dbg !21
  store i32 %0, ptr %seen, align 4, !dbg !22
  %1 = load i32, ptr %tmp, align 4, !dbg !23
  store atomic i32 1, ptr @flag seq_cst, align 4, !dbg !24
  fence seq_cst, !dbg !25
  ret ptr null, !dbg !26
}

define dso_local i32 @main() #0 !dbg !11 {
entry:
  %t = alloca i64, align 8
  %call = call i32 @pthread_create(ptr noundef %t, ptr noundef null, ptr noundef @run, ptr noundef null), !dbg !30
  ret i32 0, !dbg !31
}

declare void @llvm.dbg.declare(metadata, metadata, metadata) #1
declare i32 @pthread_create(ptr noundef, ptr noundef, ptr noundef, ptr noundef) #2
"#;

    fn load() -> WrapModule {
        let module = parse_str(MODULE).unwrap();
        let cfg = Config {
            expand: false,
            ..Config::default()
        };
        let imap = analyze(&module, &cfg).unwrap();
        WrapModule {
            module,
            imap,
            lock: std::sync::Mutex::new(()),
        }
    }

    #[test]
    fn ids_are_contiguous_in_visit_order() {
        let wm = load();
        let ids: Vec<usize> = wm.records().map(|r| r.id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn before_equals_after_when_loaded() {
        let wm = load();
        for rec in wm.records() {
            assert_eq!(rec.before(), rec.after());
        }
    }

    #[test]
    fn filters_undeclared_and_param_backed_allocas() {
        let wm = load();
        // atomic load @flag, declared-alloca store %seen, atomic store
        // @flag, fence; neither %tmp (undeclared) nor %arg.addr
        // (parameter-backed) accesses are recorded
        assert_eq!(wm.count(Selection::AtomicLoads, false), 1);
        assert_eq!(wm.count(Selection::AtomicStores, false), 1);
        assert_eq!(wm.count(Selection::PlainStores, false), 1);
        assert_eq!(wm.count(Selection::PlainLoads, false), 0);
        assert_eq!(wm.count(Selection::Fences, false), 1);
    }

    #[test]
    fn extracts_assignment_bits() {
        let wm = load();
        // visit order: acquire load (10), seq_cst store (11), seq_cst
        // fence (11); chunks are little-endian per operation
        let a = wm.assignment(Selection::Atomic);
        assert_eq!(a.bs.to_bin_string(), "111110");
        assert_eq!(wm.bitseq(Selection::Plain, false).to_bin_string(), "0");
        // stores in id order: the plain store then the atomic store
        assert_eq!(wm.bitseq(Selection::Stores, false).to_bin_string(), "10");
    }

    #[test]
    fn barrier_counts() {
        let wm = load();
        let bc = wm.barrier_count(Selection::Atomic, false);
        assert_eq!(bc.acquire, 1);
        assert_eq!(bc.seq_cst, 2);
        assert_eq!(bc.relaxed, 0);
    }

    #[test]
    fn ordering_lattice_roundtrip() {
        assert_eq!(from_ir_ordering(Some(crate::ir::IrOrdering::Monotonic)), Ordering::Relaxed);
        assert_eq!(from_ir_ordering(Some(crate::ir::IrOrdering::AcqRel)), Ordering::Invalid);
        assert_eq!(from_ir_ordering(None), Ordering::Invalid);
    }
}
