use super::{Config, ModuleError};
use crate::ir::{self, Inst, InstRef};
use log::{trace, warn};
use std::collections::HashSet;
use std::rc::Rc;

//
// Public Interface
//

/// Called for every relevant instruction while visiting the module; the
/// stack holds the `!dbg` attachments from the entry function down to the
/// instruction itself.
pub type VisitCallback<'a> =
    dyn FnMut(&InstRef, &ir::Func, &[u64]) -> Result<(), ModuleError> + 'a;

/// Depth-first traversal of all instructions reachable from the configured
/// entry functions, expanding direct calls and thread-start routines.
pub fn visit_module(
    module: &ir::Module,
    cfg: &Config,
    cb: &mut VisitCallback,
) -> Result<(), ModuleError> {
    for entry in &cfg.entry_funcs {
        let f = module
            .func(entry)
            .ok_or_else(|| ModuleError::EntryNotFound(entry.clone()))?;
        let mut visitor = Visitor {
            module,
            visited: HashSet::new(),
            skip: &cfg.skip_funcs,
        };
        trace!("====================== START VISIT ==========================");
        let mut stack = Vec::new();
        if let Some(dbg) = f.dbg {
            stack.push(dbg);
        }
        visitor.visit(f, &mut stack, cb)?;
    }
    Ok(())
}

//
// Private Implementation
//

struct Visitor<'m> {
    module: &'m ir::Module,
    visited: HashSet<usize>,
    skip: &'m [String],
}

impl<'m> Visitor<'m> {
    fn visit(
        &mut self,
        f: &ir::Func,
        stack: &mut Vec<u64>,
        cb: &mut VisitCallback,
    ) -> Result<(), ModuleError> {
        for line in &f.body {
            let ir::Line::Inst(inst) = line else { continue };
            self.visit_inst(inst, f, stack, cb)?;
        }
        Ok(())
    }

    fn visit_inst(
        &mut self,
        inst: &InstRef,
        f: &ir::Func,
        stack: &mut Vec<u64>,
        cb: &mut VisitCallback,
    ) -> Result<(), ModuleError> {
        let key = Rc::as_ptr(inst) as usize;
        if !self.visited.insert(key) {
            trace!("SKIP: {}", inst.borrow().render());
            return Ok(());
        }
        trace!("Inst: {}", inst.borrow().render());

        // read the call shape up front; the recursion below follows the
        // callee as discovered, even if the callback retargets the call
        let call = match &*inst.borrow() {
            Inst::Call(c) => Some((c.callee.clone(), c.args.clone(), c.dbg)),
            _ => None,
        };

        let dbg = match &*inst.borrow() {
            Inst::Mem(m) => m.dbg,
            Inst::Call(c) => c.dbg,
            Inst::Alloca(_) => None,
        };
        let mut with_inst = stack.clone();
        if let Some(dbg) = dbg {
            with_inst.push(dbg);
        }
        cb(inst, f, &with_inst)?;

        if let Some((callee, args, dbg)) = call {
            self.visit_callee(f, callee, &args, dbg, stack, cb)?;
        }
        Ok(())
    }

    fn visit_callee(
        &mut self,
        f: &ir::Func,
        callee: Option<String>,
        args: &[String],
        dbg: Option<u64>,
        stack: &mut Vec<u64>,
        cb: &mut VisitCallback,
    ) -> Result<(), ModuleError> {
        let Some(callee) = callee else {
            warn!("@{}: ignoring function pointer call", f.name);
            return Ok(());
        };

        if callee.contains("pthread_create") {
            // the start routine is the third argument
            return self.visit_routine(args.get(2), dbg, stack, cb);
        }
        if callee.contains("__VERIFIER_thread_create") {
            return self.visit_routine(args.get(1), dbg, stack, cb);
        }
        if self.is_callee_ignored(&callee) {
            return Ok(());
        }
        if let Some(callee) = self.module.func(&callee) {
            self.enter(callee, dbg, stack, cb)?;
        }
        Ok(())
    }

    fn visit_routine(
        &mut self,
        arg: Option<&String>,
        dbg: Option<u64>,
        stack: &mut Vec<u64>,
        cb: &mut VisitCallback,
    ) -> Result<(), ModuleError> {
        let routine = arg.and_then(|a| ir::parser::last_value_token(a));
        let Some(routine) = routine else {
            warn!("Ignoring thread creation without start routine.");
            return Ok(());
        };
        let Some(name) = routine.strip_prefix('@') else {
            warn!("Ignoring function pointer in pthread_create.");
            return Ok(());
        };
        match self.module.func(name) {
            Some(f) => self.enter(f, dbg, stack, cb),
            None => {
                warn!("Ignoring undefined thread start routine '@{}'.", name);
                Ok(())
            }
        }
    }

    fn enter(
        &mut self,
        f: &ir::Func,
        dbg: Option<u64>,
        stack: &mut Vec<u64>,
        cb: &mut VisitCallback,
    ) -> Result<(), ModuleError> {
        let pushed = match dbg {
            Some(dbg) => {
                stack.push(dbg);
                true
            }
            None => false,
        };
        let r = self.visit(f, stack, cb);
        if pushed {
            stack.pop();
        }
        r
    }

    fn is_callee_ignored(&self, callee: &str) -> bool {
        self.skip.iter().any(|fragment| callee.contains(fragment))
    }
}
