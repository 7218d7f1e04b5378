use super::visitor::visit_module;
use super::{Config, ModuleError};
use crate::ir::{self, Inst};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::collections::HashMap;

//
// Public Interface
//

/// Marker of ordering-parameterized wrapper functions.
pub const EXPAND_MARKER: &str = "vatomic";

/// Suffix appended to expanded function clones.
pub const EXPAND_SUFFIX: &str = "__vsyncer_expand_";

lazy_static! {
    static ref RE_CLONE: Regex = Regex::new(r"(.*)__vsyncer_expand_[0-9]+$").unwrap();
}

/// Strips the expansion suffix from a clone name.
pub fn original_name(name: &str) -> String {
    RE_CLONE.replace(name, "$1").into_owned()
}

/// Clones ordering-parameterized wrapper callees so that every reachable
/// call site owns a private copy: each call to a function whose name
/// contains [`EXPAND_MARKER`] is redirected to a fresh clone of the callee.
/// The function body and its debug-subprogram metadata are deep-cloned;
/// all other metadata attachments are shared.
pub fn expand(module: &mut ir::Module, cfg: &Config) -> Result<(), ModuleError> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut plans: Vec<(String, String)> = Vec::new();

    visit_module(module, cfg, &mut |inst, _f, _stack| {
        let callee = match &*inst.borrow() {
            Inst::Call(c) => c.callee.clone(),
            _ => return Ok(()),
        };
        let Some(callee) = callee else { return Ok(()) };

        if callee.contains("llvm") {
            return Ok(());
        }
        if callee.contains(EXPAND_SUFFIX) {
            debug!("skip {}", callee);
            return Ok(());
        }
        if !callee.contains(EXPAND_MARKER) {
            return Ok(());
        }

        let n = counts.entry(callee.clone()).or_insert(0);
        let clone_name = format!("{}{}{}", callee, EXPAND_SUFFIX, *n);
        *n += 1;

        inst.borrow_mut().as_call_mut().retarget(&clone_name);
        debug!("clonedCall: {}", inst.borrow().render());
        plans.push((callee, clone_name));
        Ok(())
    })?;

    for (orig, clone_name) in plans {
        clone_func(module, &orig, &clone_name)?;
    }
    Ok(())
}

//
// Private Implementation
//

fn clone_func(module: &mut ir::Module, name: &str, clone_name: &str) -> Result<(), ModuleError> {
    let (clone, subprogram) = {
        let f = module
            .func(name)
            .ok_or_else(|| ModuleError::FuncNotFound(name.to_string()))?;

        // deep-copy the subprogram node so the clone keeps distinct debug
        // info; everything the node references stays shared
        let subprogram = f.dbg.and_then(|dbg| {
            module.metadata(dbg).and_then(|line| {
                line.contains("!DISubprogram")
                    .then(|| line.split_once(" = ").map(|(_, def)| def.to_string()))
                    .flatten()
            })
        });

        let new_dbg = subprogram.as_ref().map(|_| module.next_metadata_id());
        (f.clone_as(clone_name, new_dbg), subprogram)
    };

    if let Some(def) = subprogram {
        let id = module.next_metadata_id();
        module.push_metadata(id, format!("!{} = {}", id, def));
    }
    module.push_func(clone);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parser::parse_str;

    const MODULE: &str = r#"@x = dso_local global i32 0, align 4

define dso_local void @vatomic32_write(ptr noundef %a, i32 noundef %v) #0 !dbg !11 {
entry:
  store atomic i32 %v, ptr %a seq_cst, align 4, !dbg !21
  ret void, !dbg !22
}

define dso_local i32 @main() #0 !dbg !10 {
entry:
  call void @vatomic32_write(ptr noundef @x, i32 noundef 1), !dbg !30
  call void @vatomic32_write(ptr noundef @x, i32 noundef 2), !dbg !31
  ret i32 0, !dbg !32
}

!10 = distinct !DISubprogram(name: "main", file: !2, line: 10, unit: !3)
!11 = distinct !DISubprogram(name: "vatomic32_write", file: !2, line: 3, unit: !3)
"#;

    #[test]
    fn expands_each_call_site() {
        let mut module = parse_str(MODULE).unwrap();
        let cfg = Config::default();
        expand(&mut module, &cfg).unwrap();

        let text = module.to_string();
        assert!(text.contains("call void @vatomic32_write__vsyncer_expand_0(ptr noundef @x, i32 noundef 1)"));
        assert!(text.contains("call void @vatomic32_write__vsyncer_expand_1(ptr noundef @x, i32 noundef 2)"));
        assert!(module.func("vatomic32_write__vsyncer_expand_0").is_some());
        assert!(module.func("vatomic32_write__vsyncer_expand_1").is_some());
        // the original definition stays
        assert!(module.func("vatomic32_write").is_some());
    }

    #[test]
    fn clones_subprogram_metadata() {
        let mut module = parse_str(MODULE).unwrap();
        expand(&mut module, &Config::default()).unwrap();

        let c0 = module.func("vatomic32_write__vsyncer_expand_0").unwrap();
        let dbg = c0.dbg.expect("clone has debug info");
        assert_ne!(dbg, 11);
        assert!(module.metadata(dbg).unwrap().contains("vatomic32_write"));
        assert!(c0.header.contains(&format!("!dbg !{}", dbg)));
    }

    #[test]
    fn expansion_is_idempotent_on_clones() {
        let mut module = parse_str(MODULE).unwrap();
        expand(&mut module, &Config::default()).unwrap();
        let once = module.to_string();
        // a second pass leaves already-expanded call sites alone
        expand(&mut module, &Config::default()).unwrap();
        assert_eq!(module.to_string(), once);
    }

    #[test]
    fn original_name_strips_suffix() {
        assert_eq!(
            original_name("vatomic32_write__vsyncer_expand_3"),
            "vatomic32_write"
        );
        assert_eq!(original_name("plain_func"), "plain_func");
    }
}
