use super::expander::original_name;
use super::{History, ModuleError, Record, WrapModule};
use crate::core::{AtomicOp, Ordering, Selection};
use crate::ir::Loc;
use std::fmt::Write;

//
// Public Interface
//

/// Renders a summary of the module and its recorded mutations: snapshot
/// chain, operation counts, ordering histogram, and per-selection
/// assignments.
pub fn summary(h: &History) -> String {
    let mut out = String::new();
    let push = |out: &mut String, s: String| {
        out.push_str(&s);
        out.push('\n');
    };

    push(&mut out, "== SUMMARY ===================================".into());
    push(&mut out, String::new());
    push(&mut out, "File".into());
    let files: Vec<String> = h
        .files()
        .iter()
        .map(|f| f.display().to_string())
        .collect();
    push(&mut out, format!("  {}", files.join(" --> ")));
    push(&mut out, String::new());

    push(&mut out, "Operations".into());
    for (label, sel) in [
        ("Plain  loads  ", Selection::PlainLoads),
        ("Atomic loads  ", Selection::AtomicLoads),
        ("Plain  stores ", Selection::PlainStores),
        ("Atomic stores ", Selection::AtomicStores),
        ("RMWs          ", Selection::RMWs),
        ("Fences        ", Selection::Fences),
    ] {
        push(&mut out, format!("  {} : {}", label, count_chain(h, sel)));
    }
    push(&mut out, String::new());

    push(&mut out, "Memory ordering".into());
    for (label, ordering) in [
        ("SeqCst  ", Ordering::SeqCst),
        ("Release ", Ordering::Release),
        ("Acquire ", Ordering::Acquire),
        ("Relaxed ", Ordering::Relaxed),
    ] {
        push(
            &mut out,
            format!("  {} : {}", label, barrier_chain(h, ordering)),
        );
    }
    push(&mut out, String::new());

    push(&mut out, "Assignments".into());
    for (label, sel) in [
        ("[L] Loads  ", Selection::Loads),
        ("[S] Stores ", Selection::Stores),
        ("[A] Atomics", Selection::Atomic),
        ("[F] Fences ", Selection::Fences),
        ("[X] RMWs   ", Selection::RMWs),
    ] {
        push(&mut out, format!("  {} : {}", label, bitseq_chain(h, sel)));
    }
    out
}

/// Lists the source-level changes between the initial module and the final
/// mutation, one entry per mutated instruction. The initial snapshot is
/// reloaded and all mutations reapplied so the diff survives committed
/// history.
pub fn diff(h: &History) -> Result<String, ModuleError> {
    let first_file = &h.files()[0];
    let mut first = WrapModule::load(first_file, h.config())?;
    for a in h.mutations() {
        // rejected assignments are part of the log; later mutations
        // overwrite whatever they left behind
        if let Err(e) = first.mutate(&a.bs, a.sel) {
            log::debug!("skipping unappliable mutation: {}", e);
        }
    }

    let mut out = String::new();
    let mut i = 0;
    for rec in first.records() {
        let Some(entry) = diff_entry(&first, rec) else {
            continue;
        };
        let _ = writeln!(
            out,
            "[{}] {}:{}:{}",
            i, entry.loc.filename, entry.loc.line, entry.loc.column
        );
        let _ = writeln!(out, "    {}", entry.change);
        i += 1;
    }
    Ok(out)
}

//
// Private Implementation
//

struct DiffEntry {
    loc: Loc,
    change: String,
}

fn diff_entry(wm: &WrapModule, rec: &Record) -> Option<DiffEntry> {
    let before = rec.before();
    let after = rec.after();
    let loc = wm.loc_of(rec);

    if before.atomic != after.atomic {
        let target = if after.atomic { "atomic" } else { "non-atomic" };
        return Some(DiffEntry {
            loc,
            change: format!("change {} to {}", rec.op(), target),
        });
    }
    if !after.atomic || before.ordering == after.ordering {
        return None;
    }
    if rec.op() == AtomicOp::Fence && after.ordering == Ordering::Relaxed {
        return Some(DiffEntry {
            loc,
            change: "remove it".to_string(),
        });
    }

    let func = original_name(rec.func_name());
    if func.contains("vatomic") {
        // reconstruct the wrapper call the user would write instead
        let base = func
            .strip_suffix("_rel")
            .or_else(|| func.strip_suffix("_rlx"))
            .or_else(|| func.strip_suffix("_acq"))
            .unwrap_or(&func);
        return Some(DiffEntry {
            loc,
            change: format!("{}{}", base, order_suffix(after.ordering)),
        });
    }
    Some(DiffEntry {
        loc,
        change: format!("change {} to {}", rec.op(), after.ordering),
    })
}

fn order_suffix(o: Ordering) -> &'static str {
    match o {
        Ordering::Relaxed => "_rlx",
        Ordering::Acquire => "_acq",
        Ordering::Release => "_rel",
        _ => "",
    }
}

fn count_chain(h: &History, sel: Selection) -> String {
    chain(h, |wm, last| {
        let n = wm.count(sel, last);
        format!("{}", n)
    })
}

fn barrier_chain(h: &History, ordering: Ordering) -> String {
    chain(h, |wm, last| {
        let bc = wm.barrier_count(Selection::Atomic, last);
        let n = match ordering {
            Ordering::SeqCst => bc.seq_cst,
            Ordering::Release => bc.release,
            Ordering::Acquire => bc.acquire,
            Ordering::Relaxed => bc.relaxed,
            Ordering::Invalid => 0,
        };
        format!("{}", n)
    })
}

fn bitseq_chain(h: &History, sel: Selection) -> String {
    chain(h, |wm, last| format!("{}", wm.bitseq(sel, last)))
}

// every snapshot shows its loaded state; the last one shows the desired
// state, where uncommitted mutations live
fn chain(h: &History, f: impl Fn(&WrapModule, bool) -> String) -> String {
    let mods = h.snapshots();
    let parts: Vec<String> = mods
        .iter()
        .enumerate()
        .map(|(i, wm)| f(wm, i == mods.len() - 1))
        .collect();
    parts.join(" --> ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Assignment, Bitseq};
    use crate::module::Config;
    use std::fs;
    use std::path::PathBuf;

    const MODULE: &str = r#"@x = dso_local global i32 0, align 4, !dbg !0

define dso_local i32 @main() #0 !dbg !10 {
entry:
  %0 = load atomic i32, ptr @x seq_cst, align 4, !dbg !16
  fence seq_cst, !dbg !17
  ret i32 0, !dbg !18
}

!2 = !DIFile(filename: "spin.c", directory: "/work")
!10 = distinct !DISubprogram(name: "main", scope: !2, file: !2, line: 5, unit: !3)
!16 = !DILocation(line: 7, column: 8, scope: !10)
!17 = !DILocation(line: 8, column: 3, scope: !10)
"#;

    fn setup() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spin.ll");
        fs::write(&path, MODULE).unwrap();
        (dir, path)
    }

    #[test]
    fn summary_shows_chains() {
        let (_dir, path) = setup();
        let cfg = Config {
            expand: false,
            ..Config::default()
        };
        let mut h = History::load(&path, cfg).unwrap();
        h.mutate(Assignment::new(
            Bitseq::from_bin_str("0011").unwrap(),
            Selection::Atomic,
        ))
        .unwrap();
        let s = summary(&h);
        assert!(s.contains("Atomic loads"));
        assert!(s.contains("SeqCst"));
        assert!(s.contains("[A] Atomics"));
    }

    #[test]
    fn diff_reports_changes_with_locations() {
        let (_dir, path) = setup();
        let cfg = Config {
            expand: false,
            ..Config::default()
        };
        let mut h = History::load(&path, cfg).unwrap();
        // load stays seq_cst, fence becomes relaxed (deleted)
        h.mutate(Assignment::new(
            Bitseq::from_bin_str("0011").unwrap(),
            Selection::Atomic,
        ))
        .unwrap();
        let d = diff(&h).unwrap();
        assert!(d.contains("/work/spin.c:8:3"));
        assert!(d.contains("remove it"));
        assert!(!d.contains("change Load"));
    }
}
