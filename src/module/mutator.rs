use super::{ModuleError, MutationError, WrapModule};
use crate::core::{Bitseq, Ordering, Selection};
use log::trace;

impl WrapModule {
    /// Applies a bit sequence to the records matched by a selection,
    /// updating their desired state. On error the partially applied state
    /// is left as is; callers must reload before re-attempting.
    pub fn mutate(&mut self, bs: &Bitseq, sel: Selection) -> Result<(), ModuleError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let ids = self.get_ids(sel, true);
        let bits = sel.bits_per_op();
        if bs.len() != ids.len() * bits {
            return Err(MutationError::LengthMismatch {
                sel,
                expected: ids.len() * bits,
                got: bs.len(),
            }
            .into());
        }
        trace!("mutate {} with {}", sel, bs);

        let imap = &mut self.imap;
        if !sel.is_binary() {
            bs.translate(2, |k, val| {
                let rec = imap.get_mut(&ids[k]).expect("record id out of range");
                let o = rec.op().ordering_of(val);
                if o == Ordering::Invalid {
                    return Err(MutationError::InvalidOrdering { op: rec.op() }.into());
                }
                if !rec.after().atomic {
                    panic!("instruction is not atomic");
                }
                rec.set_ordering(o);
                Ok(())
            })
        } else {
            bs.translate(1, |k, val| {
                let rec = imap.get_mut(&ids[k]).expect("record id out of range");
                match val {
                    1 => {
                        rec.set_atomic(true);
                        rec.set_ordering(Ordering::SeqCst);
                    }
                    0 => {
                        rec.set_atomic(false);
                        rec.set_ordering(Ordering::Invalid);
                    }
                    _ => unreachable!("unexpected value: {}", val),
                }
                Ok(())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Selection;
    use crate::ir::parser::parse_str;
    use crate::module::{analyzer, Config};
    use std::sync::Mutex;

    const MODULE: &str = r#"@x = dso_local global i32 0, align 4, !dbg !0

define dso_local i32 @main() #0 !dbg !10 {
entry:
  %0 = load atomic i32, ptr @x seq_cst, align 4, !dbg !20
  store atomic i32 1, ptr @x seq_cst, align 4, !dbg !21
  fence seq_cst, !dbg !22
  ret i32 0, !dbg !23
}
"#;

    fn load() -> WrapModule {
        let module = parse_str(MODULE).unwrap();
        let cfg = Config {
            expand: false,
            ..Config::default()
        };
        let imap = analyzer::analyze(&module, &cfg).unwrap();
        WrapModule {
            module,
            imap,
            lock: Mutex::new(()),
        }
    }

    #[test]
    fn mutate_orderings_rewrites_emission() {
        let mut wm = load();
        // load → acquire (10), store → relaxed (00), fence → release (01)
        let bs = Bitseq::from_bin_str("010010").unwrap();
        wm.mutate(&bs, Selection::Atomic).unwrap();

        let text = wm.to_string();
        assert!(text.contains("load atomic i32, ptr @x acquire, align 4"));
        assert!(text.contains("store atomic i32 1, ptr @x monotonic, align 4"));
        assert!(text.contains("fence release"));

        // the desired assignment follows the mutation, the loaded state
        // does not change
        assert_eq!(
            wm.assignment(Selection::Atomic).bs.to_bin_string(),
            "010010"
        );
        assert_eq!(wm.bitseq(Selection::Atomic, false).to_bin_string(), "111111");
        // emission restores the parsed fields
        assert_eq!(wm.to_string(), text);
    }

    #[test]
    fn mutate_relaxed_fence_disappears() {
        let mut wm = load();
        let bs = Bitseq::from_bin_str("001111").unwrap();
        wm.mutate(&bs, Selection::Atomic).unwrap();
        let text = wm.to_string();
        assert!(!text.contains("fence"));
    }

    #[test]
    fn mutate_binary_toggles_atomicity() {
        let mut wm = load();
        // the only load becomes plain
        wm.mutate(&Bitseq::from_bin_str("0").unwrap(), Selection::Loads)
            .unwrap();
        let text = wm.to_string();
        assert!(text.contains("load i32, ptr @x, align 4"));
        // and atomic seq_cst again
        wm.mutate(&Bitseq::from_bin_str("1").unwrap(), Selection::Loads)
            .unwrap();
        assert!(wm
            .to_string()
            .contains("load atomic i32, ptr @x seq_cst, align 4"));
    }

    #[test]
    fn mutate_rejects_length_mismatch() {
        let mut wm = load();
        let err = wm
            .mutate(&Bitseq::from_bin_str("11").unwrap(), Selection::Atomic)
            .unwrap_err();
        assert!(matches!(
            err,
            ModuleError::Mutation(MutationError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn mutate_rejects_illegal_ordering() {
        let mut wm = load();
        // 01 (release) on the load slot is not expressible
        let bs = Bitseq::from_bin_str("111101").unwrap();
        let err = wm.mutate(&bs, Selection::Atomic).unwrap_err();
        assert!(matches!(
            err,
            ModuleError::Mutation(MutationError::InvalidOrdering { .. })
        ));
    }
}
