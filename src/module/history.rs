use super::{expander, Config, ModuleError, WrapModule};
use crate::core::{Assignment, Bitseq, Selection};
use crate::ir;
use crate::tools;
use log::{debug, info};
use std::fmt;
use std::path::{Path, PathBuf};

//
// Public Interface
//

/// The mutation history of an LLVM-IR module: a stack of emitted snapshot
/// files and their analyzed modules. Mutations are applied to the top
/// snapshot and either committed with [`History::record`] or dropped with
/// [`History::forget`].
#[derive(Debug)]
pub struct History {
    cfg: Config,
    base: PathBuf,
    count: usize,
    hist: Vec<PathBuf>,
    mods: Vec<WrapModule>,
    current: Vec<Assignment>,
    recorded: Vec<Assignment>,
}

impl History {
    /// Parses and analyzes an LLVM-IR module, running the one-shot
    /// expansion pass first when configured.
    pub fn load(path: &Path, cfg: Config) -> Result<Self, ModuleError> {
        let mut efn = path.to_path_buf();

        if cfg.expand {
            info!("Parse '{}'", path.display());
            let mut module = ir::parser::parse_file(path)?;

            info!("Expand '{}'", path.display());
            expander::expand(&mut module, &cfg)?;

            efn = gen_name(path, ".expand");
            tools::dump(&module, &efn).map_err(io_err)?;
        }

        info!("Analyze '{}'", efn.display());
        let wmod = WrapModule::load(&efn, &cfg)?;
        Ok(Self {
            cfg,
            base: path.to_path_buf(),
            count: 0,
            hist: vec![efn],
            mods: vec![wmod],
            current: Vec::new(),
            recorded: Vec::new(),
        })
    }

    /// Applies an assignment to the top snapshot, remembering it as an
    /// uncommitted mutation.
    pub fn mutate(&mut self, a: Assignment) -> Result<(), ModuleError> {
        self.current.push(a.clone());
        self.top_mut().mutate(&a.bs, a.sel)
    }

    pub fn assignment(&self, sel: Selection) -> Assignment {
        self.top().assignment(sel)
    }

    pub fn bitseq(&self, sel: Selection, after: bool) -> Bitseq {
        self.top().bitseq(sel, after)
    }

    /// Commits the current mutations: the module is re-emitted to a fresh
    /// snapshot file, reparsed, and pushed as the new top.
    pub fn record(&mut self) -> Result<(), ModuleError> {
        self.count += 1;
        let path = gen_name(&self.base, &format!("_{}", self.count));
        tools::dump(self.top(), &path).map_err(io_err)?;
        let wmod = WrapModule::load(&path, &self.cfg)?;
        self.hist.push(path);
        self.mods.push(wmod);
        self.recorded.append(&mut self.current);
        Ok(())
    }

    /// Drops all non-recorded mutations by reparsing the top snapshot.
    pub fn forget(&mut self) -> Result<(), ModuleError> {
        let path = self.hist.last().expect("history is never empty").clone();
        let wmod = WrapModule::load(&path, &self.cfg)?;
        *self.mods.last_mut().expect("history is never empty") = wmod;
        self.current.clear();
        Ok(())
    }

    /// Removes all emitted snapshot files; the input file is kept.
    pub fn cleanup(&self) {
        for path in &self.hist {
            if *path == self.base {
                continue;
            }
            debug!("Removing history file '{}'", path.display());
            if let Err(e) = tools::remove(path) {
                debug!("{}", e);
            }
        }
    }

    pub fn top(&self) -> &WrapModule {
        self.mods.last().expect("history is never empty")
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Snapshot modules, oldest first.
    pub fn snapshots(&self) -> &[WrapModule] {
        &self.mods
    }

    /// Snapshot file names, oldest first.
    pub fn files(&self) -> &[PathBuf] {
        &self.hist
    }

    /// All committed mutations, followed by the uncommitted ones.
    pub fn mutations(&self) -> impl Iterator<Item = &Assignment> {
        self.recorded.iter().chain(self.current.iter())
    }

    //
    // Private Implementation
    //

    fn top_mut(&mut self) -> &mut WrapModule {
        self.mods.last_mut().expect("history is never empty")
    }
}

impl fmt::Display for History {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.top().fmt(f)
    }
}

impl crate::optimizer::MutableModule for History {
    fn mutate(&mut self, a: Assignment) -> Result<(), ModuleError> {
        History::mutate(self, a)
    }

    fn assignment(&self, sel: Selection) -> Assignment {
        History::assignment(self, sel)
    }
}

// snapshot names append to the input stem: x.ll → x_1.ll, x.expand.ll
fn gen_name(path: &Path, suffix: &str) -> PathBuf {
    let s = path.to_string_lossy();
    let stem = s.strip_suffix(".ll").unwrap_or(&s);
    PathBuf::from(format!("{}{}.ll", stem, suffix))
}

fn io_err(e: tools::ToolsError) -> ModuleError {
    match e {
        tools::ToolsError::Io(e) => ModuleError::Io(e),
        e => ModuleError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Selection;
    use std::fs;

    const MODULE: &str = r#"@x = dso_local global i32 0, align 4, !dbg !0

define dso_local i32 @main() #0 !dbg !10 {
entry:
  %0 = load atomic i32, ptr @x seq_cst, align 4, !dbg !20
  store atomic i32 1, ptr @x seq_cst, align 4, !dbg !21
  ret i32 0, !dbg !23
}
"#;

    fn setup(name: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        fs::write(&path, MODULE).unwrap();
        (dir, path)
    }

    fn cfg() -> Config {
        Config {
            expand: false,
            ..Config::default()
        }
    }

    #[test]
    fn gen_name_appends_to_stem() {
        assert_eq!(
            gen_name(Path::new("a/b.ll"), "_1"),
            PathBuf::from("a/b_1.ll")
        );
        assert_eq!(
            gen_name(Path::new("a/b.ll"), ".expand"),
            PathBuf::from("a/b.expand.ll")
        );
    }

    #[test]
    fn record_pushes_reparsed_snapshot() {
        let (_dir, path) = setup("in.ll");
        let mut h = History::load(&path, cfg()).unwrap();
        let relaxed = Bitseq::from_bin_str("0000").unwrap();
        h.mutate(Assignment::new(relaxed.clone(), Selection::Atomic))
            .unwrap();
        h.record().unwrap();

        assert_eq!(h.files().len(), 2);
        assert!(h.files()[1].ends_with("in_1.ll"));
        // the new top was reparsed from the mutated file: relaxed is now
        // the loaded state
        assert_eq!(h.bitseq(Selection::Atomic, false), relaxed);
        assert_eq!(h.assignment(Selection::Atomic).bs, relaxed);
        assert_eq!(h.mutations().count(), 1);
    }

    #[test]
    fn forget_discards_uncommitted_mutations() {
        let (_dir, path) = setup("in.ll");
        let mut h = History::load(&path, cfg()).unwrap();
        let all = h.assignment(Selection::Atomic).bs.clone();
        h.mutate(Assignment::new(
            Bitseq::from_bin_str("0000").unwrap(),
            Selection::Atomic,
        ))
        .unwrap();
        h.forget().unwrap();
        assert_eq!(h.assignment(Selection::Atomic).bs, all);
        assert_eq!(h.mutations().count(), 0);
    }

    #[test]
    fn cleanup_removes_snapshots() {
        let (_dir, path) = setup("in.ll");
        let mut h = History::load(&path, cfg()).unwrap();
        h.mutate(Assignment::new(
            Bitseq::from_bin_str("0000").unwrap(),
            Selection::Atomic,
        ))
        .unwrap();
        h.record().unwrap();
        let files: Vec<PathBuf> = h.files().to_vec();
        h.cleanup();
        // snapshots are removed, the input file survives
        assert!(files[0].exists());
        for f in &files[1..] {
            assert!(!f.exists());
        }
    }
}
