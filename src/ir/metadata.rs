use super::Module;
use lazy_static::lazy_static;
use regex::Regex;

//
// Public Interface
//

/// A source code location recovered from debug metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Loc {
    pub filename: String,
    pub directory: String,
    pub line: u64,
    pub column: u64,
}

impl Loc {
    /// Resolves a `!dbg` attachment by walking the scope chain
    /// (`DILocation` → `DILexicalBlock*` → `DISubprogram` → `DIFile`) until
    /// file and line are known.
    pub fn resolve(module: &Module, dbg: u64) -> Loc {
        let mut loc = Loc::default();
        let mut node = Some(dbg);
        // scope chains are short; the bound guards against cycles
        for _ in 0..16 {
            let Some(id) = node else { break };
            let Some(line) = module.metadata(id) else { break };
            node = loc.update(module, line);
            if !loc.filename.is_empty() && loc.line != 0 {
                break;
            }
        }
        loc
    }

    pub fn is_known(&self) -> bool {
        !self.filename.is_empty() && self.line != 0
    }

    //
    // Private Implementation
    //

    // Fills unset fields from one metadata node and returns the next node
    // to visit.
    fn update(&mut self, module: &Module, line: &str) -> Option<u64> {
        if let Some(c) = RE_LINE.captures(line) {
            if self.line == 0 {
                self.line = c[1].parse().unwrap_or(0);
            }
        }
        if let Some(c) = RE_COLUMN.captures(line) {
            if self.column == 0 {
                self.column = c[1].parse().unwrap_or(0);
            }
        }
        if line.contains("!DIFile(") {
            self.file_from(line);
            return None;
        }
        if let Some(c) = RE_FILE.captures(line) {
            if self.filename.is_empty() {
                if let Some(file_line) = c[1]
                    .parse::<u64>()
                    .ok()
                    .and_then(|id| module.metadata(id))
                {
                    self.file_from(file_line);
                }
            }
        }
        RE_SCOPE.captures(line).and_then(|c| c[1].parse().ok())
    }

    fn file_from(&mut self, line: &str) {
        if let Some(c) = RE_FILENAME.captures(line) {
            if self.directory.is_empty() {
                self.directory = c[2].to_string();
            }
            if self.filename.is_empty() {
                self.filename = format!("{}/{}", &c[2], &c[1]);
            }
        }
    }
}

lazy_static! {
    static ref RE_LINE: Regex = Regex::new(r"\bline: (\d+)").unwrap();
    static ref RE_COLUMN: Regex = Regex::new(r"\bcolumn: (\d+)").unwrap();
    static ref RE_SCOPE: Regex = Regex::new(r"\bscope: !(\d+)").unwrap();
    static ref RE_FILE: Regex = Regex::new(r"\bfile: !(\d+)").unwrap();
    static ref RE_FILENAME: Regex =
        Regex::new(r#"filename: "([^"]*)", directory: "([^"]*)""#).unwrap();
}
