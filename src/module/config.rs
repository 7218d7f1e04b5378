/// Options controlling how a module is loaded and traversed.
#[derive(Clone, Debug)]
pub struct Config {
    /// Entry functions of the analysis.
    pub entry_funcs: Vec<String>,
    /// Callees whose name contains one of these fragments are not entered.
    pub skip_funcs: Vec<String>,
    /// Whether to clone ordering-parameterized wrappers before analysis.
    pub expand: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            entry_funcs: vec!["main".to_string()],
            skip_funcs: vec![
                "pthread_".to_string(),
                "__assert_fail".to_string(),
                "llvm.".to_string(),
                "_VERIFIER".to_string(),
            ],
            expand: true,
        }
    }
}
