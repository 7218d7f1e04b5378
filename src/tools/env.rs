use super::ToolsError;
use lazy_static::lazy_static;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

//
// Public Interface
//

/// A registered environment variable with its fallback value.
#[derive(Clone, Debug)]
pub struct Envvar {
    pub name: String,
    pub default: String,
    pub desc: String,
}

impl fmt::Display for Envvar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {} (fallback: {})", self.name, self.desc, self.default)
    }
}

/// Registers an environment variable with a default value and a
/// description. Registering the same key twice is a bug in the caller.
pub fn reg_env(key: &str, default: &str, desc: &str) {
    let mut vars = registry();
    if vars.contains_key(key) {
        panic!("Envvar '{}' already registered", key);
    }
    vars.insert(
        key.to_string(),
        Envvar {
            name: key.to_string(),
            default: default.to_string(),
            desc: desc.to_string(),
        },
    );
}

/// Returns the value of a registered environment variable, falling back to
/// its registered default. Unregistered keys are a bug in the caller.
pub fn get_env(key: &str) -> String {
    lookup_env(key).unwrap_or_else(|e| panic!("{}", e))
}

/// Returns the value of a registered environment variable, falling back to
/// its registered default.
pub fn lookup_env(key: &str) -> Result<String, ToolsError> {
    let vars = registry();
    let var = vars
        .get(key)
        .ok_or_else(|| ToolsError::UnknownEnvvar(key.to_string()))?;
    Ok(std::env::var(key).unwrap_or_else(|_| var.default.clone()))
}

/// True when the user did not override the variable.
pub fn is_default_env(key: &str) -> bool {
    if !registry().contains_key(key) {
        panic!("Envvar '{}' not registered", key);
    }
    std::env::var(key).is_err()
}

/// All registered environment variables, sorted by name.
pub fn envvars() -> Vec<Envvar> {
    registry().values().cloned().collect()
}

//
// Private Implementation
//

lazy_static! {
    static ref ENV_VARS: Mutex<BTreeMap<String, Envvar>> = Mutex::new(BTreeMap::new());
}

fn registry() -> std::sync::MutexGuard<'static, BTreeMap<String, Envvar>> {
    ENV_VARS.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        reg_env("VSYNCER_TEST_VAR", "fallback", "test variable");
        assert_eq!(lookup_env("VSYNCER_TEST_VAR").unwrap(), "fallback");
        assert!(is_default_env("VSYNCER_TEST_VAR"));
        assert!(envvars().iter().any(|v| v.name == "VSYNCER_TEST_VAR"));
    }

    #[test]
    fn unknown_keys_are_errors() {
        assert!(lookup_env("VSYNCER_NEVER_REGISTERED").is_err());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn double_registration_panics() {
        reg_env("VSYNCER_TEST_TWICE", "", "");
        reg_env("VSYNCER_TEST_TWICE", "", "");
    }
}
