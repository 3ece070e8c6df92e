//! Persistent evaluation scope of one terminal.

use std::collections::BTreeMap;

use super::Value;

#[derive(Debug, Clone, Default)]
struct Scope {
    bindings: BTreeMap<String, Value>,
}

/// Scoped variable environment with push/pop semantics.
///
/// The outermost scope is what persists between commands. Inner scopes
/// live only for the duration of a function call.
#[derive(Debug, Clone)]
pub struct Environment {
    scopes: Vec<Scope>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    /// Environment whose global scope is a copy of `bindings`.
    /// Spawned threads start from one of these.
    pub fn from_globals(bindings: BTreeMap<String, Value>) -> Self {
        Self {
            scopes: vec![Scope { bindings }],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Pop the innermost scope. The global scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Define a variable in the innermost scope.
    pub fn define(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.bindings.insert(name.to_string(), value);
        }
    }

    /// Look up a variable, innermost scope first.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.bindings.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn global_bindings(&self) -> &BTreeMap<String, Value> {
        &self.scopes[0].bindings
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
