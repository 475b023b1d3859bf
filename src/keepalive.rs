//! # Keep-Alive Resolution
//!
//! Purpose: Decide whether pooling is active for a resource by walking an
//! ordered chain of scopes, most specific first. This replaces inherited
//! per-type settings with an explicit fallback chain: the first scope with
//! a declared value wins, and no declared value anywhere means "not pooled".

/// Ordered fallback chain of keep-alive scopes, most specific first.
#[derive(Debug, Clone)]
pub struct KeepaliveChain {
    scopes: Vec<Scope>,
}

#[derive(Debug, Clone)]
struct Scope {
    name: String,
    value: Option<bool>,
}

impl KeepaliveChain {
    /// Builds a chain from scope names ordered most specific first.
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        KeepaliveChain {
            scopes: scopes
                .into_iter()
                .map(|name| Scope {
                    name: name.into(),
                    value: None,
                })
                .collect(),
        }
    }

    /// Returns the first declared value in the chain, defaulting to false.
    pub fn resolve(&self) -> bool {
        self.scopes
            .iter()
            .find_map(|scope| scope.value)
            .unwrap_or(false)
    }

    /// Stores `value` at `scope`; `None` clears it so resolution falls
    /// through to a more general scope. Returns false when the scope is
    /// unknown to this chain.
    pub fn set(&mut self, scope: &str, value: Option<bool>) -> bool {
        match self.scopes.iter_mut().find(|slot| slot.name == scope) {
            Some(slot) => {
                slot.value = value;
                true
            }
            None => false,
        }
    }

    /// Returns the value declared directly at `scope`, ignoring fallback.
    pub fn get(&self, scope: &str) -> Option<bool> {
        self.scopes
            .iter()
            .find(|slot| slot.name == scope)
            .and_then(|slot| slot.value)
    }
}
