//! Context configuration.
//!
//! Embedders that need something other than the defaults build a
//! `ContextConfig` and pass it to [`crate::ctx::Context::with_config`].

/// Tunables for a [`crate::ctx::Context`].
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Maximum reentrant call depth before the VM reports a runtime
    /// error instead of exhausting the host stack.
    pub max_call_depth: usize,

    /// Whether to register the standard library at construction.
    /// Disable for sandboxed embeddings that provide their own natives.
    pub load_stdlib: bool,
}

impl ContextConfig {
    pub fn new() -> Self {
        ContextConfig {
            max_call_depth: 256,
            load_stdlib: true,
        }
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn without_stdlib(mut self) -> Self {
        self.load_stdlib = false;
        self
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let config = ContextConfig::new().with_max_call_depth(16).without_stdlib();
        assert_eq!(config.max_call_depth, 16);
        assert!(!config.load_stdlib);
    }
}
