use crate::operation::OperationKind;

pub const DEFAULT_HASH_SEPARATOR: &str = "|";
pub const DEFAULT_FUNCTION_PREFIX: &str = "fn";

/// Options shared by every operation compiled for an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Operations compiled up front. The rest compile on first use.
    pub eager: Vec<OperationKind>,
    /// Joins the fragments of a hash template.
    pub hash_separator: String,
    /// Prefix of hoisted function names.
    pub function_prefix: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            eager: OperationKind::ALL.to_vec(),
            hash_separator: DEFAULT_HASH_SEPARATOR.to_string(),
            function_prefix: DEFAULT_FUNCTION_PREFIX.to_string(),
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nothing is compiled until first use.
    pub fn lazy() -> Self {
        Self {
            eager: Vec::new(),
            ..Self::default()
        }
    }

    pub fn with_eager(mut self, kinds: impl IntoIterator<Item = OperationKind>) -> Self {
        self.eager = kinds.into_iter().collect();
        self
    }

    pub fn with_hash_separator(mut self, separator: impl Into<String>) -> Self {
        self.hash_separator = separator.into();
        self
    }

    pub fn with_function_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.function_prefix = prefix.into();
        self
    }

    pub fn is_eager(&self, kind: OperationKind) -> bool {
        self.eager.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CompilerConfig::default();
        assert_eq!(config.hash_separator, DEFAULT_HASH_SEPARATOR);
        assert!(config.is_eager(OperationKind::Merge));
        assert_eq!(config.eager.len(), OperationKind::ALL.len());
    }

    #[test]
    fn test_builder() {
        let config = CompilerConfig::lazy()
            .with_eager([OperationKind::Hash])
            .with_hash_separator("::")
            .with_function_prefix("op");
        assert!(config.is_eager(OperationKind::Hash));
        assert!(!config.is_eager(OperationKind::Clone));
        assert_eq!(config.hash_separator, "::");
        assert_eq!(config.function_prefix, "op");
    }
}
