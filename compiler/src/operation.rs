use std::fmt;

use morphstack_schema::{Value, Var};
use serde::{Deserialize, Serialize};

/// The eleven operations compiled for every entity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Clone,
    Compare,
    CompareIds,
    Deserialize,
    Enrich,
    Freeze,
    Hash,
    Merge,
    Prepare,
    Serialize,
    Strip,
}

impl OperationKind {
    pub const ALL: [OperationKind; 11] = [
        OperationKind::Clone,
        OperationKind::Compare,
        OperationKind::CompareIds,
        OperationKind::Deserialize,
        OperationKind::Enrich,
        OperationKind::Freeze,
        OperationKind::Hash,
        OperationKind::Merge,
        OperationKind::Prepare,
        OperationKind::Serialize,
        OperationKind::Strip,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Clone => "clone",
            OperationKind::Compare => "compare",
            OperationKind::CompareIds => "compareIds",
            OperationKind::Deserialize => "deserialize",
            OperationKind::Enrich => "enrich",
            OperationKind::Freeze => "freeze",
            OperationKind::Hash => "hash",
            OperationKind::Merge => "merge",
            OperationKind::Prepare => "prepare",
            OperationKind::Serialize => "serialize",
            OperationKind::Strip => "strip",
        }
    }

    /// Positional inputs of the compiled function.
    pub fn inputs(self) -> &'static [Var] {
        match self {
            OperationKind::Compare | OperationKind::CompareIds => &[Var::A, Var::B],
            OperationKind::Enrich => &[Var::Entity, Var::Mode],
            OperationKind::Hash => &[Var::Entity, Var::Mode],
            OperationKind::Merge => &[Var::Destination, Var::Source],
            OperationKind::Clone
            | OperationKind::Deserialize
            | OperationKind::Freeze
            | OperationKind::Prepare
            | OperationKind::Serialize
            | OperationKind::Strip => &[Var::Entity],
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which fields feed the hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashMode {
    /// Key fields only.
    Ids,
    /// Every hashed field.
    Object,
}

impl HashMode {
    pub fn as_str(self) -> &'static str {
        match self {
            HashMode::Ids => "ids",
            HashMode::Object => "object",
        }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value.as_str()? {
            "ids" => Some(HashMode::Ids),
            "object" => Some(HashMode::Object),
            _ => None,
        }
    }
}

impl From<HashMode> for Value {
    fn from(mode: HashMode) -> Self {
        Value::String(mode.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_matches_all_order() {
        for (i, kind) in OperationKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_value(OperationKind::CompareIds).unwrap(),
            serde_json::json!("compareIds")
        );
        assert_eq!(
            HashMode::from_value(&Value::from("ids")),
            Some(HashMode::Ids)
        );
        assert_eq!(HashMode::from_value(&Value::from("all")), None);
    }
}
