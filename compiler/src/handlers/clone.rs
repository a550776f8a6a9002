use morphstack_schema::{Naming, Var};

use super::{literal_layout, CopyValue, NestedLiteral};
use crate::chain::Chain;
use crate::operation::OperationKind;

/// Deep copy. Nested objects become fresh literals, every other value
/// (arrays included) is copied without frozen flags or trackers.
pub(super) fn chain() -> Chain {
    Chain::builder(OperationKind::Clone, literal_layout)
        .then(NestedLiteral::new(Var::Entity, Naming::Model, Naming::Model))
        .then(CopyValue::new(Var::Entity, Naming::Model, Naming::Model))
        .build()
}
