//! Error types for the storage model

use crate::location::SampleItemId;

/// Model-level errors raised while parsing or indexing server data
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Location type name not recognised
    #[error("unknown location type: {0}")]
    UnknownLocationType(String),

    /// Position schema hint not recognised
    #[error("unknown position schema: {0}")]
    UnknownPositionSchema(String),

    /// Aliquot references a parent that is not in the same result set
    #[error("aliquot {aliquot} references missing parent {parent}")]
    OrphanAliquot {
        aliquot: SampleItemId,
        parent: SampleItemId,
    },

    /// Aliquot parent chain loops back on itself
    #[error("aliquot parent chain of {0} is cyclic")]
    CyclicAliquot(SampleItemId),

    /// Node references a parent that was never indexed
    #[error("{kind} {id} references missing parent {parent}")]
    MissingParent {
        kind: String,
        id: String,
        parent: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orphan_display_names_both_ids() {
        let err = ModelError::OrphanAliquot {
            aliquot: SampleItemId::from("12"),
            parent: SampleItemId::from("7"),
        };
        assert_eq!(err.to_string(), "aliquot 12 references missing parent 7");
    }
}
