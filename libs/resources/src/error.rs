//! Error types for slot validation.

use thiserror::Error;

use crate::SlotName;

/// Errors that can occur when validating or normalizing slot vectors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlotError {
    /// A slot name is not registered and carries a non-zero quantity.
    #[error("unsupported resource slot(s): {}", format_names(.names))]
    UnsupportedResource { names: Vec<SlotName> },

    /// A slot name is empty, too long, or contains invalid characters.
    #[error("invalid slot name: '{0}'")]
    InvalidSlotName(String),

    /// A quantity failed to parse as a decimal.
    #[error("invalid quantity for slot '{name}': {message}")]
    InvalidQuantity { name: SlotName, message: String },

    /// A quantity that must be non-negative was negative.
    #[error("negative quantity for slot '{name}'")]
    NegativeQuantity { name: SlotName },
}

fn format_names(names: &[SlotName]) -> String {
    names
        .iter()
        .map(|n| n.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
