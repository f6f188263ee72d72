pub mod enums;
pub mod error;
pub mod trade;

pub mod instruments;
pub mod identifiers;
pub mod validation;

pub mod deserialization;
