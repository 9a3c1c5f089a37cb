//! Approval Portal Common Types
//!
//! Shared types used by the portal service and its storage backends.

pub mod field;
pub mod registration;

pub use field::{FieldDefinition, FieldDefinitionPatch, FieldKind, FieldValue, NewFieldDefinition};
pub use registration::{
    CustomValues, NewRegistration, Registration, RegistrationPatch, RegistrationStatus,
    UnknownStatus,
};
