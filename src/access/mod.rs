//! View-based access control (RFC 3415)

pub mod vacm;

pub use vacm::{
    AccessEntry, ContextMatch, GroupEntry, VacmError, VacmTables, ViewFamilyEntry, ViewTreeKind,
    ViewType,
};
