// Entity Models
//
// Property: Parcel | Building sharing one financial history
// Project:  references properties and owns the derived rollups

pub mod project;
pub mod property;

pub use project::{FinancialRollup, Project, ProjectStatus};
pub use property::{FinancialKind, FinancialRecord, Property, PropertyKind};
