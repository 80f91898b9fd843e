// Disposition Core - Library
// Financial rollups for disposal projects + step-scoped form validation

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod financials;
pub mod forms;
pub mod logging;
pub mod schema;
pub mod wizard;
pub mod workflow;

// Re-export commonly used types
pub use config::{AggregatorConfig, AnchorPolicy, Config, ValidationConfig, YearMatch};
pub use db::{
    Event, ImportedRecord, RecordSource, setup_database, insert_project, insert_property,
    insert_financial_records, link_property, load_project, save_project_financials,
    verify_memberships, load_financials_csv, import_financials, insert_event,
    get_events_for_entity,
};
pub use entities::{
    FinancialKind, FinancialRecord, FinancialRollup, Project, ProjectStatus, Property,
    PropertyKind,
};
pub use error::{SchemaError, StoreError, StoreResult, WorkflowError};
pub use financials::{FinancialAggregator, Recompute};
pub use forms::{FormContext, FormKind, PropertyType};
pub use schema::{FieldPath, Schema, SchemaExt, ValidationReport};
pub use wizard::{FormGraph, ValidationScope, WizardStep};
pub use workflow::ProjectWorkflow;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
