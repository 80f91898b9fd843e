// 📝 Forms - concrete schemas and the wizards that compose them
//
// Conditional flags (property type, submission step, ...) travel in an
// explicit FormContext. Schemas are rebuilt per context, never read from
// ambient state.

pub mod admin;
pub mod filter;
pub mod project;
pub mod property;

use crate::config::ValidationConfig;
use crate::entities::ProjectStatus;
use crate::error::SchemaError;
use crate::schema::Schema;
use crate::wizard::{FormGraph, WizardStep};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::trace;

/// Exclusive upper bound for land and lot areas.
pub const MAX_LAND_AREA: f64 = 200_000.0;

// ============================================================================
// FORM CONTEXT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    Land,
    Building,
    Subdivision,
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "land" | "parcel" => Ok(PropertyType::Land),
            "building" => Ok(PropertyType::Building),
            "subdivision" => Ok(PropertyType::Subdivision),
            _ => Err(format!("unknown property type '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormContext {
    /// Year rejected by the financial-year rule
    pub current_year: i32,
    pub property_type: PropertyType,
    /// Exemption checkbox visible (and validated)
    pub submission_step: bool,
    pub enforce_subdivision_parcels: bool,
}

impl FormContext {
    pub fn new(current_year: i32) -> Self {
        FormContext {
            current_year,
            property_type: PropertyType::Land,
            submission_step: true,
            enforce_subdivision_parcels: true,
        }
    }

    pub fn from_config(config: &ValidationConfig) -> Self {
        FormContext::new(config.current_year())
            .with_subdivision_parcels(config.enforce_subdivision_parcels)
    }

    /// Context for a project form at `status`.
    pub fn for_project(config: &ValidationConfig, status: ProjectStatus) -> Self {
        FormContext::from_config(config).with_submission_step(status.is_submission_step())
    }

    pub fn with_property_type(mut self, property_type: PropertyType) -> Self {
        self.property_type = property_type;
        self
    }

    pub fn with_submission_step(mut self, submission_step: bool) -> Self {
        self.submission_step = submission_step;
        self
    }

    pub fn with_subdivision_parcels(mut self, enforce: bool) -> Self {
        self.enforce_subdivision_parcels = enforce;
        self
    }
}

// ============================================================================
// WIZARDS
// ============================================================================

/// Identification / Usage / Valuation; submit also checks the parcel schema.
pub fn land_wizard(ctx: &FormContext) -> Result<FormGraph, SchemaError> {
    let mut identification: Schema = property::land_identification().into();
    let mut submission = property::parcel_schema();
    attach_subdivision_rule(&mut identification, ctx);
    attach_subdivision_rule(&mut submission, ctx);

    FormGraph::builder("land")
        .step(WizardStep::Identification, identification)
        .step(WizardStep::Usage, property::land_usage())
        .step(WizardStep::Valuation, property::valuation(ctx))
        .submission(submission)
        .build()
}

/// Identification / Occupancy / Valuation.
pub fn building_wizard(ctx: &FormContext) -> Result<FormGraph, SchemaError> {
    FormGraph::builder("building")
        .step(WizardStep::Identification, property::building_information())
        .step(WizardStep::Occupancy, property::occupancy())
        .step(WizardStep::Valuation, property::building(ctx))
        .build()
}

/// Draft / SelectProperties / Documentation.
pub fn disposal_project_wizard(ctx: &FormContext) -> Result<FormGraph, SchemaError> {
    FormGraph::builder("disposal project")
        .step(WizardStep::Draft, project::project_draft())
        .step(WizardStep::SelectProperties, project::select_properties())
        .step(WizardStep::Documentation, project::exemption_request(ctx))
        .build()
}

fn attach_subdivision_rule(schema: &mut Schema, ctx: &FormContext) {
    if !ctx.enforce_subdivision_parcels {
        trace!("Subdivision parcels rule disabled");
        return;
    }
    let attached = schema.attach_deferred(
        property::SUBDIVISION_PARCELS_HOOK,
        property::subdivision_parcels_refinement(ctx.property_type),
    );
    trace!(attached, "Subdivision parcels rule attached");
}

// ============================================================================
// FORM KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormKind {
    Land,
    Building,
    Project,
}

impl FormKind {
    pub fn wizard(&self, ctx: &FormContext) -> Result<FormGraph, SchemaError> {
        match self {
            FormKind::Land => land_wizard(ctx),
            FormKind::Building => building_wizard(ctx),
            FormKind::Project => disposal_project_wizard(ctx),
        }
    }
}

impl fmt::Display for FormKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormKind::Land => "land",
            FormKind::Building => "building",
            FormKind::Project => "project",
        };
        f.write_str(name)
    }
}

impl FromStr for FormKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "land" | "parcel" | "subdivision" => Ok(FormKind::Land),
            "building" => Ok(FormKind::Building),
            "project" | "disposal" => Ok(FormKind::Project),
            _ => Err(format!("unknown form '{}', expected land, building or project", s)),
        }
    }
}
