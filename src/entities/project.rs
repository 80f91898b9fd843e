// 📦 Project Entity - properties moving through disposition
//
// Identity: id + project number (never change)
// Derived:  estimated / net book / assessed rollups + financial date
//
// The derived fields are private and only written through the aggregator,
// so they cannot drift from the attached properties' histories.

use crate::entities::property::Property;
use crate::error::WorkflowError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// PROJECT STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectStatus {
    Draft,
    SelectProperties,
    UpdateInformation,
    RequiredDocumentation,
    Approval,
    Submitted,
    ExemptionReview,
    SurplusDeclared,
    Cancelled,
    Completed,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 10] = [
        ProjectStatus::Draft,
        ProjectStatus::SelectProperties,
        ProjectStatus::UpdateInformation,
        ProjectStatus::RequiredDocumentation,
        ProjectStatus::Approval,
        ProjectStatus::Submitted,
        ProjectStatus::ExemptionReview,
        ProjectStatus::SurplusDeclared,
        ProjectStatus::Cancelled,
        ProjectStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Draft => "Draft",
            ProjectStatus::SelectProperties => "SelectProperties",
            ProjectStatus::UpdateInformation => "UpdateInformation",
            ProjectStatus::RequiredDocumentation => "RequiredDocumentation",
            ProjectStatus::Approval => "Approval",
            ProjectStatus::Submitted => "Submitted",
            ProjectStatus::ExemptionReview => "ExemptionReview",
            ProjectStatus::SurplusDeclared => "SurplusDeclared",
            ProjectStatus::Cancelled => "Cancelled",
            ProjectStatus::Completed => "Completed",
        }
    }

    /// Cancelled and completed projects are read-mostly.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProjectStatus::Cancelled | ProjectStatus::Completed)
    }

    /// True while the submitter is still filling in the disposal wizard.
    /// From approval onwards the exemption checkbox is no longer shown.
    pub fn is_submission_step(&self) -> bool {
        matches!(
            self,
            ProjectStatus::Draft
                | ProjectStatus::SelectProperties
                | ProjectStatus::UpdateInformation
                | ProjectStatus::RequiredDocumentation
        )
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProjectStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| WorkflowError::InvalidTransition {
                from: "?".to_string(),
                to: s.to_string(),
            })
    }
}

// ============================================================================
// FINANCIAL ROLLUP
// ============================================================================

/// Project-level sums for the three rollup kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialRollup {
    pub estimated: Decimal,
    pub net_book: Decimal,
    pub assessed: Decimal,
}

impl FinancialRollup {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.estimated.is_zero() && self.net_book.is_zero() && self.assessed.is_zero()
    }
}

// ============================================================================
// PROJECT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub project_number: String,
    pub name: String,
    pub agency_id: i64,

    fiscal_year: i32,
    status: ProjectStatus,
    properties: Vec<Property>,

    estimated: Decimal,
    net_book: Decimal,
    assessed: Decimal,
    financial_date: Option<DateTime<Utc>>,
}

impl Project {
    /// New draft project with no properties and zero rollups.
    pub fn new(
        id: i64,
        project_number: impl Into<String>,
        name: impl Into<String>,
        agency_id: i64,
        fiscal_year: i32,
    ) -> Self {
        Project {
            id,
            project_number: project_number.into(),
            name: name.into(),
            agency_id,
            fiscal_year,
            status: ProjectStatus::Draft,
            properties: Vec::new(),
            estimated: Decimal::ZERO,
            net_book: Decimal::ZERO,
            assessed: Decimal::ZERO,
            financial_date: None,
        }
    }

    pub fn fiscal_year(&self) -> i32 {
        self.fiscal_year
    }

    pub fn status(&self) -> ProjectStatus {
        self.status
    }

    pub fn is_frozen(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, property_id: i64) -> Option<&Property> {
        self.properties.iter().find(|p| p.id == property_id)
    }

    pub fn estimated(&self) -> Decimal {
        self.estimated
    }

    pub fn net_book(&self) -> Decimal {
        self.net_book
    }

    pub fn assessed(&self) -> Decimal {
        self.assessed
    }

    pub fn rollup(&self) -> FinancialRollup {
        FinancialRollup {
            estimated: self.estimated,
            net_book: self.net_book,
            assessed: self.assessed,
        }
    }

    pub fn financial_date(&self) -> Option<DateTime<Utc>> {
        self.financial_date
    }

    // ------------------------------------------------------------------------
    // Crate-internal mutation: only the workflow and the aggregator call these
    // ------------------------------------------------------------------------

    pub(crate) fn ensure_mutable(&self) -> Result<(), WorkflowError> {
        if self.is_frozen() {
            return Err(WorkflowError::ProjectFrozen {
                project_id: self.id,
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn push_property(&mut self, property: Property) {
        self.properties.push(property);
    }

    pub(crate) fn take_property(&mut self, property_id: i64) -> Option<Property> {
        let position = self.properties.iter().position(|p| p.id == property_id)?;
        Some(self.properties.remove(position))
    }

    pub(crate) fn property_mut(&mut self, property_id: i64) -> Option<&mut Property> {
        self.properties.iter_mut().find(|p| p.id == property_id)
    }

    pub(crate) fn set_status(&mut self, status: ProjectStatus) {
        self.status = status;
    }

    pub(crate) fn set_fiscal_year(&mut self, fiscal_year: i32) {
        self.fiscal_year = fiscal_year;
    }

    pub(crate) fn apply_rollup(&mut self, rollup: FinancialRollup) {
        self.estimated = rollup.estimated;
        self.net_book = rollup.net_book;
        self.assessed = rollup.assessed;
    }

    pub(crate) fn set_financial_date(&mut self, date: DateTime<Utc>) {
        self.financial_date = Some(date);
    }

    /// Rebuild a project exactly as it was persisted.
    pub(crate) fn restore(
        head: Project,
        status: ProjectStatus,
        properties: Vec<Property>,
        rollup: FinancialRollup,
        financial_date: Option<DateTime<Utc>>,
    ) -> Project {
        let mut project = head;
        project.status = status;
        project.properties = properties;
        project.apply_rollup(rollup);
        project.financial_date = financial_date;
        project
    }
}

// ============================================================================
// TESTS
// ============================================================================
