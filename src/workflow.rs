// 🔄 Project Workflow - every change that can move a rollup goes through here
//
// attach / detach / record / replace / remove / fiscal year
//   → mutate → recompute (rollup + financial date)
//
// A project is consistent when its derived fields equal a fresh recompute.
// Terminal projects reject mutations and are never recomputed.

use crate::entities::{FinancialRecord, FinancialRollup, Project, ProjectStatus, Property};
use crate::error::WorkflowError;
use crate::financials::{FinancialAggregator, Recompute};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct ProjectWorkflow {
    aggregator: FinancialAggregator,
}

impl ProjectWorkflow {
    pub fn new(aggregator: FinancialAggregator) -> Self {
        ProjectWorkflow { aggregator }
    }

    pub fn aggregator(&self) -> &FinancialAggregator {
        &self.aggregator
    }

    // ========================================================================
    // PROPERTY MEMBERSHIP
    // ========================================================================

    pub fn attach(
        &self,
        project: &mut Project,
        property: Property,
    ) -> Result<FinancialRollup, WorkflowError> {
        project.ensure_mutable()?;
        if project.property(property.id).is_some() {
            return Err(WorkflowError::AlreadyAttached {
                project_id: project.id,
                property_id: property.id,
            });
        }

        info!(
            project_id = project.id,
            property_id = property.id,
            kind = property.kind.label(),
            "Attaching property"
        );
        project.push_property(property);
        Ok(self.refresh(project))
    }

    pub fn detach(
        &self,
        project: &mut Project,
        property_id: i64,
    ) -> Result<Property, WorkflowError> {
        project.ensure_mutable()?;
        let property = project
            .take_property(property_id)
            .ok_or(WorkflowError::NotAttached {
                project_id: project.id,
                property_id,
            })?;

        info!(project_id = project.id, property_id, "Detached property");
        self.refresh(project);
        Ok(property)
    }

    // ========================================================================
    // FINANCIAL HISTORY
    // ========================================================================

    /// Append a record to an attached property; returns its index.
    pub fn record_financial(
        &self,
        project: &mut Project,
        property_id: i64,
        record: FinancialRecord,
    ) -> Result<usize, WorkflowError> {
        let index = Self::attached_mut(project, property_id)?.record_financial(record)?;
        self.refresh(project);
        Ok(index)
    }

    /// Replace a record in place; returns the previous record.
    pub fn replace_financial(
        &self,
        project: &mut Project,
        property_id: i64,
        index: usize,
        record: FinancialRecord,
    ) -> Result<FinancialRecord, WorkflowError> {
        let previous = Self::attached_mut(project, property_id)?.replace_financial(index, record)?;
        self.refresh(project);
        Ok(previous)
    }

    pub fn remove_financial(
        &self,
        project: &mut Project,
        property_id: i64,
        index: usize,
    ) -> Result<FinancialRecord, WorkflowError> {
        let removed = Self::attached_mut(project, property_id)?.remove_financial(index)?;
        self.refresh(project);
        Ok(removed)
    }

    pub fn set_fiscal_year(
        &self,
        project: &mut Project,
        fiscal_year: i32,
    ) -> Result<FinancialRollup, WorkflowError> {
        project.ensure_mutable()?;
        project.set_fiscal_year(fiscal_year);
        Ok(self.refresh(project))
    }

    // ========================================================================
    // STATUS
    // ========================================================================

    /// Move to `to`. Entering a terminal status recomputes one last time;
    /// leaving one is refused.
    pub fn transition(
        &self,
        project: &mut Project,
        to: ProjectStatus,
    ) -> Result<(), WorkflowError> {
        let from = project.status();
        if from == to {
            return Ok(());
        }

        if from.is_terminal() {
            warn!(project_id = project.id, %from, %to, "Refusing to leave terminal status");
            return Err(WorkflowError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        if to.is_terminal() {
            self.refresh(project);
        }

        project.set_status(to);
        info!(project_id = project.id, %from, %to, "Project status changed");
        Ok(())
    }

    // ========================================================================
    // RECOMPUTE
    // ========================================================================

    /// Explicit recompute command.
    pub fn recompute(&self, project: &mut Project) -> Recompute {
        self.recompute_at(project, Utc::now())
    }

    pub fn recompute_at(&self, project: &mut Project, now: DateTime<Utc>) -> Recompute {
        let outcome = self.aggregator.update_project_financials(project);
        if let Recompute::Updated(_) = outcome {
            let date = self.aggregator.compute_financial_date_at(project, now);
            project.set_financial_date(date);
        }
        outcome
    }

    fn refresh(&self, project: &mut Project) -> FinancialRollup {
        match self.recompute(project) {
            Recompute::Updated(rollup) => rollup,
            Recompute::Frozen => project.rollup(),
        }
    }

    fn attached_mut(
        project: &mut Project,
        property_id: i64,
    ) -> Result<&mut Property, WorkflowError> {
        project.ensure_mutable()?;
        let project_id = project.id;
        project
            .property_mut(property_id)
            .ok_or(WorkflowError::NotAttached {
                project_id,
                property_id,
            })
    }
}

// ============================================================================
// TESTS
// ============================================================================
