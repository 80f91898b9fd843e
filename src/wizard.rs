// 🧭 Form Graph - step-scoped validation over a multi-step wizard
//
// Each step owns (claims) a set of top-level fields. Validation runs in
// one of three scopes:
//
//   Step(s)    only s's schema, only errors under fields s claims
//   Field(p)   the owning step's schema, only errors at p or below
//   Full       every step plus the submission schema, unfiltered
//
// so a step never reports a field it does not show, and full validation
// is a superset of every step.

use crate::error::SchemaError;
use crate::schema::{FieldPath, Schema, ValidationReport};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

// ============================================================================
// STEPS + SCOPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WizardStep {
    Identification,
    Usage,
    Valuation,
    Occupancy,
    Draft,
    SelectProperties,
    Documentation,
}

impl WizardStep {
    pub const ALL: [WizardStep; 7] = [
        WizardStep::Identification,
        WizardStep::Usage,
        WizardStep::Valuation,
        WizardStep::Occupancy,
        WizardStep::Draft,
        WizardStep::SelectProperties,
        WizardStep::Documentation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WizardStep::Identification => "identification",
            WizardStep::Usage => "usage",
            WizardStep::Valuation => "valuation",
            WizardStep::Occupancy => "occupancy",
            WizardStep::Draft => "draft",
            WizardStep::SelectProperties => "select-properties",
            WizardStep::Documentation => "documentation",
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WizardStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(&['_', ' '][..], "-");
        WizardStep::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == wanted || step.as_str().replace('-', "") == wanted)
            .ok_or_else(|| format!("unknown wizard step '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationScope {
    Full,
    Step(WizardStep),
    /// Single field (on blur)
    Field(FieldPath),
}

// ============================================================================
// FORM GRAPH
// ============================================================================

#[derive(Debug, Clone)]
struct StepEntry {
    step: WizardStep,
    schema: Schema,
    fields: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FormGraph {
    name: String,
    steps: Vec<StepEntry>,
    submission: Option<Schema>,
}

impl FormGraph {
    pub fn builder(name: &str) -> FormGraphBuilder {
        FormGraphBuilder {
            name: name.to_string(),
            steps: Vec::new(),
            submission: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Steps in wizard order
    pub fn steps(&self) -> Vec<WizardStep> {
        self.steps.iter().map(|entry| entry.step).collect()
    }

    pub fn has_step(&self, step: WizardStep) -> bool {
        self.entry(step).is_some()
    }

    pub fn step_fields(&self, step: WizardStep) -> Option<&[String]> {
        self.entry(step).map(|entry| entry.fields.as_slice())
    }

    /// Step whose screen shows the top-level field of `path`.
    pub fn owner_of(&self, path: &FieldPath) -> Option<WizardStep> {
        let root = path.first_segment()?;
        self.steps
            .iter()
            .find(|entry| entry.fields.iter().any(|field| field == root))
            .map(|entry| entry.step)
    }

    pub fn validate(&self, value: &Value, scope: &ValidationScope) -> ValidationReport {
        let report = match scope {
            ValidationScope::Full => self.validate_full(value),
            ValidationScope::Step(step) => match self.entry(*step) {
                Some(entry) => Self::validate_step(entry, value),
                None => {
                    warn!(form = %self.name, step = %step, "Step not part of form");
                    ValidationReport::new()
                }
            },
            ValidationScope::Field(path) => {
                let mut report = match self.owner_of(path).and_then(|step| self.entry(step)) {
                    Some(entry) => entry.schema.validate(value),
                    None => self.validate_full(value),
                };
                report.retain(|error_path| error_path.starts_with(path));
                report
            }
        };

        debug!(
            form = %self.name,
            scope = ?scope,
            errors = report.len(),
            "Form validated"
        );
        report
    }

    fn entry(&self, step: WizardStep) -> Option<&StepEntry> {
        self.steps.iter().find(|entry| entry.step == step)
    }

    fn validate_step(entry: &StepEntry, value: &Value) -> ValidationReport {
        let mut report = entry.schema.validate(value);
        report.retain(|path| {
            path.first_segment()
                .map(|root| entry.fields.iter().any(|field| field == root))
                .unwrap_or(false)
        });
        report
    }

    fn validate_full(&self, value: &Value) -> ValidationReport {
        let mut report = ValidationReport::new();
        for entry in &self.steps {
            report.merge(entry.schema.validate(value));
        }
        if let Some(submission) = &self.submission {
            report.merge(submission.validate(value));
        }
        report
    }
}

// ============================================================================
// BUILDER
// ============================================================================

pub struct FormGraphBuilder {
    name: String,
    steps: Vec<(WizardStep, Schema, Option<Vec<String>>)>,
    submission: Option<Schema>,
}

impl FormGraphBuilder {
    /// Add a step that claims every field its schema declares.
    pub fn step(mut self, step: WizardStep, schema: impl Into<Schema>) -> Self {
        self.steps.push((step, schema.into(), None));
        self
    }

    /// Add a step that claims only `fields`.
    pub fn step_fields(
        mut self,
        step: WizardStep,
        schema: impl Into<Schema>,
        fields: &[&str],
    ) -> Self {
        let fields = fields.iter().map(|f| f.to_string()).collect();
        self.steps.push((step, schema.into(), Some(fields)));
        self
    }

    /// Schema checked only on full (submit) validation.
    pub fn submission(mut self, schema: impl Into<Schema>) -> Self {
        self.submission = Some(schema.into());
        self
    }

    pub fn build(self) -> Result<FormGraph, SchemaError> {
        if self.steps.is_empty() {
            return Err(SchemaError::EmptyGraph(self.name));
        }

        let mut entries: Vec<StepEntry> = Vec::with_capacity(self.steps.len());

        for (step, schema, claimed) in self.steps {
            if entries.iter().any(|entry| entry.step == step) {
                return Err(SchemaError::DuplicateStep(step.to_string()));
            }

            schema.verify()?;
            let declared = schema.declared_fields();

            let fields = match claimed {
                Some(fields) => {
                    if let Some(field) = fields.iter().find(|f| !declared.contains(f)) {
                        return Err(SchemaError::UndeclaredStepField {
                            step: step.to_string(),
                            field: field.clone(),
                        });
                    }
                    fields
                }
                None => declared,
            };

            for field in &fields {
                if let Some(owner) = entries.iter().find(|entry| entry.fields.contains(field)) {
                    return Err(SchemaError::DuplicateStepField {
                        field: field.clone(),
                        first: owner.step.to_string(),
                        second: step.to_string(),
                    });
                }
            }

            entries.push(StepEntry { step, schema, fields });
        }

        if let Some(submission) = &self.submission {
            submission.verify()?;
        }

        Ok(FormGraph {
            name: self.name,
            steps: entries,
            submission: self.submission,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{number, object, string, SchemaExt};
    use serde_json::json;

    fn create_test_graph() -> FormGraph {
        FormGraph::builder("test")
            .step(
                WizardStep::Identification,
                object()
                    .field("name", string().non_empty("Required"))
                    .field("address", object().field("line1", string().non_empty("Required"))),
            )
            .step(WizardStep::Valuation, object().field("value", number().min(0.0, "Too small")))
            .submission(object().field("agencyId", number()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_step_scope_only_reports_own_fields() {
        let graph = create_test_graph();
        let value = json!({ "name": "", "value": -1 });

        let report = graph.validate(&value, &ValidationScope::Step(WizardStep::Valuation));
        assert_eq!(report.error_at("value"), Some("Too small"));
        assert!(!report.has_error("name"));
        assert!(!report.has_error("agencyId"));
    }

    #[test]
    fn test_full_scope_is_superset() {
        let graph = create_test_graph();
        let value = json!({ "name": "", "value": -1 });

        let full = graph.validate(&value, &ValidationScope::Full);
        for step in graph.steps() {
            let partial = graph.validate(&value, &ValidationScope::Step(step));
            for (path, message) in partial.errors() {
                assert_eq!(full.errors().get(path), Some(message));
            }
        }
        assert_eq!(full.error_at("agencyId"), Some("Required"));
    }

    #[test]
    fn test_field_scope_keeps_descendants() {
        let graph = create_test_graph();
        let value = json!({ "name": "", "address": {}, "value": -1 });

        let report = graph.validate(&value, &ValidationScope::Field(FieldPath::from("address")));
        assert_eq!(report.error_at("address.line1"), Some("Required"));
        assert_eq!(report.len(), 1);
        assert_eq!(graph.owner_of(&FieldPath::from("address.line1")), Some(WizardStep::Identification));
    }

    #[test]
    fn test_unknown_step_reports_nothing() {
        let graph = create_test_graph();
        let report = graph.validate(&json!({}), &ValidationScope::Step(WizardStep::Usage));
        assert!(report.is_valid());
        assert!(!graph.has_step(WizardStep::Usage));
        assert!(graph.has_step(WizardStep::Valuation));
    }

    #[test]
    fn test_build_rejects_malformed_graphs() {
        assert!(matches!(
            FormGraph::builder("empty").build(),
            Err(SchemaError::EmptyGraph(_))
        ));

        let twice = FormGraph::builder("twice")
            .step(WizardStep::Draft, object().field("a", number()))
            .step(WizardStep::Draft, object().field("b", number()))
            .build();
        assert!(matches!(twice, Err(SchemaError::DuplicateStep(_))));

        let shared = FormGraph::builder("shared")
            .step(WizardStep::Draft, object().field("a", number()))
            .step(WizardStep::Documentation, object().field("a", number().optional()))
            .build();
        assert!(matches!(shared, Err(SchemaError::DuplicateStepField { .. })));

        let undeclared = FormGraph::builder("undeclared")
            .step_fields(WizardStep::Draft, object().field("a", number()), &["b"])
            .build();
        assert!(matches!(undeclared, Err(SchemaError::UndeclaredStepField { .. })));
    }

    #[test]
    fn test_step_parse() {
        assert_eq!("Usage".parse::<WizardStep>().unwrap(), WizardStep::Usage);
        assert_eq!("select_properties".parse::<WizardStep>().unwrap(), WizardStep::SelectProperties);
        assert_eq!("selectproperties".parse::<WizardStep>().unwrap(), WizardStep::SelectProperties);
        assert!("review".parse::<WizardStep>().is_err());
    }
}
