// 📋 Disposal Project Forms - draft, property selection, documentation
//
// The exemption checkbox is only shown (and only validated) while the
// project is still being submitted; the rationale is required exactly when
// an exemption is requested, whatever the step.

use crate::forms::FormContext;
use crate::schema::{array, boolean, number, object, string, ObjectSchema, Refinement, SchemaExt};
use serde_json::Value;

pub fn project_draft() -> ObjectSchema {
    object()
        .field(
            "projectNumber",
            string()
                .max_length(25, "Project number must be less than 25 characters")
                .optional(),
        )
        .field(
            "name",
            string()
                .max_length(100, "Name must be less than 100 characters")
                .non_empty("Required"),
        )
        .field(
            "description",
            string()
                .max_length(1000, "Description must be less than 1000 characters")
                .nullable()
                .optional(),
        )
        .field("agencyId", number().min(1.0, "Invalid Agency"))
        .field(
            "fiscalYear",
            number()
                .integer("Fiscal year must be a whole number")
                .min(1900.0, "Invalid Fiscal Year"),
        )
        .field(
            "note",
            string()
                .max_length(2000, "Note must be less than 2000 characters")
                .nullable()
                .optional(),
        )
}

pub fn select_properties() -> ObjectSchema {
    object().field(
        "properties",
        array(object().field("id", number().integer("Invalid Property")))
            .non_empty("You must select at least one property"),
    )
}

/// Exemption request on the documentation step.
pub fn exemption_request(ctx: &FormContext) -> ObjectSchema {
    let schema = if ctx.submission_step {
        object().field("exemptionRequested", boolean().optional())
    } else {
        object()
    };

    schema
        .field(
            "exemptionRationale",
            string()
                .max_length(2000, "Rationale must be less than 2000 characters")
                .nullable()
                .optional(),
        )
        .refine(
            Refinement::object("Rationale is required when requesting an exemption", |data| {
                if !matches!(data.get("exemptionRequested"), Some(Value::Bool(true))) {
                    return Some(true);
                }
                let rationale = data.get("exemptionRationale").and_then(Value::as_str);
                Some(rationale.map(|r| !r.trim().is_empty()).unwrap_or(false))
            })
            .at("exemptionRationale"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use serde_json::json;

    fn documentation(submission_step: bool) -> Schema {
        exemption_request(&FormContext::new(2024).with_submission_step(submission_step)).into()
    }

    #[test]
    fn test_rationale_required_only_when_requested() {
        let schema = documentation(true);

        let report = schema.validate(&json!({ "exemptionRequested": true }));
        assert_eq!(
            report.error_at("exemptionRationale"),
            Some("Rationale is required when requesting an exemption")
        );

        assert!(schema
            .validate(&json!({ "exemptionRequested": true, "exemptionRationale": "Heritage site" }))
            .is_valid());
    }

    #[test]
    fn test_clearing_exemption_clears_error() {
        let schema = documentation(true);
        let value = json!({ "exemptionRequested": false, "exemptionRationale": "" });

        let first = schema.validate(&value);
        let second = schema.validate(&value);
        assert!(first.is_valid());
        assert_eq!(first, second);
    }

    #[test]
    fn test_checkbox_hidden_after_submission() {
        // a malformed checkbox is only reported while it is visible
        let value = json!({ "exemptionRequested": "yes" });
        assert!(documentation(true).validate(&value).has_error("exemptionRequested"));
        assert!(documentation(false).validate(&value).is_valid());

        assert!(!documentation(false).declared_fields().contains(&"exemptionRequested".to_string()));
    }

    #[test]
    fn test_requested_exemption_needs_rationale_after_submission() {
        let report = documentation(false).validate(&json!({ "exemptionRequested": true }));
        assert_eq!(
            report.error_at("exemptionRationale"),
            Some("Rationale is required when requesting an exemption")
        );
        assert!(documentation(false)
            .validate(&json!({ "exemptionRequested": true, "exemptionRationale": "Heritage site" }))
            .is_valid());
    }

    #[test]
    fn test_select_properties_requires_one() {
        let schema: Schema = select_properties().into();

        assert_eq!(
            schema.validate(&json!({ "properties": [] })).error_at("properties"),
            Some("You must select at least one property")
        );
        assert!(schema.validate(&json!({ "properties": [{ "id": 4 }] })).is_valid());
    }

    #[test]
    fn test_project_draft() {
        let schema: Schema = project_draft().into();

        assert!(schema
            .validate(&json!({ "name": "Surplus lots", "agencyId": 2, "fiscalYear": 2020 }))
            .is_valid());
        let report = schema.validate(&json!({ "name": "", "agencyId": 0, "fiscalYear": 2020.5 }));
        assert_eq!(report.error_at("name"), Some("Required"));
        assert_eq!(report.error_at("agencyId"), Some("Invalid Agency"));
        assert_eq!(report.error_at("fiscalYear"), Some("Fiscal year must be a whole number"));
    }
}
