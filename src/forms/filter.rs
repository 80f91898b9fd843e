// 🔎 Property Filter Bar
//
// Lot sizes arrive as numbers or as raw text from the input box.

use crate::forms::MAX_LAND_AREA;
use crate::schema::{
    as_number, boolean, number, object, string, truthy, unknown, ObjectSchema, Refinement, Schema,
    SchemaExt,
};

fn lot_size() -> Schema {
    number()
        .positive("Number must be greater than 0")
        .max(MAX_LAND_AREA, "Number must be less than or equal to 200000")
        .or(string())
        .optional()
}

pub fn filter_bar() -> ObjectSchema {
    object()
        .field("minLotSize", lot_size())
        .field("maxLotSize", lot_size())
        .field("inEnhancedReferralProcess", boolean().optional())
        .field("inSurplusPropertyProgram", boolean().optional())
        .field("surplusFilter", unknown().optional())
        .refine(
            Refinement::object("Must be greater than Min Lot Size", |data| {
                let min = data.get("minLotSize");
                let max = data.get("maxLotSize");
                if truthy(min) && truthy(max) {
                    return Some(as_number(max)? > as_number(min)?);
                }
                Some(true)
            })
            .at("maxLotSize"),
        )
        .refine(
            Refinement::object(
                "ERP or SPL Properties required when using the Surplus Properties filter.",
                |data| {
                    if !truthy(data.get("surplusFilter")) {
                        return Some(true);
                    }
                    Some(
                        truthy(data.get("inEnhancedReferralProcess"))
                            || truthy(data.get("inSurplusPropertyProgram")),
                    )
                },
            )
            .at_paths(&["inEnhancedReferralProcess", "inSurplusPropertyProgram"]),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validate(value: serde_json::Value) -> crate::schema::ValidationReport {
        Schema::from(filter_bar()).validate(&value)
    }

    #[test]
    fn test_max_lot_size_must_exceed_min() {
        assert!(validate(json!({ "minLotSize": 1, "maxLotSize": 5 })).is_valid());
        assert!(validate(json!({ "minLotSize": "1", "maxLotSize": "5" })).is_valid());
        assert_eq!(
            validate(json!({ "minLotSize": 5, "maxLotSize": 5 })).error_at("maxLotSize"),
            Some("Must be greater than Min Lot Size")
        );
        // only one bound supplied
        assert!(validate(json!({ "maxLotSize": 5 })).is_valid());
    }

    #[test]
    fn test_unparseable_lot_sizes_fail_closed() {
        let report = validate(json!({ "minLotSize": "small", "maxLotSize": "5" }));
        assert_eq!(report.error_at("maxLotSize"), Some("Must be greater than Min Lot Size"));
    }

    #[test]
    fn test_lot_size_range() {
        assert_eq!(
            validate(json!({ "minLotSize": -1 })).error_at("minLotSize"),
            Some("Number must be greater than 0")
        );
        assert!(validate(json!({ "maxLotSize": 300000 })).has_error("maxLotSize"));
    }

    #[test]
    fn test_surplus_filter_needs_a_program() {
        let report = validate(json!({ "surplusFilter": true }));
        assert!(report.has_error("inEnhancedReferralProcess"));
        assert!(report.has_error("inSurplusPropertyProgram"));

        assert!(validate(json!({ "surplusFilter": true, "inSurplusPropertyProgram": true })).is_valid());
        assert!(validate(json!({ "surplusFilter": false })).is_valid());
    }
}
