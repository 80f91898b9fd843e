// 🏠 Property Forms - land, parcel and building schemas
//
// Legacy tolerance: several numeric fields still accept a non-empty string
// (older records stored them as text). Numeric text obeys the same range
// as a number.

use crate::forms::{FormContext, PropertyType, MAX_LAND_AREA};
use crate::schema::{
    array, boolean, null, number, object, string, truthy, unknown, ArraySchema, ObjectSchema,
    Pattern, Refinement, Schema, SchemaExt,
};
use serde_json::{Map, Value};

/// Deferred hook on `parcels`: filled by the wizard that knows the property type.
pub const SUBDIVISION_PARCELS_HOOK: &str = "subdivision-parcels";

/// 9 digits, optionally grouped by spaces or dashes.
pub const PID_PATTERN: &str = r"^\d{3}[\s-]?\d{3}[\s-]?\d{3}$";

/// Strict `###-###-###` used on the identification step.
pub const PID_STRICT_PATTERN: &str = r"^\d{3}-\d{3}-\d{3}$";

pub const POSTAL_PATTERN: &str = r"^[a-zA-Z][0-9][a-zA-Z][\s-]?[0-9][a-zA-Z][0-9]$";

/// Money with at most two decimals.
pub const VALUE_PATTERN: &str = r"^\d+(\.\d{1,2})?$";

/// Lookup ids are digit strings.
pub const ID_PATTERN: &str = r"^\d*$";

const FINANCIAL_KINDS: [&str; 4] = ["assessed", "appraised", "netbook", "market"];

fn at_most(length: usize) -> String {
    format!("String must contain at most {} character(s)", length)
}

fn at_least_number(min: f64) -> String {
    format!("Number must be greater than or equal to {}", min)
}

fn at_most_number(max: f64) -> String {
    format!("Number must be less than or equal to {}", max)
}

// ============================================================================
// ADDRESS
// ============================================================================

pub fn address() -> ObjectSchema {
    let postal = Pattern::new(POSTAL_PATTERN);

    object()
        .field(
            "line1",
            string()
                .max_length(150, "Address must be less then 150 characters")
                .non_empty("Required"),
        )
        .field(
            "line2",
            string()
                .max_length(150, "Address must be less then 150 characters")
                .optional(),
        )
        .field(
            "administrativeArea",
            string()
                .pattern(ID_PATTERN, "Invalid Location")
                .non_empty("Required")
                .nullable()
                .optional(),
        )
        .field("provinceId", string().non_empty("Required"))
        .field(
            "postal",
            string().optional().refine(Refinement::new("Invalid Postal Code", move |value| {
                match value {
                    None => Some(true),
                    Some(Value::String(text)) => Some(text.is_empty() || postal.is_match(text)),
                    Some(_) => None,
                }
            })),
        )
}

// ============================================================================
// FINANCIALS
// ============================================================================

pub fn financial() -> ObjectSchema {
    object()
        .field("year", number().optional())
        .field("date", string().nullable().optional())
        .field("key", string().nullable().optional())
        .field(
            "value",
            string()
                .pattern(VALUE_PATTERN, "Only two decimal places are allowed")
                .or(null()),
        )
}

/// One fiscal year of the four tracked kinds.
pub fn financial_year() -> ObjectSchema {
    FINANCIAL_KINDS
        .iter()
        .fold(object(), |schema, kind| schema.field(kind, financial()))
}

/// `Some(false)` when any kind carries `current_year`. Fails closed when a
/// kind is missing.
fn year_is_not_current(entry: &Map<String, Value>, current_year: i32) -> Option<bool> {
    for kind in FINANCIAL_KINDS {
        let financial = entry.get(kind)?.as_object()?;
        if financial.get("year").and_then(Value::as_f64) == Some(f64::from(current_year)) {
            return Some(false);
        }
    }
    Some(true)
}

/// Current-year figures are not final and cannot be entered.
pub fn not_current_year(current_year: i32, message: &str) -> Refinement {
    Refinement::object(message, move |entry| year_is_not_current(entry, current_year))
}

// ============================================================================
// BUILDING
// ============================================================================

pub fn occupancy() -> ObjectSchema {
    object()
        .field(
            "rentableArea",
            number()
                .min(1.0, "Net Usable Area must be greater than 0")
                .optional(),
        )
        .field("totalArea", number().optional())
        .field(
            "buildingTenancy",
            string()
                .max_length(100, "Tenancy must be less than 100 characters")
                .optional(),
        )
        .field("buildingTenancyUpdatedOn", string().nullable().optional())
        .refine(
            Refinement::object("Invalid data", |data| {
                let rentable = data.get("rentableArea");
                let total = data.get("totalArea");
                let areas_ok = if truthy(rentable) && truthy(total) {
                    rentable?.as_f64()? <= total?.as_f64()?
                } else {
                    true
                };

                let tenancy_ok = match data.get("buildingTenancy") {
                    None => true,
                    Some(Value::String(tenancy)) if tenancy.is_empty() => true,
                    Some(Value::String(_)) => {
                        !matches!(data.get("buildingTenancyUpdatedOn"), Some(Value::Null))
                    }
                    Some(_) => return None,
                };

                Some(areas_ok && tenancy_ok)
            })
            .at_paths(&["rentableArea", "totalArea", "buildingTenancyUpdatedOn"]),
        )
}

pub fn building_information() -> ObjectSchema {
    object()
        .field(
            "name",
            string()
                .max_length(150, "Name must be less than 150 characters")
                .nullable()
                .optional(),
        )
        .field(
            "description",
            string()
                .max_length(2000, "Description must be less than 2000 characters")
                .nullable()
                .optional(),
        )
        .field(
            "latitude",
            number()
                .min(-90.0, "Invalid Latitude")
                .max(90.0, "Invalid Latitude")
                .optional(),
        )
        .field(
            "longitude",
            number()
                .min(-180.0, "Invalid Longitude")
                .max(180.0, "Invalid Longitude")
                .optional(),
        )
        .field(
            "buildingConstructionTypeId",
            string()
                .pattern(ID_PATTERN, "Invalid Building Construction Type")
                .nullable()
                .optional(),
        )
        .field(
            "buildingPredominateUseId",
            string()
                .pattern(ID_PATTERN, "Invalid Building Predominate Use")
                .nullable()
                .optional(),
        )
        .field(
            "classificationId",
            string()
                .pattern(ID_PATTERN, "Invalid Building Classification Id")
                .or(number())
                .nullable()
                .optional(),
        )
        .field(
            "buildingFloorCount",
            number()
                .min(0.0, "Floor Count must be a valid number")
                .optional(),
        )
        .field("address", address())
        .field("agencyId", number().optional())
        .field("isSensitive", boolean().or(string()).nullable().optional())
        .refine(
            Refinement::object("Required", |data| {
                let present = |field: &str| data.contains_key(field);
                let not_null = |field: &str| !matches!(data.get(field), Some(Value::Null));
                Some(
                    present("latitude")
                        && present("longitude")
                        && not_null("buildingConstructionTypeId")
                        && not_null("buildingPredominateUseId")
                        && not_null("classificationId")
                        && present("agencyId")
                        && not_null("isSensitive"),
                )
            })
            .at_paths(&[
                "latitude",
                "longitude",
                "buildingConstructionTypeId",
                "buildingPredominateUseId",
                "classificationId",
                "agencyId",
                "isSensitive",
            ]),
        )
}

/// Building valuation: every yearly entry is checked against the current year.
pub fn building(ctx: &FormContext) -> ObjectSchema {
    object()
        .field("transferLeaseOnSale", boolean().optional())
        .field("leaseExpiry", string().nullable().optional())
        .field(
            "financials",
            array(financial_year().refine(not_current_year(
                ctx.current_year,
                "Year must not be the current year.",
            )))
            .optional(),
        )
}

// ============================================================================
// LAND
// ============================================================================

/// Required: a number in [0, 200000), or a non-empty (legacy) string.
pub fn land_area_schema() -> Schema {
    let range = || {
        number()
            .min(0.0, "Land Area must be a positive number")
            .less_than(MAX_LAND_AREA, "Please enter a valid number")
    };
    range().or(string().non_empty("Required").if_numeric(range()))
}

/// Required: boolean, or a non-empty (legacy) string.
pub fn is_sensitive() -> Schema {
    boolean().or(string().non_empty("Required"))
}

fn parcels_with_hook(element: impl Into<Schema>) -> ArraySchema {
    array(element).deferred(SUBDIVISION_PARCELS_HOOK)
}

pub fn land() -> ObjectSchema {
    object()
        .field(
            "classificationId",
            string()
                .non_empty("Required")
                .pattern(ID_PATTERN, "Invalid Classification")
                .or(number())
                .nullable()
                .optional(),
        )
        .field("address", address())
        .field(
            "name",
            string()
                .max_length(150, "Name must be less than 150 characters")
                .nullable()
                .optional(),
        )
        .field(
            "description",
            string()
                .max_length(2000, "Description must be less than 2000 characters")
                .nullable()
                .optional(),
        )
        .field(
            "administrativeArea",
            string()
                .max_length(250, "Location must be less than 250 characters")
                .nullable()
                .optional(),
        )
        .field(
            "zoning",
            string()
                .max_length(250, "Zoning must be less than 250 characters")
                .nullable()
                .optional(),
        )
        .field(
            "zoningPotential",
            string()
                .max_length(250, "Zoning Potential must be less than 250 characters")
                .nullable()
                .optional(),
        )
        .field(
            "landLegalDescription",
            string()
                .max_length(500, "Land Legal Description must be less than 500 characters")
                .nullable()
                .optional(),
        )
        .field(
            "latitude",
            number()
                .min(-90.0, "Invalid Latitude")
                .max(90.0, "Invalid Latitude"),
        )
        .field(
            "longitude",
            number()
                .min(-180.0, "Invalid Longitude")
                .max(180.0, "Invalid Longitude"),
        )
        .field("landArea", land_area_schema())
        .field("lotSize", number().optional())
        .field("isSensitive", is_sensitive())
        .field("parcels", parcels_with_hook(unknown()))
}

// ============================================================================
// PARCEL
// ============================================================================

/// A valid PID, or a PIN of at most 9 characters.
pub fn pid_or_pin() -> Refinement {
    let pid_pattern = Pattern::new(PID_PATTERN);

    Refinement::object("PID or PIN Required", move |data| {
        let pid_ok = match data.get("pid") {
            Some(Value::String(pid)) => !pid.is_empty() && pid_pattern.is_match(pid),
            _ => false,
        };
        let pin_ok = truthy(data.get("pin"))
            && match data.get("pin") {
                Some(Value::String(pin)) => pin.chars().count() <= 9,
                Some(Value::Number(pin)) => pin.to_string().len() <= 9,
                _ => false,
            };
        Some(pid_ok || pin_ok)
    })
    .at_paths(&["pid", "pin"])
}

pub fn parcel_identifier() -> ObjectSchema {
    object()
        .field("pid", string().optional())
        .field("pin", string().or(number()).optional())
        .field("buildings", array(unknown()))
        .field("financials", array(financial_year()).optional())
        .field("agencyId", number())
        .refine(pid_or_pin())
}

/// Parcel identification AND the full land schema.
pub fn parcel_schema() -> Schema {
    parcel_identifier().and(land())
}

pub fn associated_land_ownership() -> ObjectSchema {
    object()
        .field("type", number().integer("Expected integer, received float"))
        .refine(
            Refinement::object("Choose an option", |data| Some(data.contains_key("type")))
                .at("type"),
        )
}

pub fn land_usage() -> ObjectSchema {
    let id_pattern = Pattern::new(ID_PATTERN);

    object()
        .field("zoning", string().max_length(250, &at_most(250)).nullable().optional())
        .field(
            "zoningPotential",
            string().max_length(250, &at_most(250)).nullable().optional(),
        )
        .field(
            "classificationId",
            string()
                .nullable()
                .optional()
                .refine(Refinement::new("Invalid Classification", move |id| match id {
                    Some(Value::String(id)) => Some(!id.is_empty() && id_pattern.is_match(id)),
                    _ => Some(false),
                }))
                .refine(Refinement::new("Required", |id| {
                    Some(!matches!(id, None | Some(Value::Null)))
                }))
                .or(number()),
        )
}

pub fn valuation(ctx: &FormContext) -> ObjectSchema {
    let current_year = ctx.current_year;

    object().field(
        "financials",
        array(financial_year()).refine(Refinement::new(
            "Financial year must not be the current year.",
            move |financials| {
                for entry in financials?.as_array()? {
                    if !year_is_not_current(entry.as_object()?, current_year)? {
                        return Some(false);
                    }
                }
                Some(true)
            },
        )),
    )
}

/// Identification step of the land wizard.
pub fn land_identification() -> ObjectSchema {
    let strict_pid = Pattern::new(PID_STRICT_PATTERN);

    object()
        .field(
            "pid",
            string().optional().refine(
                Refinement::new("PID must be in the format ###-###-###", move |pid| match pid {
                    None => Some(true),
                    Some(Value::String(pid)) => Some(strict_pid.is_match(pid)),
                    Some(_) => None,
                }),
            ),
        )
        .field(
            "pin",
            string().or(number()).optional().refine(Refinement::new(
                "Please enter a valid PIN no longer than 9 digits.",
                |pin| match pin {
                    None => Some(true),
                    Some(Value::String(pin)) => Some(pin.chars().count() <= 9),
                    Some(_) => Some(false),
                },
            )),
        )
        .field("address", address())
        .field("name", string().max_length(150, &at_most(150)).nullable().optional())
        .field(
            "description",
            string().max_length(2000, &at_most(2000)).nullable().optional(),
        )
        .field(
            "landLegalDescription",
            string().max_length(500, &at_most(500)).nullable().optional(),
        )
        .field(
            "latitude",
            number()
                .min(-90.0, &at_least_number(-90.0))
                .max(90.0, &at_most_number(90.0))
                .nullable()
                .optional(),
        )
        .field(
            "longitude",
            number()
                .min(-180.0, &at_least_number(-180.0))
                .max(180.0, &at_most_number(180.0))
                .nullable()
                .optional(),
        )
        .field("landArea", land_area_schema())
        .field("agencyId", number().nullable().optional())
        .field("lotSize", number().nullable().optional())
        .field("isSensitive", is_sensitive())
        .field("parcels", parcels_with_hook(parcel_schema()))
}

/// Filled into `SUBDIVISION_PARCELS_HOOK`: a subdivision needs at least one
/// parent parcel.
pub fn subdivision_parcels_refinement(property_type: PropertyType) -> Refinement {
    Refinement::new("You must add at least one parent parcel", move |parcels| {
        if property_type != PropertyType::Subdivision {
            return Some(true);
        }
        Some(!parcels?.as_array()?.is_empty())
    })
}

pub fn associated_land() -> ObjectSchema {
    object().field(
        "data",
        object().field("parcels", array(parcel_schema())),
    )
}

// ============================================================================
// TESTS
// ============================================================================
