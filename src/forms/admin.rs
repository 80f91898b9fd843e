// 👤 Admin Forms - access requests, users, agencies, administrative areas

use crate::schema::{boolean, number, object, string, truthy, ObjectSchema, Refinement, SchemaExt};

pub fn access_request() -> ObjectSchema {
    object()
        .field(
            "agency",
            number().min(1.0, "Invalid Agency").min(0.0, "Required"),
        )
        .field(
            "role",
            string().min_length(1, "Invalid Role").non_empty("Required"),
        )
        .field(
            "note",
            string().max_length(1000, "Note must be less than 1000 characters"),
        )
        .field(
            "user",
            object()
                .field("firstName", string().non_empty("Required"))
                .field("lastName", string().non_empty("Required"))
                .field(
                    "position",
                    string().max_length(100, "Note must be less than 100 characters"),
                ),
        )
}

pub fn user_update() -> ObjectSchema {
    object()
        .field(
            "email",
            string()
                .email("Invalid email format")
                .max_length(100, "Email must be less than 100 characters"),
        )
        .field(
            "firstName",
            string().max_length(100, "First Name must be less than 100 characters"),
        )
        .field(
            "lastName",
            string().max_length(100, "Last Name must be less than 100 characters"),
        )
}

/// `sendEmail` needs both an email address and an addressee.
pub fn agency_edit() -> ObjectSchema {
    object()
        .field(
            "email",
            string()
                .max_length(100, "Email must be less than 100 characters")
                .email("Please enter a valid email.")
                .optional(),
        )
        .field(
            "name",
            string()
                .max_length(100, "Agency name must be less than 100 characters")
                .non_empty("An agency name is required."),
        )
        .field(
            "addressTo",
            string()
                .max_length(100, "Email addressed to must be less than 100 characters")
                .optional(),
        )
        .field("code", string().non_empty("An agency code is required."))
        .field("sendEmail", boolean())
        .refine(
            Refinement::object("Email address and addressTo are required", |data| {
                let send = truthy(data.get("sendEmail"));
                Some(!(send && (!truthy(data.get("email")) || !truthy(data.get("addressTo")))))
            })
            .at_paths(&["email", "addressTo"]),
        )
}

pub fn administrative_area() -> ObjectSchema {
    object().field(
        "name",
        string().non_empty("A name is required for administrative areas"),
    )
}

pub fn user() -> ObjectSchema {
    object()
        .field(
            "email",
            string()
                .email("Invalid email")
                .max_length(100, "Email must be less than 100 characters")
                .non_empty("Required"),
        )
        .field(
            "firstName",
            string()
                .max_length(100, "First Name must be less than 100 characters")
                .non_empty("Required"),
        )
        .field(
            "middleName",
            string()
                .max_length(100, "Middle Name must be less than 100 characters")
                .optional(),
        )
        .field(
            "lastName",
            string()
                .max_length(100, "Last Name must be less than 100 characters")
                .non_empty("Required"),
        )
        .field("role", number().min(1.0, "Invalid Role").nullable().optional())
        .field("agency", number().min(1.0, "Invalid Agency").nullable().optional())
}
