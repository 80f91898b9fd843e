// 📐 Shape Layer - Schema Validation
//
// Declarative schemas over JSON value trees:
//   leaves (string / number / boolean / null / unknown)
//   combinators (optional, nullable, union, all, refined)
//   containers (object with cross-field refinements, array with deferred hooks)
//
// Validation never fails with an error: it produces a ValidationReport,
// a mapping from dotted field path ("financials.0.assessed.year") to the
// first message reported for that path.

use crate::error::SchemaError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

const REQUIRED: &str = "Required";
const INVALID_INPUT: &str = "Invalid input";
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

// ============================================================================
// FIELD PATH
// ============================================================================

/// Dotted path into a value tree. The empty path is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn root() -> Self {
        FieldPath(String::new())
    }

    pub fn parse(raw: &str) -> Self {
        let segments: Vec<&str> = raw.split('.').filter(|s| !s.is_empty()).collect();
        FieldPath(segments.join("."))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, name: &str) -> Self {
        self.join(&FieldPath::parse(name))
    }

    pub fn index(&self, index: usize) -> Self {
        self.child(&index.to_string())
    }

    pub fn join(&self, other: &FieldPath) -> Self {
        match (self.is_root(), other.is_root()) {
            (true, _) => other.clone(),
            (_, true) => self.clone(),
            _ => FieldPath(format!("{}.{}", self.0, other.0)),
        }
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.').filter(|s| !s.is_empty())
    }

    pub fn first_segment(&self) -> Option<&str> {
        self.segments().next()
    }

    /// Segment-wise prefix test: "address" is a prefix of "address.postal"
    /// but not of "addressTo".
    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        if prefix.is_root() {
            return true;
        }
        self.0 == prefix.0
            || (self.0.starts_with(&prefix.0) && self.0[prefix.0.len()..].starts_with('.'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldPath {
    fn from(raw: &str) -> Self {
        FieldPath::parse(raw)
    }
}

// ============================================================================
// VALIDATION REPORT
// ============================================================================

/// Field path → message. The first message pushed for a path is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    errors: BTreeMap<FieldPath, String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &BTreeMap<FieldPath, String> {
        &self.errors
    }

    pub fn error_at(&self, path: &str) -> Option<&str> {
        self.errors.get(&FieldPath::parse(path)).map(String::as_str)
    }

    pub fn has_error(&self, path: &str) -> bool {
        self.error_at(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn push(&mut self, path: FieldPath, message: impl Into<String>) {
        self.errors.entry(path).or_insert_with(|| message.into());
    }

    pub fn merge(&mut self, other: ValidationReport) {
        for (path, message) in other.errors {
            self.push(path, message);
        }
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&FieldPath) -> bool,
    {
        self.errors.retain(|path, _| keep(path));
    }

    pub fn paths(&self) -> impl Iterator<Item = &FieldPath> {
        self.errors.keys()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            return writeln!(f, "✅ valid");
        }
        writeln!(f, "❌ {} field(s) invalid", self.errors.len())?;
        for (path, message) in &self.errors {
            let shown = if path.is_root() { "(form)" } else { path.as_str() };
            writeln!(f, "   {}: {}", shown, message)?;
        }
        Ok(())
    }
}

// ============================================================================
// LEAF CONSTRAINTS
// ============================================================================

/// Compiled regex. A pattern that does not compile never matches;
/// `Schema::verify` reports it.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Option<Regex>,
}

impl Pattern {
    pub fn new(source: &str) -> Self {
        Pattern {
            source: source.to_string(),
            regex: Regex::new(source).ok(),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.as_ref().map(|r| r.is_match(text)).unwrap_or(false)
    }

    pub fn is_valid(&self) -> bool {
        self.regex.is_some()
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

#[derive(Debug, Clone)]
pub enum StringCheck {
    NonEmpty(String),
    MinLength(usize, String),
    MaxLength(usize, String),
    Pattern(Pattern, String),
    Email(Pattern, String),
    /// Numeric text must also satisfy these number checks
    IfNumeric(NumberSchema),
}

#[derive(Debug, Clone)]
pub enum NumberCheck {
    Min(f64, String),
    Max(f64, String),
    LessThan(f64, String),
    Positive(String),
    Integer(String),
}

#[derive(Debug, Clone, Default)]
pub struct StringSchema {
    checks: Vec<StringCheck>,
}

impl StringSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn non_empty(mut self, message: &str) -> Self {
        self.checks.push(StringCheck::NonEmpty(message.to_string()));
        self
    }

    pub fn min_length(mut self, length: usize, message: &str) -> Self {
        self.checks.push(StringCheck::MinLength(length, message.to_string()));
        self
    }

    pub fn max_length(mut self, length: usize, message: &str) -> Self {
        self.checks.push(StringCheck::MaxLength(length, message.to_string()));
        self
    }

    pub fn pattern(mut self, source: &str, message: &str) -> Self {
        self.checks
            .push(StringCheck::Pattern(Pattern::new(source), message.to_string()));
        self
    }

    pub fn email(mut self, message: &str) -> Self {
        self.checks
            .push(StringCheck::Email(Pattern::new(EMAIL_PATTERN), message.to_string()));
        self
    }

    pub fn if_numeric(mut self, number: NumberSchema) -> Self {
        self.checks.push(StringCheck::IfNumeric(number));
        self
    }

    fn check(&self, text: &str, path: &FieldPath, report: &mut ValidationReport) {
        let length = text.chars().count();

        for check in &self.checks {
            match check {
                StringCheck::NonEmpty(message) if length == 0 => report.push(path.clone(), message),
                StringCheck::MinLength(min, message) if length < *min => {
                    report.push(path.clone(), message)
                }
                StringCheck::MaxLength(max, message) if length > *max => {
                    report.push(path.clone(), message)
                }
                StringCheck::Pattern(pattern, message) if !pattern.is_match(text) => {
                    report.push(path.clone(), message)
                }
                StringCheck::Email(pattern, message) if !pattern.is_match(text) => {
                    report.push(path.clone(), message)
                }
                StringCheck::IfNumeric(number) => {
                    if let Ok(parsed) = text.trim().parse::<f64>() {
                        number.check(parsed, path, report);
                    }
                }
                _ => {}
            }
        }
    }

    fn verify(&self) -> Result<(), SchemaError> {
        for check in &self.checks {
            if let StringCheck::Pattern(pattern, _) | StringCheck::Email(pattern, _) = check {
                if !pattern.is_valid() {
                    return Err(SchemaError::InvalidPattern {
                        pattern: pattern.source().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NumberSchema {
    checks: Vec<NumberCheck>,
}

impl NumberSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min(mut self, min: f64, message: &str) -> Self {
        self.checks.push(NumberCheck::Min(min, message.to_string()));
        self
    }

    pub fn max(mut self, max: f64, message: &str) -> Self {
        self.checks.push(NumberCheck::Max(max, message.to_string()));
        self
    }

    pub fn less_than(mut self, bound: f64, message: &str) -> Self {
        self.checks.push(NumberCheck::LessThan(bound, message.to_string()));
        self
    }

    pub fn positive(mut self, message: &str) -> Self {
        self.checks.push(NumberCheck::Positive(message.to_string()));
        self
    }

    pub fn integer(mut self, message: &str) -> Self {
        self.checks.push(NumberCheck::Integer(message.to_string()));
        self
    }

    fn check(&self, number: f64, path: &FieldPath, report: &mut ValidationReport) {
        for check in &self.checks {
            let failed = match check {
                NumberCheck::Min(min, _) => number < *min,
                NumberCheck::Max(max, _) => number > *max,
                NumberCheck::LessThan(bound, _) => number >= *bound,
                NumberCheck::Positive(_) => number <= 0.0,
                NumberCheck::Integer(_) => number.fract() != 0.0,
            };
            if failed {
                let message = match check {
                    NumberCheck::Min(_, m)
                    | NumberCheck::Max(_, m)
                    | NumberCheck::LessThan(_, m)
                    | NumberCheck::Positive(m)
                    | NumberCheck::Integer(m) => m,
                };
                report.push(path.clone(), message);
            }
        }
    }
}

// ============================================================================
// REFINEMENTS
// ============================================================================

type Predicate = Arc<dyn Fn(Option<&Value>) -> Option<bool> + Send + Sync>;

/// Predicate over a whole value, reported at zero or more paths.
///
/// `None` from the predicate means "could not evaluate" and counts as a
/// failure. With no paths the message lands on the refined value itself.
#[derive(Clone)]
pub struct Refinement {
    message: String,
    paths: Vec<FieldPath>,
    predicate: Predicate,
}

impl Refinement {
    pub fn new<F>(message: &str, predicate: F) -> Self
    where
        F: Fn(Option<&Value>) -> Option<bool> + Send + Sync + 'static,
    {
        Refinement {
            message: message.to_string(),
            paths: Vec::new(),
            predicate: Arc::new(predicate),
        }
    }

    /// Refinement over an object's fields.
    pub fn object<F>(message: &str, predicate: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Option<bool> + Send + Sync + 'static,
    {
        Refinement::new(message, move |value| match value {
            Some(Value::Object(map)) => predicate(map),
            _ => None,
        })
    }

    /// Builder: report at `path` (relative to the refined value)
    pub fn at(mut self, path: &str) -> Self {
        self.paths.push(FieldPath::parse(path));
        self
    }

    pub fn at_paths(mut self, paths: &[&str]) -> Self {
        self.paths.extend(paths.iter().map(|p| FieldPath::parse(p)));
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn paths(&self) -> &[FieldPath] {
        &self.paths
    }

    pub fn passes(&self, value: Option<&Value>) -> bool {
        (self.predicate)(value).unwrap_or(false)
    }

    fn apply(&self, value: Option<&Value>, path: &FieldPath, report: &mut ValidationReport) {
        if self.passes(value) {
            return;
        }
        if self.paths.is_empty() {
            report.push(path.clone(), &self.message);
        } else {
            for relative in &self.paths {
                report.push(path.join(relative), &self.message);
            }
        }
    }

    fn verify_against(&self, declared: &[String]) -> Result<(), SchemaError> {
        for path in &self.paths {
            let known = path
                .first_segment()
                .map(|root| declared.iter().any(|field| field == root))
                .unwrap_or(false);
            if !known {
                return Err(SchemaError::UnknownRefinementPath {
                    path: path.to_string(),
                    message: self.message.clone(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Refinement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Refinement")
            .field("message", &self.message)
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// CONTAINERS
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    fields: Vec<(String, Schema)>,
    refinements: Vec<Refinement>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, schema: impl Into<Schema>) -> Self {
        self.fields.push((name.to_string(), schema.into()));
        self
    }

    /// Cross-field rule, evaluated even when individual fields failed.
    pub fn refine(mut self, refinement: Refinement) -> Self {
        self.refinements.push(refinement);
        self
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Named slot for a rule that depends on where the schema is used.
#[derive(Debug, Clone)]
struct DeferredHook {
    name: String,
    refinement: Option<Refinement>,
}

#[derive(Debug, Clone)]
pub struct ArraySchema {
    element: Box<Schema>,
    min_items: Option<(usize, String)>,
    hooks: Vec<DeferredHook>,
}

impl ArraySchema {
    pub fn of(element: impl Into<Schema>) -> Self {
        ArraySchema {
            element: Box::new(element.into()),
            min_items: None,
            hooks: Vec::new(),
        }
    }

    pub fn min_items(mut self, count: usize, message: &str) -> Self {
        self.min_items = Some((count, message.to_string()));
        self
    }

    pub fn non_empty(self, message: &str) -> Self {
        self.min_items(1, message)
    }

    /// Declare a hook filled in later with `Schema::attach_deferred`.
    pub fn deferred(mut self, name: &str) -> Self {
        self.hooks.push(DeferredHook {
            name: name.to_string(),
            refinement: None,
        });
        self
    }
}

/// Whether a named deferred hook has been filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookStatus {
    pub name: String,
    pub attached: bool,
}

// ============================================================================
// SCHEMA
// ============================================================================

#[derive(Debug, Clone)]
pub enum Schema {
    /// Anything, including an absent value
    Unknown,
    Boolean,
    Null,
    String(StringSchema),
    Number(NumberSchema),
    Object(ObjectSchema),
    Array(ArraySchema),
    /// Absent is fine; present values go to the inner schema
    Optional(Box<Schema>),
    /// Null is fine; anything else goes to the inner schema
    Nullable(Box<Schema>),
    /// Accepted when any branch accepts
    Union(Vec<Schema>),
    /// Every part validated independently
    All(Vec<Schema>),
    Refined(Box<Schema>, Refinement),
}

pub fn string() -> StringSchema {
    StringSchema::new()
}

pub fn number() -> NumberSchema {
    NumberSchema::new()
}

pub fn boolean() -> Schema {
    Schema::Boolean
}

pub fn null() -> Schema {
    Schema::Null
}

pub fn unknown() -> Schema {
    Schema::Unknown
}

pub fn object() -> ObjectSchema {
    ObjectSchema::new()
}

pub fn array(element: impl Into<Schema>) -> ArraySchema {
    ArraySchema::of(element)
}

impl From<StringSchema> for Schema {
    fn from(schema: StringSchema) -> Self {
        Schema::String(schema)
    }
}

impl From<NumberSchema> for Schema {
    fn from(schema: NumberSchema) -> Self {
        Schema::Number(schema)
    }
}

impl From<ObjectSchema> for Schema {
    fn from(schema: ObjectSchema) -> Self {
        Schema::Object(schema)
    }
}

impl From<ArraySchema> for Schema {
    fn from(schema: ArraySchema) -> Self {
        Schema::Array(schema)
    }
}

/// Combinators available on every schema builder.
pub trait SchemaExt: Into<Schema> + Sized {
    fn optional(self) -> Schema {
        Schema::Optional(Box::new(self.into()))
    }

    fn nullable(self) -> Schema {
        Schema::Nullable(Box::new(self.into()))
    }

    fn or(self, other: impl Into<Schema>) -> Schema {
        match (self.into(), other.into()) {
            (Schema::Union(mut left), Schema::Union(right)) => {
                left.extend(right);
                Schema::Union(left)
            }
            (Schema::Union(mut left), right) => {
                left.push(right);
                Schema::Union(left)
            }
            (left, right) => Schema::Union(vec![left, right]),
        }
    }

    fn and(self, other: impl Into<Schema>) -> Schema {
        match self.into() {
            Schema::All(mut parts) => {
                parts.push(other.into());
                Schema::All(parts)
            }
            left => Schema::All(vec![left, other.into()]),
        }
    }

    fn refine(self, refinement: Refinement) -> Schema {
        Schema::Refined(Box::new(self.into()), refinement)
    }
}

impl<T: Into<Schema>> SchemaExt for T {}

impl Schema {
    /// Validate a whole value tree.
    pub fn validate(&self, value: &Value) -> ValidationReport {
        let mut report = ValidationReport::new();
        self.check(Some(value), &FieldPath::root(), &mut report);
        report
    }

    /// Validate `value` as if it sat at `path`. `None` is an absent value.
    pub fn check(&self, value: Option<&Value>, path: &FieldPath, report: &mut ValidationReport) {
        match self {
            Schema::Unknown => {}

            Schema::Boolean => {
                if !matches!(value, Some(Value::Bool(_))) {
                    report.push(path.clone(), mismatch("boolean", value));
                }
            }

            Schema::Null => {
                if !matches!(value, Some(Value::Null)) {
                    report.push(path.clone(), mismatch("null", value));
                }
            }

            Schema::String(string) => match value {
                Some(Value::String(text)) => string.check(text, path, report),
                other => report.push(path.clone(), mismatch("string", other)),
            },

            Schema::Number(number) => match value.and_then(Value::as_f64) {
                Some(parsed) => number.check(parsed, path, report),
                None => report.push(path.clone(), mismatch("number", value)),
            },

            Schema::Object(object) => match value {
                Some(Value::Object(map)) => {
                    for (name, field) in &object.fields {
                        field.check(map.get(name), &path.child(name), report);
                    }
                    for refinement in &object.refinements {
                        refinement.apply(value, path, report);
                    }
                }
                other => report.push(path.clone(), mismatch("object", other)),
            },

            Schema::Array(array) => match value {
                Some(Value::Array(items)) => {
                    if let Some((min, message)) = &array.min_items {
                        if items.len() < *min {
                            report.push(path.clone(), message);
                        }
                    }
                    for (index, item) in items.iter().enumerate() {
                        array.element.check(Some(item), &path.index(index), report);
                    }
                    for hook in &array.hooks {
                        match &hook.refinement {
                            Some(refinement) => refinement.apply(value, path, report),
                            None => {
                                let hook = hook.name.as_str();
                                trace!(hook, path = %path, "Deferred hook not attached")
                            }
                        }
                    }
                }
                other => report.push(path.clone(), mismatch("array", other)),
            },

            Schema::Optional(inner) => {
                if value.is_some() {
                    inner.check(value, path, report);
                }
            }

            Schema::Nullable(inner) => {
                if !matches!(value, Some(Value::Null)) {
                    inner.check(value, path, report);
                }
            }

            Schema::Union(branches) => {
                let mut first_failure: Option<ValidationReport> = None;
                let mut shaped = 0;

                for branch in branches.iter().filter(|b| b.accepts_shape(value)) {
                    shaped += 1;
                    let mut scratch = ValidationReport::new();
                    branch.check(value, path, &mut scratch);
                    if scratch.is_valid() {
                        return;
                    }
                    first_failure.get_or_insert(scratch);
                }

                match first_failure {
                    Some(failure) => report.merge(failure),
                    None if shaped == 0 && value.is_none() => report.push(path.clone(), REQUIRED),
                    None => report.push(path.clone(), INVALID_INPUT),
                }
            }

            Schema::All(parts) => {
                for part in parts {
                    part.check(value, path, report);
                }
            }

            Schema::Refined(inner, refinement) => {
                inner.check(value, path, report);
                if inner.accepts_shape(value) {
                    refinement.apply(value, path, report);
                }
            }
        }
    }

    /// Type-level match only: constraints and refinements are ignored.
    pub fn accepts_shape(&self, value: Option<&Value>) -> bool {
        match self {
            Schema::Unknown => true,
            Schema::Boolean => matches!(value, Some(Value::Bool(_))),
            Schema::Null => matches!(value, Some(Value::Null)),
            Schema::String(_) => matches!(value, Some(Value::String(_))),
            Schema::Number(_) => matches!(value, Some(Value::Number(_))),
            Schema::Object(_) => matches!(value, Some(Value::Object(_))),
            Schema::Array(_) => matches!(value, Some(Value::Array(_))),
            Schema::Optional(inner) => value.is_none() || inner.accepts_shape(value),
            Schema::Nullable(inner) => {
                matches!(value, Some(Value::Null)) || inner.accepts_shape(value)
            }
            Schema::Union(branches) => branches.iter().any(|b| b.accepts_shape(value)),
            Schema::All(parts) => parts.iter().all(|p| p.accepts_shape(value)),
            Schema::Refined(inner, _) => inner.accepts_shape(value),
        }
    }

    /// Top-level field names this schema declares (objects, and
    /// intersections / unions of objects).
    pub fn declared_fields(&self) -> Vec<String> {
        match self {
            Schema::Object(object) => object.field_names(),
            Schema::Optional(inner) | Schema::Nullable(inner) | Schema::Refined(inner, _) => {
                inner.declared_fields()
            }
            Schema::Union(parts) | Schema::All(parts) => {
                let mut fields: Vec<String> = Vec::new();
                for name in parts.iter().flat_map(Schema::declared_fields) {
                    if !fields.contains(&name) {
                        fields.push(name);
                    }
                }
                fields
            }
            _ => Vec::new(),
        }
    }

    /// Fill every deferred hook called `name`; returns how many were filled.
    ///
    /// Array element schemas are separate uses and are not descended into.
    pub fn attach_deferred(&mut self, name: &str, refinement: Refinement) -> usize {
        match self {
            Schema::Object(object) => object
                .fields
                .iter_mut()
                .map(|(_, field)| field.attach_deferred(name, refinement.clone()))
                .sum(),
            Schema::Array(array) => {
                let mut attached = 0;
                for hook in array.hooks.iter_mut().filter(|h| h.name == name) {
                    hook.refinement = Some(refinement.clone());
                    attached += 1;
                }
                attached
            }
            Schema::Optional(inner) | Schema::Nullable(inner) | Schema::Refined(inner, _) => {
                inner.attach_deferred(name, refinement)
            }
            Schema::Union(parts) | Schema::All(parts) => parts
                .iter_mut()
                .map(|part| part.attach_deferred(name, refinement.clone()))
                .sum(),
            _ => 0,
        }
    }

    pub fn deferred_hooks(&self) -> Vec<HookStatus> {
        let mut hooks = Vec::new();
        self.collect_hooks(&mut hooks);
        hooks
    }

    fn collect_hooks(&self, hooks: &mut Vec<HookStatus>) {
        match self {
            Schema::Object(object) => {
                for (_, field) in &object.fields {
                    field.collect_hooks(hooks);
                }
            }
            Schema::Array(array) => {
                hooks.extend(array.hooks.iter().map(|h| HookStatus {
                    name: h.name.clone(),
                    attached: h.refinement.is_some(),
                }));
            }
            Schema::Optional(inner) | Schema::Nullable(inner) | Schema::Refined(inner, _) => {
                inner.collect_hooks(hooks)
            }
            Schema::Union(parts) | Schema::All(parts) => {
                for part in parts {
                    part.collect_hooks(hooks);
                }
            }
            _ => {}
        }
    }

    /// Composition check: refinement paths name declared fields and every
    /// pattern compiles.
    pub fn verify(&self) -> Result<(), SchemaError> {
        match self {
            Schema::String(string) => string.verify(),
            Schema::Object(object) => {
                for (_, field) in &object.fields {
                    field.verify()?;
                }
                let declared = object.field_names();
                for refinement in &object.refinements {
                    refinement.verify_against(&declared)?;
                }
                Ok(())
            }
            Schema::Array(array) => {
                for refinement in array.hooks.iter().filter_map(|h| h.refinement.as_ref()) {
                    refinement.verify_against(&[])?;
                }
                array.element.verify()
            }
            Schema::Optional(inner) | Schema::Nullable(inner) => inner.verify(),
            Schema::Refined(inner, refinement) => {
                inner.verify()?;
                refinement.verify_against(&inner.declared_fields())
            }
            Schema::Union(parts) | Schema::All(parts) => parts.iter().try_for_each(Schema::verify),
            Schema::Unknown | Schema::Boolean | Schema::Null | Schema::Number(_) => Ok(()),
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(expected: &str, value: Option<&Value>) -> String {
    match value {
        None => REQUIRED.to_string(),
        Some(found) => format!("Expected {}, received {}", expected, kind_name(found)),
    }
}

/// Loose truthiness used by refinement predicates: absent, null, false,
/// zero and "" are falsy.
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(n)) => n.as_f64().map(|x| x != 0.0).unwrap_or(false),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Number, or text that parses as one.
pub fn as_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_path_operations() {
        let root = FieldPath::root();
        let year = root.child("financials").index(0).child("assessed.year");

        assert_eq!(year.as_str(), "financials.0.assessed.year");
        assert_eq!(year.first_segment(), Some("financials"));
        assert!(year.starts_with(&FieldPath::from("financials.0")));
        assert!(!FieldPath::from("addressTo").starts_with(&FieldPath::from("address")));
        assert!(year.starts_with(&root));
        assert_eq!(FieldPath::parse(".a..b."), FieldPath::from("a.b"));
    }

    #[test]
    fn test_report_keeps_first_message() {
        let mut report = ValidationReport::new();
        report.push(FieldPath::from("pid"), "first");
        report.push(FieldPath::from("pid"), "second");

        assert_eq!(report.error_at("pid"), Some("first"));
        assert_eq!(report.len(), 1);
    }

    #[test]
    fn test_missing_and_mistyped_fields() {
        let schema: Schema = object()
            .field("name", string().non_empty("A name is required"))
            .field("count", number())
            .into();

        let report = schema.validate(&json!({ "count": "three" }));
        assert_eq!(report.error_at("name"), Some("Required"));
        assert_eq!(report.error_at("count"), Some("Expected number, received string"));

        let report = schema.validate(&json!({ "name": "", "count": 3 }));
        assert_eq!(report.error_at("name"), Some("A name is required"));
        assert!(!report.has_error("count"));
    }

    #[test]
    fn test_optional_and_nullable() {
        let schema: Schema = object()
            .field("a", string().max_length(3, "too long").optional())
            .field("b", string().nullable())
            .into();

        assert!(schema.validate(&json!({ "b": null })).is_valid());
        // optional does not accept null
        assert!(schema.validate(&json!({ "a": null, "b": "x" })).has_error("a"));
        assert_eq!(
            schema.validate(&json!({ "a": "abcd", "b": "x" })).error_at("a"),
            Some("too long")
        );
    }

    #[test]
    fn test_union_reports_matching_branch() {
        let schema: Schema = object()
            .field(
                "landArea",
                number()
                    .min(0.0, "Land Area must be a positive number")
                    .or(string().non_empty("Required")),
            )
            .into();

        assert!(schema.validate(&json!({ "landArea": 5 })).is_valid());
        assert!(schema.validate(&json!({ "landArea": "any" })).is_valid());
        assert_eq!(
            schema.validate(&json!({ "landArea": -1 })).error_at("landArea"),
            Some("Land Area must be a positive number")
        );
        assert_eq!(
            schema.validate(&json!({ "landArea": "" })).error_at("landArea"),
            Some("Required")
        );
        assert_eq!(schema.validate(&json!({})).error_at("landArea"), Some("Required"));
        assert_eq!(
            schema.validate(&json!({ "landArea": true })).error_at("landArea"),
            Some("Invalid input")
        );
    }

    #[test]
    fn test_numeric_strings_obey_number_checks() {
        let schema: Schema = string()
            .non_empty("Required")
            .if_numeric(number().less_than(10.0, "too big"))
            .into();

        assert!(schema.validate(&json!("9")).is_valid());
        assert!(schema.validate(&json!("abc")).is_valid());
        assert_eq!(schema.validate(&json!("12")).error_at(""), Some("too big"));
    }

    #[test]
    fn test_object_refinement_runs_with_field_errors() {
        let schema: Schema = object()
            .field("pid", string().optional())
            .field("agencyId", number())
            .refine(
                Refinement::object("PID Required", |data| Some(truthy(data.get("pid"))))
                    .at("pid"),
            )
            .into();

        let report = schema.validate(&json!({}));
        assert_eq!(report.error_at("pid"), Some("PID Required"));
        assert_eq!(report.error_at("agencyId"), Some("Required"));
    }

    #[test]
    fn test_refinement_fails_closed() {
        let schema: Schema = number()
            .refine(Refinement::new("cannot evaluate", |_| None))
            .into();

        assert_eq!(schema.validate(&json!(1)).error_at(""), Some("cannot evaluate"));
    }

    #[test]
    fn test_refinement_skipped_when_shape_is_wrong() {
        let schema: Schema = string()
            .refine(Refinement::new("never", |_| Some(false)))
            .into();

        let report = schema.validate(&json!(4));
        assert_eq!(report.error_at(""), Some("Expected string, received number"));
    }

    #[test]
    fn test_all_validates_each_part() {
        let left = object().field("a", number());
        let right = object().field("b", boolean());
        let schema = left.and(right);

        let report = schema.validate(&json!({ "a": 1 }));
        assert!(!report.has_error("a"));
        assert_eq!(report.error_at("b"), Some("Required"));
        assert_eq!(schema.declared_fields(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_array_elements_and_min_items() {
        let schema: Schema = object()
            .field(
                "items",
                array(object().field("year", number())).non_empty("At least one"),
            )
            .into();

        assert_eq!(
            schema.validate(&json!({ "items": [] })).error_at("items"),
            Some("At least one")
        );
        let report = schema.validate(&json!({ "items": [{ "year": 1 }, { "year": "x" }] }));
        assert_eq!(report.error_at("items.1.year"), Some("Expected number, received string"));
        assert!(!report.has_error("items.0.year"));
    }

    #[test]
    fn test_deferred_hook_attached_at_use() {
        let mut schema: Schema = object()
            .field("parcels", array(unknown()).deferred("parcels"))
            .into();

        assert_eq!(
            schema.deferred_hooks(),
            vec![HookStatus { name: "parcels".to_string(), attached: false }]
        );
        assert!(schema.validate(&json!({ "parcels": [] })).is_valid());

        let attached = schema.attach_deferred(
            "parcels",
            Refinement::new("need one", |v| Some(!v?.as_array()?.is_empty())),
        );
        assert_eq!(attached, 1);
        assert!(schema.deferred_hooks()[0].attached);
        assert_eq!(
            schema.validate(&json!({ "parcels": [] })).error_at("parcels"),
            Some("need one")
        );
        assert_eq!(schema.attach_deferred("missing", Refinement::new("x", |_| None)), 0);
    }

    #[test]
    fn test_deferred_hook_not_attached_inside_elements() {
        let nested = object().field("parcels", array(unknown()).deferred("parcels"));
        let mut schema: Schema = object()
            .field("parcels", array(nested).deferred("parcels"))
            .into();

        assert_eq!(schema.attach_deferred("parcels", Refinement::new("x", |_| Some(false))), 1);
        let report = schema.validate(&json!({ "parcels": [{ "parcels": [] }] }));
        assert_eq!(report.error_at("parcels"), Some("x"));
        assert!(!report.has_error("parcels.0.parcels"));
    }

    #[test]
    fn test_verify_rejects_unknown_refinement_path() {
        let schema: Schema = object()
            .field("email", string().optional())
            .refine(Refinement::object("pair", |_| Some(true)).at_paths(&["email", "addressTo"]))
            .into();

        assert!(matches!(
            schema.verify(),
            Err(SchemaError::UnknownRefinementPath { ref path, .. }) if path == "addressTo"
        ));
    }

    #[test]
    fn test_verify_rejects_bad_pattern() {
        let schema: Schema = string().pattern("([0-9]", "bad").into();

        assert!(matches!(schema.verify(), Err(SchemaError::InvalidPattern { .. })));
        // a broken pattern never matches
        assert!(schema.validate(&json!("1")).has_error(""));
    }

    #[test]
    fn test_email_check() {
        let schema: Schema = string().email("Invalid email").into();

        assert!(schema.validate(&json!("ops@agency.ca")).is_valid());
        assert_eq!(schema.validate(&json!("ops@agency")).error_at(""), Some("Invalid email"));
        assert_eq!(schema.validate(&json!("a b@c.ca")).error_at(""), Some("Invalid email"));
        assert!(schema.verify().is_ok());
    }

    #[test]
    fn test_truthy_and_as_number() {
        assert!(!truthy(None));
        assert!(!truthy(Some(&json!(""))));
        assert!(!truthy(Some(&json!(0))));
        assert!(truthy(Some(&json!("0"))));
        assert_eq!(as_number(Some(&json!(" 12.5 "))), Some(12.5));
        assert_eq!(as_number(Some(&json!(true))), None);
    }
}
