//! Filter compilation.
//!
//! Two authoring modes feed the `filter_by` expression:
//!
//! - **Structured**: per-field widgets. Numeric fields take a `min`/`max`
//!   range, string fields take a prefix. [`StructuredDraft::compile`] turns
//!   them into one expression:
//!
//!   | Constraint | Fragment |
//!   |------------|----------|
//!   | min and max | `field:[min..max]` |
//!   | min only | `field:>=min` |
//!   | max only | `field:<=max` |
//!   | prefix | `field:value*` |
//!
//!   Fragments are joined with ` && `, numeric fields first, then string
//!   fields, each group sorted by field name.
//!
//! - **Raw**: the wire strings (`q`, `query_by`, `filter_by`, `sort_by`) are
//!   edited verbatim in a [`RawDraft`].
//!
//! [`FilterDrafts`] keeps both drafts side by side with a mode
//! discriminator, so switching modes never round-trips one draft through
//! the other.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::FilterError;
use crate::models::{FieldKind, IndexSchema, SearchRequest};

const AND: &str = " && ";

/// A constraint on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FieldConstraint {
    NumericRange {
        min: Option<String>,
        max: Option<String>,
    },
    StringPrefix {
        value: String,
    },
}

impl FieldConstraint {
    /// The filter fragment for `field`, or `None` when the constraint is empty.
    pub fn fragment(&self, field: &str) -> Option<String> {
        match self {
            FieldConstraint::NumericRange { min, max } => match (min, max) {
                (Some(min), Some(max)) => Some(format!("{}:[{}..{}]", field, min, max)),
                (Some(min), None) => Some(format!("{}:>={}", field, min)),
                (None, Some(max)) => Some(format!("{}:<={}", field, max)),
                (None, None) => None,
            },
            FieldConstraint::StringPrefix { value } if !value.is_empty() => {
                Some(format!("{}:{}*", field, value))
            }
            FieldConstraint::StringPrefix { .. } => None,
        }
    }
}

/// Fields of one index, classified for the structured widgets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldCatalog {
    numeric: Vec<String>,
    string: Vec<String>,
    sortable: Vec<String>,
}

impl FieldCatalog {
    pub fn from_schema(schema: &IndexSchema) -> Self {
        let mut numeric = Vec::new();
        let mut string = Vec::new();
        let mut sortable = Vec::new();
        for field in &schema.fields {
            match field.kind() {
                FieldKind::Numeric => numeric.push(field.name.clone()),
                FieldKind::String => string.push(field.name.clone()),
                FieldKind::Other => {}
            }
            if field.is_sortable() {
                sortable.push(field.name.clone());
            }
        }
        numeric.sort();
        string.sort();
        sortable.sort();
        Self {
            numeric,
            string,
            sortable,
        }
    }

    pub fn numeric_fields(&self) -> &[String] {
        &self.numeric
    }

    pub fn string_fields(&self) -> &[String] {
        &self.string
    }

    pub fn sortable_fields(&self) -> &[String] {
        &self.sortable
    }

    /// `field:asc` / `field:desc` for every sortable field.
    pub fn sort_options(&self) -> Vec<String> {
        self.sortable
            .iter()
            .flat_map(|f| [format!("{}:asc", f), format!("{}:desc", f)])
            .collect()
    }

    fn kind_of(&self, field: &str) -> Option<FieldKind> {
        if self.numeric.iter().any(|f| f == field) {
            Some(FieldKind::Numeric)
        } else if self.string.iter().any(|f| f == field) {
            Some(FieldKind::String)
        } else {
            None
        }
    }

    fn expect_kind(&self, field: &str, kind: FieldKind) -> Result<(), FilterError> {
        match self.kind_of(field) {
            None => Err(FilterError::UnknownField {
                field: field.to_string(),
            }),
            Some(k) if k == kind => Ok(()),
            Some(_) => Err(FilterError::WrongFieldKind {
                field: field.to_string(),
                expected: match kind {
                    FieldKind::Numeric => "numeric range",
                    _ => "prefix",
                },
            }),
        }
    }
}

fn bound(field: &str, raw: &str) -> Result<Option<String>, FilterError> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if value.parse::<f64>().is_err() {
        return Err(FilterError::NotNumeric {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(Some(value.to_string()))
}

/// Per-field widget state for structured mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StructuredDraft {
    constraints: BTreeMap<String, FieldConstraint>,
}

impl StructuredDraft {
    /// Set the numeric range of `field`. Blank bounds are empty; both blank
    /// removes the constraint.
    pub fn set_numeric_range(
        &mut self,
        catalog: &FieldCatalog,
        field: &str,
        min: &str,
        max: &str,
    ) -> Result<(), FilterError> {
        catalog.expect_kind(field, FieldKind::Numeric)?;
        let min = bound(field, min)?;
        let max = bound(field, max)?;
        if min.is_none() && max.is_none() {
            self.constraints.remove(field);
        } else {
            self.constraints
                .insert(field.to_string(), FieldConstraint::NumericRange { min, max });
        }
        Ok(())
    }

    /// Set the prefix of `field`. A blank prefix removes the constraint.
    pub fn set_string_prefix(
        &mut self,
        catalog: &FieldCatalog,
        field: &str,
        value: &str,
    ) -> Result<(), FilterError> {
        catalog.expect_kind(field, FieldKind::String)?;
        let value = value.trim();
        if value.is_empty() {
            self.constraints.remove(field);
        } else {
            self.constraints.insert(
                field.to_string(),
                FieldConstraint::StringPrefix {
                    value: value.to_string(),
                },
            );
        }
        Ok(())
    }

    pub fn constraint(&self, field: &str) -> Option<&FieldConstraint> {
        self.constraints.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn clear(&mut self) {
        self.constraints.clear();
    }

    /// AND-join of the non-empty fragments in catalog order. Constraints on
    /// fields outside the catalog are ignored.
    pub fn compile(&self, catalog: &FieldCatalog) -> String {
        catalog
            .numeric_fields()
            .iter()
            .chain(catalog.string_fields())
            .filter_map(|field| self.constraints.get(field)?.fragment(field))
            .collect::<Vec<_>>()
            .join(AND)
    }
}

/// Raw-mode draft: the wire strings exactly as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawDraft {
    pub text: String,
    /// Comma-separated field names.
    pub query_by: String,
    pub filter_by: String,
    pub sort_by: String,
}

impl RawDraft {
    /// Seed from the values currently driving the active request.
    pub fn seeded_from(active: &SearchRequest) -> Self {
        Self {
            text: active.text.clone(),
            query_by: active.query_by.join(", "),
            filter_by: active.filter.clone().unwrap_or_default(),
            sort_by: active.sort.clone().unwrap_or_default(),
        }
    }

    pub fn query_by_fields(&self) -> Vec<String> {
        self.query_by
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn filter(&self) -> Option<String> {
        non_empty(&self.filter_by)
    }

    pub fn sort(&self) -> Option<String> {
        non_empty(&self.sort_by)
    }
}

/// Trimmed `s`, or `None` when blank.
pub fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Which draft drives the active request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum FilterMode {
    #[default]
    Structured,
    Raw,
}

/// Both drafts plus the active-mode discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterDrafts {
    pub mode: FilterMode,
    pub structured: StructuredDraft,
    pub raw: RawDraft,
}

impl FilterDrafts {
    /// Switch to raw mode, seeding the raw draft from `active`. A no-op if
    /// already in raw mode.
    pub fn enter_raw(&mut self, active: &SearchRequest) {
        if self.mode == FilterMode::Raw {
            return;
        }
        self.raw = RawDraft::seeded_from(active);
        self.mode = FilterMode::Raw;
    }

    /// Switch to structured mode. The structured draft is left as it was.
    pub fn enter_structured(&mut self) {
        self.mode = FilterMode::Structured;
    }

    /// The structured filter, `None` when no constraint contributes.
    pub fn compiled(&self, catalog: &FieldCatalog) -> Option<String> {
        non_empty(&self.structured.compile(catalog))
    }
}
