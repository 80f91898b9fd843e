// 🏞️ Property Entity - Parcel | Building with a shared financial history
//
// "The variant says WHAT the asset is; the history says what it was WORTH"
//
// Both variants roll up identically, so the financial history lives on the
// shared struct and only identification data sits on the variant.

use crate::error::WorkflowError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Oldest fiscal year accepted on a financial record.
pub const MIN_FISCAL_YEAR: i32 = 1900;

/// Newest fiscal year accepted on a financial record.
pub const MAX_FISCAL_YEAR: i32 = 9999;

// ============================================================================
// FINANCIAL KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FinancialKind {
    /// Legal assessment - the anchor kind for dating a project snapshot
    Assessed,
    Appraised,
    NetBook,
    Market,
    Estimated,
}

impl FinancialKind {
    pub const ALL: [FinancialKind; 5] = [
        FinancialKind::Assessed,
        FinancialKind::Appraised,
        FinancialKind::NetBook,
        FinancialKind::Market,
        FinancialKind::Estimated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FinancialKind::Assessed => "Assessed",
            FinancialKind::Appraised => "Appraised",
            FinancialKind::NetBook => "NetBook",
            FinancialKind::Market => "Market",
            FinancialKind::Estimated => "Estimated",
        }
    }
}

impl fmt::Display for FinancialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FinancialKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "assessed" => Ok(FinancialKind::Assessed),
            "appraised" => Ok(FinancialKind::Appraised),
            "netbook" => Ok(FinancialKind::NetBook),
            "market" => Ok(FinancialKind::Market),
            "estimated" => Ok(FinancialKind::Estimated),
            _ => Err(WorkflowError::InvalidRecord(format!(
                "unknown financial kind '{}'",
                s
            ))),
        }
    }
}

// ============================================================================
// FINANCIAL RECORD
// ============================================================================

/// One dated value in a property's financial history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialRecord {
    pub kind: FinancialKind,
    pub fiscal_year: i32,
    pub value: Decimal,
    #[serde(default)]
    pub effective_date: Option<NaiveDate>,
}

impl FinancialRecord {
    pub fn new(kind: FinancialKind, fiscal_year: i32, value: Decimal) -> Self {
        FinancialRecord {
            kind,
            fiscal_year,
            value,
            effective_date: None,
        }
    }

    /// Builder: set the effective date
    pub fn with_effective_date(mut self, date: NaiveDate) -> Self {
        self.effective_date = Some(date);
        self
    }

    /// Non-negative value, fiscal year within the historical range.
    pub fn check(&self) -> Result<(), WorkflowError> {
        if self.value < Decimal::ZERO {
            return Err(WorkflowError::InvalidRecord(format!(
                "{} value for {} must not be negative, got {}",
                self.kind, self.fiscal_year, self.value
            )));
        }

        if !(MIN_FISCAL_YEAR..=MAX_FISCAL_YEAR).contains(&self.fiscal_year) {
            return Err(WorkflowError::InvalidRecord(format!(
                "fiscal year {} is outside {}..={}",
                self.fiscal_year, MIN_FISCAL_YEAR, MAX_FISCAL_YEAR
            )));
        }

        Ok(())
    }
}

// ============================================================================
// PROPERTY KIND
// ============================================================================

/// Closed set of property variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PropertyKind {
    /// Land-only record, identified by PID and/or PIN
    Parcel {
        pid: Option<String>,
        pin: Option<String>,
    },

    /// Structure record, optionally tied to its parent parcel
    Building { parcel_id: Option<i64> },
}

impl PropertyKind {
    pub fn label(&self) -> &'static str {
        match self {
            PropertyKind::Parcel { .. } => "Parcel",
            PropertyKind::Building { .. } => "Building",
        }
    }
}

// ============================================================================
// PROPERTY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: i64,
    pub name: String,
    pub kind: PropertyKind,

    /// Append-only; position is creation order
    #[serde(default)]
    financials: Vec<FinancialRecord>,
}

impl Property {
    pub fn new_parcel(id: i64, name: impl Into<String>) -> Self {
        Property {
            id,
            name: name.into(),
            kind: PropertyKind::Parcel {
                pid: None,
                pin: None,
            },
            financials: Vec::new(),
        }
    }

    pub fn new_building(id: i64, name: impl Into<String>, parcel_id: Option<i64>) -> Self {
        Property {
            id,
            name: name.into(),
            kind: PropertyKind::Building { parcel_id },
            financials: Vec::new(),
        }
    }

    /// Builder: set the PID (parcels only, ignored for buildings)
    pub fn with_pid(mut self, value: impl Into<String>) -> Self {
        if let PropertyKind::Parcel { pid, .. } = &mut self.kind {
            *pid = Some(value.into());
        }
        self
    }

    /// Builder: set the PIN (parcels only, ignored for buildings)
    pub fn with_pin(mut self, value: impl Into<String>) -> Self {
        if let PropertyKind::Parcel { pin, .. } = &mut self.kind {
            *pin = Some(value.into());
        }
        self
    }

    /// Builder: append a financial record, skipping the range check.
    /// Used by loaders that trust their source.
    pub fn with_financial(mut self, record: FinancialRecord) -> Self {
        self.financials.push(record);
        self
    }

    pub fn is_parcel(&self) -> bool {
        matches!(self.kind, PropertyKind::Parcel { .. })
    }

    pub fn is_building(&self) -> bool {
        matches!(self.kind, PropertyKind::Building { .. })
    }

    /// Financial history in creation order
    pub fn financials(&self) -> &[FinancialRecord] {
        &self.financials
    }

    /// Append a record; returns its index in the history.
    pub fn record_financial(&mut self, record: FinancialRecord) -> Result<usize, WorkflowError> {
        record.check()?;
        self.financials.push(record);
        Ok(self.financials.len() - 1)
    }

    /// Replace the record at `index` in place (keeps its creation position).
    pub fn replace_financial(
        &mut self,
        index: usize,
        record: FinancialRecord,
    ) -> Result<FinancialRecord, WorkflowError> {
        record.check()?;
        let property_id = self.id;
        let slot = self
            .financials
            .get_mut(index)
            .ok_or(WorkflowError::RecordNotFound { property_id, index })?;
        Ok(std::mem::replace(slot, record))
    }

    pub fn remove_financial(&mut self, index: usize) -> Result<FinancialRecord, WorkflowError> {
        if index >= self.financials.len() {
            return Err(WorkflowError::RecordNotFound {
                property_id: self.id,
                index,
            });
        }
        Ok(self.financials.remove(index))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_financial_kind_parse_is_lenient() {
        assert_eq!("NetBook".parse::<FinancialKind>().unwrap(), FinancialKind::NetBook);
        assert_eq!("net_book".parse::<FinancialKind>().unwrap(), FinancialKind::NetBook);
        assert_eq!("ASSESSED".parse::<FinancialKind>().unwrap(), FinancialKind::Assessed);
        assert!("Appraisal".parse::<FinancialKind>().is_err());
    }

    #[test]
    fn test_record_rejects_negative_value() {
        let mut parcel = Property::new_parcel(1, "Lot 1");
        let record = FinancialRecord::new(FinancialKind::Assessed, 2019, Decimal::new(-1, 0));

        assert!(matches!(
            parcel.record_financial(record),
            Err(WorkflowError::InvalidRecord(_))
        ));
        assert!(parcel.financials().is_empty());
    }

    #[test]
    fn test_record_rejects_out_of_range_year() {
        let mut parcel = Property::new_parcel(1, "Lot 1");
        let record = FinancialRecord::new(FinancialKind::Assessed, 1850, Decimal::ONE);

        assert!(parcel.record_financial(record).is_err());
    }

    #[test]
    fn test_history_keeps_creation_order() {
        let mut building = Property::new_building(2, "Warehouse", Some(1));
        building
            .record_financial(FinancialRecord::new(FinancialKind::NetBook, 2019, Decimal::ONE))
            .unwrap();
        let second = building
            .record_financial(FinancialRecord::new(FinancialKind::NetBook, 2019, Decimal::TWO))
            .unwrap();

        assert_eq!(second, 1);
        assert_eq!(building.financials()[1].value, Decimal::TWO);
    }

    #[test]
    fn test_replace_and_remove_unknown_index() {
        let mut parcel = Property::new_parcel(3, "Lot 3");
        let record = FinancialRecord::new(FinancialKind::Market, 2018, Decimal::TEN);

        assert!(matches!(
            parcel.replace_financial(0, record.clone()),
            Err(WorkflowError::RecordNotFound { property_id: 3, index: 0 })
        ));
        assert!(parcel.remove_financial(4).is_err());

        parcel.record_financial(record).unwrap();
        let old = parcel
            .replace_financial(0, FinancialRecord::new(FinancialKind::Market, 2018, Decimal::ONE))
            .unwrap();
        assert_eq!(old.value, Decimal::TEN);
        assert_eq!(parcel.financials()[0].value, Decimal::ONE);
    }

    #[test]
    fn test_pid_builder_ignored_on_buildings() {
        let building = Property::new_building(4, "Shed", None).with_pid("123-456-789");
        assert_eq!(building.kind, PropertyKind::Building { parcel_id: None });

        let parcel = Property::new_parcel(5, "Lot 5").with_pid("123-456-789");
        assert!(parcel.is_parcel());
        assert_eq!(
            parcel.kind,
            PropertyKind::Parcel {
                pid: Some("123-456-789".to_string()),
                pin: None
            }
        );
    }
}
