//! Result records and result sets.

use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::schema::{SchemaContract, SemanticType};

/// A scalar value of a contract field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
    Null,
}

impl FieldValue {
    /// Whether this value can live in a field of the given type.
    pub fn fits(&self, ty: SemanticType) -> bool {
        matches!(
            (self, ty),
            (Self::Null, _)
                | (Self::Integer(_), SemanticType::Integer)
                | (Self::Text(_), SemanticType::Text)
        )
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{}", v),
            Self::Text(s) => write!(f, "{}", s),
            Self::Null => Ok(()),
        }
    }
}

/// One row, aligned with the owning [`ResultSet`]'s columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub values: Vec<FieldValue>,
}

impl ResultRecord {
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self { values }
    }
}

/// The rows returned by one query, with their column names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub records: Vec<ResultRecord>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: ResultRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value of `column` in every record, in record order.
    pub fn column_values<'a>(&'a self, column: &str) -> Option<impl Iterator<Item = &'a FieldValue>> {
        let idx = self.column_index(column)?;
        Some(self.records.iter().filter_map(move |r| r.values.get(idx)))
    }

    /// Iterate a record as `(column, value)` pairs.
    pub fn named<'a>(
        &'a self,
        record: &'a ResultRecord,
    ) -> impl Iterator<Item = (&'a str, &'a FieldValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(record.values.iter())
    }

    /// Check columns and values against the contract.
    ///
    /// Columns must be contract fields, each at most once, and every value
    /// must fit its field's semantic type.
    pub fn validate(&self, contract: &SchemaContract) -> Result<(), ToolError> {
        if self.columns.is_empty() {
            return Err(ToolError::SchemaViolation(
                "query projects no columns".to_string(),
            ));
        }

        let mut types = Vec::with_capacity(self.columns.len());
        for (i, column) in self.columns.iter().enumerate() {
            let spec = contract.field(column).ok_or_else(|| {
                ToolError::SchemaViolation(format!(
                    "column '{}' is not a field of {}",
                    column,
                    contract.table()
                ))
            })?;
            if self.columns[..i].contains(column) {
                return Err(ToolError::SchemaViolation(format!(
                    "column '{}' is projected more than once",
                    column
                )));
            }
            types.push(spec.semantic_type);
        }

        for (row, record) in self.records.iter().enumerate() {
            if record.values.len() != types.len() {
                return Err(ToolError::SchemaViolation(format!(
                    "row {} has {} values for {} columns",
                    row,
                    record.values.len(),
                    types.len()
                )));
            }
            for ((value, ty), column) in record.values.iter().zip(&types).zip(&self.columns) {
                if !value.fits(*ty) {
                    return Err(ToolError::SchemaViolation(format!(
                        "row {} column '{}' holds {:?}, expected {}",
                        row, column, value, ty
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultSet {
        let mut set = ResultSet::new(vec!["id".into(), "name".into(), "age".into()]);
        set.push(ResultRecord::new(vec![
            FieldValue::Integer(1),
            FieldValue::Text("Ada".into()),
            FieldValue::Integer(36),
        ]));
        set.push(ResultRecord::new(vec![
            FieldValue::Integer(2),
            FieldValue::Null,
            FieldValue::Integer(8),
        ]));
        set
    }

    #[test]
    fn test_validate_accepts_subset_of_contract() {
        let contract = SchemaContract::patient_records();
        assert!(sample().validate(&contract).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_projection() {
        let contract = SchemaContract::patient_records();
        assert!(matches!(
            ResultSet::default().validate(&contract),
            Err(ToolError::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_column() {
        let contract = SchemaContract::patient_records();
        let set = ResultSet::new(vec!["id".into(), "ssn".into()]);
        let err = set.validate(&contract).unwrap_err();
        assert!(matches!(err, ToolError::SchemaViolation(_)));
        assert!(err.to_string().contains("ssn"));
    }

    #[test]
    fn test_validate_rejects_duplicate_column() {
        let contract = SchemaContract::patient_records();
        let set = ResultSet::new(vec!["age".into(), "age".into()]);
        assert!(matches!(
            set.validate(&contract),
            Err(ToolError::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_type_mismatch() {
        let contract = SchemaContract::patient_records();
        let mut set = ResultSet::new(vec!["age".into()]);
        set.push(ResultRecord::new(vec![FieldValue::Text("ten".into())]));
        assert!(matches!(
            set.validate(&contract),
            Err(ToolError::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_column_values() {
        let set = sample();
        let ages: Vec<i64> = set
            .column_values("age")
            .unwrap()
            .filter_map(FieldValue::as_i64)
            .collect();
        assert_eq!(ages, vec![36, 8]);
        assert!(set.column_values("missing").is_none());
    }

    #[test]
    fn test_named_pairs() {
        let set = sample();
        let pairs: Vec<(&str, &FieldValue)> = set.named(&set.records[0]).collect();
        assert_eq!(pairs[1], ("name", &FieldValue::Text("Ada".into())));
    }
}
