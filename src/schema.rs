//! Schema contract for the queryable entity.
//!
//! The contract is built once at startup and shared read-only (behind an
//! `Arc`) by the planner and every tool. It has no mutation API.

use serde::Serialize;
use serde::ser::{SerializeMap, SerializeStruct, Serializer};

/// Semantic type of a contract field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Integer,
    Text,
}

impl std::fmt::Display for SemanticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// One field of the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub semantic_type: SemanticType,
    pub description: &'static str,
}

impl FieldSpec {
    const fn new(name: &'static str, semantic_type: SemanticType, description: &'static str) -> Self {
        Self {
            name,
            semantic_type,
            description,
        }
    }
}

const PATIENT_RECORD_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("id", SemanticType::Integer, "The ID of the patient record."),
    FieldSpec::new("name", SemanticType::Text, "The name of the patient."),
    FieldSpec::new("age", SemanticType::Integer, "The age of the patient."),
    FieldSpec::new("patient_id", SemanticType::Text, "The unique patient ID."),
    FieldSpec::new("symptoms", SemanticType::Text, "The symptoms of the patient."),
    FieldSpec::new(
        "ct_image_file",
        SemanticType::Text,
        "The filename of the CT image.",
    ),
    FieldSpec::new(
        "image_path",
        SemanticType::Text,
        "The file path of the CT image.",
    ),
];

/// Ordered description of the queryable table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaContract {
    table: &'static str,
    description: &'static str,
    fields: Vec<FieldSpec>,
}

impl SchemaContract {
    /// The `patient_records` table.
    pub fn patient_records() -> Self {
        Self {
            table: "patient_records",
            description: "Table containing patient records with detailed medical data.",
            fields: PATIENT_RECORD_FIELDS.to_vec(),
        }
    }

    pub fn table(&self) -> &str {
        self.table
    }

    pub fn description(&self) -> &str {
        self.description
    }

    /// Field names and descriptions, in contract order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.fields.iter().map(|f| (f.name, f.description))
    }

    /// Full field specs, in contract order.
    pub fn specs(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// Render the contract as the YAML block handed to the planner.
    ///
    /// Keys keep contract order: `name`, `description`, then `columns`
    /// mapping each field to its description.
    pub fn to_constraints(&self) -> String {
        // Serializing plain strings and maps into YAML cannot fail.
        serde_yaml::to_string(self).unwrap_or_default()
    }
}

impl Serialize for SchemaContract {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("SchemaContract", 3)?;
        state.serialize_field("name", self.table)?;
        state.serialize_field("description", self.description)?;
        state.serialize_field("columns", &Columns(&self.fields))?;
        state.end()
    }
}

struct Columns<'a>(&'a [FieldSpec]);

impl Serialize for Columns<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for field in self.0 {
            map.serialize_entry(field.name, field.description)?;
        }
        map.end()
    }
}
