//! `seed` and `list` commands for development databases.

use crate::config::DatabaseConfig;
use crate::db::PgStore;
use crate::records::FieldValue;
use crate::schema::SchemaContract;

/// Create the table if needed and insert `count` synthetic records.
pub async fn run_seed_command(count: usize) -> anyhow::Result<()> {
    let contract = SchemaContract::patient_records();
    let store = PgStore::new(&DatabaseConfig::resolve()?)?;

    store.ensure_table(&contract).await?;
    let records = crate::seed::generate_records(&mut rand::thread_rng(), count);
    let inserted = store.insert_records(&contract, &records).await?;

    tracing::info!(inserted, table = contract.table(), "Seeded records");
    println!("Inserted {} records into {}", inserted, contract.table());
    Ok(())
}

/// Print every record, one line each.
pub async fn run_list_command() -> anyhow::Result<()> {
    let contract = SchemaContract::patient_records();
    let store = PgStore::new(&DatabaseConfig::resolve()?)?;

    let set = store.list_all(&contract).await?;
    for record in &set.records {
        println!("{}", format_record(&set.columns, &record.values));
    }
    if set.is_empty() {
        println!("No records in {}", contract.table());
    }
    Ok(())
}

fn label(column: &str) -> String {
    match column {
        "id" => "ID".to_string(),
        "ct_image_file" => "CT Image File".to_string(),
        "patient_id" => "Patient ID".to_string(),
        other => other
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(c) => c.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" "),
    }
}

fn format_record(columns: &[String], values: &[FieldValue]) -> String {
    columns
        .iter()
        .zip(values)
        .map(|(column, value)| {
            if value.is_null() {
                format!("{}: None", label(column))
            } else {
                format!("{}: {}", label(column), value)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::patient_table;

    #[test]
    fn test_labels() {
        assert_eq!(label("id"), "ID");
        assert_eq!(label("patient_id"), "Patient ID");
        assert_eq!(label("ct_image_file"), "CT Image File");
        assert_eq!(label("image_path"), "Image Path");
        assert_eq!(label("name"), "Name");
    }

    #[test]
    fn test_format_record() {
        let table = patient_table(1);
        let line = format_record(&table.columns, &table.records[0].values);
        assert!(line.starts_with("ID: 1, Name: Patient 1, Age: 4, Patient ID: p-0001"));
        assert!(line.ends_with("Image Path: /data/images/scan_001.dcm"));
    }

    #[test]
    fn test_format_null_as_none() {
        let table = patient_table(3);
        let line = format_record(&table.columns, &table.records[2].values);
        assert!(line.contains("Symptoms: None,"), "{line}");
    }
}
