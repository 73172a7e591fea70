//! `schema` command: dump the contract the planner is constrained by.

use std::path::Path;

use crate::schema::SchemaContract;

/// Write the contract's YAML document to `output`.
pub fn run_schema_command(output: &Path) -> anyhow::Result<()> {
    let contract = SchemaContract::patient_records();
    let yaml = serde_yaml::to_string(&contract)?;

    std::fs::write(output, yaml)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {}", output.display(), e))?;

    tracing::info!(path = %output.display(), "Wrote schema contract");
    println!("YAML file generated successfully: {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.yaml");

        run_schema_command(&path).unwrap();

        let yaml = std::fs::read_to_string(&path).unwrap();
        assert!(yaml.starts_with("name: patient_records"));
        assert!(yaml.contains("image_path: The file path of the CT image."));
    }
}
