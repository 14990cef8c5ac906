use schemars::schema_for;

use crate::config::ModeConfig;

/// Generate the JSON Schema for `ModeConfig` (the union of all seven strategy modes).
pub fn get_schema_json() -> String {
    let schema = schema_for!(ModeConfig);
    serde_json::to_string_pretty(&schema).expect("schema serializes")
}

pub fn run() -> anyhow::Result<()> {
    println!("{}", get_schema_json());
    Ok(())
}
