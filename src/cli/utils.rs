use serde_json::{json, Value};
use std::path::PathBuf;

use crate::cli::OutputFormat;
use crate::compiler::{CompiledModel, Compiler, CorsOptions};
use crate::config::config;
use crate::model::loader::load_model;
use crate::registry::Registry;

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let (Some(Value::Object(extra)), Some(object)) = (data, response.as_object_mut()) {
                object.extend(extra);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Model files from the command line, falling back to ARBOR_MODEL
pub fn resolve_model_paths(files: Vec<PathBuf>) -> anyhow::Result<Vec<PathBuf>> {
    if !files.is_empty() {
        return Ok(files);
    }
    let configured = config().model.paths.clone();
    if configured.is_empty() {
        anyhow::bail!("No model files given and ARBOR_MODEL is not set");
    }
    Ok(configured)
}

/// Load, merge and compile against the built-in registry
pub fn compile_files(files: Vec<PathBuf>) -> anyhow::Result<CompiledModel> {
    let paths = resolve_model_paths(files)?;
    let raw = load_model(&paths)?;
    let registry = Registry::with_builtins();
    let model = Compiler::new(&registry)
        .with_default_cors(CorsOptions::from_origins(&config().security.cors_origins))
        .compile_value(&raw)?;
    Ok(model)
}
