use clap::Args;
use serde_json::{json, Value};
use std::path::PathBuf;

use crate::cli::utils::{compile_files, output_success};
use crate::cli::OutputFormat;
use crate::compiler::{AuthEntry, CompiledModel};

#[derive(Args)]
pub struct CompileArgs {
    #[arg(help = "Model fragments, merged in order (JSON or YAML)")]
    pub files: Vec<PathBuf>,
}

pub fn handle(args: CompileArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let model = compile_files(args.files)?;

    match output_format {
        OutputFormat::Json => output_success(&output_format, "Model compiled", Some(summary(&model))),
        OutputFormat::Text => {
            for node in model.nodes() {
                println!("{}", node.path);
                for (method, entry) in node.auth.iter() {
                    println!("    {:<8} {}", method.as_str(), describe(entry));
                }
                for (field, _) in &node.fields {
                    println!("    field    {}", field);
                }
            }
            output_success(
                &output_format,
                &format!(
                    "Compiled {} nodes (real-time {})",
                    model.nodes().len(),
                    if model.has_realtime { "on" } else { "off" }
                ),
                None,
            )
        }
    }
}

fn describe(entry: &AuthEntry) -> String {
    match entry {
        AuthEntry::Forbidden => "forbidden".to_string(),
        AuthEntry::Required(requirement) => {
            let mut text = if requirement.requires_auth { "auth".to_string() } else { "open".to_string() };
            if let Some(roles) = &requirement.requires_roles {
                text.push_str(&format!(" roles={}", roles.join(",")));
            }
            let policies = requirement.policy_names();
            if policies.len() > 1 {
                text.push_str(&format!(" policies={}", policies[1..].join(",")));
            }
            text
        }
    }
}

fn summary(model: &CompiledModel) -> Value {
    let nodes: Vec<Value> = model
        .nodes()
        .into_iter()
        .map(|node| {
            let auth: serde_json::Map<String, Value> = node
                .auth
                .iter()
                .map(|(method, entry)| (method.as_str().to_string(), Value::String(describe(entry))))
                .collect();
            json!({
                "path": node.path,
                "auth": auth,
                "fields": node.fields.iter().map(|(name, _)| name).collect::<Vec<_>>(),
                "methods": node.handlers.registered_methods(),
                "collection": node.collection,
                "realTime": !node.real_time.is_empty(),
            })
        })
        .collect();

    json!({ "hasRealtime": model.has_realtime, "nodes": nodes })
}
