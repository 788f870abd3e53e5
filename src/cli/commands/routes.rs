use clap::Args;
use serde_json::json;
use std::path::PathBuf;

use crate::cli::utils::{compile_files, output_success};
use crate::cli::OutputFormat;
use crate::pipeline::HandlerChain;
use crate::realtime::RoutingTable;

#[derive(Args)]
pub struct RoutesArgs {
    #[arg(help = "Model fragments, merged in order (JSON or YAML)")]
    pub files: Vec<PathBuf>,
}

pub fn handle(args: RoutesArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let model = compile_files(args.files)?;
    let table = RoutingTable::build(&model.root)?;

    let mut http = Vec::new();
    for node in model.nodes() {
        for method in node.handlers.registered_methods() {
            let chain = HandlerChain::for_method(node, method);
            http.push(json!({
                "method": method,
                "path": node.path,
                "chain": chain.step_names(),
            }));
        }
    }

    let realtime: Vec<_> = table
        .routes()
        .iter()
        .map(|route| {
            json!({
                "path": route.path,
                "pattern": route.pattern.as_str(),
                "params": route.param_names,
                "forbidden": route.auth.is_forbidden(),
                "connect": route.handlers.connect.iter().map(|h| h.name.as_str()).collect::<Vec<_>>(),
                "message": route.handlers.message.iter().map(|h| h.name.as_str()).collect::<Vec<_>>(),
                "disconnect": route.handlers.disconnect.iter().map(|h| h.name.as_str()).collect::<Vec<_>>(),
            })
        })
        .collect();

    match output_format {
        OutputFormat::Json => output_success(
            &output_format,
            "Routes listed",
            Some(json!({ "http": http, "realtime": realtime })),
        ),
        OutputFormat::Text => {
            println!("HTTP");
            for node in model.nodes() {
                for method in node.handlers.registered_methods() {
                    let chain = HandlerChain::for_method(node, method);
                    println!("  {:<8} {:<32} {}", method.as_str(), node.path, chain.step_names().join(" -> "));
                }
            }
            println!("Real-time");
            for route in table.routes() {
                let state = if route.auth.is_forbidden() { " (disabled)" } else { "" };
                println!("  {:<41} {}{}", route.path, route.pattern.as_str(), state);
            }
            Ok(())
        }
    }
}
