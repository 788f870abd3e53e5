use clap::Args;
use std::path::PathBuf;

use crate::cli::utils::resolve_model_paths;
use crate::config::config;

#[derive(Args)]
pub struct ServeArgs {
    #[arg(help = "Model fragments, merged in order (JSON or YAML)")]
    pub files: Vec<PathBuf>,

    #[arg(long, help = "Port to listen on")]
    pub port: Option<u16>,
}

pub async fn handle(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = config().clone();
    config.model.paths = resolve_model_paths(args.files)?;
    if let Some(port) = args.port {
        config.api.port = port;
    }
    crate::server::run(config).await
}
