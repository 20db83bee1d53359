use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use serde_json::json;

mod cli;

use bale_core::{
    BuildConfig, BuildDirLocation, Bundler, FunctionRequest, InstallMode, LayerRequest,
    PipInstaller,
};
use cli::{BaleCli, Command};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = BaleCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let config = resolve_config(&cli).map_err(|err| eyre!("{err:?}"))?;
    let bundler = Bundler::new(config, Arc::new(PipInstaller::from_env()));

    let outcome = match &cli.command {
        Command::Layer(args) => bundler.build_layer_artifact(&LayerRequest {
            requirement_files: args.requirements.clone(),
        }),
        Command::Function(args) => bundler.build_function_artifact(&FunctionRequest {
            code_directories: args.code.clone(),
            requirement_files: args.requirements.clone(),
            exclude_patterns: args.exclude.clone(),
        }),
    };

    match outcome {
        Ok(artifact) => {
            emit_success(&cli, &artifact);
            Ok(())
        }
        Err(err) => {
            if cli.json {
                let payload = json!({
                    "status": "error",
                    "message": format!("{err:#}"),
                    "details": {},
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
                std::process::exit(2);
            }
            Err(eyre!("{err:?}"))
        }
    }
}

fn resolve_config(cli: &BaleCli) -> anyhow::Result<BuildConfig> {
    let mut config = BuildConfig::from_env()?;
    if let Some(build_dir) = &cli.build_dir {
        let path = if build_dir.is_absolute() {
            build_dir.clone()
        } else {
            std::env::current_dir()?.join(build_dir)
        };
        config.build_dir = BuildDirLocation {
            path,
            source: "--build-dir",
        };
    }
    if cli.skip_install {
        config.install_mode = InstallMode::SkipAndEmitEmpty;
    }
    Ok(config)
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("bale_core={level},bale_cli={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn emit_success(cli: &BaleCli, artifact: &Path) {
    if cli.json {
        let payload = json!({
            "status": "ok",
            "message": "artifact ready",
            "details": { "artifact": artifact },
        });
        match serde_json::to_string_pretty(&payload) {
            Ok(body) => println!("{body}"),
            Err(err) => eprintln!("failed to render JSON output: {err}"),
        }
    } else if !cli.quiet {
        println!("{}", artifact.display());
    }
}
