use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};

use runlet_engine::{Manager, ManagerConfig};
use runlet_types::WorkflowDefinition;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("run", sub)) => run_workflow(sub).await,
        Some(("cleanup", _)) => cleanup().await,
        _ => {
            build_cli().print_help()?;
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn build_cli() -> Command {
    Command::new("runlet")
        .about("Sandboxed workflow runner")
        .subcommand_required(false)
        .subcommand(
            Command::new("run")
                .about("Execute a workflow definition file")
                .arg(
                    Arg::new("file")
                        .long("file")
                        .short('f')
                        .required(true)
                        .action(ArgAction::Set)
                        .help("Path to the workflow YAML file"),
                )
                .arg(
                    Arg::new("workspace")
                        .long("workspace")
                        .action(ArgAction::Set)
                        .help("Workspace directory (overrides RUNLET_WORKSPACE_DIR)"),
                )
                .arg(
                    Arg::new("summary")
                        .long("summary")
                        .action(ArgAction::SetTrue)
                        .help("Print the combined run state as JSON after execution"),
                ),
        )
        .subcommand(Command::new("cleanup").about("Recursively delete everything under the workspace root"))
}

fn load_config(matches: &ArgMatches) -> Result<ManagerConfig> {
    let mut config = ManagerConfig::from_env().context("invalid runner configuration")?;
    if let Some(workspace) = matches.get_one::<String>("workspace") {
        config.workspace_dir = workspace.into();
    }
    Ok(config)
}

async fn run_workflow(matches: &ArgMatches) -> Result<()> {
    let file = matches.get_one::<String>("file").context("--file is required")?;
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("could not read workflow file: {file}"))?;
    let definition: WorkflowDefinition =
        serde_yaml::from_str(&content).with_context(|| format!("invalid workflow definition: {file}"))?;

    let config = load_config(matches)?;
    let mut manager = Manager::new(config)?;
    manager.prepare().await?;

    let run = manager.execute_definition(&definition).await?;
    tracing::info!(run_id = %run.id(), status = %run.status(), "workflow finished");

    if matches.get_flag("summary") {
        println!("{}", serde_json::to_string_pretty(&run.combined_state())?);
    }

    // The overall exit code mirrors the invoked action's own exit code.
    let code = run.exit_code();
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

async fn cleanup() -> Result<()> {
    let config = ManagerConfig::from_env().context("invalid runner configuration")?;
    let manager = Manager::new(config)?;
    manager.cleanup().await?;
    tracing::info!("workspace cleaned");
    Ok(())
}
