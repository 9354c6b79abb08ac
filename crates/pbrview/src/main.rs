mod cli;
mod export;
mod paths;
mod run;
mod settings;

use anyhow::Result;
use cli::{Command, ConfigAction};
use paths::AppPaths;
use viewconfig::ViewerConfig;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    let paths = AppPaths::discover()?;
    let explicit = cli.config.as_deref();

    match cli.command {
        Some(Command::Config(config_cmd)) => handle_config_command(&paths, explicit, config_cmd.action),
        Some(Command::Export(args)) => {
            let config = settings::load_config(&paths, explicit)?;
            export::run_export(config, args)
        }
        None => {
            let config = settings::load_config(&paths, explicit)?;
            run::run(config, cli.view)
        }
    }
}

fn handle_config_command(
    paths: &AppPaths,
    explicit: Option<&std::path::Path>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = settings::load_config(paths, explicit)?;
            print!("{}", config.to_toml_string()?);
        }
        ConfigAction::Default => {
            let defaults = ViewerConfig {
                version: 1,
                ..ViewerConfig::default()
            };
            print!("{}", defaults.to_toml_string()?);
        }
        ConfigAction::Where => {
            let path = paths.config_file(explicit);
            let status = if path.exists() { "present" } else { "missing, using defaults" };
            println!("Configuration directory: {}", paths.config_dir().display());
            println!("Configuration file:      {} ({status})", path.display());
        }
    }
    Ok(())
}
