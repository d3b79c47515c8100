//! Lodestar CLI - mock migration backend, live channel client and simulator.

use std::future::Future;
use std::process;
use std::time::Duration;

use clap::Parser;
use lodestar::cli::{Cli, Commands, ConfigCommands};
use lodestar::commands::{self, Output};
use lodestar::config::{ConfigOverrides, ResolvedConfig};
use lodestar::live::ChannelEvent;
use lodestar::{Error, logging};

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;

    let mut overrides = commands::overrides(cli.server_url.clone(), cli.log_level.clone(), cli.log_json);
    match &cli.command {
        Commands::Serve { host, port, seed } => {
            overrides.host = host.clone();
            overrides.port = *port;
            overrides.seed = *seed;
        }
        Commands::Simulate { seed, .. } => overrides.seed = *seed,
        _ => {}
    }

    let result = match commands::resolve(&overrides) {
        Ok(config) => {
            logging::init(&config.log_level.value, config.log_format.value);
            run_command(cli.command, &config, &overrides, human)
        }
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        report_error(&e, human);
        process::exit(1);
    }
}

fn report_error(e: &Error, human: bool) {
    match e {
        Error::ProjectNotFound(id) => {
            if human {
                eprintln!("Error: Project not found: {}\n", id);
                eprintln!("List known projects with:");
                eprintln!("    lodestar projects");
            } else {
                let err = serde_json::json!({
                    "error": e.to_string(),
                    "hint": "Run 'lodestar projects' to list known projects.",
                    "project_id": id,
                });
                eprintln!("{}", err);
            }
        }
        _ => {
            if human {
                eprintln!("Error: {}", e);
            } else {
                eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
            }
        }
    }
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}

/// Print one streamed event: JSON lines by default, a short description with -H.
fn print_event(event: &ChannelEvent, human: bool) {
    if human {
        println!("{}", commands::describe_event(event));
    } else if let Ok(line) = event.to_json() {
        println!("{}", line);
    }
}

fn block_on<F: Future>(future: F) -> Result<F::Output, Error> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Other(format!("Failed to create runtime: {}", e)))?;
    Ok(runtime.block_on(future))
}

fn run_command(
    command: Commands,
    config: &ResolvedConfig,
    overrides: &ConfigOverrides,
    human: bool,
) -> Result<(), Error> {
    match command {
        Commands::Serve { .. } => serve(config)?,
        Commands::Simulate {
            project_id,
            events,
            seconds,
            ..
        } => {
            let summary = block_on(commands::simulate(
                &project_id,
                config.simulation(),
                events,
                Duration::from_secs(seconds),
                |event| print_event(event, human),
            ))??;
            output(&summary, human);
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => output(&commands::config_show(overrides)?, human),
            ConfigCommands::Set { key, value } => {
                output(&commands::config_set(&key, &value)?, human)
            }
            ConfigCommands::Path => output(&commands::config_path()?, human),
        },
        other => run_client_command(other, &config.server_url.value, human)?,
    }
    Ok(())
}

#[cfg(feature = "server")]
fn serve(config: &ResolvedConfig) -> Result<(), Error> {
    block_on(lodestar::server::run(config))?
}

#[cfg(not(feature = "server"))]
fn serve(_config: &ResolvedConfig) -> Result<(), Error> {
    Err(Error::Unsupported(
        "this build has no backend; rebuild with the `server` feature".to_string(),
    ))
}

#[cfg(feature = "client")]
fn run_client_command(command: Commands, server_url: &str, human: bool) -> Result<(), Error> {
    use lodestar::client::ApiClient;
    use lodestar::models::LevelFilter;

    let client = ApiClient::new(server_url);
    match command {
        Commands::Projects => output(&block_on(commands::projects(&client))??, human),
        Commands::Show { project_id } => {
            output(&block_on(commands::show(&client, &project_id))??, human)
        }
        Commands::Upload { archive, name } => output(
            &block_on(commands::upload(&client, &archive, name.as_deref()))??,
            human,
        ),
        Commands::Graph { project_id, layout } => output(
            &block_on(commands::graph(&client, &project_id, layout))??,
            human,
        ),
        Commands::File { project_id, path } => output(
            &block_on(commands::file(&client, &project_id, &path))??,
            human,
        ),
        Commands::RunAgent {
            project_id,
            agent_id,
        } => output(
            &block_on(commands::run_agent(&client, &project_id, &agent_id))??,
            human,
        ),
        Commands::ApplyPatch {
            project_id,
            file,
            content,
            author,
        } => output(
            &block_on(commands::apply_patch(
                &client,
                &project_id,
                &file,
                &content,
                author,
            ))??,
            human,
        ),
        Commands::Watch {
            project_id,
            seconds,
            level,
            tail,
        } => {
            let filter = LevelFilter::parse(&level).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "unknown log level '{}': expected all, info, warn or error",
                    level
                ))
            })?;
            let result = block_on(commands::watch(
                client,
                &project_id,
                Duration::from_secs(seconds),
                filter,
                tail,
                |event| {
                    if human {
                        println!("{}", commands::describe_event(event));
                    }
                },
            ))??;
            output(&result, human);
        }
        Commands::Serve { .. } | Commands::Simulate { .. } | Commands::Config { .. } => {}
    }
    Ok(())
}

#[cfg(not(feature = "client"))]
fn run_client_command(_command: Commands, _server_url: &str, _human: bool) -> Result<(), Error> {
    Err(Error::Unsupported(
        "this build has no HTTP client; rebuild with the `client` feature".to_string(),
    ))
}
