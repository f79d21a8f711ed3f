use clap::{ArgAction, Args, Parser, Subcommand};
use jobspec_launcher::{
    config::{ConfigErrors, LaunchConfig},
    submit::{SubmitError, Submitters},
    Dialect, LaunchDescriptor,
};
use std::{fs, io, path::PathBuf, process::ExitCode};
use thiserror::Error;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Render and submit batch job scripts from launch files
#[derive(Parser, Debug)]
#[command(name = "jobspec", version, about, long_about = None)]
struct Cli {
    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render the job scripts of a launch file
    Render(RenderArgs),
    /// Validate a launch file without rendering it
    Check(LaunchArgs),
    /// Render the job scripts and hand them to the scheduler
    Submit(SubmitArgs),
}

#[derive(Args, Debug)]
struct LaunchArgs {
    /// Path to the launch file (YAML)
    config: PathBuf,

    /// Override the directive dialect of the launch file
    #[arg(long, value_enum)]
    dialect: Option<Dialect>,
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[command(flatten)]
    launch: LaunchArgs,

    /// Write one script per job into this directory instead of stdout
    #[arg(short, long)]
    out_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SubmitArgs {
    #[command(flatten)]
    launch: LaunchArgs,

    /// Log the scripts instead of submitting them
    #[arg(long)]
    dry_run: bool,
}

#[derive(Error, Debug)]
enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error("Failed to write job script")]
    Output(#[from] io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose > 0 { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            if let Some(source) = std::error::Error::source(&e) {
                debug!(error = ?source, "Caused by");
            }

            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), CommandError> {
    match command {
        Commands::Render(args) => {
            let (config, descriptors) = prepare(&args.launch)?;
            render(&config, &descriptors, args.out_dir)
        }
        Commands::Check(args) => {
            let (_, descriptors) = prepare(&args)?;
            info!("Launch file is valid, {} job(s)", descriptors.len());

            Ok(())
        }
        Commands::Submit(args) => {
            let (config, descriptors) = prepare(&args.launch)?;
            let submitter = Submitters::load(&config, args.dry_run)?;

            for descriptor in &descriptors {
                let name = config.script_file_name(descriptor);
                let name = name.to_string_lossy();
                let script = descriptor.render().to_script(config.shebang.as_deref());

                if let Some(reply) = submitter.submit(&name, &script)? {
                    info!(job = %name, "Submitted: {reply}");
                }
            }

            Ok(())
        }
    }
}

/// load and check a launch file, then build its descriptors
fn prepare(args: &LaunchArgs) -> Result<(LaunchConfig, Vec<LaunchDescriptor>), CommandError> {
    let mut config = LaunchConfig::load(&args.config)?;
    if let Some(dialect) = args.dialect {
        config.dialect = dialect;
    }

    if config.preflight_checks() {
        return Err(ConfigErrors::Preflight.into());
    }

    let descriptors = config.descriptors()?;

    Ok((config, descriptors))
}

fn render(
    config: &LaunchConfig,
    descriptors: &[LaunchDescriptor],
    out_dir: Option<PathBuf>,
) -> Result<(), CommandError> {
    let shebang = config.shebang.as_deref();

    match out_dir {
        Some(directory) => {
            fs::create_dir_all(&directory)?;

            for descriptor in descriptors {
                let path = directory.join(config.script_file_name(descriptor));
                fs::write(&path, descriptor.render().to_script(shebang))?;
                info!("Wrote {}", path.to_string_lossy());
            }
        }
        None => {
            let scripts: Vec<String> = descriptors
                .iter()
                .map(|descriptor| descriptor.render().to_script(shebang))
                .collect();
            print!("{}", scripts.join("\n"));
        }
    }

    Ok(())
}
