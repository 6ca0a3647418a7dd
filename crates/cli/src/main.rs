mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use output::{OutputFormat, print_error};

/// mbs - managed build system
#[derive(Parser)]
#[command(name = "mbs")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  /// Manifest directory (repeatable); defaults to MBS_MANIFEST_PATH or the config directory
  #[arg(short, long = "manifests", global = true)]
  manifests: Vec<PathBuf>,

  /// Project directory
  #[arg(short = 'C', long, global = true, default_value = ".")]
  project: PathBuf,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// List extension objects from the manifests
  List {
    /// Element kind, e.g. projectType, toolChain, tool
    #[arg(default_value = "projectType")]
    kind: String,

    /// Include abstract objects
    #[arg(short, long)]
    all: bool,
  },

  /// Create a project from a project type
  New {
    /// Project type ID
    project_type: String,

    /// Project name (default: directory name)
    #[arg(short, long)]
    name: Option<String>,

    /// Project nature, c or cc (repeatable)
    #[arg(long = "nature")]
    natures: Vec<String>,
  },

  /// Show, get or set tool option values
  #[command(name = "option")]
  ToolOption {
    /// Tool ID or name
    tool: String,

    /// Option ID or name; omit to list all options of the tool
    option: Option<String>,

    /// New value; lists are separated by ';'
    value: Option<String>,

    /// Configuration (default: the project's default configuration)
    #[arg(short, long)]
    configuration: Option<String>,

    /// Scope the option to a single source file
    #[arg(short, long)]
    file: Option<String>,
  },

  /// Show the steps a build would run
  Plan {
    /// Configuration (default: the project's default configuration)
    #[arg(short, long)]
    configuration: Option<String>,

    /// Treat every step as out of date
    #[arg(long)]
    rebuild: bool,
  },

  /// Build a configuration
  Build {
    /// Configuration (default: the project's default configuration)
    #[arg(short, long)]
    configuration: Option<String>,

    /// Rebuild everything
    #[arg(long)]
    rebuild: bool,

    /// Parallel steps; negative picks the number of CPUs
    #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
    jobs: i32,

    /// Keep building independent steps after a failure
    #[arg(short, long)]
    keep_going: bool,

    /// Emit dependency files where tools support them
    #[arg(long)]
    depfiles: bool,

    /// Shell used to run commands
    #[arg(long)]
    shell: Option<String>,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let level = match cli.verbose {
    0 => "warn",
    1 => "info",
    _ => "debug",
  };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let ctx = cmd::Context {
    project_dir: dunce::canonicalize(&cli.project).unwrap_or(cli.project),
    manifests: cli.manifests,
    output: cli.output,
  };

  let result = match cli.command {
    Commands::List { kind, all } => cmd::cmd_list(&ctx, &kind, all),
    Commands::New {
      project_type,
      name,
      natures,
    } => cmd::cmd_new(&ctx, &project_type, name.as_deref(), &natures),
    Commands::ToolOption {
      tool,
      option,
      value,
      configuration,
      file,
    } => cmd::cmd_option(
      &ctx,
      &tool,
      option.as_deref(),
      value.as_deref(),
      configuration.as_deref(),
      file.as_deref(),
    ),
    Commands::Plan { configuration, rebuild } => cmd::cmd_plan(&ctx, configuration.as_deref(), rebuild),
    Commands::Build {
      configuration,
      rebuild,
      jobs,
      keep_going,
      depfiles,
      shell,
    } => cmd::cmd_build(
      &ctx,
      cmd::BuildArgs {
        configuration,
        rebuild,
        jobs,
        keep_going,
        depfiles,
        shell,
      },
    ),
  };

  match result {
    Ok(code) => code,
    Err(e) => {
      print_error(&format!("{e:#}"));
      ExitCode::FAILURE
    }
  }
}
