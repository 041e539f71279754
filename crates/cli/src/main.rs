mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::output::{Mark, OutputFormat, status};

/// portwright - source-based package build engine
#[derive(Parser)]
#[command(name = "pw")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Increase log verbosity (-v info, -vv debug)
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run every stage over the packages of a package list
  Batch {
    /// File with one `name,target,patchlevel` line per package
    list: PathBuf,

    /// Run the test sweep between build and package
    #[arg(long)]
    tests: bool,
  },

  /// Inspect and maintain the build manifest
  Manifest {
    #[command(subcommand)]
    action: ManifestAction,
  },

  /// Fetch the sources of one recipe target
  Fetch {
    /// Recipe source description (JSON)
    recipe: PathBuf,

    /// Target to fetch (default: the recipe's default target)
    #[arg(short, long)]
    target: Option<String>,

    /// Unpack the downloaded archives into this directory
    #[arg(long, value_name = "DIR")]
    unpack: Option<PathBuf>,
  },

  /// Show which backend a source URL maps to
  Classify {
    url: String,
  },

  /// Order version strings, oldest first
  Version {
    #[arg(required = true)]
    versions: Vec<String>,

    /// Print only the newest version
    #[arg(long)]
    latest: bool,
  },

  /// Print the tagged digest of a file
  Hash {
    file: PathBuf,

    /// Digest algorithm
    #[arg(short, long, default_value = "sha256")]
    algorithm: String,

    /// Verify the file against its .sha1 sidecar instead
    #[arg(long)]
    sidecar: bool,
  },

  /// List the files of a directory with their digests
  List {
    dir: PathBuf,
  },

  /// Merge an image directory into the install root
  Merge {
    image: PathBuf,

    /// Install root (default: the configured root)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Hardlink instead of copying
    #[arg(long)]
    hardlink: bool,
  },

  /// Remove the files of a listing from the install root
  Unmerge {
    /// Listing produced by `pw list -o json`
    listing: PathBuf,

    /// Install root (default: the configured root)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Delete files even when their digest changed
    #[arg(short, long)]
    force: bool,
  },
}

#[derive(Subcommand)]
enum ManifestAction {
  /// Print the local manifest
  Show {
    /// Only this package
    package: Option<String>,
  },

  /// Merge the remote manifests into the local cache
  Sync,

  /// Record a built file for a package
  Record {
    package: String,
    file: PathBuf,

    /// Version the file was built from
    #[arg(long, default_value = "")]
    version: String,

    /// Build root at the time of the build
    #[arg(long)]
    build_prefix: Option<String>,

    /// Build option snapshot, as key=value
    #[arg(long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,
  },
}

fn init_logging(verbose: u8) {
  let default = match verbose {
    0 => "warn",
    1 => "info",
    _ => "debug",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  match run(cli).await {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::FAILURE,
    Err(e) => {
      status(Mark::Failed, &format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}

/// Dispatch a command. `Ok(false)` means it ran but reported a failure.
async fn run(cli: Cli) -> Result<bool> {
  let output = cli.output;
  match cli.command {
    Commands::Batch { list, tests } => cmd::cmd_batch(&list, tests, output).await,
    Commands::Manifest { action } => match action {
      ManifestAction::Show { package } => cmd::cmd_manifest_show(package.as_deref(), output).map(|_| true),
      ManifestAction::Sync => cmd::cmd_manifest_sync(output).await.map(|_| true),
      ManifestAction::Record {
        package,
        file,
        version,
        build_prefix,
        options,
      } => cmd::cmd_manifest_record(&package, &file, &version, build_prefix, &options, output).map(|_| true),
    },
    Commands::Fetch { recipe, target, unpack } => cmd::cmd_fetch(&recipe, target.as_deref(), unpack.as_deref(), output)
      .await
      .map(|_| true),
    Commands::Classify { url } => cmd::cmd_classify(&url, output).map(|_| true),
    Commands::Version { versions, latest } => cmd::cmd_version(versions, latest, output).map(|_| true),
    Commands::Hash {
      file,
      algorithm,
      sidecar,
    } => cmd::cmd_hash(&file, &algorithm, sidecar, output),
    Commands::List { dir } => cmd::cmd_list(&dir, output).map(|_| true),
    Commands::Merge { image, root, hardlink } => cmd::cmd_merge(&image, root, hardlink, output).map(|_| true),
    Commands::Unmerge { listing, root, force } => cmd::cmd_unmerge(&listing, root, force, output),
  }
}
