use std::error::Error;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use markers::dhms::{parse_dhms, share_link};
use markers::format::MINIMAL;
use markers::{FormatterRegistry, JsonFileStore, MarkerStorage, OverlayConfig};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Convert, share and inspect video markers")]
struct Cli {
    /// TOML file overriding the default settings.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-encode marker text from one formatter to another.
    Convert {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        /// Input file; stdin when omitted.
        file: Option<PathBuf>,
    },
    /// Print a link opening the video at TIME (DHMS or seconds).
    Share { video_id: String, time: String },
    /// Print the markers stored for a video.
    Show {
        #[arg(short, long)]
        store: PathBuf,
        video_id: String,
    },
}

fn main() -> ExitCode {
    init_tracing();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = OverlayConfig::load(cli.config.as_deref())?;
    let registry = FormatterRegistry::with_builtin(config.minimal_min_places);
    debug!(formatters = ?registry.names(), "registry ready");

    match cli.command {
        Commands::Convert { from, to, file } => {
            let source = registry.get(&from)?;
            let target = registry.get(&to)?;
            let text = match file {
                Some(path) => std::fs::read_to_string(path)?,
                None => {
                    let mut text = String::new();
                    std::io::stdin().read_to_string(&mut text)?;
                    text
                }
            };
            let markers = source.deserialize_all(&text)?;
            println!("{}", target.serialize_all(&markers)?);
        }
        Commands::Share { video_id, time } => {
            let seconds = parse_dhms(&time)?;
            println!("{}", share_link(&config.share_base_url, &video_id, seconds));
        }
        Commands::Show { store, video_id } => {
            let storage = MarkerStorage::new(Arc::new(JsonFileStore::open(store)?), &config);
            let markers = storage.load_markers(&video_id, &registry)?;
            println!("{}", registry.get(MINIMAL)?.serialize_all(&markers)?);
        }
    }
    Ok(())
}
