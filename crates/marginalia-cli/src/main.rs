//! Marginalia command line entry point (native).
//!
//! Exports an attempt from a JSON ink file as a flattened image of the page
//! region it was written on.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use marginalia_core::{
    ConfigError, ExportFormat, FileRepository, InkConfig, InkContext, InkStore, RepositoryError,
};
use marginalia_render::{CompositeExporter, DocumentRenderer, ExportError, ExportRequest, ImageDocument, RenderError};
use uuid::Uuid;

const DEFAULT_MAX_SOURCE_BYTES: u64 = 64 * 1024 * 1024;
const DEFAULT_MAX_OUTPUT_PIXELS: u64 = 4096 * 4096;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Document(#[from] RenderError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

#[derive(Parser, Debug)]
#[command(name = "marginalia", version, about = "Ink annotation export tool")]
struct Cli {
    /// JSON config file; missing sections use defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Flatten one attempt onto its page region.
    Export {
        #[arg(long)]
        ink: PathBuf,
        #[arg(long)]
        attempt: Uuid,
        /// Page images in document order.
        #[arg(long = "page", required = true)]
        pages: Vec<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Encode as JPEG instead of PNG.
        #[arg(long)]
        jpeg: bool,
        #[arg(long, default_value_t = 90)]
        quality: u8,
        /// Print a data URI instead of writing a file.
        #[arg(long)]
        data_uri: bool,
        #[arg(long, default_value_t = DEFAULT_MAX_SOURCE_BYTES)]
        max_source_bytes: u64,
        #[arg(long, default_value_t = DEFAULT_MAX_OUTPUT_PIXELS)]
        max_output_pixels: u64,
    },
    /// List the attempts stored for a session and document.
    Attempts {
        #[arg(long)]
        ink: PathBuf,
        #[arg(long)]
        session: Uuid,
        #[arg(long)]
        document: Uuid,
    },
    /// Print the effective configuration as JSON.
    Config,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        log::error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => InkConfig::load(path)?,
        None => InkConfig::default(),
    };

    match cli.command {
        Command::Export {
            ink,
            attempt,
            pages,
            out,
            jpeg,
            quality,
            data_uri,
            max_source_bytes,
            max_output_pixels,
        } => {
            let repo = FileRepository::open(ink)?;
            let document = ImageDocument::open(&pages)?;
            log::info!(
                "Loaded {} page(s), {} source bytes",
                document.page_count(),
                document.source_len()
            );

            let mut export = config.export;
            if jpeg {
                export.format = ExportFormat::Jpeg { quality };
            }
            let request = ExportRequest {
                attempt_id: attempt,
                max_source_bytes,
                max_output_pixels,
            };
            let exporter = CompositeExporter::new(&repo, Some(&document), export);
            let image = pollster::block_on(exporter.export(&request))?;

            if data_uri {
                println!("{}", image.to_data_uri());
                return Ok(());
            }
            let path = out.unwrap_or_else(|| {
                let extension = image.format.extension();
                PathBuf::from(format!("{attempt}.{extension}"))
            });
            std::fs::write(&path, &image.bytes).map_err(|source| CliError::Write {
                path: path.clone(),
                source,
            })?;
            println!(
                "{} ({}x{}, page {})",
                path.display(),
                image.width,
                image.height,
                image.page_number
            );
        }
        Command::Attempts { ink, session, document } => {
            let repo = FileRepository::open(ink)?;
            let mut store = InkStore::new(&config);
            let context = InkContext {
                session_id: session,
                document_id: document,
            };
            if let Some(ticket) = store.set_context(Some(context)) {
                store.apply_hydration(pollster::block_on(ticket.load(&repo)))?;
            }
            for card in store.attempt_cards() {
                let b = card.bounds;
                println!(
                    "{}  {:>4} stroke(s)  [{:.1}, {:.1}] - [{:.1}, {:.1}]",
                    card.attempt_id, card.stroke_count, b.x0, b.y0, b.x1, b.y1
                );
            }
        }
        Command::Config => {
            println!("{}", config.to_json()?);
        }
    }
    Ok(())
}
