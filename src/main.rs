use clap::{Parser, Subcommand};
use derivo::cache::{DerivativeCache, Limits};
use derivo::imaging::{ImageBackend, Quality, RustBackend};
use derivo::storage::FsBlobStore;
use derivo::{
    AspectRatio, DerivativeRequest, ImageFormat, ShapeRequest, TenantScope, VariantRequest,
    config, output, query,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Tenant scope flags shared by every image command.
#[derive(clap::Args, Clone)]
struct ScopeArgs {
    /// Tenant code (no '-')
    #[arg(long)]
    tenant: String,

    /// Organisation code within the tenant
    #[arg(long)]
    org: String,
}

impl ScopeArgs {
    fn scope(&self) -> Result<TenantScope, derivo::ServiceError> {
        TenantScope::new(&self.tenant, &self.org)
    }
}

#[derive(Parser)]
#[command(name = "derivo")]
#[command(about = "On-demand image derivatives with a write-once storage cache")]
#[command(long_about = "\
On-demand image derivatives with a write-once storage cache

Originals are uploaded once per tenant scope and named by content hash.
Every request for a width, height, aspect ratio or format is resolved to a
concrete shape, built on first use by resizing and center-cropping the
original, and served from storage afterwards.

Storage layout:

  {namespace}/{tenant}-{org}/{name}/{name}.{ext}                    original
  {namespace}/{tenant}-{org}/{name}/{format}/{w}:{h}/{width}/{name}.{format}

Shapes (for get flags and warm --shape queries):
  width + height      exact box, cropped from the center
  width or height     other side follows the original's aspect ratio
  ar + width/height   other side follows the given ratio
  ar alone            largest box of that ratio inside the original
  nothing             the original itself

Run 'derivo gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Directory containing config.toml
    #[arg(long, default_value = ".", global = true)]
    config_dir: PathBuf,

    /// Storage root directory (overrides storage.root)
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(flatten)]
    Image(ImageCommand),
    /// Print a stock config.toml with all options documented
    GenConfig,
}

/// Commands that open the configured storage.
#[derive(Subcommand)]
enum ImageCommand {
    /// Store an image file as a new original
    Upload {
        /// Image file (JPEG, PNG, WebP or AVIF)
        file: PathBuf,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Fetch one derivative, building it on first request
    Get {
        /// Image name returned by upload
        name: String,
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        /// Aspect ratio as W:H
        #[arg(long)]
        ar: Option<AspectRatio>,
        /// avif, webp, jpeg, png or auto
        #[arg(long)]
        format: Option<ImageFormat>,
        /// Accept header to negotiate the format from when --format is absent or auto
        #[arg(long)]
        accept: Option<String>,
        /// Where to write the image bytes
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Build several derivatives of one original in parallel
    Warm {
        /// Image name returned by upload
        name: String,
        #[command(flatten)]
        scope: ScopeArgs,
        /// Shape as a query string, e.g. "width=300&ar=4:3&format=webp"
        #[arg(long = "shape", required = true)]
        shapes: Vec<String>,
    },
    /// List the cached derivatives of an original
    Variants {
        /// Image name returned by upload
        name: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenConfig => print!("{}", config::stock_config_toml()),
        Command::Image(command) => {
            let config = config::load_config(&cli.config_dir)?;
            init_logging(&config.logging);
            init_thread_pool(&config.processing);
            let storage_root = cli
                .storage
                .unwrap_or_else(|| PathBuf::from(&config.storage.root));
            run(command, &config, storage_root, cli.json)?;
        }
    }

    Ok(())
}

fn run(
    command: ImageCommand,
    config: &config::ServiceConfig,
    storage_root: PathBuf,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(root = %storage_root.display(), namespace = %config.storage.namespace, "opening storage");
    let cache = DerivativeCache::new(
        RustBackend::with_quality(Quality::new(config.processing.quality)),
        FsBlobStore::new(storage_root),
        &config.storage.namespace,
    )
    .with_limits(Limits::from(&config.limits));

    match command {
        ImageCommand::Upload { file, scope } => {
            let scope = scope.scope()?;
            let bytes = std::fs::read(&file)?;
            let name = cache.upload(&bytes, &scope)?;
            let spec = cache.backend().inspect(&bytes).ok();
            if json {
                println!("{}", output::upload_json(&name, &scope, spec.as_ref())?);
            } else {
                output::print_upload(&name, &scope, spec.as_ref());
            }
        }
        ImageCommand::Get {
            name,
            scope,
            width,
            height,
            ar,
            format,
            accept,
            output: output_path,
        } => {
            let variant = VariantRequest {
                shape: ShapeRequest {
                    width,
                    height,
                    aspect_ratio: ar,
                },
                format: query::negotiate_format(format, accept.as_deref()),
            };
            let request = DerivativeRequest::new(scope.scope()?, &name, variant);
            request.validate()?;

            let derivative = cache.get_image(&request)?;
            std::fs::write(&output_path, &derivative.bytes)?;
            if json {
                println!("{}", output::derivative_json(&derivative, &output_path)?);
            } else {
                output::print_derivative(&derivative, &output_path);
            }
        }
        ImageCommand::Warm {
            name,
            scope,
            shapes,
        } => {
            let scope = scope.scope()?;
            let variants = shapes
                .iter()
                .map(|s| query::parse_variant(s))
                .collect::<Result<Vec<_>, _>>()?;

            let results = cache.warm(&scope, &name, &variants);
            output::print_warm(&shapes, &results, &cache.stats());

            let failed = results.iter().filter(|r| r.is_err()).count();
            if failed > 0 {
                return Err(format!("{failed} of {} shapes failed", results.len()).into());
            }
        }
        ImageCommand::Variants { name, scope } => {
            let keys = cache.variants(&scope.scope()?, &name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&keys)?);
            } else {
                output::print_variants(&name, &keys);
            }
        }
    }

    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` wins over `logging.level`.
/// Logs go to stderr so command output on stdout stays clean.
fn init_logging(logging: &config::LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
