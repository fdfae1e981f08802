use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use poster_overlay::{
    EnhanceOutcome, InMemoryLibrary, ItemId, LibraryItem, MediaLibrary, OverlayConfig,
    OverlayService,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "poster-overlay", version)]
struct Cli {
    /// TOML configuration file. `POSTER_OVERLAY_*` variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Composite overlays onto one item's poster.
    Render(RenderArgs),
    /// Print the cache key the host would store for an item.
    Key(ItemArgs),
    /// Index the icon folder and print what was found.
    Icons,
    /// Draw one sample icon per enabled category of a profile.
    Preview(PreviewArgs),
    /// Print the effective configuration after layering.
    ShowConfig,
}

#[derive(Parser, Debug)]
struct ItemArgs {
    /// Library snapshot: JSON array of `{ item, parent, streams }`.
    #[arg(long)]
    library: PathBuf,

    /// Item id (uuid).
    #[arg(long)]
    item: String,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[command(flatten)]
    target: ItemArgs,

    /// Source poster.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct PreviewArgs {
    /// Profile name from the configuration.
    #[arg(long)]
    profile: String,

    /// Source poster.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output path.
    #[arg(long)]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "poster_overlay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = OverlayConfig::load(cli.config.as_deref()).context("load configuration")?;
    match cli.cmd {
        Command::Render(args) => cmd_render(config, args).await,
        Command::Key(args) => cmd_key(config, args),
        Command::Icons => cmd_icons(config),
        Command::Preview(args) => cmd_preview(config, args).await,
        Command::ShowConfig => {
            print!("{}", toml::to_string_pretty(&config).context("serialize configuration")?);
            Ok(())
        }
    }
}

fn read_library(path: &Path) -> anyhow::Result<Arc<InMemoryLibrary>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("read library snapshot '{}'", path.display()))?;
    let lib = InMemoryLibrary::from_json(&json)
        .with_context(|| format!("parse library snapshot '{}'", path.display()))?;
    Ok(Arc::new(lib))
}

fn open(config: OverlayConfig, args: &ItemArgs) -> anyhow::Result<(OverlayService, LibraryItem)> {
    let lib = read_library(&args.library)?;
    let id = ItemId::parse(&args.item)
        .with_context(|| format!("'{}' is not an item id", args.item))?;
    let item = lib
        .get(id)
        .with_context(|| format!("item {id} not in snapshot"))?;
    let service = OverlayService::new(config, lib)?;
    Ok((service, item))
}

async fn cmd_render(config: OverlayConfig, args: RenderArgs) -> anyhow::Result<()> {
    let (service, item) = open(config, &args.target)?;
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let outcome = service
        .enhance(&item, &args.in_path, &args.out, &cancel)
        .await;
    ctrl_c.abort();
    match outcome {
        EnhanceOutcome::Composited | EnhanceOutcome::CopiedOriginal => {
            eprintln!("{outcome:?}: wrote {}", args.out.display());
            println!("{}", service.cache_key(&item));
            Ok(())
        }
        EnhanceOutcome::Cancelled => anyhow::bail!("cancelled"),
        EnhanceOutcome::Failed => anyhow::bail!("could not write '{}'", args.out.display()),
    }
}

fn cmd_key(config: OverlayConfig, args: ItemArgs) -> anyhow::Result<()> {
    let (service, item) = open(config, &args)?;
    println!("{}", service.cache_key(&item));
    Ok(())
}

fn cmd_icons(config: OverlayConfig) -> anyhow::Result<()> {
    let folder = config.icons_folder.clone();
    let service = OverlayService::new(config, Arc::new(InMemoryLibrary::new()))?;
    service.icons().initialize(&folder);
    let stats = service.icons().stats();
    println!(
        "{}",
        serde_json::to_string_pretty(&stats).context("serialize icon stats")?
    );
    Ok(())
}

async fn cmd_preview(config: OverlayConfig, args: PreviewArgs) -> anyhow::Result<()> {
    let profile = config
        .profile(&args.profile)
        .cloned()
        .with_context(|| format!("unknown profile '{}'", args.profile))?;
    let service = OverlayService::new(config, Arc::new(InMemoryLibrary::new()))?;
    let placements = service
        .render_preview(&profile, &args.in_path, &args.out)
        .await
        .with_context(|| format!("preview '{}'", args.in_path.display()))?;
    for g in &placements {
        eprintln!(
            "{:<18} {:?} {} item(s) at {:?}",
            g.category.label(),
            g.alignment,
            g.items.len(),
            g.bounds
        );
    }
    eprintln!("wrote {}", args.out.display());
    Ok(())
}
