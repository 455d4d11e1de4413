//! Oxide Probe - inspect media items with the local worker pools.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use oxide_media::{
    Event, EventCallback, EventPayload, EventType, Instance, InstanceConfig, ListPath, Media,
    ParseFlags, ParseStatus, ParseTimeout, PictureType, ThumbnailParams,
};

/// Oxide Probe - preparse media items and print what was found
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Paths or MRLs to probe
    #[arg(required = true)]
    locations: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Instance configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Parse timeout in milliseconds (-1 default, 0 infinite)
    #[arg(long, default_value = "-1", allow_hyphen_values = true)]
    timeout: i64,

    /// Maximum directory depth
    #[arg(long)]
    depth: Option<usize>,

    /// Parse network items too
    #[arg(long)]
    network: bool,

    /// Look for local art next to items
    #[arg(long)]
    fetch: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Write a thumbnail of each item into this directory
    #[arg(long)]
    thumbnail: Option<PathBuf>,

    /// Thumbnail width; height follows the aspect ratio
    #[arg(long, default_value = "320")]
    thumbnail_width: u32,
}

impl Args {
    fn parse_flags(&self) -> ParseFlags {
        let mut flags = ParseFlags::LOCAL;
        if self.network {
            flags |= ParseFlags::NETWORK;
        }
        if self.fetch {
            flags |= ParseFlags::FETCH_LOCAL;
        }
        flags
    }

    fn instance_config(&self) -> Result<InstanceConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => InstanceConfig::default(),
        };
        if let Some(depth) = self.depth {
            config = config.with_max_subtree_depth(depth);
        }
        Ok(config)
    }
}

fn open(location: &str) -> Result<Arc<Media>> {
    let media = if location.contains("://") {
        Media::new_location(location)?
    } else {
        Media::new_path(location)?
    };
    Ok(media)
}

/// Open and parse one location; failures are logged and skipped.
async fn parse_location(
    instance: &Instance,
    location: &str,
    flags: ParseFlags,
    timeout: ParseTimeout,
) -> Option<(Arc<Media>, ParseStatus)> {
    let media = match open(location) {
        Ok(media) => media,
        Err(err) => {
            warn!("Skipping {}: {}", location, err);
            return None;
        }
    };
    if let Err(err) = media.parse_request(instance, flags, timeout) {
        warn!("Skipping {}: {}", location, err);
        return None;
    }
    let status = match media.parsed_status() {
        status if status.is_finished() => status,
        _ => media.wait_parsed().await,
    };
    Some((media, status))
}

/// Sub-items in pre-order, with their path below the root.
fn subtree(media: &Arc<Media>) -> Vec<(ListPath, Arc<Media>)> {
    let mut found = Vec::new();
    let mut pending: Vec<(ListPath, Arc<Media>)> = media
        .subitems()
        .items()
        .into_iter()
        .enumerate()
        .rev()
        .map(|(index, item)| (ListPath::with_root_index(index), item))
        .collect();

    while let Some((path, item)) = pending.pop() {
        let children = item.subitems().items();
        for (index, child) in children.into_iter().enumerate().rev() {
            pending.push((path.copy_by_appending(index), child));
        }
        found.push((path, item));
    }
    found
}

fn print_text(location: &str, media: &Arc<Media>, status: ParseStatus) {
    let duration = media
        .duration()
        .map(|duration| duration.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{} [{}] {:?} {} ({})",
        location,
        status,
        media.item_type(),
        media.name(),
        duration
    );
    for (path, item) in subtree(media) {
        println!("  {:<12} {:?} {}", path.to_string(), item.item_type(), item.name());
    }
}

fn to_json(location: &str, media: &Arc<Media>, status: ParseStatus) -> serde_json::Value {
    let children: Vec<_> = subtree(media)
        .into_iter()
        .map(|(path, item)| {
            serde_json::json!({
                "path": path.indices(),
                "mrl": item.mrl(),
                "name": item.name(),
                "type": format!("{:?}", item.item_type()),
            })
        })
        .collect();
    serde_json::json!({
        "location": location,
        "mrl": media.mrl(),
        "status": status.as_str(),
        "name": media.name(),
        "type": format!("{:?}", media.item_type()),
        "duration_ms": media.duration().map(|duration| duration.get()),
        "children": children,
    })
}

async fn write_thumbnail(
    instance: &Arc<Instance>,
    media: &Arc<Media>,
    dir: &Path,
    index: usize,
    width: u32,
) -> Result<()> {
    let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
    let callback: EventCallback = Arc::new(move |event: &Event| {
        if let EventPayload::MediaThumbnailGenerated { picture } = &event.payload {
            let _ = sender.send(picture.clone());
        }
    });
    media
        .event_bus()
        .attach(EventType::MediaThumbnailGenerated, callback.clone())?;

    let picture_type = PictureType::Png;
    let params = ThumbnailParams::at_position(0.3)
        .with_size(width, 0)
        .with_picture_type(picture_type);
    let request = media.thumbnail_request(instance, params)?;
    let picture = receiver.recv().await.flatten();
    drop(request);
    media
        .event_bus()
        .detach(EventType::MediaThumbnailGenerated, &callback);

    match picture {
        Some(picture) => {
            let path = dir.join(format!("thumb-{}.{}", index, picture_type.extension()));
            picture.save(&path)?;
            info!("Thumbnail saved to: {}", path.display());
        }
        None => warn!("No thumbnail for {}", media.mrl()),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
        let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("Oxide Probe v{}", oxide_media::VERSION);
    let config = args.instance_config()?;
    let instance = preparser::local_instance(config);
    let flags = args.parse_flags();
    let timeout = ParseTimeout::from_millis(args.timeout);

    if let Some(dir) = &args.thumbnail {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let mut reports = Vec::new();
    for (index, location) in args.locations.iter().enumerate() {
        let Some((media, status)) = parse_location(&instance, location, flags, timeout).await
        else {
            continue;
        };

        if args.json {
            reports.push(to_json(location, &media, status));
        } else {
            print_text(location, &media, status);
        }

        if let Some(dir) = &args.thumbnail {
            let wait = write_thumbnail(&instance, &media, dir, index, args.thumbnail_width);
            match tokio::time::timeout(Duration::from_secs(30), wait).await {
                Ok(result) => result?,
                Err(_) => warn!("Thumbnail of {} timed out", location),
            }
        }
        // Release blocks until the pools are done with the item.
        tokio::task::spawn_blocking(move || media.release()).await?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    Ok(())
}
