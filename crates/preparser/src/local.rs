//! Filesystem preparser.

use crate::jobs::{build_runtime, race, CancelRegistry, Race};
use crate::playlist;
use crate::scan;
use common::{MediaError, MediaResult};
use oxide_media::{
    Fourcc, InstanceConfig, ItemType, Location, MetaKey, ParseJob, ParseReporter, ParseScope,
    PreparseOutcome, Preparser, Refused, RequestId, Track, TrackDetails,
};
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::Semaphore;
use url::Url;

/// Preparser reading local files and directories.
///
/// Jobs run on a runtime owned by the pool, at most `preparse_threads` at
/// a time. Network items fail: this pool has no network access.
pub struct LocalPreparser {
    runtime: Option<Runtime>,
    config: Arc<InstanceConfig>,
    cancels: Arc<CancelRegistry>,
    permits: Arc<Semaphore>,
}

impl LocalPreparser {
    pub fn new(config: &InstanceConfig) -> MediaResult<Arc<Self>> {
        let runtime = build_runtime("preparser", config.preparse_threads)?;
        Ok(Arc::new(Self {
            runtime: Some(runtime),
            permits: Arc::new(Semaphore::new(config.preparse_threads.max(1))),
            config: Arc::new(config.clone()),
            cancels: Arc::new(CancelRegistry::default()),
        }))
    }

    /// Number of jobs accepted and not yet completed.
    pub fn in_flight(&self) -> usize {
        self.cancels.len()
    }
}

impl Preparser for LocalPreparser {
    fn push(&self, job: ParseJob) -> Result<(), Refused<ParseJob>> {
        let Some(runtime) = self.runtime.as_ref() else {
            return Err(Refused::new(job, MediaError::worker("preparser shut down")));
        };
        let cancel = self.cancels.register(job.id);
        let config = self.config.clone();
        let cancels = self.cancels.clone();
        let permits = self.permits.clone();

        runtime.spawn(async move {
            let ParseJob {
                id,
                scope,
                timeout,
                reporter,
            } = job;
            let outcome = match race(run(&reporter, scope, &config, &permits), cancel, timeout).await
            {
                Race::Done(Ok(())) => PreparseOutcome::Success,
                Race::Done(Err(err)) => {
                    tracing::debug!(%id, %err, "preparse failed");
                    PreparseOutcome::Failed
                }
                Race::Cancelled => PreparseOutcome::Interrupted,
                Race::TimedOut => PreparseOutcome::Timeout,
            };
            cancels.forget(id);
            reporter.finish(outcome);
        });
        Ok(())
    }

    fn cancel(&self, id: RequestId) {
        if self.cancels.cancel(id) {
            tracing::debug!(%id, "preparse cancelled");
        }
    }
}

impl Drop for LocalPreparser {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn run(
    reporter: &ParseReporter,
    scope: ParseScope,
    config: &InstanceConfig,
    permits: &Semaphore,
) -> MediaResult<()> {
    let _permit = permits
        .acquire()
        .await
        .map_err(|_| MediaError::worker("preparser closed"))?;
    let location = reporter.media().location();

    if scope.contains(ParseScope::PARSE) {
        parse(reporter, &location, scope, config).await?;
    }
    if scope.contains(ParseScope::FETCH_LOCAL) {
        fetch_local_art(reporter, &location, config).await;
    }
    if scope.contains(ParseScope::FETCH_NETWORK) {
        tracing::trace!(media = %reporter.media().id(), "no network art fetcher");
    }
    Ok(())
}

async fn parse(
    reporter: &ParseReporter,
    location: &Location,
    scope: ParseScope,
    config: &InstanceConfig,
) -> MediaResult<()> {
    if location.is_network() {
        return Err(MediaError::unsupported(format!("network location {}", location)));
    }
    if location.item_type() == ItemType::Node {
        return Ok(());
    }

    let path = scan::local_path(location)?;
    let metadata = tokio::fs::metadata(&path).await?;
    reporter.set_file_stat(scan::file_stat(&metadata));

    if metadata.is_dir() {
        reporter.set_item_type(ItemType::Directory);
        if scope.contains(ParseScope::SUBITEMS) {
            let tree = scan::list_directory(&path, config.max_subtree_depth).await?;
            if !tree.is_empty() {
                reporter.subtree(&tree)?;
            }
        }
        return Ok(());
    }

    if playlist::is_m3u(&path) {
        reporter.set_item_type(ItemType::Playlist);
        let text = tokio::fs::read_to_string(&path).await?;
        let base = path.parent().unwrap_or_else(|| Path::new("/"));
        let tree = playlist::parse_m3u(&text, base)?;
        if scope.contains(ParseScope::SUBITEMS) && !tree.is_empty() {
            reporter.subtree(&tree)?;
        }
        return Ok(());
    }

    reporter.set_item_type(ItemType::File);
    if !reporter.has_meta(MetaKey::Title) {
        if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
            reporter.set_meta(MetaKey::Title, Some(stem.to_string()));
        }
    }
    if let Some(track) = image_track(&path) {
        reporter.set_tracks(vec![track]);
    }
    Ok(())
}

/// Describe a still image as a single video track.
fn image_track(path: &Path) -> Option<Track> {
    let format = image::ImageFormat::from_path(path).ok()?;
    let codec = match format {
        image::ImageFormat::Png => Fourcc::new(b"png "),
        image::ImageFormat::Jpeg => Fourcc::new(b"jpeg"),
        image::ImageFormat::WebP => Fourcc::new(b"webp"),
        _ => return None,
    };
    let (width, height) = image::image_dimensions(path).ok()?;
    Some(Track::new(
        0,
        codec,
        TrackDetails::Video {
            width,
            height,
            sar_num: 1,
            sar_den: 1,
            frame_rate_num: 0,
            frame_rate_den: 1,
        },
    ))
}

async fn fetch_local_art(reporter: &ParseReporter, location: &Location, config: &InstanceConfig) {
    let Some(path) = location.to_file_path() else {
        return;
    };
    let dir = if tokio::fs::metadata(&path)
        .await
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false)
    {
        path
    } else {
        match path.parent() {
            Some(parent) => parent.to_path_buf(),
            None => return,
        }
    };

    let Some((art, attachment)) = scan::find_art(&dir, &config.fetch_art_names).await else {
        return;
    };
    if let Ok(url) = Url::from_file_path(&art) {
        reporter.set_meta(MetaKey::ArtworkUrl, Some(url.to_string()));
    }
    reporter.attachments(&[attachment]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_media::{
        Event, EventCallback, EventPayload, EventType, FileStatKind, Instance, Media, ParseFlags,
        ParseStatus, ParseTimeout, TrackType,
    };
    use std::fs;
    use std::sync::mpsc;
    use std::time::Duration;

    fn instance(config: InstanceConfig) -> Arc<Instance> {
        Instance::builder(config)
            .with_preparser_factory(|config| {
                let pool: Arc<dyn Preparser> = LocalPreparser::new(config)?;
                Ok(pool)
            })
            .build()
    }

    fn parse_and_wait(media: &Arc<Media>, instance: &Instance, flags: ParseFlags) -> ParseStatus {
        let (sender, receiver) = mpsc::channel();
        let callback: EventCallback = Arc::new(move |event: &Event| {
            if let EventPayload::MediaParsedChanged { status } = event.payload {
                let _ = sender.send(status);
            }
        });
        media
            .event_bus()
            .attach(EventType::MediaParsedChanged, callback.clone())
            .unwrap();
        media
            .parse_request(instance, flags, ParseTimeout::Default)
            .unwrap();
        let status = receiver.recv_timeout(Duration::from_secs(10)).unwrap();
        media
            .event_bus()
            .detach(EventType::MediaParsedChanged, &callback);
        status
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.ogg");
        fs::write(&path, vec![1u8; 300]).unwrap();
        let instance = instance(InstanceConfig::default());

        let media = Media::new_path(&path).unwrap();
        assert_eq!(parse_and_wait(&media, &instance, ParseFlags::LOCAL), ParseStatus::Done);
        assert_eq!(media.meta(MetaKey::Title).as_deref(), Some("song"));
        assert_eq!(media.file_stat(FileStatKind::Size), Some(300));
        assert!(media.file_stat(FileStatKind::Mtime).is_some());
    }

    #[test]
    fn test_parse_image_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.png");
        image::RgbaImage::new(6, 3).save(&path).unwrap();
        let instance = instance(InstanceConfig::default());

        let media = Media::new_path(&path).unwrap();
        assert_eq!(parse_and_wait(&media, &instance, ParseFlags::LOCAL), ParseStatus::Done);
        let tracks = media.tracks(TrackType::Video);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].codec, Fourcc::new(b"png "));
    }

    #[test]
    fn test_parse_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("album")).unwrap();
        fs::write(dir.path().join("album/01.flac"), b"x").unwrap();
        fs::write(dir.path().join("intro.ogg"), b"x").unwrap();
        let instance = instance(InstanceConfig::default());

        let media = Media::new_path(dir.path()).unwrap();
        assert_eq!(parse_and_wait(&media, &instance, ParseFlags::LOCAL), ParseStatus::Done);

        let items = media.subitems().items();
        let names: Vec<_> = items.iter().map(|item| item.name()).collect();
        assert_eq!(names, vec!["album", "intro.ogg"]);
        assert_eq!(items[0].subitems().lock().count(), 1);
    }

    #[test]
    fn test_parse_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.m3u");
        fs::write(&path, "#EXTM3U\n#EXTINF:3,First\na.ogg\nb.ogg\n").unwrap();
        let instance = instance(InstanceConfig::default());

        let media = Media::new_path(&path).unwrap();
        assert_eq!(parse_and_wait(&media, &instance, ParseFlags::LOCAL), ParseStatus::Done);
        let items = media.subitems().items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name(), "First");
    }

    #[test]
    fn test_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let instance = instance(InstanceConfig::default());
        let media = Media::new_path(dir.path().join("gone.ogg")).unwrap();
        assert_eq!(parse_and_wait(&media, &instance, ParseFlags::LOCAL), ParseStatus::Failed);
    }

    #[test]
    fn test_network_fails() {
        let instance = instance(InstanceConfig::default());
        let media = Media::new_location("https://example.invalid/a.ogg").unwrap();
        assert_eq!(parse_and_wait(&media, &instance, ParseFlags::NETWORK), ParseStatus::Failed);
    }

    #[test]
    fn test_local_art() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.ogg");
        fs::write(&path, b"x").unwrap();
        image::RgbaImage::new(2, 2)
            .save(dir.path().join("cover.png"))
            .unwrap();
        let instance = instance(InstanceConfig::default());
        let media = Media::new_path(&path).unwrap();

        let (sender, receiver) = mpsc::channel();
        let callback: EventCallback = Arc::new(move |event: &Event| {
            if let EventPayload::MediaAttachedThumbnailsFound { pictures } = &event.payload {
                let _ = sender.send(pictures.len());
            }
        });
        media
            .event_bus()
            .attach(EventType::MediaAttachedThumbnailsFound, callback)
            .unwrap();

        let flags = ParseFlags::LOCAL | ParseFlags::FETCH_LOCAL;
        assert_eq!(parse_and_wait(&media, &instance, flags), ParseStatus::Done);
        assert_eq!(receiver.recv_timeout(Duration::from_secs(1)).unwrap(), 1);
        assert!(media
            .meta(MetaKey::ArtworkUrl)
            .unwrap()
            .ends_with("/cover.png"));
    }

    #[test]
    fn test_cancel_and_release() {
        let instance = instance(InstanceConfig::default().with_preparse_timeout(Duration::ZERO));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.ogg");
        fs::write(&path, b"x").unwrap();
        let media = Media::new_path(&path).unwrap();

        media
            .parse_request(&instance, ParseFlags::LOCAL, ParseTimeout::Default)
            .unwrap();
        media.parse_stop(&instance);
        media.clone().release();
        assert!(matches!(
            media.parsed_status(),
            ParseStatus::Done | ParseStatus::Cancelled
        ));
    }
}
