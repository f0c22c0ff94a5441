use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use async_stream::{stream, try_stream};
use futures::StreamExt as _;
use futures_core::Stream;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::binary::{
    BinaryCache, BinaryFetcher, BinaryLocator, ExecutableSpec, FFMPEG, FetchEvent, Platform,
    ResolvedBinary, YT_DLP, builtin_specs, probe_version
};
use crate::command::CommandBuilder;
use crate::config::DownloaderConfig;
use crate::error::{Error, Result};
use crate::parser::ProgressParser;
use crate::process::{
    CapturedOutput, ExitReport, OutputStream, ProcessEvent, ProcessRunner, RunOptions, Termination
};
use crate::types::{
    BinaryHealth, DownloadConfig, DownloadEvent, DownloadResponse, EntryFailure, ErrorPolicy,
    HealthReport, OperationResult, PlaylistEvent, PlaylistInfo, PlaylistRequest, PlaylistResponse,
    PlaylistResult, ProgressEvent, Response, SearchRequest, SearchResponse, Stage, VideoInfo
};

const STDERR_TAIL_LINES: usize = 20;

const RESOLUTION_MARKERS: &[&str] = &[
    "Unsupported URL",
    "is not a valid URL",
    "Video unavailable",
    "This video is unavailable",
    "Private video",
    "Incomplete YouTube ID",
    "does not exist",
    "HTTP Error 404"
];

pub type DownloadStream<'a> = Pin<Box<dyn Stream<Item = Result<DownloadEvent>> + Send + 'a>>;
pub type PlaylistStream<'a> = Pin<Box<dyn Stream<Item = Result<PlaylistEvent>> + Send + 'a>>;
pub type SetupStream<'a> = Pin<Box<dyn Stream<Item = Result<FetchEvent>> + Send + 'a>>;

/// Entry point of the library.
///
/// Resolves yt-dlp and ffmpeg on first use (provisioning them if allowed),
/// then drives one yt-dlp process per operation. Resolved executables are
/// cached for the lifetime of the instance; see
/// [`recheck_binaries`](Self::recheck_binaries).
///
/// ```no_run
/// use asyncyt::{DownloadConfig, DownloadEvent, Downloader, DownloaderConfig, Quality};
/// use tokio_stream::StreamExt;
///
/// # async fn run() -> asyncyt::Result<()> {
/// let downloader = Downloader::new(DownloaderConfig::from_env()?)?;
/// let config = DownloadConfig::builder()
///     .quality(Quality::Hd720p)
///     .output_dir("./downloads")
///     .build()?;
///
/// let mut events = downloader.download("https://www.youtube.com/watch?v=dQw4w9WgXcQ", config);
/// while let Some(event) = events.next().await {
///     match event? {
///         DownloadEvent::Progress(p) => println!("{:?} {:.1}%", p.stage, p.percent),
///         DownloadEvent::Completed(result) => println!("saved {:?}", result.primary_file()),
///         DownloadEvent::Cancelled => println!("cancelled")
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Downloader {
    config: DownloaderConfig,
    runner: ProcessRunner,
    locator: BinaryLocator,
    fetcher: BinaryFetcher,
    cache: BinaryCache
}

impl Downloader {
    pub fn new(config: DownloaderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("asyncyt/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(config, client))
    }

    /// Uses `client` for provisioning downloads.
    pub fn with_client(config: DownloaderConfig, client: reqwest::Client) -> Self {
        let runner = ProcessRunner::new(config.grace_period);

        let mut locator = BinaryLocator::new(&config.bin_dir, runner.clone())
            .use_system_path(config.use_system_path);
        if let Some(ref path) = config.ytdlp_path {
            locator = locator.with_override(YT_DLP, path);
        }
        if let Some(ref path) = config.ffmpeg_path {
            locator = locator.with_override(FFMPEG, path);
        }

        let fetcher = BinaryFetcher::new(client, &config.bin_dir, runner.clone());

        Self {
            config,
            runner,
            locator,
            fetcher,
            cache: BinaryCache::new()
        }
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Metadata of a single video.
    pub async fn get_info(&self, url: &str) -> Result<VideoInfo> {
        self.get_info_with_cancel(url, &CancellationToken::new()).await
    }

    /// [`get_info`](Self::get_info) that gives up with [`Error::Cancelled`]
    /// once `cancel` fires, terminating the tool if it is running.
    pub async fn get_info_with_cancel(&self, url: &str, cancel: &CancellationToken) -> Result<VideoInfo> {
        let ytdlp = self.yt_dlp_or_cancel(cancel).await?;
        let builder = self
            .command(&ytdlp)
            .json_output()
            .skip_download()
            .no_playlist()
            .no_warnings()
            .arg("--")
            .url(url);

        let output = self.run_metadata(builder, url, cancel).await?;
        let line = output
            .stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| Error::Resolution {
                url: url.to_string(),
                reason: "no metadata returned".to_string()
            })?;
        Ok(serde_json::from_str(line)?)
    }

    /// Flat listing of a playlist's entries, without per-entry extraction.
    pub async fn get_playlist_info(&self, url: &str) -> Result<PlaylistInfo> {
        self.get_playlist_info_with_cancel(url, &CancellationToken::new()).await
    }

    pub async fn get_playlist_info_with_cancel(
        &self,
        url: &str,
        cancel: &CancellationToken
    ) -> Result<PlaylistInfo> {
        self.playlist_listing(url, None, cancel).await
    }

    /// Runs a `ytsearchN:` / `scsearchN:` query. Results keep the tool's
    /// order.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<VideoInfo>> {
        self.search_with_cancel(request, &CancellationToken::new()).await
    }

    pub async fn search_with_cancel(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken
    ) -> Result<Vec<VideoInfo>> {
        if request.query.trim().is_empty() {
            return Err(Error::Config("search query must not be empty".to_string()));
        }

        let ytdlp = self.yt_dlp_or_cancel(cancel).await?;
        let search_url = request.search_url();
        let builder = self
            .command(&ytdlp)
            .json_output()
            .no_warnings()
            .arg("--")
            .url(&search_url);

        let output = self.run_metadata(builder, &search_url, cancel).await?;
        let mut results = parse_json_lines::<VideoInfo>(&output.stdout)?;
        results.truncate(request.limit());
        tracing::debug!(query = %request.query, count = results.len(), "search finished");
        Ok(results)
    }

    pub fn download(&self, url: impl Into<String>, config: DownloadConfig) -> DownloadStream<'_> {
        self.download_with_cancel(url, config, CancellationToken::new())
    }

    /// Lazy, single-consumer download. The stream ends after
    /// [`DownloadEvent::Completed`], after [`DownloadEvent::Cancelled`], or
    /// with an error. Dropping it stops the download.
    pub fn download_with_cancel(
        &self,
        url: impl Into<String>,
        config: DownloadConfig,
        cancel: CancellationToken
    ) -> DownloadStream<'_> {
        let url = url.into();

        Box::pin(try_stream! {
            let started = Instant::now();
            let mut parser = ProgressParser::new();
            yield DownloadEvent::Progress(ProgressEvent::new(Stage::Pending, 0.0));

            let binaries = tokio::select! {
                resolved = async { (self.yt_dlp().await, self.ffmpeg().await) } => Some(resolved),
                () = cancel.cancelled() => None
            };
            let run = match binaries {
                Some((ytdlp, ffmpeg)) => {
                    let ytdlp = ytdlp?;
                    let output_dir = std::path::absolute(config.output_dir())?;
                    tokio::fs::create_dir_all(&output_dir).await?;

                    let (program, args) = self
                        .download_command(&ytdlp, ffmpeg.as_ref(), &config, &url)
                        .into_parts();
                    let timeout = config.timeout().or(self.config.download_timeout);
                    let options = self
                        .run_options()
                        .cwd(&output_dir)
                        .timeout_opt(timeout)
                        .cancel(cancel.child_token());

                    tracing::info!(%url, output_dir = %output_dir.display(), audio = config.is_audio(), "starting download");
                    Some((program, args, options, output_dir, timeout))
                }
                None => None
            };

            if let Some((program, args, options, output_dir, timeout)) = run {
                let mut process = self.runner.spawn(&program, &args, options)?;
                tracing::debug!(pid = ?process.pid(), "yt-dlp started");
                let mut stderr_tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                let mut report = None;

                while let Some(event) = process.next().await {
                    match event {
                        ProcessEvent::Line(line) => {
                            if line.stream == OutputStream::Stderr {
                                if stderr_tail.len() == STDERR_TAIL_LINES {
                                    stderr_tail.pop_front();
                                }
                                stderr_tail.push_back(line.text.clone());
                            }
                            if let Some(progress) = parser.parse(&line.text) {
                                yield DownloadEvent::Progress(progress);
                            }
                        }
                        ProcessEvent::Exited(exit) => report = Some(exit)
                    }
                }

                let report = report.ok_or_else(|| {
                    Error::Io(std::io::Error::other("process ended without an exit report"))
                })?;
                let stderr_lines: Vec<String> = stderr_tail.into_iter().collect();

                if report.termination == Termination::Cancelled {
                    tracing::info!(%url, "download cancelled");
                    remove_partial_files(&output_dir, &parser, &config).await;
                    yield DownloadEvent::Cancelled;
                } else if report.success() {
                    let collected = collect_result(&url, &output_dir, &parser, &config, started).await;
                    let failure = collected.as_ref().err().and_then(|e| parser.fail(e.to_string()));
                    if let Some(progress) = failure {
                        yield DownloadEvent::Progress(progress);
                    }
                    let result = collected?;
                    if let Some(progress) = parser.finish() {
                        yield DownloadEvent::Progress(progress);
                    }
                    tracing::info!(%url, file = ?result.primary_file(), elapsed = ?result.duration, "download finished");
                    yield DownloadEvent::Completed(result);
                } else {
                    let error = classify_failure(&program, &url, &report, &stderr_lines, timeout);
                    tracing::warn!(%url, error = %error, "download failed");
                    if let Some(progress) = parser.fail(error.to_string()) {
                        yield DownloadEvent::Progress(progress);
                    }
                    if report.termination == Termination::TimedOut {
                        remove_partial_files(&output_dir, &parser, &config).await;
                    }
                    Err::<(), _>(error)?;
                }
            } else {
                yield DownloadEvent::Cancelled;
            }
        })
    }

    /// Drives [`download`](Self::download) to completion, handing every
    /// progress event to `callback`.
    pub async fn download_with_callback<F>(
        &self,
        url: impl Into<String>,
        config: DownloadConfig,
        mut callback: F
    ) -> Result<OperationResult>
    where
        F: FnMut(&ProgressEvent) + Send
    {
        let mut events = self.download(url, config);
        while let Some(event) = events.next().await {
            match event? {
                DownloadEvent::Progress(progress) => callback(&progress),
                DownloadEvent::Completed(result) => return Ok(result),
                DownloadEvent::Cancelled => return Err(Error::Cancelled)
            }
        }
        Err(Error::Io(std::io::Error::other("download ended without a result")))
    }

    /// [`Downloader::download_with_callback`] with the outcome folded into a
    /// serializable envelope.
    pub async fn download_with_response<F>(
        &self,
        url: impl Into<String>,
        config: DownloadConfig,
        callback: F
    ) -> DownloadResponse
    where
        F: FnMut(&ProgressEvent) + Send
    {
        let result = self.download_with_callback(url, config, callback).await;
        Response::from_result(result, |_| "Download completed successfully".to_string(), "Download failed")
    }

    pub async fn search_with_response(&self, request: &SearchRequest) -> SearchResponse {
        let result = self.search(request).await;
        Response::from_result(result, |found| format!("Found {} results", found.len()), "Search failed")
    }

    /// Drives a playlist download to the end and reports its summary. Entry
    /// failures still count as success; only a playlist that could not be
    /// listed fails.
    pub async fn download_playlist_with_response(&self, request: PlaylistRequest) -> PlaylistResponse {
        let result = self.playlist_summary(request).await;
        Response::from_result(
            result,
            |summary| format!("Downloaded {} out of {} videos", summary.successes.len(), summary.total),
            "Playlist download failed"
        )
    }

    async fn playlist_summary(&self, request: PlaylistRequest) -> Result<PlaylistResult> {
        let mut events = self.download_playlist(request);
        while let Some(event) = events.next().await {
            if let PlaylistEvent::Finished(result) = event? {
                return Ok(result);
            }
        }
        Err(Error::Io(std::io::Error::other("playlist ended without a result")))
    }

    pub fn download_playlist(&self, request: PlaylistRequest) -> PlaylistStream<'_> {
        self.download_playlist_with_cancel(request, CancellationToken::new())
    }

    /// Downloads every entry of a playlist, `request.concurrency` at a time.
    ///
    /// Entries are numbered from 1 in playlist order. Events of one entry
    /// keep their order; events of concurrent entries interleave. The stream
    /// always ends with [`PlaylistEvent::Finished`] unless listing the
    /// playlist itself fails. Cancelling while the playlist is being listed
    /// ends the stream with `Err(Error::Cancelled)` before any entry starts;
    /// cancelling later still ends with `Finished`, the remaining entries
    /// listed as cancelled.
    pub fn download_playlist_with_cancel(
        &self,
        request: PlaylistRequest,
        cancel: CancellationToken
    ) -> PlaylistStream<'_> {
        Box::pin(try_stream! {
            let listing = self
                .playlist_listing(&request.url, Some(request.max_entries), &cancel)
                .await?;

            let entries: Vec<PlaylistEntry> = listing
                .entries
                .iter()
                .enumerate()
                .map(|(i, entry)| PlaylistEntry {
                    index: i + 1,
                    url: entry.entry_url().map(str::to_string),
                    title: entry.title.clone()
                })
                .collect();
            let total = entries.len();
            tracing::info!(
                url = %request.url,
                total,
                concurrency = request.concurrency,
                policy = ?request.policy,
                "downloading playlist"
            );

            let mut result = PlaylistResult {
                title: listing.title.clone(),
                total,
                ..PlaylistResult::default()
            };
            let playlist_token = cancel.child_token();

            let streams = futures::stream::iter(entries.clone().into_iter().map(|entry| {
                self.playlist_entry(entry, request.config.clone(), playlist_token.clone())
            }));
            let mut updates = std::pin::pin!(streams.flatten_unordered(request.concurrency.max(1)));

            while let Some(EntryUpdate { index, kind }) = updates.next().await {
                let entry = &entries[index - 1];
                match kind {
                    EntryUpdateKind::Started => {
                        yield PlaylistEvent::EntryStarted {
                            index,
                            total,
                            title: entry.title.clone()
                        };
                    }
                    EntryUpdateKind::Event(event) => {
                        match &event {
                            DownloadEvent::Completed(done) => result.successes.push((index, done.clone())),
                            DownloadEvent::Cancelled => result.cancelled.push(index),
                            DownloadEvent::Progress(_) => {}
                        }
                        yield PlaylistEvent::Entry { index, event };
                    }
                    EntryUpdateKind::Skipped => {
                        result.cancelled.push(index);
                        yield PlaylistEvent::Entry {
                            index,
                            event: DownloadEvent::Cancelled
                        };
                    }
                    EntryUpdateKind::Failed(error) => {
                        tracing::warn!(index, title = ?entry.title, error = %error, "playlist entry failed");
                        let failure = EntryFailure {
                            index,
                            url: entry.url.clone().unwrap_or_default(),
                            title: entry.title.clone(),
                            error: error.to_string()
                        };
                        result.failures.push(failure.clone());
                        if request.policy == ErrorPolicy::StopOnError && !result.aborted {
                            result.aborted = true;
                            playlist_token.cancel();
                        }
                        yield PlaylistEvent::EntryFailed(failure);
                    }
                }
            }

            result.successes.sort_by_key(|(index, _)| *index);
            result.failures.sort_by_key(|f| f.index);
            result.cancelled.sort_unstable();
            tracing::info!(
                url = %request.url,
                succeeded = result.successes.len(),
                failed = result.failures.len(),
                cancelled = result.cancelled.len(),
                "playlist finished"
            );
            yield PlaylistEvent::Finished(result);
        })
    }

    /// Resolves every built-in executable, provisioning what is missing.
    pub async fn setup_binaries(&self) -> Result<Vec<ResolvedBinary>> {
        let mut resolved = Vec::with_capacity(builtin_specs().len());
        for spec in builtin_specs() {
            resolved.push(self.resolve(spec).await?);
        }
        Ok(resolved)
    }

    /// [`setup_binaries`](Self::setup_binaries) with download progress. Each
    /// executable ends with a [`FetchEvent::Finished`].
    pub fn setup_binaries_with_progress(&self) -> SetupStream<'_> {
        Box::pin(try_stream! {
            for spec in builtin_specs() {
                if let Some(cached) = self.cache.get(&spec.name).await {
                    yield FetchEvent::Finished(cached);
                    continue;
                }
                if let Some(found) = self.locator.locate(spec).await {
                    let found = self.remember(found).await?;
                    yield FetchEvent::Finished(found);
                    continue;
                }
                if !self.config.auto_provision {
                    Err::<(), _>(Error::BinaryNotFound { name: spec.name.clone() })?;
                }

                let mut fetch = self.fetcher.fetch_with_progress(spec);
                while let Some(event) = fetch.next().await {
                    match event? {
                        FetchEvent::Progress(progress) => yield FetchEvent::Progress(progress),
                        FetchEvent::Finished(installed) => {
                            let installed = self.remember(installed).await?;
                            yield FetchEvent::Finished(installed);
                        }
                    }
                }
            }
        })
    }

    /// Reports whether each executable can be found and runs. Never
    /// provisions anything and never fails.
    pub async fn health_check(&self) -> HealthReport {
        let mut binaries = Vec::with_capacity(builtin_specs().len());
        for spec in builtin_specs() {
            binaries.push(self.binary_health(spec).await);
        }
        let report = HealthReport::from_binaries(binaries, self.config.bin_dir.clone());
        tracing::debug!(status = ?report.status, "health check finished");
        report
    }

    /// Forgets every resolved executable so the next operation searches
    /// again, then reports the fresh state.
    pub async fn recheck_binaries(&self) -> HealthReport {
        self.cache.clear().await;
        for spec in builtin_specs() {
            self.fetcher.forget(&spec.name).await;
        }
        self.health_check().await
    }

    async fn binary_health(&self, spec: &ExecutableSpec) -> BinaryHealth {
        let found = match self.cache.get(&spec.name).await {
            Some(cached) => Some(cached),
            None => self.locator.locate(spec).await
        };

        let Some(found) = found else {
            return BinaryHealth {
                name: spec.name.clone(),
                resolvable: false,
                runnable: false,
                path: None,
                version: None,
                source: None,
                detail: Some(missing_detail(spec, self.config.auto_provision, Platform::current()))
            };
        };

        let version = probe_version(&self.runner, &found.path, spec).await;
        let detail = match version {
            Some(ref v) if !spec.meets_min_version(v) => Some(format!(
                "version {v} is older than the supported minimum {}",
                spec.min_version.as_deref().unwrap_or_default()
            )),
            Some(_) => None,
            None => Some("version probe failed".to_string())
        };

        BinaryHealth {
            name: spec.name.clone(),
            resolvable: true,
            runnable: version.is_some(),
            path: Some(found.path),
            version: version.or(Some(found.version)),
            source: Some(found.source),
            detail
        }
    }

    async fn resolve(&self, spec: &ExecutableSpec) -> Result<ResolvedBinary> {
        self.cache
            .get_or_try_init(&spec.name, || async {
                if let Some(found) = self.locator.locate(spec).await {
                    tracing::debug!(
                        name = %found.name,
                        path = %found.path.display(),
                        version = %found.version,
                        source = ?found.source,
                        "binary resolved"
                    );
                    return Ok(found);
                }
                if !self.config.auto_provision {
                    return Err(Error::BinaryNotFound {
                        name: spec.name.clone()
                    });
                }
                Ok(self.fetcher.fetch(spec).await?)
            })
            .await
    }

    async fn remember(&self, binary: ResolvedBinary) -> Result<ResolvedBinary> {
        let name = binary.name.clone();
        self.cache
            .get_or_try_init(&name, move || async move { Ok::<_, Error>(binary) })
            .await
    }

    async fn yt_dlp(&self) -> Result<ResolvedBinary> {
        self.resolve(&builtin_specs()[0]).await
    }

    async fn yt_dlp_or_cancel(&self, cancel: &CancellationToken) -> Result<ResolvedBinary> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            resolved = self.yt_dlp() => resolved
        }
    }

    /// ffmpeg is optional: yt-dlp works without it for formats that need no
    /// merging or conversion.
    async fn ffmpeg(&self) -> Option<ResolvedBinary> {
        match self.resolve(&builtin_specs()[1]).await {
            Ok(ffmpeg) => Some(ffmpeg),
            Err(e) => {
                tracing::warn!(error = %e, "ffmpeg unavailable, continuing without it");
                None
            }
        }
    }

    fn command(&self, ytdlp: &ResolvedBinary) -> CommandBuilder {
        CommandBuilder::new(&ytdlp.path).args(self.config.extra_args.iter().map(String::as_str))
    }

    fn run_options(&self) -> RunOptions {
        RunOptions::default().env(self.config.env.clone())
    }

    fn download_command(
        &self,
        ytdlp: &ResolvedBinary,
        ffmpeg: Option<&ResolvedBinary>,
        config: &DownloadConfig,
        url: &str
    ) -> CommandBuilder {
        let mut builder = self.command(ytdlp).with_config(config);
        if config.options().cookies_file.is_none() {
            builder = builder.cookies_file_opt(self.config.cookies_file.as_ref());
        }
        if let Some(ffmpeg) = ffmpeg {
            builder = builder.ffmpeg_location(&ffmpeg.path);
        }
        builder.no_playlist().parseable_progress().arg("--").url(url)
    }

    async fn run_metadata(
        &self,
        builder: CommandBuilder,
        url: &str,
        cancel: &CancellationToken
    ) -> Result<CapturedOutput> {
        let (program, args) = builder.into_parts();
        let options = self
            .run_options()
            .timeout_opt(self.config.metadata_timeout)
            .cancel(cancel.child_token());
        let output = self.runner.output(&program, &args, options).await?;
        if !output.report.success() {
            return Err(classify_failure(
                &program,
                url,
                &output.report,
                &output.stderr_lines,
                self.config.metadata_timeout
            ));
        }
        Ok(output)
    }

    async fn playlist_listing(
        &self,
        url: &str,
        limit: Option<usize>,
        cancel: &CancellationToken
    ) -> Result<PlaylistInfo> {
        let ytdlp = self.yt_dlp_or_cancel(cancel).await?;
        let mut builder = self
            .command(&ytdlp)
            .json_output()
            .flat_playlist()
            .yes_playlist()
            .no_warnings();
        if let Some(limit) = limit {
            builder = builder.playlist_end(limit);
        }
        let builder = builder.arg("--").url(url);

        let output = self.run_metadata(builder, url, cancel).await?;
        let mut entries = parse_json_lines::<VideoInfo>(&output.stdout)?;
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        PlaylistInfo::from_entries(entries).ok_or(Error::EmptyPlaylist)
    }

    fn playlist_entry(
        &self,
        entry: PlaylistEntry,
        config: DownloadConfig,
        token: CancellationToken
    ) -> Pin<Box<dyn Stream<Item = EntryUpdate> + Send + '_>> {
        let index = entry.index;
        Box::pin(stream! {
            if token.is_cancelled() {
                yield EntryUpdate { index, kind: EntryUpdateKind::Skipped };
            } else if let Some(url) = entry.url {
                yield EntryUpdate { index, kind: EntryUpdateKind::Started };
                let mut events = self.download_with_cancel(url, config, token);
                while let Some(item) = events.next().await {
                    let kind = match item {
                        Ok(event) => EntryUpdateKind::Event(event),
                        Err(Error::Cancelled) => EntryUpdateKind::Event(DownloadEvent::Cancelled),
                        Err(error) => EntryUpdateKind::Failed(error)
                    };
                    yield EntryUpdate { index, kind };
                }
            } else {
                yield EntryUpdate { index, kind: EntryUpdateKind::Started };
                yield EntryUpdate {
                    index,
                    kind: EntryUpdateKind::Failed(Error::Resolution {
                        url: String::new(),
                        reason: "playlist entry has no URL".to_string()
                    })
                };
            }
        })
    }
}

#[derive(Debug, Clone)]
struct PlaylistEntry {
    index: usize,
    url: Option<String>,
    title: Option<String>
}

struct EntryUpdate {
    index: usize,
    kind: EntryUpdateKind
}

enum EntryUpdateKind {
    Started,
    Event(DownloadEvent),
    Failed(Error),
    /// Cancelled before it started.
    Skipped
}

/// Health detail for an executable that is not installed anywhere.
fn missing_detail(spec: &ExecutableSpec, auto_provision: bool, platform: Option<Platform>) -> String {
    if !auto_provision {
        return "not found".to_string();
    }
    if platform.and_then(|p| spec.asset_for(p)).is_some() {
        "not installed; will be provisioned on first use".to_string()
    } else {
        "not found; no build can be provisioned for this platform".to_string()
    }
}

fn parse_json_lines<T: serde::de::DeserializeOwned>(stdout: &str) -> Result<Vec<T>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| serde_json::from_str(l).map_err(Error::from))
        .collect()
}

/// Maps a failed invocation to the most specific error.
fn classify_failure(
    program: &Path,
    url: &str,
    report: &ExitReport,
    stderr_lines: &[String],
    timeout: Option<Duration>
) -> Error {
    match report.termination {
        Termination::Cancelled => return Error::Cancelled,
        Termination::TimedOut => {
            return Error::Timeout {
                program: program.to_path_buf(),
                timeout: timeout.unwrap_or_default()
            };
        }
        Termination::Exited => {}
    }

    if let Some(reason) = resolution_reason(stderr_lines) {
        return Error::Resolution {
            url: url.to_string(),
            reason
        };
    }

    let start = stderr_lines.len().saturating_sub(STDERR_TAIL_LINES);
    Error::Process {
        program: program.to_path_buf(),
        code: report.code,
        signal: report.signal,
        stderr_tail: stderr_lines[start..].join("\n")
    }
}

fn resolution_reason(stderr_lines: &[String]) -> Option<String> {
    stderr_lines.iter().rev().find_map(|line| {
        let message = line.trim().strip_prefix("ERROR:")?.trim();
        RESOLUTION_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
            .then(|| message.to_string())
    })
}

/// Builds the result of a successful run. The media file must exist.
async fn collect_result(
    url: &str,
    output_dir: &Path,
    parser: &ProgressParser,
    config: &DownloadConfig,
    started: Instant
) -> Result<OperationResult> {
    let primary = parser
        .output_file()
        .map(|p| output_dir.join(p))
        .filter(|p| p.is_file())
        .ok_or_else(|| Error::MissingOutput {
            url: url.to_string()
        })?;

    let info_json = parser.info_json().map(|p| output_dir.join(p));
    let metadata = match info_json {
        Some(ref path) => read_info_json(path).await,
        None => None
    };

    let keep_info_json = config.options().write_info_json;
    if !keep_info_json && let Some(ref path) = info_json {
        remove_quietly(path).await;
    }

    let mut files = vec![primary];
    for side in parser.side_files() {
        let side = output_dir.join(side);
        if files.contains(&side) || (!keep_info_json && info_json.as_ref() == Some(&side)) {
            continue;
        }
        if side.is_file() {
            files.push(side);
        }
    }

    Ok(OperationResult {
        url: url.to_string(),
        files,
        duration: started.elapsed(),
        metadata
    })
}

async fn read_info_json(path: &Path) -> Option<VideoInfo> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read info JSON");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(info) => Some(info),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse info JSON");
            None
        }
    }
}

/// Best-effort removal of what an interrupted run left behind.
async fn remove_partial_files(output_dir: &Path, parser: &ProgressParser, config: &DownloadConfig) {
    let mut targets: Vec<PathBuf> = Vec::new();
    for dest in parser.destinations() {
        let dest = output_dir.join(dest);
        let name = dest.as_os_str().to_os_string();
        for suffix in [".part", ".ytdl"] {
            let mut sibling = name.clone();
            sibling.push(suffix);
            targets.push(PathBuf::from(sibling));
        }
        targets.push(dest);
    }
    if !config.options().write_info_json
        && let Some(info_json) = parser.info_json()
    {
        targets.push(output_dir.join(info_json));
    }

    for target in targets {
        remove_quietly(&target).await;
    }
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove file")
    }
}
