//! Async wrapper around the yt-dlp and ffmpeg command-line tools.
//!
//! A [`Downloader`] finds the executables it needs (a configured path, the
//! system `PATH`, or a copy it provisioned earlier), downloads and verifies a
//! pinned build when none is usable, and turns each tool invocation into a
//! typed, cancellable stream of progress events.
//!
//! # Example
//!
//! ```no_run
//! use asyncyt::{DownloadConfig, Downloader, DownloaderConfig, Quality};
//!
//! #[tokio::main]
//! async fn main() -> asyncyt::Result<()> {
//!     let downloader = Downloader::new(DownloaderConfig::default())?;
//!
//!     let report = downloader.health_check().await;
//!     println!("binaries: {:?}", report.status);
//!
//!     let info = downloader
//!         .get_info("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
//!         .await?;
//!     println!("title: {:?}", info.title);
//!
//!     let config = DownloadConfig::builder().quality(Quality::Hd720p).build()?;
//!     let result = downloader
//!         .download_with_callback(
//!             "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
//!             config,
//!             |p| println!("{:?} {:.1}%", p.stage, p.percent)
//!         )
//!         .await?;
//!     println!("files: {:?}", result.files);
//!
//!     Ok(())
//! }
//! ```

pub mod binary;
mod command;
mod config;
mod downloader;
pub mod error;
pub mod parser;
pub mod process;
pub mod types;

pub use binary::{BinarySource, FetchEvent, FetchPhase, FetchProgress, Platform, ResolvedBinary};
pub use command::{CommandBuilder, PROGRESS_TEMPLATE};
pub use config::{DEFAULT_BIN_DIR, DEFAULT_METADATA_TIMEOUT, DownloaderConfig};
pub use downloader::{DownloadStream, Downloader, PlaylistStream, SetupStream};
pub use error::{Error, ProvisionError, Result};
pub use parser::ProgressParser;
pub use tokio_util::sync::CancellationToken;
pub use types::{
    AudioFormat, BinaryHealth, DownloadConfig, DownloadEvent, DownloadOptions, DownloadResponse,
    EntryFailure, ErrorPolicy, HealthReport, HealthStatus, OperationResult, OptionValue,
    PlaylistEvent, PlaylistInfo, PlaylistRequest, PlaylistResponse, PlaylistResult, ProgressEvent, Quality,
    Response, SearchProvider, SearchRequest, SearchResponse, Stage, VideoFormat, VideoInfo
};
