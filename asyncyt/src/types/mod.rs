mod options;
mod progress;
mod request;
mod response;
mod result;
mod video_info;

pub use options::{
    AudioFormat, DEFAULT_OUTPUT_TEMPLATE, DownloadConfig, DownloadOptions, OptionValue, Quality,
    VideoFormat
};
pub(crate) use progress::format_bytes;
pub use progress::{DownloadEvent, ProgressEvent, Stage};
pub use request::{ErrorPolicy, MAX_SEARCH_RESULTS, PlaylistRequest, SearchProvider, SearchRequest};
pub use response::{DownloadResponse, PlaylistResponse, Response, SearchResponse};
pub use result::{
    BinaryHealth, EntryFailure, HealthReport, HealthStatus, OperationResult, PlaylistEvent,
    PlaylistResult
};
pub use video_info::{Chapter, Format, PlaylistInfo, Thumbnail, VideoInfo};
