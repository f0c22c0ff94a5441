use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    #[default]
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "worst")]
    Worst,
    #[serde(rename = "audio_only")]
    AudioOnly,
    #[serde(rename = "video_only")]
    VideoOnly,
    #[serde(rename = "144p")]
    Low144p,
    #[serde(rename = "240p")]
    Low240p,
    #[serde(rename = "360p")]
    Sd360p,
    #[serde(rename = "480p")]
    Sd480p,
    #[serde(rename = "720p")]
    Hd720p,
    #[serde(rename = "1080p")]
    Hd1080p,
    #[serde(rename = "1440p")]
    Qhd1440p,
    #[serde(rename = "2160p")]
    Uhd2160p
}

impl Quality {
    pub fn height(self) -> Option<u32> {
        match self {
            Quality::Low144p => Some(144),
            Quality::Low240p => Some(240),
            Quality::Sd360p => Some(360),
            Quality::Sd480p => Some(480),
            Quality::Hd720p => Some(720),
            Quality::Hd1080p => Some(1080),
            Quality::Qhd1440p => Some(1440),
            Quality::Uhd2160p => Some(2160),
            Quality::Best | Quality::Worst | Quality::AudioOnly | Quality::VideoOnly => None
        }
    }

    /// yt-dlp `-f` selector for this quality.
    pub fn format_selector(self) -> String {
        match self {
            Quality::Best => "bv*+ba/b".to_string(),
            Quality::Worst => "worst".to_string(),
            Quality::AudioOnly => "bestaudio".to_string(),
            Quality::VideoOnly => "bestvideo".to_string(),
            _ => {
                let height = self.height().unwrap_or_default();
                format!(
                    "bestvideo[height<={height}][ext=mp4]+bestaudio[ext=m4a]/best[height<={height}][ext=mp4]"
                )
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    Mp4,
    Webm,
    Mkv,
    Avi,
    Mov,
    Flv
}

impl VideoFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Webm => "webm",
            VideoFormat::Mkv => "mkv",
            VideoFormat::Avi => "avi",
            VideoFormat::Mov => "mov",
            VideoFormat::Flv => "flv"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    M4a,
    Aac,
    Flac,
    Opus,
    Vorbis,
    Wav
}

impl AudioFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Aac => "aac",
            AudioFormat::Flac => "flac",
            AudioFormat::Opus => "opus",
            AudioFormat::Vorbis => "vorbis",
            AudioFormat::Wav => "wav"
        }
    }
}

/// Value of a pass-through yt-dlp option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Flag(bool),
    Number(i64),
    Text(String)
}

/// Long options that may be forwarded verbatim, and whether they take a value.
const PASSTHROUGH_OPTIONS: &[(&str, bool)] = &[
    ("add-header", true),
    ("audio-quality", true),
    ("concurrent-fragments", true),
    ("embed-chapters", false),
    ("embed-metadata", false),
    ("extractor-args", true),
    ("force-overwrites", false),
    ("geo-bypass", false),
    ("http-chunk-size", true),
    ("max-filesize", true),
    ("max-sleep-interval", true),
    ("min-filesize", true),
    ("no-check-certificates", false),
    ("no-mtime", false),
    ("no-overwrites", false),
    ("no-part", false),
    ("prefer-free-formats", false),
    ("referer", true),
    ("restrict-filenames", false),
    ("sleep-interval", true),
    ("socket-timeout", true),
    ("source-address", true),
    ("sponsorblock-remove", true),
    ("throttled-rate", true),
    ("trim-filenames", true),
    ("user-agent", true),
    ("windows-filenames", false)
];

pub const DEFAULT_OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Mutable, unvalidated download settings.
///
/// Turn them into a [`DownloadConfig`] with [`DownloadOptions::build`]; that is
/// where contradictory or unknown settings are rejected. When deserialized,
/// unknown keys are an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadOptions {
    pub quality: Quality,
    pub video_format: Option<VideoFormat>,
    pub audio_format: Option<AudioFormat>,
    pub extract_audio: bool,
    pub output_dir: PathBuf,
    pub output_template: String,
    pub write_subs: bool,
    pub embed_subs: bool,
    pub subtitle_lang: String,
    pub write_thumbnail: bool,
    pub embed_thumbnail: bool,
    pub write_info_json: bool,
    pub cookies_file: Option<PathBuf>,
    pub proxy: Option<String>,
    pub rate_limit: Option<String>,
    pub retries: u32,
    pub fragment_retries: u32,
    pub timeout_secs: Option<u64>,
    pub custom_options: BTreeMap<String, OptionValue>
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            quality: Quality::Best,
            video_format: None,
            audio_format: None,
            extract_audio: false,
            output_dir: PathBuf::from("./downloads"),
            output_template: DEFAULT_OUTPUT_TEMPLATE.to_string(),
            write_subs: false,
            embed_subs: false,
            subtitle_lang: "en".to_string(),
            write_thumbnail: false,
            embed_thumbnail: false,
            write_info_json: false,
            cookies_file: None,
            proxy: None,
            rate_limit: None,
            retries: 3,
            fragment_retries: 3,
            timeout_secs: None,
            custom_options: BTreeMap::new()
        }
    }
}

impl DownloadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn video_format(mut self, format: VideoFormat) -> Self {
        self.video_format = Some(format);
        self
    }

    pub fn audio_format(mut self, format: AudioFormat) -> Self {
        self.audio_format = Some(format);
        self
    }

    pub fn extract_audio(mut self, extract: bool) -> Self {
        self.extract_audio = extract;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn output_template(mut self, template: impl Into<String>) -> Self {
        self.output_template = template.into();
        self
    }

    pub fn write_subs(mut self, write: bool) -> Self {
        self.write_subs = write;
        self
    }

    pub fn embed_subs(mut self, embed: bool) -> Self {
        self.embed_subs = embed;
        self
    }

    pub fn subtitle_lang(mut self, lang: impl Into<String>) -> Self {
        self.subtitle_lang = lang.into();
        self
    }

    pub fn write_thumbnail(mut self, write: bool) -> Self {
        self.write_thumbnail = write;
        self
    }

    pub fn embed_thumbnail(mut self, embed: bool) -> Self {
        self.embed_thumbnail = embed;
        self
    }

    pub fn write_info_json(mut self, write: bool) -> Self {
        self.write_info_json = write;
        self
    }

    pub fn cookies_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookies_file = Some(path.into());
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn rate_limit(mut self, limit: impl Into<String>) -> Self {
        self.rate_limit = Some(limit.into());
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn fragment_retries(mut self, retries: u32) -> Self {
        self.fragment_retries = retries;
        self
    }

    /// Upper bound for the whole download, rounded up to whole seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0));
        self
    }

    pub fn custom_option(mut self, name: impl Into<String>, value: OptionValue) -> Self {
        self.custom_options.insert(name.into(), value);
        self
    }

    pub fn build(self) -> Result<DownloadConfig> {
        DownloadConfig::try_from(self)
    }

    fn validate(&self) -> Result<()> {
        if self.output_template.trim().is_empty() {
            return Err(Error::Config("output template must not be empty".to_string()));
        }
        if self.output_template.contains('\0') {
            return Err(Error::Config("output template contains a NUL byte".to_string()));
        }
        if self.extract_audio && self.video_format.is_some() {
            return Err(Error::Config(
                "video_format cannot be combined with extract_audio".to_string()
            ));
        }
        if (self.write_subs || self.embed_subs) && self.subtitle_lang.trim().is_empty() {
            return Err(Error::Config("subtitle_lang must be set when subtitles are requested".to_string()));
        }
        if let Some(ref proxy) = self.proxy
            && proxy.trim().is_empty()
        {
            return Err(Error::Config("proxy must not be empty".to_string()));
        }
        if let Some(ref limit) = self.rate_limit
            && !is_rate_limit(limit)
        {
            return Err(Error::Config(format!("invalid rate limit {limit:?}")));
        }
        if self.timeout_secs == Some(0) {
            return Err(Error::Config("timeout must be positive".to_string()));
        }
        for (name, value) in &self.custom_options {
            validate_custom_option(name, value)?;
        }
        Ok(())
    }
}

/// `50K`, `4.2M`, `1G` or a plain byte count.
fn is_rate_limit(limit: &str) -> bool {
    let number = limit
        .strip_suffix(['K', 'M', 'G', 'k', 'm', 'g'])
        .unwrap_or(limit);
    !number.is_empty() && number.parse::<f64>().is_ok_and(|n| n > 0.0)
}

fn validate_custom_option(name: &str, value: &OptionValue) -> Result<()> {
    let Some(&(_, takes_value)) = PASSTHROUGH_OPTIONS.iter().find(|(known, _)| *known == name)
    else {
        return Err(Error::Config(format!("unknown option --{name}")));
    };

    match (takes_value, value) {
        (false, OptionValue::Flag(_)) => Ok(()),
        (false, _) => Err(Error::Config(format!("--{name} is a flag and takes a boolean"))),
        (true, OptionValue::Flag(_)) => Err(Error::Config(format!("--{name} requires a value"))),
        (true, _) => Ok(())
    }
}

/// Validated, immutable download settings for one operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DownloadOptions", into = "DownloadOptions")]
pub struct DownloadConfig {
    options: DownloadOptions
}

impl DownloadConfig {
    pub fn builder() -> DownloadOptions {
        DownloadOptions::default()
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    pub fn output_dir(&self) -> &Path {
        &self.options.output_dir
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.options.timeout_secs.map(Duration::from_secs)
    }

    /// Whether the configuration produces an audio-only file.
    pub fn is_audio(&self) -> bool {
        self.options.extract_audio || self.options.quality == Quality::AudioOnly
    }
}

impl TryFrom<DownloadOptions> for DownloadConfig {
    type Error = Error;

    fn try_from(options: DownloadOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }
}

impl From<DownloadConfig> for DownloadOptions {
    fn from(config: DownloadConfig) -> Self {
        config.options
    }
}
