use std::path::{Path, PathBuf};

use crate::types::{AudioFormat, DownloadConfig, OptionValue, Quality};

/// Progress line emitted once per progress update; parsed by
/// [`ProgressParser`](crate::parser::ProgressParser).
pub const PROGRESS_TEMPLATE: &str = "download:PROGRESS|%(progress._percent_str)s|%(progress._downloaded_bytes_str)s|%(progress._total_bytes_str)s|%(progress._speed_str)s|%(progress._eta_str)s";

pub struct CommandBuilder {
    binary: PathBuf,
    args: Vec<String>
}

impl CommandBuilder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn url(self, url: impl Into<String>) -> Self {
        self.arg(url)
    }

    pub fn json_output(self) -> Self {
        self.arg("--dump-json")
    }

    pub fn skip_download(self) -> Self {
        self.arg("--skip-download")
    }

    pub fn flat_playlist(self) -> Self {
        self.arg("--flat-playlist")
    }

    pub fn yes_playlist(self) -> Self {
        self.arg("--yes-playlist")
    }

    pub fn no_playlist(self) -> Self {
        self.arg("--no-playlist")
    }

    pub fn playlist_end(self, count: usize) -> Self {
        self.arg("--playlist-end").arg(count.to_string())
    }

    pub fn output(self, template: impl Into<String>) -> Self {
        self.arg("-o").arg(template)
    }

    pub fn format(self, format: impl Into<String>) -> Self {
        self.arg("-f").arg(format)
    }

    pub fn extract_audio(self, format: AudioFormat) -> Self {
        self.arg("-x").arg("--audio-format").arg(format.as_str())
    }

    pub fn recode_video(self, format: impl Into<String>) -> Self {
        self.arg("--recode-video").arg(format)
    }

    pub fn write_subtitles(self, lang: impl Into<String>) -> Self {
        self.arg("--write-subs").arg("--sub-lang").arg(lang)
    }

    pub fn embed_subtitles(self) -> Self {
        self.arg("--embed-subs")
    }

    pub fn write_thumbnail(self) -> Self {
        self.arg("--write-thumbnail")
    }

    pub fn embed_thumbnail(self) -> Self {
        self.arg("--embed-thumbnail")
    }

    pub fn write_info_json(self) -> Self {
        self.arg("--write-info-json")
    }

    pub fn cookies_file(self, path: impl AsRef<Path>) -> Self {
        self.arg("--cookies").arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn cookies_file_opt(self, path: Option<&PathBuf>) -> Self {
        match path {
            Some(p) => self.cookies_file(p),
            None => self
        }
    }

    pub fn proxy(self, proxy: impl Into<String>) -> Self {
        self.arg("--proxy").arg(proxy)
    }

    pub fn rate_limit(self, limit: impl Into<String>) -> Self {
        self.arg("--limit-rate").arg(limit)
    }

    pub fn retries(self, retries: u32) -> Self {
        self.arg("--retries").arg(retries.to_string())
    }

    pub fn fragment_retries(self, retries: u32) -> Self {
        self.arg("--fragment-retries").arg(retries.to_string())
    }

    pub fn ffmpeg_location(self, path: impl AsRef<Path>) -> Self {
        self.arg("--ffmpeg-location").arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn progress_template(self, template: impl Into<String>) -> Self {
        self.arg("--progress-template").arg(template)
    }

    pub fn newline_progress(self) -> Self {
        self.arg("--newline")
    }

    pub fn no_warnings(self) -> Self {
        self.arg("--no-warnings")
    }

    /// Progress reporting the parser understands, one update per line.
    pub fn parseable_progress(self) -> Self {
        self.arg("--progress")
            .newline_progress()
            .progress_template(PROGRESS_TEMPLATE)
    }

    /// Format selection, post-processing and network settings. The info JSON
    /// is always written: it is where the final metadata is read from.
    pub fn with_config(mut self, config: &DownloadConfig) -> Self {
        let options = config.options();

        if options.extract_audio {
            self = self.extract_audio(options.audio_format.unwrap_or(AudioFormat::Mp3));
        } else {
            self = self.format(options.quality.format_selector());
            if options.quality == Quality::AudioOnly
                && let Some(format) = options.audio_format
            {
                self = self.extract_audio(format);
            }
        }

        if let Some(format) = options.video_format
            && !options.extract_audio
        {
            self = self.recode_video(format.as_str());
        }

        self = self.output(options.output_template.clone());

        if options.write_subs {
            self = self.write_subtitles(options.subtitle_lang.clone());
        }
        if options.embed_subs {
            self = self.embed_subtitles();
        }
        if options.write_thumbnail {
            self = self.write_thumbnail();
        }
        if options.embed_thumbnail {
            self = self.embed_thumbnail();
        }

        self = self
            .write_info_json()
            .cookies_file_opt(options.cookies_file.as_ref());

        if let Some(ref proxy) = options.proxy {
            self = self.proxy(proxy.clone());
        }
        if let Some(ref limit) = options.rate_limit {
            self = self.rate_limit(limit.clone());
        }

        self = self
            .retries(options.retries)
            .fragment_retries(options.fragment_retries);

        for (name, value) in &options.custom_options {
            self = self.custom_option(name, value);
        }

        self
    }

    fn custom_option(self, name: &str, value: &OptionValue) -> Self {
        match value {
            OptionValue::Flag(true) => self.arg(format!("--{name}")),
            OptionValue::Flag(false) => self,
            OptionValue::Number(n) => self.arg(format!("--{name}")).arg(n.to_string()),
            OptionValue::Text(text) => self.arg(format!("--{name}")).arg(text.clone())
        }
    }

    pub fn program(&self) -> &Path {
        &self.binary
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn into_parts(self) -> (PathBuf, Vec<String>) {
        (self.binary, self.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DownloadOptions, VideoFormat};

    fn position(args: &[String], flag: &str) -> Option<usize> {
        args.iter().position(|a| a == flag)
    }

    #[test]
    fn test_command_builder_basic() {
        let builder = CommandBuilder::new("yt-dlp").arg("--version");
        assert_eq!(builder.get_args(), &["--version"]);
        assert_eq!(builder.program(), Path::new("yt-dlp"));
    }

    #[test]
    fn test_command_builder_metadata() {
        let builder = CommandBuilder::new("yt-dlp")
            .json_output()
            .skip_download()
            .no_playlist()
            .no_warnings()
            .url("https://example.com/video");
        assert_eq!(builder.get_args(), &[
            "--dump-json",
            "--skip-download",
            "--no-playlist",
            "--no-warnings",
            "https://example.com/video"
        ]);
    }

    #[test]
    fn test_command_builder_cookies_file_opt() {
        let some_path = Some(PathBuf::from("/tmp/cookies.txt"));
        let builder = CommandBuilder::new("yt-dlp").cookies_file_opt(some_path.as_ref());
        assert_eq!(builder.get_args(), &["--cookies", "/tmp/cookies.txt"]);

        let builder = CommandBuilder::new("yt-dlp").cookies_file_opt(None);
        assert!(builder.get_args().is_empty());
    }

    #[test]
    fn test_with_config_defaults() {
        let config = DownloadConfig::default();
        let (_, args) = CommandBuilder::new("yt-dlp").with_config(&config).into_parts();

        let f = position(&args, "-f").unwrap();
        assert_eq!(args[f + 1], "bv*+ba/b");
        let o = position(&args, "-o").unwrap();
        assert_eq!(args[o + 1], "%(title)s.%(ext)s");
        assert!(args.contains(&"--write-info-json".to_string()));
        let r = position(&args, "--retries").unwrap();
        assert_eq!(args[r + 1], "3");
        assert!(position(&args, "-x").is_none());
        assert!(position(&args, "--recode-video").is_none());
    }

    #[test]
    fn test_with_config_audio_extraction() {
        let config = DownloadOptions::new()
            .extract_audio(true)
            .audio_format(AudioFormat::Opus)
            .quality(Quality::Hd720p)
            .build()
            .unwrap();
        let args = CommandBuilder::new("yt-dlp").with_config(&config).into_parts().1;
        let x = position(&args, "-x").unwrap();
        assert_eq!(&args[x..x + 3], ["-x", "--audio-format", "opus"]);
        assert!(position(&args, "-f").is_none());
    }

    #[test]
    fn test_with_config_quality_and_extras() {
        let config = DownloadOptions::new()
            .quality(Quality::Hd720p)
            .video_format(VideoFormat::Mkv)
            .write_subs(true)
            .subtitle_lang("de")
            .proxy("socks5://127.0.0.1:9050")
            .rate_limit("2M")
            .custom_option("no-part", OptionValue::Flag(true))
            .custom_option("restrict-filenames", OptionValue::Flag(false))
            .custom_option("concurrent-fragments", OptionValue::Number(4))
            .build()
            .unwrap();
        let args = CommandBuilder::new("yt-dlp").with_config(&config).into_parts().1;

        let f = position(&args, "-f").unwrap();
        assert!(args[f + 1].contains("height<=720"));
        let recode = position(&args, "--recode-video").unwrap();
        assert_eq!(args[recode + 1], "mkv");
        let lang = position(&args, "--sub-lang").unwrap();
        assert_eq!(args[lang + 1], "de");
        let rate = position(&args, "--limit-rate").unwrap();
        assert_eq!(args[rate + 1], "2M");
        assert!(args.contains(&"--no-part".to_string()));
        assert!(!args.contains(&"--restrict-filenames".to_string()));
        let frag = position(&args, "--concurrent-fragments").unwrap();
        assert_eq!(args[frag + 1], "4");
    }

    #[test]
    fn test_parseable_progress() {
        let args = CommandBuilder::new("yt-dlp").parseable_progress().into_parts().1;
        assert_eq!(args, vec![
            "--progress".to_string(),
            "--newline".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string()
        ]);
    }

    #[test]
    fn test_command_builder_ffmpeg_location() {
        let builder = CommandBuilder::new("yt-dlp").ffmpeg_location("/usr/local/bin/ffmpeg");
        assert_eq!(builder.get_args(), &["--ffmpeg-location", "/usr/local/bin/ffmpeg"]);
    }
}
