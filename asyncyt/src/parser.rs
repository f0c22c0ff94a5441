//! Incremental interpretation of yt-dlp output.
//!
//! [`ProgressParser`] is fed one line at a time and keeps just enough state
//! to turn the tool's mixed output into an ordered sequence of
//! [`ProgressEvent`]s. It also remembers which files the run wrote so the
//! caller can find the finished output once the process exits.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{ProgressEvent, Stage};

/// Post-processors; their lines mean the download itself is over.
const POSTPROCESSORS: &[&str] = &[
    "Merger",
    "ExtractAudio",
    "VideoConvertor",
    "VideoRemuxer",
    "EmbedSubtitle",
    "EmbedThumbnail",
    "Metadata",
    "ffmpeg",
    "FixupM3u8",
    "FixupM4a",
    "FixupStretched",
    "FixupDuplicateMoov",
    "FixupTimestamp",
    "FixupDuration",
    "ModifyChapters",
    "SponsorBlock",
    "SplitChapters",
    "ThumbnailsConvertor",
    "SubtitlesConvertor",
    "MoveFiles",
    "Exec"
];

/// Downloader back-ends that report under their own tag.
const DOWNLOADERS: &[&str] = &["download", "hlsnative", "dashsegments"];

#[derive(Debug)]
pub struct ProgressParser {
    stage: Stage,
    /// Highest percent emitted in the current stage.
    baseline: f64,
    last: Option<ProgressEvent>,
    last_bytes: u64,
    total_bytes: Option<u64>,
    /// Progress currently belongs to a subtitle or other side download.
    side_download: bool,
    destinations: Vec<PathBuf>,
    output: Option<PathBuf>,
    side_files: Vec<PathBuf>,
    info_json: Option<PathBuf>
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressParser {
    pub fn new() -> Self {
        Self {
            stage: Stage::Pending,
            baseline: 0.0,
            last: None,
            last_bytes: 0,
            total_bytes: None,
            side_download: false,
            destinations: Vec::new(),
            output: None,
            side_files: Vec::new(),
            info_json: None
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Interprets one line. Returns an event when the line changes what a
    /// consumer would display; unknown lines yield nothing.
    pub fn parse(&mut self, line: &str) -> Option<ProgressEvent> {
        if self.stage.is_terminal() {
            return None;
        }
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(message) = line.strip_prefix("ERROR:") {
            return self.message(message.trim());
        }
        if let Some(message) = line.strip_prefix("WARNING:") {
            return self.message(message.trim());
        }

        let template = line.strip_prefix("download:").unwrap_or(line);
        if let Some(fields) = template.strip_prefix("PROGRESS|") {
            return self.template_progress(fields);
        }

        if let Some((tag, rest)) = split_tag(line) {
            return self.tagged(tag, rest, line);
        }

        if line.starts_with("Deleting original file") {
            return self.emit(Stage::Converting, None, Some(line.to_string()));
        }

        // `--newline` without a template: " 14.6%  887.84MiB  7.61MiB/s 01:39"
        if line.split_whitespace().next().is_some_and(|t| t.ends_with('%')) {
            let update = parse_default_progress(line)?;
            return self.progress(update);
        }

        None
    }

    /// Marks the run as successfully finished.
    pub fn finish(&mut self) -> Option<ProgressEvent> {
        if self.stage.is_terminal() {
            return None;
        }
        self.stage = Stage::Done;
        self.baseline = 100.0;
        let mut event = ProgressEvent::new(Stage::Done, 100.0);
        event.downloaded_bytes = self.last_bytes;
        event.total_bytes = self.total_bytes;
        self.record(event)
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Option<ProgressEvent> {
        if self.stage.is_terminal() {
            return None;
        }
        self.stage = Stage::Error;
        self.baseline = 0.0;
        let mut event = ProgressEvent::new(Stage::Error, 0.0).with_message(message);
        event.downloaded_bytes = self.last_bytes;
        event.total_bytes = self.total_bytes;
        self.record(event)
    }

    /// The file the run ended up producing, as printed by the tool.
    pub fn output_file(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    /// Every file the tool downloaded into, including intermediate formats.
    pub fn destinations(&self) -> &[PathBuf] {
        &self.destinations
    }

    /// Subtitles, thumbnails and the info JSON.
    pub fn side_files(&self) -> &[PathBuf] {
        &self.side_files
    }

    pub fn info_json(&self) -> Option<&Path> {
        self.info_json.as_deref()
    }

    fn tagged(&mut self, tag: &str, rest: &str, line: &str) -> Option<ProgressEvent> {
        if DOWNLOADERS.contains(&tag) {
            return self.download_line(rest);
        }

        if POSTPROCESSORS.contains(&tag) {
            if let Some(path) = postprocessor_output(tag, rest) {
                self.set_output(path);
            }
            return self.emit(Stage::Converting, None, Some(line.to_string()));
        }

        if tag == "info" {
            if let Some((what, path)) = rest.split_once(" to: ") {
                let path = PathBuf::from(path.trim());
                if what.contains("metadata as JSON") {
                    self.info_json = Some(path.clone());
                }
                if !self.side_files.contains(&path) {
                    self.side_files.push(path);
                }
                return None;
            }
        }

        // Anything else is an extractor talking.
        self.emit(Stage::Resolving, None, Some(line.to_string()))
    }

    fn download_line(&mut self, rest: &str) -> Option<ProgressEvent> {
        if let Some(path) = rest.strip_prefix("Destination:") {
            let path = PathBuf::from(path.trim());
            self.side_download = self.side_files.contains(&path);
            if self.side_download {
                return None;
            }
            if !self.destinations.contains(&path) {
                self.destinations.push(path.clone());
            }
            let message = format!("Destination: {}", path.display());
            self.set_output(path);
            return self.emit(Stage::Downloading, None, Some(message));
        }

        if let Some(path) = rest.strip_suffix("has already been downloaded") {
            let path = PathBuf::from(path.trim());
            self.side_download = false;
            self.set_output(path);
            return self.emit(Stage::Downloading, Some(100.0), Some("already downloaded".to_string()));
        }

        if self.side_download {
            return None;
        }
        let update = parse_default_progress(rest)?;
        self.progress(update)
    }

    fn template_progress(&mut self, fields: &str) -> Option<ProgressEvent> {
        if self.side_download {
            return None;
        }
        let mut parts = fields.split('|').map(str::trim);
        let percent = parts.next().and_then(parse_percent);
        let downloaded = parts.next().and_then(parse_size);
        let total = parts.next().and_then(parse_size);
        let speed = parts.next().and_then(parse_speed);
        let eta = parts.next().and_then(parse_eta);

        self.progress(Update {
            percent,
            downloaded,
            total,
            speed,
            eta
        })
    }

    fn progress(&mut self, update: Update) -> Option<ProgressEvent> {
        if let Some(total) = update.total {
            self.total_bytes = Some(total);
        }

        let downloaded = update.downloaded.or_else(|| {
            let (percent, total) = (update.percent?, update.total?);
            Some(bytes_at(percent, total))
        });
        let percent = update.percent.or_else(|| {
            let (downloaded, total) = (downloaded?, self.total_bytes?);
            (total > 0).then(|| downloaded as f64 / total as f64 * 100.0)
        })?;

        if let Some(downloaded) = downloaded {
            self.last_bytes = downloaded;
        }

        if !self.enter(Stage::Downloading) {
            return None;
        }
        let percent = percent.clamp(0.0, 100.0);
        if percent < self.baseline {
            return None;
        }

        let mut event = ProgressEvent::new(Stage::Downloading, percent);
        event.downloaded_bytes = self.last_bytes;
        event.total_bytes = self.total_bytes;
        event.speed = update.speed;
        event.eta = update.eta;
        self.record(event)
    }

    /// Diagnostic lines keep the current stage.
    fn message(&mut self, message: &str) -> Option<ProgressEvent> {
        let mut event = ProgressEvent::new(self.stage, self.baseline).with_message(message);
        event.downloaded_bytes = self.last_bytes;
        event.total_bytes = self.total_bytes;
        self.record(event)
    }

    fn emit(&mut self, stage: Stage, percent: Option<f64>, message: Option<String>) -> Option<ProgressEvent> {
        if !self.enter(stage) {
            return None;
        }
        let percent = percent.unwrap_or(self.baseline).max(self.baseline);
        let mut event = ProgressEvent::new(stage, percent);
        event.message = message;
        event.downloaded_bytes = self.last_bytes;
        event.total_bytes = self.total_bytes;
        self.record(event)
    }

    /// Moves to `stage` unless that would go backwards.
    fn enter(&mut self, stage: Stage) -> bool {
        if stage < self.stage {
            return false;
        }
        if stage > self.stage {
            tracing::trace!(from = ?self.stage, to = ?stage, "stage change");
            self.stage = stage;
            self.baseline = 0.0;
            self.last = None;
        }
        true
    }

    fn record(&mut self, event: ProgressEvent) -> Option<ProgressEvent> {
        if self.last.as_ref() == Some(&event) {
            return None;
        }
        self.baseline = self.baseline.max(event.percent);
        self.last = Some(event.clone());
        Some(event)
    }

    fn set_output(&mut self, path: PathBuf) {
        self.output = Some(path);
    }
}

#[derive(Debug, Default)]
struct Update {
    percent: Option<f64>,
    downloaded: Option<u64>,
    total: Option<u64>,
    speed: Option<f64>,
    eta: Option<Duration>
}

/// `[Merger] Merging formats into "x.mkv"` → `("Merger", "Merging ...")`.
fn split_tag(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix('[')?;
    let (tag, rest) = rest.split_once(']')?;
    if tag.is_empty() || tag.contains(char::is_whitespace) {
        return None;
    }
    Some((tag, rest.trim_start()))
}

fn postprocessor_output(tag: &str, rest: &str) -> Option<PathBuf> {
    match tag {
        "Merger" => {
            let (_, target) = rest.split_once("into ")?;
            Some(PathBuf::from(target.trim().trim_matches('"')))
        }
        "MoveFiles" => {
            let (_, target) = rest.rsplit_once(" to ")?;
            Some(PathBuf::from(target.trim().trim_matches('"')))
        }
        "ExtractAudio" | "VideoConvertor" | "VideoRemuxer" => {
            let (_, target) = rest.split_once("Destination: ")?;
            Some(PathBuf::from(target.trim()))
        }
        _ => None
    }
}

/// The tool's own progress format, with or without keywords:
/// `45.2% of ~ 10.00MiB at 1.00MiB/s ETA 00:05 (frag 3/40)`,
/// `100% of 10.00MiB in 00:00:02 at 4.29MiB/s`,
/// `14.6%  887.84MiB  7.61MiB/s 01:39`.
fn parse_default_progress(text: &str) -> Option<Update> {
    let tokens: Vec<&str> = text
        .split_whitespace()
        .filter(|t| *t != "~")
        .collect();
    let percent = parse_percent(tokens.first()?)?;
    let mut update = Update {
        percent: Some(percent),
        ..Update::default()
    };

    let mut i = 1;
    while i < tokens.len() {
        let token = tokens[i];
        let next = tokens.get(i + 1).copied();
        match token {
            "of" => {
                update.total = next.and_then(parse_size);
                i += 1;
            }
            "at" => {
                update.speed = next.and_then(parse_speed);
                i += 1;
            }
            "ETA" => {
                update.eta = next.and_then(parse_eta);
                i += 1;
            }
            // Elapsed time of a finished download.
            "in" => i += 1,
            _ if token.starts_with('(') => break,
            _ if token.ends_with("/s") => update.speed = parse_speed(token),
            _ if token.contains(':') => update.eta = parse_eta(token),
            _ => {
                if update.total.is_none() {
                    update.total = parse_size(token);
                }
            }
        }
        i += 1;
    }

    if let Some(total) = update.total {
        update.downloaded = Some(bytes_at(percent, total));
    }
    Some(update)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn bytes_at(percent: f64, total: u64) -> u64 {
    (percent.clamp(0.0, 100.0) / 100.0 * total as f64) as u64
}

fn parse_percent(s: &str) -> Option<f64> {
    let value = s.trim().strip_suffix('%')?.trim().parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim().trim_start_matches('~');
    if s == "N/A" || s == "Unknown" || s.is_empty() {
        return None;
    }

    let multipliers = [
        ("TiB", 1024u64 * 1024 * 1024 * 1024),
        ("GiB", 1024 * 1024 * 1024),
        ("MiB", 1024 * 1024),
        ("KiB", 1024),
        ("TB", 1000 * 1000 * 1000 * 1000),
        ("GB", 1000 * 1000 * 1000),
        ("MB", 1000 * 1000),
        ("KB", 1000),
        ("kB", 1000),
        ("B", 1)
    ];

    for (suffix, mult) in multipliers {
        if let Some(num_str) = s.strip_suffix(suffix) {
            let num = num_str.trim().parse::<f64>().ok()?;
            return (num.is_finite() && num >= 0.0).then(|| (num * mult as f64) as u64);
        }
    }

    None
}

#[allow(clippy::cast_precision_loss)]
fn parse_speed(s: &str) -> Option<f64> {
    let s = s.trim().strip_suffix("/s")?;
    parse_size(s).map(|b| b as f64)
}

fn parse_eta(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s == "N/A" || s == "Unknown" || s.is_empty() {
        return None;
    }

    let mut seconds = 0u64;
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    for part in parts {
        seconds = seconds * 60 + part.parse::<u64>().ok()?;
    }
    Some(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parser: &mut ProgressParser, lines: &[&str]) -> Vec<ProgressEvent> {
        lines.iter().filter_map(|line| parser.parse(line)).collect()
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("100MiB"), Some(104_857_600));
        assert_eq!(parse_size("1GiB"), Some(1_073_741_824));
        assert_eq!(parse_size("500KiB"), Some(512_000));
        assert_eq!(parse_size("~10.50MB"), Some(10_500_000));
        assert_eq!(parse_size("1000B"), Some(1000));
        assert_eq!(parse_size("N/A"), None);
        assert_eq!(parse_size("fast"), None);
    }

    #[test]
    fn test_parse_speed() {
        assert_eq!(parse_speed("1MiB/s"), Some(1_048_576.0));
        assert_eq!(parse_speed("500KiB/s"), Some(512_000.0));
        assert_eq!(parse_speed("Unknown B/s"), None);
    }

    #[test]
    fn test_parse_eta() {
        assert_eq!(parse_eta("1:30"), Some(Duration::from_secs(90)));
        assert_eq!(parse_eta("1:00:00"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_eta("42"), Some(Duration::from_secs(42)));
        assert_eq!(parse_eta("N/A"), None);
    }

    #[test]
    fn test_template_line() {
        let mut parser = ProgressParser::new();
        let event = parser
            .parse("PROGRESS|  45.2%|   4.52MiB|  10.00MiB|   1.00MiB/s|00:05")
            .unwrap();
        assert_eq!(event.stage, Stage::Downloading);
        assert!((event.percent - 45.2).abs() < f64::EPSILON);
        assert_eq!(event.downloaded_bytes, 4_739_563);
        assert_eq!(event.total_bytes, Some(10_485_760));
        assert_eq!(event.speed, Some(1_048_576.0));
        assert_eq!(event.eta, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_template_line_with_unknowns() {
        let mut parser = ProgressParser::new();
        let event = parser
            .parse("PROGRESS|  N/A|   2.00MiB|  4.00MiB|  N/A|Unknown")
            .unwrap();
        assert!((event.percent - 50.0).abs() < f64::EPSILON);
        assert_eq!(event.speed, None);
        assert_eq!(event.eta, None);

        // Nothing to compute a percentage from.
        assert!(parser.parse("PROGRESS|N/A|N/A|N/A|N/A|N/A").is_none());
    }

    #[test]
    fn test_default_download_lines() {
        let mut parser = ProgressParser::new();
        let event = parser
            .parse("[download]  12.5% of ~  80.00MiB at    2.00MiB/s ETA 00:35 (frag 3/40)")
            .unwrap();
        assert!((event.percent - 12.5).abs() < f64::EPSILON);
        assert_eq!(event.total_bytes, Some(83_886_080));
        assert_eq!(event.downloaded_bytes, 10_485_760);
        assert_eq!(event.eta, Some(Duration::from_secs(35)));

        let event = parser
            .parse("[download] 100% of   80.00MiB in 00:00:40 at 2.00MiB/s")
            .unwrap();
        assert!((event.percent - 100.0).abs() < f64::EPSILON);
        assert_eq!(event.speed, Some(2_097_152.0));
        assert_eq!(event.eta, None);
    }

    #[test]
    fn test_bare_percentage_line() {
        let mut parser = ProgressParser::new();
        let event = parser.parse(" 14.6%  887.84MiB    7.61MiB/s 01:39").unwrap();
        assert!((event.percent - 14.6).abs() < f64::EPSILON);
        assert_eq!(event.total_bytes, parse_size("887.84MiB"));
        assert_eq!(event.eta, Some(Duration::from_secs(99)));
    }

    #[test]
    fn test_stage_sequence() {
        let mut parser = ProgressParser::new();
        let events = feed(&mut parser, &[
            "[youtube] Extracting URL: https://www.youtube.com/watch?v=abc",
            "[youtube] abc: Downloading webpage",
            "[info] abc: Downloading 1 format(s): 137+140",
            "[download] Destination: Video.f137.mp4",
            "PROGRESS|  50.0%|1.00MiB|2.00MiB|1.00MiB/s|00:01",
            "PROGRESS| 100.0%|2.00MiB|2.00MiB|1.00MiB/s|00:00",
            "[Merger] Merging formats into \"Video.mp4\"",
            "Deleting original file Video.f137.mp4 (pass -k to keep)"
        ]);
        let stages: Vec<Stage> = events.iter().map(|e| e.stage).collect();
        assert_eq!(stages, vec![
            Stage::Resolving,
            Stage::Resolving,
            Stage::Resolving,
            Stage::Downloading,
            Stage::Downloading,
            Stage::Downloading,
            Stage::Converting,
            Stage::Converting
        ]);
        assert_eq!(parser.output_file(), Some(Path::new("Video.mp4")));
        assert_eq!(parser.destinations(), &[PathBuf::from("Video.f137.mp4")]);

        let done = parser.finish().unwrap();
        assert_eq!(done.stage, Stage::Done);
        assert!((done.percent - 100.0).abs() < f64::EPSILON);
        assert!(parser.finish().is_none());
        assert!(parser.fail("late").is_none());
        assert!(parser.parse("PROGRESS|10%|1B|10B|N/A|N/A").is_none());
    }

    #[test]
    fn test_no_backwards_stage() {
        let mut parser = ProgressParser::new();
        parser.parse("[download] Destination: a.webm").unwrap();
        parser.parse("[ExtractAudio] Destination: a.mp3").unwrap();
        assert_eq!(parser.stage(), Stage::Converting);

        assert!(parser.parse("PROGRESS|50%|1B|2B|N/A|N/A").is_none());
        assert!(parser.parse("[youtube] abc: Downloading webpage").is_none());
        assert_eq!(parser.output_file(), Some(Path::new("a.mp3")));
    }

    #[test]
    fn test_diagnostics_keep_stage() {
        let mut parser = ProgressParser::new();
        parser.parse("PROGRESS|40%|4B|10B|N/A|N/A").unwrap();
        let warning = parser.parse("WARNING: unable to extract uploader").unwrap();
        assert_eq!(warning.stage, Stage::Downloading);
        assert!((warning.percent - 40.0).abs() < f64::EPSILON);
        assert_eq!(warning.message.as_deref(), Some("unable to extract uploader"));

        let error = parser.parse("ERROR: [youtube] abc: Video unavailable").unwrap();
        assert_eq!(error.stage, Stage::Downloading);
        assert_eq!(parser.stage(), Stage::Downloading);

        let failed = parser.fail("yt-dlp exited with code 1").unwrap();
        assert_eq!(failed.stage, Stage::Error);
        assert!(parser.finish().is_none());
    }

    #[test]
    fn test_duplicates_and_regressions_dropped() {
        let mut parser = ProgressParser::new();
        assert!(parser.parse("PROGRESS|30%|3B|10B|N/A|N/A").is_some());
        assert!(parser.parse("PROGRESS|30%|3B|10B|N/A|N/A").is_none());
        assert!(parser.parse("PROGRESS|20%|2B|10B|N/A|N/A").is_none());
        assert!(parser.parse("PROGRESS|30%|3B|10B|5B/s|N/A").is_some());
        assert!(parser.parse("PROGRESS|31%|3B|10B|5B/s|N/A").is_some());
    }

    #[test]
    fn test_percent_never_decreases_within_stage() {
        // Deterministic pseudo-random sequences of mixed lines.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        for _ in 0..200 {
            let mut parser = ProgressParser::new();
            let mut events = Vec::new();
            for _ in 0..60 {
                let roll = next();
                let line = match roll % 7 {
                    0 => "[youtube] abc: Downloading webpage".to_string(),
                    1 => format!("[download] Destination: part{}.mp4", roll % 3),
                    2 => "WARNING: retrying".to_string(),
                    3 => "[Merger] Merging formats into \"out.mp4\"".to_string(),
                    4 => format!("[download] {:.1}% of 10.00MiB at 1.00MiB/s ETA 00:03", (roll % 1001) as f64 / 10.0),
                    _ => format!("PROGRESS|{:.1}%|N/A|10.00MiB|N/A|N/A", (roll % 1001) as f64 / 10.0)
                };
                events.extend(parser.parse(&line));
            }
            events.extend(parser.finish());

            for pair in events.windows(2) {
                assert!(pair[0].stage <= pair[1].stage, "stage went backwards: {pair:?}");
                if pair[0].stage == pair[1].stage {
                    assert!(pair[1].percent >= pair[0].percent, "percent decreased: {pair:?}");
                    assert_ne!(pair[0], pair[1]);
                }
            }
        }
    }

    #[test]
    fn test_tracks_files() {
        let mut parser = ProgressParser::new();
        feed(&mut parser, &[
            "[info] Writing video subtitles to: Clip.en.vtt",
            "[download] Destination: Clip.en.vtt",
            "[download] 100% of 2.00KiB in 00:00:00 at 10.00KiB/s",
            "[info] Writing video metadata as JSON to: Clip.info.json",
            "[download] Destination: Clip.webm",
            "PROGRESS| 30.0%|3.00MiB|10.00MiB|N/A|N/A"
        ]);
        assert_eq!(parser.info_json(), Some(Path::new("Clip.info.json")));
        assert_eq!(parser.side_files(), &[
            PathBuf::from("Clip.en.vtt"),
            PathBuf::from("Clip.info.json")
        ]);
        assert_eq!(parser.destinations(), &[PathBuf::from("Clip.webm")]);
        assert_eq!(parser.output_file(), Some(Path::new("Clip.webm")));
        assert_eq!(parser.stage(), Stage::Downloading);
    }

    #[test]
    fn test_already_downloaded() {
        let mut parser = ProgressParser::new();
        let event = parser
            .parse("[download] My Video [abc].mp4 has already been downloaded")
            .unwrap();
        assert!((event.percent - 100.0).abs() < f64::EPSILON);
        assert_eq!(parser.output_file(), Some(Path::new("My Video [abc].mp4")));
    }

    #[test]
    fn test_move_files_and_convertors() {
        let mut parser = ProgressParser::new();
        parser.parse("[VideoConvertor] Converting video from webm to mkv; Destination: a.mkv");
        assert_eq!(parser.output_file(), Some(Path::new("a.mkv")));
        parser.parse("[MoveFiles] Moving file \"a.mkv\" to \"/media/a.mkv\"");
        assert_eq!(parser.output_file(), Some(Path::new("/media/a.mkv")));
    }

    #[test]
    fn test_unknown_lines_ignored() {
        let mut parser = ProgressParser::new();
        assert!(parser.parse("").is_none());
        assert!(parser.parse("some random chatter").is_none());
        assert!(parser.parse("[not a tag line").is_none());
        assert_eq!(parser.stage(), Stage::Pending);
    }
}
