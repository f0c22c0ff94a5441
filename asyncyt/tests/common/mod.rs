#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::Duration;

use asyncyt::DownloaderConfig;

/// Stands in for yt-dlp. Appends its arguments to `$FAKE_ARGS_LOG` when set.
///
/// - `.../nothing` is rejected as an unsupported URL
/// - `.../stall` hangs in every mode
/// - `--flat-playlist` lists `v1`, `v2` and `v3`
/// - `ytsearchN:` returns N results
/// - downloading `v2` fails, downloading `slow` hangs after writing a part file
const FAKE_YT_DLP: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
    echo 2024.12.13
    exit 0
fi
if [ -n "$FAKE_ARGS_LOG" ]; then
    echo "$*" >> "$FAKE_ARGS_LOG"
fi

for last; do :; done
url="$last"
id="${url##*/}"
dump=0
flat=0
for arg in "$@"; do
    case "$arg" in
        --dump-json) dump=1 ;;
        --flat-playlist) flat=1 ;;
    esac
done

case "$url" in
    */nothing)
        echo "ERROR: Unsupported URL: $url" >&2
        exit 1
        ;;
    */stall)
        exec sleep 30
        ;;
esac

if [ "$flat" = 1 ]; then
    for n in 1 2 3; do
        printf '{"id": "v%s", "title": "Entry %s", "url": "https://fake.test/watch/v%s", "playlist_id": "PL1", "playlist_title": "Fake list"}\n' "$n" "$n" "$n"
    done
    exit 0
fi

case "$url" in
    ytsearch*)
        count="${url#ytsearch}"
        count="${count%%:*}"
        n=1
        while [ "$n" -le "$count" ]; do
            printf '{"id": "s%s", "title": "Result %s", "webpage_url": "https://fake.test/watch/s%s"}\n' "$n" "$n" "$n"
            n=$((n + 1))
        done
        exit 0
        ;;
esac

if [ "$dump" = 1 ]; then
    printf '{"id": "%s", "title": "Video %s", "duration": 212.0, "webpage_url": "%s"}\n' "$id" "$id" "$url"
    exit 0
fi

echo "[fake] $id: Downloading webpage"
case "$id" in
    v2)
        echo "ERROR: [fake] v2: Requested format is not available" >&2
        exit 1
        ;;
    slow)
        echo "[download] Destination: slow.mp4"
        echo "PROGRESS|  1.0%|10.00KiB|1.00MiB|1.00KiB/s|16:40"
        printf 'partial' > slow.mp4.part
        exec sleep 30
        ;;
esac

echo "[info] Writing video metadata as JSON to: $id.info.json"
printf '{"id": "%s", "title": "Video %s"}\n' "$id" "$id" > "$id.info.json"
echo "[download] Destination: $id.mp4"
echo "PROGRESS|  0.0%|0.00B|1.00MiB|N/A|N/A"
echo "PROGRESS| 50.0%|512.00KiB|1.00MiB|1.00MiB/s|00:01"
echo "PROGRESS|100.0%|1.00MiB|1.00MiB|1.00MiB/s|00:00"
printf 'video %s' "$id" > "$id.mp4"
exit 0
"#;

const FAKE_FFMPEG: &str = "#!/bin/sh\necho 'ffmpeg version 7.1 Copyright (c) 2000-2024 the FFmpeg developers'\n";

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "asyncyt=debug".into())
            )
            .with_test_writer()
            .init();
    });
}

#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A scratch directory holding fake executables and a downloader configured
/// to use only them.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub args_log: PathBuf,
    pub config: DownloaderConfig
}

#[cfg(unix)]
impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let ytdlp = write_script(dir.path(), "yt-dlp", FAKE_YT_DLP);
        let ffmpeg = write_script(dir.path(), "ffmpeg", FAKE_FFMPEG);
        let args_log = dir.path().join("args.log");

        let config = DownloaderConfig::new()
            .bin_dir(dir.path().join("bin"))
            .ytdlp_path(ytdlp)
            .ffmpeg_path(ffmpeg)
            .use_system_path(false)
            .auto_provision(false)
            .env("FAKE_ARGS_LOG", args_log.to_string_lossy())
            .grace_period(Duration::from_secs(2));

        Self {
            dir,
            args_log,
            config
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    pub fn logged_args(&self) -> String {
        std::fs::read_to_string(&self.args_log).unwrap_or_default()
    }
}
