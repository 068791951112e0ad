#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use ytmusic_dl_bot::providers::{AudioDownloader, DownloadError, Track, YtDlpDownloader};

/// Writes the MP3 named by the `-o` template
const SUCCESS_SCRIPT: &str = r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; shift; fi
  shift
done
printf 'ID3fake-mp3-data' > "${out%.*}.mp3"
"#;

/// Fails once per call and records the URL it was given
const RATE_LIMITED_SCRIPT: &str = r#"#!/bin/sh
for last; do :; done
echo "$last" >> "$(dirname "$0")/calls.log"
echo "ERROR: Unable to download webpage: HTTP Error 429: Too Many Requests" >&2
exit 1
"#;

const UNAVAILABLE_SCRIPT: &str = r#"#!/bin/sh
for last; do :; done
echo "$last" >> "$(dirname "$0")/calls.log"
echo "ERROR: [youtube] YkgkThdzX-8: Video unavailable" >&2
exit 1
"#;

/// Exits successfully without producing anything
const SILENT_SCRIPT: &str = "#!/bin/sh\nexit 0\n";

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-yt-dlp");
    std::fs::write(&path, body).expect("write script");
    let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod");
    path
}

fn calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn track() -> Track {
    Track {
        title: "AC/DC: Back in Black".to_string(),
        artists: vec!["AC/DC".to_string()],
        album: None,
        duration_secs: Some(255),
        thumbnail_url: None,
        video_id: "YkgkThdzX-8".to_string(),
    }
}

fn downloader(bin: &Path, out: &Path) -> YtDlpDownloader {
    YtDlpDownloader::new(bin.to_string_lossy(), out).with_mirrors(vec![
        "https://mirror-a.example".to_string(),
        "https://mirror-b.example".to_string(),
    ])
}

#[tokio::test]
async fn test_successful_download_produces_named_mp3() {
    let bin_dir = TempDir::new().expect("tempdir");
    let out_dir = TempDir::new().expect("tempdir");
    let script = write_script(bin_dir.path(), SUCCESS_SCRIPT);

    let audio = downloader(&script, out_dir.path())
        .download(&track())
        .await
        .expect("download");

    assert!(audio.path.exists());
    assert_eq!(audio.file_name, "AC_DC_ Back in Black.mp3");
    assert_eq!(audio.performer, "AC/DC");
    assert_eq!(audio.size_bytes, 16);

    let stored = audio
        .path
        .file_name()
        .and_then(|n| n.to_str())
        .expect("file name");
    assert!(stored.starts_with("AC_DC_ Back in Black_YkgkThdzX-8_"));
    assert!(stored.ends_with(".mp3"));
}

#[tokio::test]
async fn test_transient_errors_try_every_source() {
    let bin_dir = TempDir::new().expect("tempdir");
    let out_dir = TempDir::new().expect("tempdir");
    let script = write_script(bin_dir.path(), RATE_LIMITED_SCRIPT);

    let err = downloader(&script, out_dir.path())
        .download(&track())
        .await
        .expect_err("must fail");

    match err {
        DownloadError::AllSourcesFailed {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("429"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let urls = calls(bin_dir.path());
    assert_eq!(urls.len(), 3);
    assert_eq!(urls[0], "https://www.youtube.com/watch?v=YkgkThdzX-8");
    assert!(urls[1..].iter().all(|u| u.contains("mirror-")));
}

#[tokio::test]
async fn test_fatal_error_stops_fallback() {
    let bin_dir = TempDir::new().expect("tempdir");
    let out_dir = TempDir::new().expect("tempdir");
    let script = write_script(bin_dir.path(), UNAVAILABLE_SCRIPT);

    let err = downloader(&script, out_dir.path())
        .download(&track())
        .await
        .expect_err("must fail");

    assert!(matches!(err, DownloadError::Unavailable(_)));
    assert_eq!(calls(bin_dir.path()).len(), 1);
}

#[tokio::test]
async fn test_missing_output_is_reported() {
    let bin_dir = TempDir::new().expect("tempdir");
    let out_dir = TempDir::new().expect("tempdir");
    let script = write_script(bin_dir.path(), SILENT_SCRIPT);

    let err = YtDlpDownloader::new(script.to_string_lossy(), out_dir.path())
        .download(&track())
        .await
        .expect_err("must fail");

    assert!(matches!(err, DownloadError::MissingOutput));
}

#[tokio::test]
async fn test_oversize_output_is_rejected_and_removed() {
    let bin_dir = TempDir::new().expect("tempdir");
    let out_dir = TempDir::new().expect("tempdir");
    let script = write_script(bin_dir.path(), SUCCESS_SCRIPT);

    let err = downloader(&script, out_dir.path())
        .with_max_upload_bytes(4)
        .download(&track())
        .await
        .expect_err("must fail");

    assert!(matches!(err, DownloadError::TooLarge { .. }));
    let leftovers = std::fs::read_dir(out_dir.path()).expect("read_dir").count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_missing_binary_is_spawn_error() {
    let out_dir = TempDir::new().expect("tempdir");
    let err = YtDlpDownloader::new("/nonexistent/yt-dlp", out_dir.path())
        .download(&track())
        .await
        .expect_err("must fail");

    assert!(matches!(err, DownloadError::Spawn(_)));
}

#[tokio::test]
async fn test_startup_sweep_removes_only_leftovers() {
    let out_dir = TempDir::new().expect("tempdir");
    let leftovers = [
        "Imagine_YkgkThdzX-8_0123456789abcdef0123456789abcdef.mp3",
        "Imagine_YkgkThdzX-8_fedcba9876543210fedcba9876543210.webm.part",
    ];
    for name in leftovers {
        std::fs::write(out_dir.path().join(name), b"partial").expect("write leftover");
    }
    std::fs::write(out_dir.path().join("README.txt"), b"keep").expect("write unrelated");

    let removed = YtDlpDownloader::new("yt-dlp", out_dir.path())
        .sweep_downloads_dir()
        .await
        .expect("sweep");

    assert_eq!(removed, 2);
    let remaining: Vec<String> = std::fs::read_dir(out_dir.path())
        .expect("read_dir")
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(remaining, vec!["README.txt".to_string()]);
}
