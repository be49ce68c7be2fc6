//! End-to-end tests of the `page-shot` binary.
//!
//! Tests marked `#[ignore]` launch a real browser; run them with
//! `cargo test -- --ignored` on a machine with Chrome or Chromium installed
//! (or `CHROME` pointing at one).

use assert_cmd::assert::Assert;
use assert_cmd::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const MISSING_URL: &str = "Please provide a URL to screenshot\n";
const MISSING_OUTPUT: &str = "Please provide a filename to save the screenshot\n";

fn page_shot(args: &[&str], tmp: &Path) -> Assert {
    let bin = assert_cmd::cargo::cargo_bin!("page-shot");
    Command::new(bin)
        .args(args)
        // Browser user-data dirs land here, so leftovers are easy to spot.
        .env("TMPDIR", tmp)
        .assert()
}

fn write_page(dir: &Path, name: &str, html: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, html).unwrap();
    format!("file://{}", path.display())
}

/// Width and height from a PNG's IHDR chunk.
fn png_size(bytes: &[u8]) -> (u32, u32) {
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n", "not a PNG");
    let width = u32::from_be_bytes(bytes[16..20].try_into().unwrap());
    let height = u32::from_be_bytes(bytes[20..24].try_into().unwrap());
    (width, height)
}

fn leftover_profiles(tmp: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(tmp)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("cdp-page-shot_"))
        })
        .collect()
}

fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[test]
fn no_arguments_asks_for_url() {
    let tmp = TempDir::new().unwrap();
    page_shot(&[], tmp.path()).code(1).stdout(MISSING_URL);
    assert!(is_empty_dir(tmp.path()));
}

#[test]
fn url_only_asks_for_filename() {
    let tmp = TempDir::new().unwrap();
    page_shot(&["https://example.com"], tmp.path())
        .code(1)
        .stdout(MISSING_OUTPUT);
    assert!(is_empty_dir(tmp.path()));
}

#[test]
fn empty_url_asks_for_url() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("shot.png");
    page_shot(&["", output.to_str().unwrap()], tmp.path())
        .code(1)
        .stdout(MISSING_URL);
    assert!(is_empty_dir(tmp.path()));
}

#[test]
fn empty_output_asks_for_filename() {
    let tmp = TempDir::new().unwrap();
    page_shot(&["https://example.com", ""], tmp.path())
        .code(1)
        .stdout(MISSING_OUTPUT);
    assert!(is_empty_dir(tmp.path()));
}

#[test]
fn help_exits_cleanly() {
    let tmp = TempDir::new().unwrap();
    let assert = page_shot(&["--help"], tmp.path()).success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 output");
    assert!(stdout.contains("Usage"));
}

#[test]
#[ignore = "needs a Chrome/Chromium install"]
fn captures_local_page() {
    let tmp = TempDir::new().unwrap();
    let url = write_page(tmp.path(), "index.html", "<h1>hello</h1>");
    let output = tmp.path().join("shot.png");

    page_shot(&[&url, output.to_str().unwrap()], tmp.path())
        .success()
        .stdout("");

    let bytes = std::fs::read(&output).unwrap();
    assert!(!bytes.is_empty());
    png_size(&bytes);
    assert!(leftover_profiles(tmp.path()).is_empty());
}

#[test]
#[ignore = "needs a Chrome/Chromium install"]
fn second_run_overwrites() {
    let tmp = TempDir::new().unwrap();
    let short = write_page(tmp.path(), "short.html", "<body style='margin:0'><div style='height:100px'></div></body>");
    let tall = write_page(tmp.path(), "tall.html", "<body style='margin:0'><div style='height:3000px'></div></body>");
    let output = tmp.path().join("shot.png");
    let output_str = output.to_str().unwrap();

    page_shot(&[&tall, output_str], tmp.path()).success();
    let (_, first_height) = png_size(&std::fs::read(&output).unwrap());

    page_shot(&[&short, output_str], tmp.path()).success();
    let (_, second_height) = png_size(&std::fs::read(&output).unwrap());

    assert_eq!(first_height, 3000);
    assert!(second_height < first_height);
}

#[test]
#[ignore = "needs a Chrome/Chromium install"]
fn captures_full_document_height() {
    let tmp = TempDir::new().unwrap();
    let url = write_page(
        tmp.path(),
        "tall.html",
        "<body style='margin:0'><div style='height:5000px;background:#c33'></div></body>",
    );
    let output = tmp.path().join("tall.png");

    page_shot(&[&url, output.to_str().unwrap()], tmp.path()).success();

    let (_, height) = png_size(&std::fs::read(&output).unwrap());
    assert_eq!(height, 5000);
}

#[test]
#[ignore = "needs a Chrome/Chromium install"]
fn unreachable_host_fails_and_releases_browser() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("never.png");

    let started = Instant::now();
    page_shot(&["http://10.255.255.1/", output.to_str().unwrap()], tmp.path()).failure();

    assert!(started.elapsed() < Duration::from_secs(90));
    assert!(!output.exists());
    assert!(leftover_profiles(tmp.path()).is_empty());
}

#[test]
#[ignore = "needs a Chrome/Chromium install"]
fn missing_output_directory_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let url = write_page(tmp.path(), "index.html", "<p>x</p>");
    let output = tmp.path().join("no-such-dir").join("shot.png");

    let assert = page_shot(&[&url, output.to_str().unwrap()], tmp.path()).failure();

    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("Failed to write"));
    assert!(leftover_profiles(tmp.path()).is_empty());
}
