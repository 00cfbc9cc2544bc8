//! yt-dlp backed media source.
//!
//! Metadata lookups run `yt-dlp --print` and parse one `reference<TAB>title`
//! line per entry. Streaming spawns `yt-dlp -o -` and relays its stdout. The
//! child process is killed when the returned stream is dropped.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::process::Command;
use tokio_util::io::ReaderStream;

use super::{MediaError, MediaResult, MediaSource, MediaStream, Track};
use crate::config::MediaConfig;
use crate::constants::RELAY_CHUNK_SIZE;
use crate::utils::looks_like_url;

/// Output template for single-entry lookups.
const ENTRY_TEMPLATE: &str = "%(webpage_url)s\t%(title)s";

/// Output template for flat playlist entries.
const PLAYLIST_TEMPLATE: &str = "%(url)s\t%(title)s";

/// Media source that delegates resolution and streaming to yt-dlp.
pub struct YtDlpSource {
    config: MediaConfig,
}

impl YtDlpSource {
    /// Creates a new source using the given yt-dlp settings.
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.ytdlp_path);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.config.resolve_timeout_secs)
    }

    /// Runs yt-dlp to completion and returns its stdout.
    async fn run(&self, args: &[&str]) -> MediaResult<String> {
        let mut cmd = self.command();
        cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());

        log::debug!("[YtDlp] Running {} {:?}", self.config.ytdlp_path, args);

        let output = tokio::time::timeout(self.resolve_timeout(), cmd.output())
            .await
            .map_err(|_| MediaError::Timeout(self.config.resolve_timeout_secs))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no diagnostic output")
                .trim()
                .to_string();
            return Err(MediaError::Extractor(format!(
                "{} ({})",
                message, output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Maps a user query onto something yt-dlp can resolve.
///
/// URLs pass through unchanged; anything else becomes a single-result search.
pub(crate) fn search_target(query: &str) -> String {
    let query = query.trim();
    if looks_like_url(query) {
        query.to_string()
    } else {
        format!("ytsearch1:{query}")
    }
}

/// Parses `reference<TAB>title` lines into tracks.
///
/// Blank lines and lines without a usable reference are skipped. yt-dlp prints
/// `NA` for missing fields, which is treated as absent.
pub(crate) fn parse_entries(stdout: &str) -> Vec<Track> {
    stdout
        .lines()
        .filter_map(|line| {
            let line = line.trim_end_matches('\r');
            let (reference, title) = line.split_once('\t').unwrap_or((line, ""));
            let reference = reference.trim();
            if reference.is_empty() || reference == "NA" {
                return None;
            }
            let title = match title.trim() {
                "NA" => "",
                t => t,
            };
            Some(Track::new(reference, title))
        })
        .collect()
}

#[async_trait]
impl MediaSource for YtDlpSource {
    async fn resolve(&self, query: &str) -> MediaResult<Track> {
        let target = search_target(query);
        let stdout = self
            .run(&[
                "--no-playlist",
                "--no-warnings",
                "--skip-download",
                "--print",
                ENTRY_TEMPLATE,
                &target,
            ])
            .await?;

        let track = parse_entries(&stdout)
            .into_iter()
            .next()
            .ok_or_else(|| MediaError::NotFound(query.to_string()))?;

        log::info!("[YtDlp] Resolved '{}' -> {}", query, track.reference());
        Ok(track)
    }

    async fn resolve_playlist(&self, reference: &str) -> MediaResult<Vec<Track>> {
        let stdout = self
            .run(&[
                "--flat-playlist",
                "--no-warnings",
                "--print",
                PLAYLIST_TEMPLATE,
                reference.trim(),
            ])
            .await?;

        let tracks = parse_entries(&stdout);
        if tracks.is_empty() {
            return Err(MediaError::EmptyPlaylist(reference.to_string()));
        }

        log::info!(
            "[YtDlp] Playlist {} expanded to {} entries",
            reference,
            tracks.len()
        );
        Ok(tracks)
    }

    async fn open_stream(&self, track: &Track) -> MediaResult<MediaStream> {
        let mut cmd = self.command();
        cmd.args([
            "--no-playlist",
            "--quiet",
            "--no-warnings",
            "-f",
            self.config.format.as_str(),
            "-o",
            "-",
            track.reference(),
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

        let mut child = cmd.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::Extractor("stdout was not captured".into()))?;
        let mut reader = ReaderStream::with_capacity(stdout, RELAY_CHUNK_SIZE);

        // Wait for the first chunk so a dead reference fails here instead of
        // surfacing later as an instantly idle sink.
        let first = match tokio::time::timeout(self.resolve_timeout(), reader.next()).await {
            Err(_) => return Err(MediaError::Timeout(self.config.resolve_timeout_secs)),
            Ok(Some(Ok(chunk))) => chunk,
            Ok(Some(Err(e))) => return Err(MediaError::Io(e)),
            Ok(None) => {
                let status = child.wait().await?;
                return Err(MediaError::Extractor(format!(
                    "no audio produced for {} ({})",
                    track.reference(),
                    status
                )));
            }
        };

        log::debug!("[YtDlp] Streaming {}", track.reference());

        let stream = futures::stream::once(async move { Ok::<_, std::io::Error>(first) })
            .chain(reader)
            .map(move |chunk| {
                // Owning the child here ties its lifetime to the stream.
                let _child = &child;
                chunk
            });
        Ok(Box::pin(stream))
    }
}
