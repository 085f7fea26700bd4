//! Cutting a validated clip set through the media processor

use std::path::PathBuf;
use std::sync::Arc;

use super::ClipSet;
use crate::processing::{ClipMetadata, ClipRequest, MediaProcessor};
use crate::types::ClipOutcome;
use crate::utils::{sanitize_clip_title, sanitize_metadata};

/// Where and how to cut a clip set
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitTarget {
    /// Fetched source file
    pub source: PathBuf,
    /// Directory receiving the clips
    pub output_dir: PathBuf,
    /// Produce MP3 clips without video
    pub audio_only: bool,
    /// Album tag for audio clips (usually the source title)
    pub album: Option<String>,
}

/// Applies a [`ClipSet`] to a source file, one processor call per clip
///
/// Clips are independent: a failed clip is recorded in its [`ClipOutcome`] and
/// the remaining clips are still cut.
#[derive(Clone)]
pub struct TimestampSplitter {
    processor: Arc<dyn MediaProcessor>,
}

impl std::fmt::Debug for TimestampSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestampSplitter")
            .field("processor", &self.processor.name())
            .finish()
    }
}

impl TimestampSplitter {
    /// Create a splitter delegating to `processor`
    pub fn new(processor: Arc<dyn MediaProcessor>) -> Self {
        Self { processor }
    }

    /// Output path for the clip at 1-based `index`
    ///
    /// `NN-<sanitized title>.<ext>`, where `ext` is `mp3` for audio-only targets
    /// and the source extension (or `mp4`) otherwise.
    pub fn clip_path(target: &SplitTarget, index: usize, title: &str) -> PathBuf {
        let ext = if target.audio_only {
            "mp3".to_string()
        } else {
            target
                .source
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("mp4")
                .to_string()
        };
        target
            .output_dir
            .join(format!("{index:02}-{}.{ext}", sanitize_clip_title(title)))
    }

    /// Cut every clip in order
    ///
    /// Returns one outcome per clip, in clip order.
    pub async fn apply(&self, clips: &ClipSet, target: &SplitTarget) -> Vec<ClipOutcome> {
        let total = clips.len();

        if let Err(e) = tokio::fs::create_dir_all(&target.output_dir).await {
            tracing::error!(
                dir = %target.output_dir.display(),
                error = %e,
                "Cannot create clip output directory"
            );
            let reason = format!(
                "cannot prepare output directory {}: {e}",
                target.output_dir.display()
            );
            return clips
                .iter()
                .enumerate()
                .map(|(i, clip)| ClipOutcome {
                    index: i + 1,
                    title: sanitize_clip_title(&clip.title),
                    path: None,
                    error: Some(reason.clone()),
                })
                .collect();
        }

        tracing::info!(
            source = %target.source.display(),
            clips = total,
            processor = self.processor.name(),
            "Splitting media into clips"
        );

        let album = target.album.as_deref().map(sanitize_metadata);
        let mut outcomes = Vec::with_capacity(total);

        for (i, clip) in clips.iter().enumerate() {
            let index = i + 1;
            let title = sanitize_clip_title(&clip.title);
            let request = ClipRequest {
                source: target.source.clone(),
                start: clip.start,
                end: clip.end,
                output: Self::clip_path(target, index, &clip.title),
                metadata: ClipMetadata {
                    title: sanitize_metadata(&clip.title),
                    track: index,
                    total,
                    album: album.clone(),
                },
                audio_only: target.audio_only,
            };

            let outcome = match self.processor.cut(&request).await {
                Ok(path) => {
                    tracing::debug!(index, total, path = %path.display(), "Clip written");
                    ClipOutcome {
                        index,
                        title,
                        path: Some(path),
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::warn!(index, total, error = %e, "Clip processing failed");
                    ClipOutcome {
                        index,
                        title,
                        path: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        outcomes
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessingError;
    use crate::timestamps::{Clip, ClipInput, Offset, parse};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    /// Records requests and fails any clip whose title contains "fail"
    #[derive(Default)]
    struct RecordingProcessor {
        requests: Mutex<Vec<ClipRequest>>,
    }

    #[async_trait]
    impl MediaProcessor for RecordingProcessor {
        async fn cut(&self, request: &ClipRequest) -> Result<PathBuf, ProcessingError> {
            self.requests.lock().unwrap().push(request.clone());
            if request.metadata.title.contains("fail") {
                return Err(ProcessingError::Failed {
                    output: request.output.clone(),
                    reason: "boom".into(),
                });
            }
            Ok(request.output.clone())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn clip_set(titles: &[&str]) -> ClipSet {
        let clips = titles
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let i = i as u64;
                Clip::new(Offset::from_secs(i * 10), Offset::from_secs(i * 10 + 10), *t)
            })
            .collect();
        parse(&ClipInput::Structured(clips), None).unwrap()
    }

    fn target(dir: &Path, audio_only: bool) -> SplitTarget {
        SplitTarget {
            source: dir.join("Source Video.webm"),
            output_dir: dir.join("clips"),
            audio_only,
            album: Some("Source $Video".into()),
        }
    }

    #[tokio::test]
    async fn one_failing_clip_does_not_abort_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let processor = Arc::new(RecordingProcessor::default());
        let splitter = TimestampSplitter::new(processor.clone());

        let outcomes = splitter
            .apply(&clip_set(&["Intro", "will fail", "Outro"]), &target(dir.path(), false))
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_success());
        assert!(!outcomes[1].is_success());
        assert!(outcomes[1].error.as_deref().unwrap().contains("boom"));
        assert!(outcomes[2].is_success());
        assert_eq!(processor.requests.lock().unwrap().len(), 3);
        assert!(dir.path().join("clips").is_dir());
    }

    #[tokio::test]
    async fn requests_carry_numbered_sanitized_names_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let processor = Arc::new(RecordingProcessor::default());
        let splitter = TimestampSplitter::new(processor.clone());

        splitter
            .apply(&clip_set(&["A/B: $Live"]), &target(dir.path(), true))
            .await;

        let requests = processor.requests.lock().unwrap();
        let req = &requests[0];
        assert_eq!(req.output, dir.path().join("clips").join("01-A_B_ Live.mp3"));
        assert_eq!(req.metadata.title, "A/B: Live");
        assert_eq!(req.metadata.album.as_deref(), Some("Source Video"));
        assert_eq!((req.metadata.track, req.metadata.total), (1, 1));
        assert!(req.audio_only);
    }

    #[test]
    fn video_clips_keep_source_extension() {
        let t = target(Path::new("/x"), false);
        assert_eq!(
            TimestampSplitter::clip_path(&t, 12, "Chorus"),
            Path::new("/x/clips/12-Chorus.webm")
        );
    }
}
