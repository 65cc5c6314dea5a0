// src/video/source.rs

//! Input sources and the colon-separated selector grammar.
//!
//! A selector `a[:b[:c[:d]]]` picks one of two source shapes:
//!
//! - four parts `prefix:start:end:suffix` — an image sequence; frame `n`
//!   loads `prefix{n}{suffix}` with the index zero-padded to the width of
//!   the `end` field;
//! - one to three parts `path[:start[:end]]` — a frame range of an AVI file.
//!
//! A caller that has already materialised its frames passes
//! [`Source::Frames`] directly.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::debug;

use crate::image::YCbCrFrame;
use crate::utils::{MjvError, Result};

/// A video input in one of its three shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    ImageSequence {
        prefix: String,
        start: usize,
        end: usize,
        suffix: String,
        /// Zero-pad width of the frame index within the file name.
        index_width: usize,
    },
    Avi {
        path: PathBuf,
        start: Option<usize>,
        end: Option<usize>,
    },
    Frames(Vec<YCbCrFrame>),
}

fn parse_index(part: &str, what: &str) -> Result<usize> {
    part.parse::<usize>().map_err(|_| {
        MjvError::InvalidInput(format!("selector {what} {part:?} is not a frame index"))
    })
}

impl Source {
    /// Parses a selector string into a source. Pure; no file is touched.
    pub fn parse(selector: &str) -> Result<Self> {
        if selector.is_empty() {
            return Err(MjvError::InvalidInput("empty source selector".into()));
        }
        let parts: Vec<&str> = selector.split(':').collect();
        match parts.as_slice() {
            [prefix, start, end, suffix] => {
                let start_idx = parse_index(start, "start")?;
                let end_idx = parse_index(end, "end")?;
                if end_idx < start_idx {
                    return Err(MjvError::InvalidInput(format!(
                        "selector range {start_idx}..{end_idx} is reversed"
                    )));
                }
                Ok(Source::ImageSequence {
                    prefix: prefix.to_string(),
                    start: start_idx,
                    end: end_idx,
                    suffix: suffix.to_string(),
                    index_width: end.len(),
                })
            }
            [path, start, end] => Ok(Source::Avi {
                path: PathBuf::from(path),
                start: Some(parse_index(start, "start")?),
                end: Some(parse_index(end, "end")?),
            }),
            [path, start] => Ok(Source::Avi {
                path: PathBuf::from(path),
                start: Some(parse_index(start, "start")?),
                end: None,
            }),
            [path] => Ok(Source::Avi {
                path: PathBuf::from(path),
                start: None,
                end: None,
            }),
            _ => Err(MjvError::InvalidInput(format!(
                "selector {selector:?} has more than four parts"
            ))),
        }
    }

    /// The file paths an image-sequence source resolves to, in frame order.
    pub fn sequence_paths(&self) -> Option<Vec<PathBuf>> {
        match self {
            Source::ImageSequence {
                prefix,
                start,
                end,
                suffix,
                index_width,
            } => Some(
                (*start..=*end)
                    .map(|n| PathBuf::from(format!("{prefix}{n:0index_width$}{suffix}")))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Loads the source into packed YCbCr frames.
    ///
    /// Image sequences are decoded with the `image` crate and converted with
    /// Rec.601. AVI demuxing is an external collaborator: callers demux
    /// ahead of time and pass [`Source::Frames`].
    pub fn materialise(self) -> Result<Vec<YCbCrFrame>> {
        match self {
            Source::Frames(frames) => Ok(frames),
            Source::ImageSequence { .. } => {
                let paths = self.sequence_paths().expect("image sequence has paths");
                debug!(count = paths.len(), "loading image sequence");
                paths
                    .iter()
                    .map(|path| {
                        let img = image::open(path)?.to_rgb8();
                        YCbCrFrame::from_rgb(&img)
                    })
                    .collect()
            }
            Source::Avi { path, .. } => Err(MjvError::InvalidInput(format!(
                "AVI demuxing is not built in ({}); demux externally and pass raw frames",
                path.display()
            ))),
        }
    }
}

impl FromStr for Source {
    type Err = MjvError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
