//! Camera frame acquisition for the inspection node.
//!
//! Capture runs in a background thread that drives an `ffmpeg` subprocess
//! decoding the camera (a V4L2 device path, a bare device index, or any URI
//! ffmpeg accepts) into fixed-size single-channel frames. Frames are handed
//! to the caller over a small bounded channel so a slow consumer
//! backpressures the decoder instead of growing a queue.

use std::{
    io::Read,
    process::{Child, Command, Stdio},
    thread,
};

use anyhow::{Result, anyhow};
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, bounded};
use thiserror::Error;

/// Single-channel (grayscale) frame captured from the inspection camera.
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("video source {uri:?} stopped producing frames")]
    Stream { uri: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CaptureError {
    /// Whether the error means the device could never be opened, as opposed
    /// to a source that died mid-stream.
    pub fn is_open_failure(&self) -> bool {
        matches!(self, CaptureError::Open { .. })
    }
}

/// Spawns a background thread that continually captures frames from `uri`.
///
/// Frames are scaled to `target_size` (width, height) and converted to
/// 8-bit grayscale before being forwarded over the returned [`Receiver`].
/// An unopenable device surfaces as [`CaptureError::Open`] on the channel;
/// the caller decides whether that is fatal.
pub fn spawn_camera_reader(
    uri: &str,
    target_size: (i32, i32),
) -> Result<Receiver<Result<Frame, CaptureError>>> {
    let (tx, rx) = bounded(2);
    let uri = uri.to_string();

    let child = spawn_ffmpeg(&uri, target_size)?;

    thread::Builder::new()
        .name("frame-ingest".into())
        .spawn(move || capture_loop(child, &uri, target_size, tx))
        .map_err(|err| anyhow!("failed to spawn capture thread: {err}"))?;

    Ok(rx)
}

fn spawn_ffmpeg(uri: &str, target_size: (i32, i32)) -> Result<Child> {
    let scale_arg = format!("scale={}:{}", target_size.0, target_size.1);

    let (is_v4l, ffmpeg_uri) = if let Some(index) = parse_device_index(uri) {
        (true, format!("/dev/video{index}"))
    } else if uri.starts_with("/dev/video") {
        (true, uri.to_string())
    } else {
        (false, uri.to_string())
    };

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .stderr(Stdio::inherit());

    if is_v4l {
        cmd.arg("-f").arg("video4linux2");
    }

    cmd.arg("-i")
        .arg(&ffmpeg_uri)
        .arg("-vf")
        .arg(&scale_arg)
        .arg("-pix_fmt")
        .arg("gray")
        .arg("-f")
        .arg("rawvideo")
        .arg("-")
        .stdout(Stdio::piped());

    cmd.spawn()
        .map_err(|err| anyhow!("failed to launch ffmpeg for {uri}: {err}"))
}

fn capture_loop(
    mut child: Child,
    uri: &str,
    target_size: (i32, i32),
    tx: Sender<Result<Frame, CaptureError>>,
) {
    let Some(mut stdout) = child.stdout.take() else {
        let _ = tx.send(Err(CaptureError::Other(anyhow!(
            "failed to capture ffmpeg stdout"
        ))));
        return;
    };

    let frame_bytes = (target_size.0 as usize) * (target_size.1 as usize);
    let mut buffer = vec![0u8; frame_bytes];
    let mut frames_read: u64 = 0;

    loop {
        match stdout.read_exact(&mut buffer) {
            Ok(()) => {
                frames_read += 1;
                let frame = Frame {
                    data: buffer.clone(),
                    width: target_size.0,
                    height: target_size.1,
                    timestamp_ms: Utc::now().timestamp_millis(),
                };
                if tx.send(Ok(frame)).is_err() {
                    break;
                }
            }
            Err(_) => {
                // No frame ever arrived: the device could not be opened.
                let err = if frames_read == 0 {
                    CaptureError::Open {
                        uri: uri.to_string(),
                    }
                } else {
                    CaptureError::Stream {
                        uri: uri.to_string(),
                    }
                };
                let _ = tx.send(Err(err));
                break;
            }
        }
    }

    let _ = child.kill();
    let _ = child.wait();
}

fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if stripped.chars().all(|c| c.is_ascii_digit()) {
            return stripped.parse::<i32>().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_index_forms() {
        assert_eq!(parse_device_index("0"), Some(0));
        assert_eq!(parse_device_index("/dev/video2"), Some(2));
        assert_eq!(parse_device_index("/dev/videoX"), None);
        assert_eq!(parse_device_index("rtsp://cam/stream"), None);
    }

    #[test]
    fn open_failure_is_distinguished() {
        let open = CaptureError::Open { uri: "0".into() };
        let stream = CaptureError::Stream { uri: "0".into() };
        assert!(open.is_open_failure());
        assert!(!stream.is_open_failure());
    }
}
