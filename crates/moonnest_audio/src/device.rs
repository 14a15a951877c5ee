//! cpal 输出设备
//!
//! 每个已加载的声音对应一个输出流和一个解码线程。

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::HostTrait;
use moonnest_player::{resource_path, OutputDevice, OutputError, OutputHandle};

use crate::{AudioOutput, DecoderError, LoopDecoder, SharedOutput};

/// 队列满时解码线程的等待时间
const FEED_INTERVAL: Duration = Duration::from_millis(5);

struct LoadedLoop {
    output: AudioOutput,
    feeder: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
}

/// 基于 cpal 的输出设备
pub struct CpalDevice {
    resource_dir: PathBuf,
    tracks: HashMap<u64, LoadedLoop>,
    next_id: u64,
}

impl CpalDevice {
    pub fn new(resource_dir: impl Into<PathBuf>) -> Self {
        Self {
            resource_dir: resource_dir.into(),
            tracks: HashMap::new(),
            next_id: 0,
        }
    }
}

impl OutputDevice for CpalDevice {
    fn load(&mut self, resource_ref: &str) -> Result<OutputHandle, OutputError> {
        let path = resource_path(&self.resource_dir, resource_ref);
        let decoder = LoopDecoder::open(&path).map_err(|e| match e {
            DecoderError::Io(io) if io.kind() == ErrorKind::NotFound => {
                OutputError::ResourceMissing(path.display().to_string())
            }
            other => OutputError::Stream(other.to_string()),
        })?;

        let output = AudioOutput::new(decoder.stream_format)?;
        let stop = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));

        let feeder = {
            let shared = output.shared();
            let stop = stop.clone();
            let alive = alive.clone();
            let name = resource_ref.to_string();
            thread::Builder::new()
                .name(format!("moonnest-feed-{name}"))
                .spawn(move || {
                    feed(decoder, &shared, &stop, &name);
                    alive.store(false, Ordering::Relaxed);
                })
                .map_err(|e| OutputError::Stream(e.to_string()))?
        };

        self.next_id += 1;
        let id = self.next_id;
        self.tracks.insert(
            id,
            LoadedLoop {
                output,
                feeder: Some(feeder),
                stop,
                alive,
            },
        );
        log::debug!("loaded {resource_ref} as #{id}");
        Ok(OutputHandle::new(id))
    }

    fn play(&mut self, handle: &OutputHandle) -> Result<(), OutputError> {
        let track = self
            .tracks
            .get(&handle.raw())
            .ok_or_else(|| OutputError::Stream(format!("unknown handle #{}", handle.raw())))?;
        track.output.play()
    }

    fn stop(&mut self, handle: OutputHandle) {
        let Some(mut track) = self.tracks.remove(&handle.raw()) else {
            return;
        };
        track.output.pause();
        track.stop.store(true, Ordering::Relaxed);
        if let Some(feeder) = track.feeder.take() {
            if feeder.join().is_err() {
                log::warn!("feeder thread for #{} panicked", handle.raw());
            }
        }
        log::debug!("released #{}", handle.raw());
    }

    fn set_volume(&mut self, handle: &OutputHandle, volume: f32) {
        if let Some(track) = self.tracks.get(&handle.raw()) {
            track.output.set_volume(volume);
        }
    }

    fn is_actually_playing(&self, handle: &OutputHandle) -> bool {
        self.tracks
            .get(&handle.raw())
            .is_some_and(|t| t.output.is_playing() && t.alive.load(Ordering::Relaxed))
    }

    fn reactivate(&mut self) -> Result<(), OutputError> {
        cpal::default_host()
            .default_output_device()
            .map(|_| ())
            .ok_or(OutputError::NoDevice)
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        let ids: Vec<u64> = self.tracks.keys().copied().collect();
        for id in ids {
            self.stop(OutputHandle::new(id));
        }
    }
}

/// 解码线程：保持采样队列填满，直到收到停止信号
fn feed(mut decoder: LoopDecoder, shared: &SharedOutput, stop: &AtomicBool, name: &str) {
    let mut pending: Vec<f32> = Vec::new();

    while !stop.load(Ordering::Relaxed) {
        if shared.has_failed() {
            break;
        }

        if pending.is_empty() {
            match decoder.next_samples() {
                Ok(samples) => pending = samples,
                Err(e) => {
                    log::warn!("decoding {name} failed: {e}");
                    shared.mark_failed();
                    break;
                }
            }
        }

        let written = shared.queue.push(&pending);
        pending.drain(..written);
        if !pending.is_empty() {
            thread::sleep(FEED_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_resource_maps_to_resource_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut device = CpalDevice::new(dir.path());

        let result = device.load("rain");
        assert!(matches!(result, Err(OutputError::ResourceMissing(_))));
    }

    #[test]
    fn test_unknown_handle_is_not_playing() {
        let dir = tempfile::tempdir().unwrap();
        let mut device = CpalDevice::new(dir.path());
        let handle = OutputHandle::new(42);

        assert!(!device.is_actually_playing(&handle));
        assert!(device.play(&handle).is_err());
        device.stop(handle);
    }
}
