//! 音频输出流
//!
//! 使用 cpal 进行音频播放，音量在输出回调里实时生效。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use moonnest_player::OutputError;

use crate::StreamFormat;

/// 采样队列容量（按帧计）
pub const BUFFER_FRAMES: usize = 16384;

/// 输出流和播放线程共享的状态
#[derive(Debug)]
pub struct SharedOutput {
    pub queue: SampleQueue,
    playing: AtomicBool,
    failed: AtomicBool,
    volume_bits: AtomicU32,
}

impl SharedOutput {
    fn new(capacity: usize) -> Self {
        Self {
            queue: SampleQueue::new(capacity),
            playing: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            volume_bits: AtomicU32::new(1.0f32.to_bits()),
        }
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::Relaxed);
    }

    /// 输出回调：暂停或缓冲不足时补静音
    fn render(&self, data: &mut [f32]) {
        if !self.is_playing() {
            data.fill(0.0);
            return;
        }
        let read = self.queue.pop_into(data);
        let volume = self.volume();
        for sample in &mut data[..read] {
            *sample *= volume;
        }
        data[read..].fill(0.0);
    }
}

/// 音频输出流
pub struct AudioOutput {
    stream: Stream,
    shared: Arc<SharedOutput>,
    format: StreamFormat,
}

impl AudioOutput {
    /// 在默认设备上创建音频输出
    pub fn new(format: StreamFormat) -> Result<Self, OutputError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(OutputError::NoDevice)?;

        Self::with_device(&device, format)
    }

    /// 使用指定设备创建音频输出
    pub fn with_device(device: &Device, format: StreamFormat) -> Result<Self, OutputError> {
        let supported = device
            .supported_output_configs()
            .map_err(|e| OutputError::Stream(e.to_string()))?
            .find(|c| {
                c.channels() == format.channels
                    && c.min_sample_rate().0 <= format.sample_rate
                    && c.max_sample_rate().0 >= format.sample_rate
                    && c.sample_format() == SampleFormat::F32
            })
            .ok_or_else(|| {
                OutputError::Session(format!(
                    "no f32 config for {} Hz / {} ch",
                    format.sample_rate, format.channels
                ))
            })?;

        let stream_config: StreamConfig = supported
            .with_sample_rate(cpal::SampleRate(format.sample_rate))
            .into();

        let shared = Arc::new(SharedOutput::new(
            BUFFER_FRAMES * usize::from(format.channels),
        ));
        let render = shared.clone();
        let on_error = shared.clone();

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| render.render(data),
                move |err| {
                    log::warn!("audio output error: {err}");
                    on_error.mark_failed();
                },
                None,
            )
            .map_err(|e| OutputError::Stream(e.to_string()))?;

        Ok(Self {
            stream,
            shared,
            format,
        })
    }

    pub fn shared(&self) -> Arc<SharedOutput> {
        self.shared.clone()
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// 开始输出
    pub fn play(&self) -> Result<(), OutputError> {
        self.stream
            .play()
            .map_err(|e| OutputError::Stream(e.to_string()))?;
        self.shared.playing.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// 暂停输出（保留缓冲）
    pub fn pause(&self) {
        self.shared.playing.store(false, Ordering::Relaxed);
        if let Err(e) = self.stream.pause() {
            log::debug!("failed to pause stream: {e}");
        }
    }

    pub fn set_volume(&self, volume: f32) {
        self.shared
            .volume_bits
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn is_playing(&self) -> bool {
        self.shared.is_playing() && !self.shared.has_failed()
    }
}

/// 解码线程与输出回调之间的采样队列
#[derive(Debug)]
pub struct SampleQueue {
    samples: Mutex<VecDeque<f32>>,
    capacity: usize,
}

impl SampleQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 写入能放下的部分，返回写入的采样数
    pub fn push(&self, data: &[f32]) -> usize {
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        let n = data.len().min(self.capacity.saturating_sub(samples.len()));
        samples.extend(&data[..n]);
        n
    }

    /// 取出采样填入 `out`，返回填入的数量
    pub fn pop_into(&self, out: &mut [f32]) -> usize {
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        let n = out.len().min(samples.len());
        for (dst, src) in out.iter_mut().zip(samples.drain(..n)) {
            *dst = src;
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_keeps_order_and_rejects_overflow() {
        let queue = SampleQueue::new(4);
        assert_eq!(queue.push(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(queue.push(&[4.0, 5.0]), 1);

        let mut out = [0.0; 3];
        assert_eq!(queue.pop_into(&mut out), 3);
        assert_eq!(out, [1.0, 2.0, 3.0]);
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.pop_into(&mut out), 1);
        assert_eq!(out[0], 4.0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_render_applies_volume_and_silence() {
        let shared = SharedOutput::new(8);
        shared.queue.push(&[0.5, -0.5]);

        let mut out = [1.0; 4];
        shared.render(&mut out);
        assert_eq!(out, [0.0; 4]);

        shared.playing.store(true, Ordering::Relaxed);
        shared
            .volume_bits
            .store(0.5f32.to_bits(), Ordering::Relaxed);
        shared.render(&mut out);
        assert_eq!(out, [0.25, -0.25, 0.0, 0.0]);
    }
}
