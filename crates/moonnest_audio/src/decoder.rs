//! 循环解码器
//!
//! 使用 symphonia 解码音频文件，到达结尾时回到开头。

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

/// 解码器错误
#[derive(thiserror::Error, Debug)]
pub enum DecoderError {
    #[error("No supported audio track found")]
    NoTrack,
    #[error("Unsupported codec")]
    UnsupportedCodec,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SymphoniaError> for DecoderError {
    fn from(e: SymphoniaError) -> Self {
        DecoderError::Decode(e.to_string())
    }
}

/// 流格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// 无限循环的解码器
pub struct LoopDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_buf: Option<SampleBuffer<f32>>,
    pub stream_format: StreamFormat,
}

impl LoopDecoder {
    /// 打开音频文件
    pub fn open(path: &Path) -> Result<Self, DecoderError> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| DecoderError::Decode(e.to_string()))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecoderError::NoTrack)?;

        let track_id = track.id;
        let codec_params = &track.codec_params;

        let stream_format = StreamFormat {
            sample_rate: codec_params.sample_rate.unwrap_or(44100),
            channels: codec_params.channels.map(|c| c.count() as u16).unwrap_or(2),
        };

        let decoder = symphonia::default::get_codecs()
            .make(codec_params, &DecoderOptions::default())
            .map_err(|_| DecoderError::UnsupportedCodec)?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_buf: None,
            stream_format,
        })
    }

    /// 解码下一帧；到达结尾时自动回到开头
    pub fn next_samples(&mut self) -> Result<Vec<f32>, DecoderError> {
        let mut rewound = false;
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    // 空文件不能无限回绕
                    if rewound {
                        return Err(DecoderError::NoTrack);
                    }
                    self.rewind()?;
                    rewound = true;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                // 坏包跳过
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            let capacity = decoded.capacity();

            let buf = match self.sample_buf.take() {
                Some(buf) if buf.capacity() >= capacity => buf,
                _ => SampleBuffer::new(capacity as u64, spec),
            };
            let sample_buf = self.sample_buf.insert(buf);
            sample_buf.copy_interleaved_ref(decoded);

            return Ok(sample_buf.samples().to_vec());
        }
    }

    /// 回到开头
    pub fn rewind(&mut self) -> Result<(), DecoderError> {
        let seek_to = SeekTo::Time {
            time: Time::from(0.0),
            track_id: Some(self.track_id),
        };

        self.format
            .seek(SeekMode::Coarse, seek_to)
            .map_err(|e| DecoderError::Decode(e.to_string()))?;
        self.decoder.reset();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = LoopDecoder::open(&dir.path().join("rain.mp3"));
        assert!(matches!(result, Err(DecoderError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound));
    }

    #[test]
    fn test_garbage_file_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wind.mp3");
        std::fs::write(&path, b"definitely not audio").unwrap();

        assert!(matches!(
            LoopDecoder::open(&path),
            Err(DecoderError::Decode(_))
        ));
    }
}
