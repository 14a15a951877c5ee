//! 错误定义

use crate::SoundId;

/// 播放核心错误
///
/// 全部可恢复：失败时状态保持不变，只上报给调用方和日志。
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    #[error("No audio resource for sound: {0}")]
    ResourceNotFound(SoundId),

    #[error("Audio output unavailable: {0}")]
    OutputUnavailable(String),

    #[error("Playback engine is not running")]
    EngineUnavailable,
}

/// 输出设备错误
#[derive(thiserror::Error, Debug)]
pub enum OutputError {
    #[error("Resource not found: {0}")]
    ResourceMissing(String),

    #[error("No output device available")]
    NoDevice,

    #[error("Session configuration rejected: {0}")]
    Session(String),

    #[error("Stream error: {0}")]
    Stream(String),
}

impl OutputError {
    /// 映射到调用方可见的错误
    pub fn into_player_error(self, id: &SoundId) -> PlayerError {
        match self {
            OutputError::ResourceMissing(_) => PlayerError::ResourceNotFound(id.clone()),
            other => PlayerError::OutputUnavailable(other.to_string()),
        }
    }
}

/// 设置存储错误
#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
