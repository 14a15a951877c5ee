//! 播放状态快照

use serde::Serialize;

use crate::SoundId;

/// 默认音量（首次启动）
pub const DEFAULT_VOLUME: f32 = 0.2;

/// 睡眠定时器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerState {
    pub remaining_secs: u32,
    pub total_secs: u32,
}

impl TimerState {
    pub fn new(total_secs: u32) -> Self {
        Self {
            remaining_secs: total_secs,
            total_secs,
        }
    }

    /// `M:SS` 格式的剩余时间
    pub fn formatted(&self) -> String {
        format_remaining(self.remaining_secs)
    }
}

/// 状态机所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    Playing,
    PlayingWithTimer,
}

/// 不可变的播放状态快照
///
/// `current_sound` 非空当且仅当 `is_playing`；`timer` 只在播放时存在。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub current_sound: Option<SoundId>,
    pub volume: f32,
    pub timer: Option<TimerState>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::idle(DEFAULT_VOLUME)
    }
}

impl PlaybackState {
    pub fn idle(volume: f32) -> Self {
        Self {
            is_playing: false,
            current_sound: None,
            volume: clamp_volume(volume),
            timer: None,
        }
    }

    pub fn phase(&self) -> Phase {
        match (self.is_playing, self.timer) {
            (false, _) => Phase::Idle,
            (true, None) => Phase::Playing,
            (true, Some(_)) => Phase::PlayingWithTimer,
        }
    }

    /// 是否正在播放指定声音
    pub fn is_playing_sound(&self, id: &SoundId) -> bool {
        self.is_playing && self.current_sound.as_ref() == Some(id)
    }

    /// 剩余时间 `M:SS`，未设定时器时为 None
    pub fn formatted_remaining(&self) -> Option<String> {
        self.timer.map(|t| t.formatted())
    }
}

/// 音量限制在 [0, 1]，NaN 视为 0
pub fn clamp_volume(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

pub fn format_remaining(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(0), "0:00");
        assert_eq!(format_remaining(59), "0:59");
        assert_eq!(format_remaining(300), "5:00");
        assert_eq!(format_remaining(7199), "119:59");
    }

    #[test]
    fn test_phase() {
        let mut state = PlaybackState::default();
        assert_eq!(state.phase(), Phase::Idle);
        assert_eq!(state.formatted_remaining(), None);

        state.is_playing = true;
        state.current_sound = Some("rain".into());
        assert_eq!(state.phase(), Phase::Playing);

        state.timer = Some(TimerState::new(90));
        assert_eq!(state.phase(), Phase::PlayingWithTimer);
        assert_eq!(state.formatted_remaining().as_deref(), Some("1:30"));
    }

    #[test]
    fn test_clamp_volume() {
        assert_eq!(clamp_volume(-0.5), 0.0);
        assert_eq!(clamp_volume(1.7), 1.0);
        assert_eq!(clamp_volume(0.35), 0.35);
        assert_eq!(clamp_volume(f32::NAN), 0.0);
    }
}
