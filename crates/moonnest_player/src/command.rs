//! 播放命令和事件定义

use crate::{PlaybackState, PlayerError, SoundId};

/// 播放器命令（UI / 宿主 -> 控制线程）
#[derive(Debug, Clone)]
pub enum PlayerCommand {
    /// 播放指定声音（先释放当前声音）
    Play(SoundId),
    /// 停止
    Stop,
    /// 正在播放该声音则停止，否则播放
    Toggle(SoundId),
    /// 设置音量 (0.0 - 1.0)，不持久化
    SetVolume(f32),
    /// 设置页修改默认音量（百分比），持久化后生效
    SetDefaultVolume(u8),
    /// 指定秒数后自动停止
    ScheduleStop(u32),
    /// 取消睡眠定时器
    CancelTimer,
    /// 系统事件
    Event(InboundEvent),
    /// 关闭引擎
    Shutdown,
}

/// 系统传入事件（来电、线路变化、锁屏控制）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundEvent {
    InterruptionBegan,
    InterruptionEnded { should_resume: bool },
    RouteLost,
    RemoteTransport(TransportCommand),
}

/// 锁屏 / 系统媒体控制命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCommand {
    Play,
    Pause,
    Stop,
    Toggle,
}

/// 播放器事件（控制线程 -> UI）
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// 状态变更
    StateChanged(PlaybackState),
    /// 错误
    Error(PlayerError),
}

/// 命令执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// 状态已改变
    Changed,
    /// 命令在当前状态下无效果
    NoOp,
}

pub type CommandResult = Result<Transition, PlayerError>;
