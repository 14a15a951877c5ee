//! moonnest_player - 播放核心
//!
//! 白噪音播放器的状态机：当前播放的声音、音量、睡眠定时器，
//! 以及来电中断 / 耳机拔出 / 锁屏控制等外部事件的处理。

mod catalog;
mod command;
mod controller;
mod engine;
mod error;
mod now_playing;
mod output;
mod settings;
mod state;
mod timer;

pub use catalog::*;
pub use command::*;
pub use controller::*;
pub use engine::*;
pub use error::*;
pub use now_playing::*;
pub use output::*;
pub use settings::*;
pub use state::*;
pub use timer::*;
