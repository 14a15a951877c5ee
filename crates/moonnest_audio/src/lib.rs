//! moonnest_audio - 音频输出
//!
//! 用 symphonia 解码内置的 MP3 循环音频，cpal 播放。

mod decoder;
mod device;
mod stream;

pub use decoder::*;
pub use device::*;
pub use stream::*;
