//! 输出设备抽象
//!
//! 控制器只通过这个窄接口操作平台音频（会话、播放器实例），
//! 测试中用假实现替换。

use crate::OutputError;

/// 已加载资源的句柄
///
/// 不可复制：`stop` 按值接收句柄，同一时间只能有一个活动资源。
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct OutputHandle(u64);

impl OutputHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// 平台音频输出能力
pub trait OutputDevice {
    /// 加载可循环播放的资源
    fn load(&mut self, resource_ref: &str) -> Result<OutputHandle, OutputError>;

    /// 开始（或恢复）无限循环播放
    fn play(&mut self, handle: &OutputHandle) -> Result<(), OutputError>;

    /// 停止并释放资源
    fn stop(&mut self, handle: OutputHandle);

    fn set_volume(&mut self, handle: &OutputHandle, volume: f32);

    /// 设备是否仍在实际发声
    fn is_actually_playing(&self, handle: &OutputHandle) -> bool;

    /// 重新激活音频会话（中断结束后）
    fn reactivate(&mut self) -> Result<(), OutputError> {
        Ok(())
    }
}

impl<D: OutputDevice + ?Sized> OutputDevice for Box<D> {
    fn load(&mut self, resource_ref: &str) -> Result<OutputHandle, OutputError> {
        (**self).load(resource_ref)
    }

    fn play(&mut self, handle: &OutputHandle) -> Result<(), OutputError> {
        (**self).play(handle)
    }

    fn stop(&mut self, handle: OutputHandle) {
        (**self).stop(handle)
    }

    fn set_volume(&mut self, handle: &OutputHandle, volume: f32) {
        (**self).set_volume(handle, volume)
    }

    fn is_actually_playing(&self, handle: &OutputHandle) -> bool {
        (**self).is_actually_playing(handle)
    }

    fn reactivate(&mut self) -> Result<(), OutputError> {
        (**self).reactivate()
    }
}
