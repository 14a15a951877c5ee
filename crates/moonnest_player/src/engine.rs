//! 播放引擎
//!
//! 控制器运行在独立的控制线程上：命令、定时回调按到达顺序逐个执行。

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};

use crate::{
    CommandResult, InboundEvent, NowPlayingSurface, OutputDevice, PlaybackController,
    PlaybackState, PlayerCommand, PlayerError, PlayerEvent, SettingsStore, SoundCatalog, SoundId,
    ThreadTimers, TimerMsg, Tuning,
};

/// 等待控制线程回复的上限
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// 引擎配置
#[derive(Debug, Clone, Default)]
pub struct PlayerConfig {
    pub catalog: SoundCatalog,
    pub tuning: Tuning,
}

enum Envelope {
    Command {
        cmd: PlayerCommand,
        reply: Option<Sender<CommandResult>>,
    },
    Subscribe(Sender<Receiver<PlayerEvent>>),
}

/// 播放引擎句柄
pub struct PlayerHandle {
    tx: Sender<Envelope>,
    state: Arc<Mutex<PlaybackState>>,
    catalog: SoundCatalog,
    thread: Option<JoinHandle<()>>,
}

/// 启动播放引擎
///
/// 输出设备在控制线程上创建（平台音频对象通常不能跨线程移动）。
pub fn spawn_player<D, N, F>(
    make_device: F,
    surface: N,
    settings: Box<dyn SettingsStore>,
    config: PlayerConfig,
) -> PlayerHandle
where
    D: OutputDevice + 'static,
    N: NowPlayingSurface + Send + 'static,
    F: FnOnce() -> D + Send + 'static,
{
    let (tx, rx) = bounded::<Envelope>(32);
    let (ready_tx, ready_rx) = bounded(1);
    let catalog = config.catalog.clone();

    let thread = thread::Builder::new()
        .name("moonnest-control".into())
        .spawn(move || {
            let (timer_tx, timer_rx) = unbounded();
            let controller = PlaybackController::new(
                config.catalog,
                make_device(),
                ThreadTimers::new(timer_tx),
                surface,
                settings,
                config.tuning,
            );
            let _ = ready_tx.send(controller.shared_state());
            run_engine(controller, rx, timer_rx);
        });

    let (state, thread) = match thread {
        Ok(handle) => match ready_rx.recv() {
            Ok(state) => (state, Some(handle)),
            Err(_) => (Arc::new(Mutex::new(PlaybackState::default())), None),
        },
        Err(e) => {
            log::warn!("failed to spawn control thread: {e}");
            (Arc::new(Mutex::new(PlaybackState::default())), None)
        }
    };

    PlayerHandle {
        tx,
        state,
        catalog,
        thread,
    }
}

fn run_engine<D, N>(
    mut controller: PlaybackController<D, ThreadTimers, N>,
    rx: Receiver<Envelope>,
    timer_rx: Receiver<TimerMsg>,
) where
    D: OutputDevice,
    N: NowPlayingSurface,
{
    log::debug!("control thread started");

    loop {
        select! {
            recv(rx) -> msg => match msg {
                Ok(Envelope::Command { cmd, reply }) => {
                    let shutdown = matches!(cmd, PlayerCommand::Shutdown);
                    let result = controller.execute(cmd);
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                    if shutdown {
                        break;
                    }
                }
                Ok(Envelope::Subscribe(reply)) => {
                    let _ = reply.send(controller.subscribe());
                }
                // 所有句柄都已释放
                Err(_) => break,
            },
            recv(timer_rx) -> msg => {
                if let Ok(msg) = msg {
                    controller.on_timer(msg);
                }
            }
        }
    }

    log::debug!("control thread exiting");
}

impl PlayerHandle {
    /// 发送命令，不等待结果
    pub fn send(&self, cmd: PlayerCommand) -> Result<(), PlayerError> {
        self.tx
            .send(Envelope::Command { cmd, reply: None })
            .map_err(|_| PlayerError::EngineUnavailable)
    }

    /// 发送命令并等待执行结果
    pub fn call(&self, cmd: PlayerCommand) -> CommandResult {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send_timeout(
                Envelope::Command {
                    cmd,
                    reply: Some(reply_tx),
                },
                REPLY_TIMEOUT,
            )
            .map_err(|_| PlayerError::EngineUnavailable)?;
        reply_rx
            .recv_timeout(REPLY_TIMEOUT)
            .map_err(|_| PlayerError::EngineUnavailable)?
    }

    pub fn play(&self, id: impl Into<SoundId>) -> CommandResult {
        self.call(PlayerCommand::Play(id.into()))
    }

    pub fn stop(&self) -> CommandResult {
        self.call(PlayerCommand::Stop)
    }

    pub fn toggle(&self, id: impl Into<SoundId>) -> CommandResult {
        self.call(PlayerCommand::Toggle(id.into()))
    }

    pub fn set_volume(&self, volume: f32) -> CommandResult {
        self.call(PlayerCommand::SetVolume(volume))
    }

    pub fn set_default_volume(&self, percent: u8) -> CommandResult {
        self.call(PlayerCommand::SetDefaultVolume(percent))
    }

    pub fn schedule_stop(&self, secs: u32) -> CommandResult {
        self.call(PlayerCommand::ScheduleStop(secs))
    }

    pub fn cancel_timer(&self) -> CommandResult {
        self.call(PlayerCommand::CancelTimer)
    }

    /// 转发系统事件
    pub fn dispatch(&self, event: InboundEvent) -> CommandResult {
        self.call(PlayerCommand::Event(event))
    }

    /// 最新状态快照
    pub fn state(&self) -> PlaybackState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn catalog(&self) -> &SoundCatalog {
        &self.catalog
    }

    /// 订阅状态变更，首个事件为当前状态
    pub fn subscribe(&self) -> Result<Receiver<PlayerEvent>, PlayerError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send(Envelope::Subscribe(reply_tx))
            .map_err(|_| PlayerError::EngineUnavailable)?;
        reply_rx
            .recv_timeout(REPLY_TIMEOUT)
            .map_err(|_| PlayerError::EngineUnavailable)
    }

    /// 停止播放并结束控制线程
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.tx.send(Envelope::Command {
                cmd: PlayerCommand::Shutdown,
                reply: None,
            });
            if thread.join().is_err() {
                log::warn!("control thread panicked");
            }
        }
    }
}

impl Drop for PlayerHandle {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}
