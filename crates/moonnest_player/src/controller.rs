//! 播放控制器
//!
//! 唯一持有 [`PlaybackState`] 的状态机。所有命令、定时回调和系统事件
//! 都在同一个控制线程上按到达顺序执行（见 `engine`）。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::{
    clamp_volume, CommandResult, InboundEvent, NowPlayingInfo, NowPlayingSurface, OutputDevice,
    OutputError, OutputHandle, PlaybackState, PlayerCommand, PlayerError, PlayerEvent, Settings,
    SettingsStore, SoundCatalog, SoundEntry, SoundId, Subscription, TimerMsg, TimerSource,
    TimerState, Transition, TransportCommand, Tuning,
};

/// 已设定的睡眠定时器（两个订阅）
struct SleepTimer {
    generation: u64,
    remaining_secs: u32,
    total_secs: u32,
    _stop: Subscription,
    _countdown: Subscription,
}

/// 单个可取消订阅及其代号
struct Armed {
    generation: u64,
    _subscription: Subscription,
}

pub struct PlaybackController<D, T, N>
where
    D: OutputDevice,
    T: TimerSource,
    N: NowPlayingSurface,
{
    catalog: SoundCatalog,
    device: D,
    timers: T,
    surface: N,
    settings: Box<dyn SettingsStore>,
    tuning: Tuning,

    state: PlaybackState,
    active: Option<OutputHandle>,
    last_sound: Option<SoundId>,
    interrupted: bool,

    generation: u64,
    sleep_timer: Option<SleepTimer>,
    health_check: Option<Armed>,
    resume: Option<Armed>,

    subscribers: Vec<Sender<PlayerEvent>>,
    published: Arc<Mutex<PlaybackState>>,
}

impl<D, T, N> PlaybackController<D, T, N>
where
    D: OutputDevice,
    T: TimerSource,
    N: NowPlayingSurface,
{
    /// 创建控制器，音量取自设置存储（缺失时 20%）
    pub fn new(
        catalog: SoundCatalog,
        device: D,
        timers: T,
        surface: N,
        settings: Box<dyn SettingsStore>,
        tuning: Tuning,
    ) -> Self {
        let loaded = settings.load().unwrap_or_else(|e| {
            log::warn!("failed to load settings, using defaults: {e}");
            Settings::default()
        });
        let state = PlaybackState::idle(loaded.volume());

        Self {
            catalog,
            device,
            timers,
            surface,
            settings,
            tuning,
            published: Arc::new(Mutex::new(state.clone())),
            state,
            active: None,
            last_sound: None,
            interrupted: false,
            generation: 0,
            sleep_timer: None,
            health_check: None,
            resume: None,
            subscribers: Vec::new(),
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn catalog(&self) -> &SoundCatalog {
        &self.catalog
    }

    /// 最新快照的共享引用（只读用途）
    pub fn shared_state(&self) -> Arc<Mutex<PlaybackState>> {
        self.published.clone()
    }

    /// 订阅状态变更和错误事件
    pub fn subscribe(&mut self) -> Receiver<PlayerEvent> {
        let (tx, rx) = unbounded();
        let _ = tx.send(PlayerEvent::StateChanged(self.state.clone()));
        self.subscribers.push(tx);
        rx
    }

    /// 执行一条命令，失败时同时广播错误事件
    pub fn execute(&mut self, cmd: PlayerCommand) -> CommandResult {
        let result = match cmd {
            PlayerCommand::Play(id) => self.play(id),
            PlayerCommand::Stop => Ok(self.stop()),
            PlayerCommand::Toggle(id) => self.toggle(id),
            PlayerCommand::SetVolume(v) => Ok(self.set_volume(v)),
            PlayerCommand::SetDefaultVolume(percent) => Ok(self.set_default_volume(percent)),
            PlayerCommand::ScheduleStop(secs) => Ok(self.schedule_stop(secs)),
            PlayerCommand::CancelTimer => Ok(self.cancel_timer()),
            PlayerCommand::Event(event) => self.handle_event(event),
            PlayerCommand::Shutdown => Ok(self.stop()),
        };

        if let Err(e) = &result {
            log::warn!("command failed: {e}");
            self.broadcast(PlayerEvent::Error(e.clone()));
        }
        result
    }

    /// 播放指定声音
    ///
    /// 先释放当前资源再加载新资源。启动失败时尝试恢复原来的声音，
    /// 恢复也失败则回到空闲状态。
    pub fn play(&mut self, id: SoundId) -> CommandResult {
        let entry = self
            .catalog
            .get(&id)
            .cloned()
            .ok_or_else(|| PlayerError::ResourceNotFound(id.clone()))?;

        self.cancel_resume();
        if let Some(previous) = self.active.take() {
            self.device.stop(previous);
        }

        match self.start_output(&entry) {
            Ok(handle) => {
                self.active = Some(handle);
                self.sleep_timer = None;
                self.state.is_playing = true;
                self.state.current_sound = Some(id.clone());
                self.state.timer = None;
                self.last_sound = Some(id);
                // 新会话已重新激活，遗留的中断标记作废
                self.interrupted = false;
                self.arm_health_check();
                self.surface
                    .publish(NowPlayingInfo::for_sound(&entry.display_name));
                log::info!("playing {}", entry.id);
                self.publish();
                Ok(Transition::Changed)
            }
            Err(e) => {
                let err = e.into_player_error(&id);
                log::warn!("failed to start {id}: {err}");
                self.restore_previous();
                Err(err)
            }
        }
    }

    /// 停止播放，幂等
    pub fn stop(&mut self) -> Transition {
        if !self.state.is_playing && self.active.is_none() {
            // 空闲时设定的定时器到期也会走到这里
            self.sleep_timer = None;
            self.cancel_resume();
            return Transition::NoOp;
        }

        self.enter_idle();
        log::info!("playback stopped");
        Transition::Changed
    }

    /// 正在播放该声音则停止，否则播放（会先停掉其它声音）
    pub fn toggle(&mut self, id: SoundId) -> CommandResult {
        if self.state.is_playing_sound(&id) {
            Ok(self.stop())
        } else {
            self.play(id)
        }
    }

    /// 设置音量，立即作用于正在播放的声音
    pub fn set_volume(&mut self, volume: f32) -> Transition {
        let volume = clamp_volume(volume);
        if let Some(handle) = &self.active {
            self.device.set_volume(handle, volume);
        }
        if self.state.volume == volume {
            return Transition::NoOp;
        }
        self.state.volume = volume;
        self.publish();
        Transition::Changed
    }

    /// 设置页修改默认音量：持久化后应用
    pub fn set_default_volume(&mut self, percent: u8) -> Transition {
        let settings = Settings {
            default_volume: percent.min(100),
        };
        if let Err(e) = self.settings.save(&settings) {
            log::warn!("failed to persist default volume: {e}");
        }
        self.set_volume(settings.volume())
    }

    /// `secs` 秒后停止播放，替换已有定时器；空闲时无效
    pub fn schedule_stop(&mut self, secs: u32) -> Transition {
        if secs == 0 {
            log::warn!("ignoring sleep timer of zero seconds");
            return Transition::NoOp;
        }
        if !self.state.is_playing {
            log::debug!("ignoring sleep timer while idle");
            return Transition::NoOp;
        }

        self.sleep_timer = None;
        let generation = self.next_generation();
        let stop = self.timers.once(
            Duration::from_secs(u64::from(secs)),
            TimerMsg::StopDue(generation),
        );
        let countdown = self.timers.every(
            self.tuning.countdown_period,
            TimerMsg::CountdownTick(generation),
        );
        self.sleep_timer = Some(SleepTimer {
            generation,
            remaining_secs: secs,
            total_secs: secs,
            _stop: stop,
            _countdown: countdown,
        });

        self.state.timer = Some(TimerState::new(secs));
        self.publish();
        log::info!("sleep timer set for {secs}s");
        Transition::Changed
    }

    /// 取消睡眠定时器，不影响播放
    pub fn cancel_timer(&mut self) -> Transition {
        if self.sleep_timer.take().is_none() {
            return Transition::NoOp;
        }
        self.state.timer = None;
        self.publish();
        log::debug!("sleep timer cancelled");
        Transition::Changed
    }

    /// 处理系统事件
    pub fn handle_event(&mut self, event: InboundEvent) -> CommandResult {
        match event {
            InboundEvent::InterruptionBegan => {
                log::info!("audio session interrupted");
                self.interrupted = true;
                Ok(Transition::NoOp)
            }
            InboundEvent::InterruptionEnded { should_resume } => {
                self.interrupted = false;
                if let Err(e) = self.device.reactivate() {
                    log::warn!("failed to reactivate audio session: {e}");
                }
                if should_resume && self.state.is_playing {
                    let generation = self.next_generation();
                    let subscription = self
                        .timers
                        .once(self.tuning.resume_grace, TimerMsg::Resume(generation));
                    self.resume = Some(Armed {
                        generation,
                        _subscription: subscription,
                    });
                    log::debug!("resume scheduled after {:?}", self.tuning.resume_grace);
                }
                Ok(Transition::NoOp)
            }
            InboundEvent::RouteLost => {
                log::info!("output route lost, stopping");
                Ok(self.stop())
            }
            InboundEvent::RemoteTransport(cmd) => self.handle_transport(cmd),
        }
    }

    /// 定时回调入口
    pub fn on_timer(&mut self, msg: TimerMsg) {
        match msg {
            TimerMsg::StopDue(g) => {
                if self.sleep_timer.as_ref().map(|t| t.generation) == Some(g) {
                    log::info!("sleep timer elapsed");
                    self.stop();
                }
            }
            TimerMsg::CountdownTick(g) => self.countdown_tick(g),
            TimerMsg::HealthCheck(g) => {
                if self.health_check.as_ref().map(|a| a.generation) == Some(g) {
                    self.check_health();
                }
            }
            TimerMsg::Resume(g) => {
                if self.resume.as_ref().map(|a| a.generation) == Some(g) {
                    self.resume = None;
                    self.resume_output();
                }
            }
        }
    }

    fn handle_transport(&mut self, cmd: TransportCommand) -> CommandResult {
        log::debug!("remote command: {cmd:?}");
        match cmd {
            TransportCommand::Pause | TransportCommand::Stop => Ok(self.stop()),
            TransportCommand::Play if self.state.is_playing => Ok(Transition::NoOp),
            TransportCommand::Toggle if self.state.is_playing => Ok(self.stop()),
            TransportCommand::Play | TransportCommand::Toggle => match self.last_sound.clone() {
                Some(id) => self.play(id),
                None => Ok(Transition::NoOp),
            },
        }
    }

    fn countdown_tick(&mut self, generation: u64) {
        let Some(timer) = self.sleep_timer.as_mut() else {
            return;
        };
        if timer.generation != generation {
            return;
        }

        timer.remaining_secs = timer.remaining_secs.saturating_sub(1);
        let (remaining, total) = (timer.remaining_secs, timer.total_secs);

        if remaining == 0 {
            log::info!("sleep timer countdown reached zero");
            self.stop();
            return;
        }
        if self.state.is_playing {
            self.state.timer = Some(TimerState {
                remaining_secs: remaining,
                total_secs: total,
            });
            self.publish();
        }
    }

    /// 设备可能被系统静默停止，发现不一致时自行纠正
    fn check_health(&mut self) {
        if !self.state.is_playing || self.interrupted || self.resume.is_some() {
            return;
        }
        let alive = self
            .active
            .as_ref()
            .is_some_and(|h| self.device.is_actually_playing(h));
        if !alive {
            log::warn!(
                "output stopped silently while {} was playing, correcting state",
                self.state
                    .current_sound
                    .as_ref()
                    .map(SoundId::as_str)
                    .unwrap_or("?")
            );
            self.enter_idle();
        }
    }

    fn resume_output(&mut self) {
        if !self.state.is_playing {
            return;
        }
        let Some(handle) = &self.active else {
            return;
        };
        if let Err(e) = self.device.play(handle) {
            log::warn!("failed to resume after interruption: {e}");
            let err = PlayerError::OutputUnavailable(e.to_string());
            self.enter_idle();
            self.broadcast(PlayerEvent::Error(err));
        } else {
            log::info!("resumed after interruption");
        }
    }

    /// 加载、设置循环音量并播放；播放失败时释放资源
    fn start_output(&mut self, entry: &SoundEntry) -> Result<OutputHandle, OutputError> {
        self.device.reactivate()?;
        let handle = self.device.load(&entry.resource_ref)?;
        self.device.set_volume(&handle, self.state.volume);
        if let Err(e) = self.device.play(&handle) {
            self.device.stop(handle);
            return Err(e);
        }
        Ok(handle)
    }

    /// 新声音启动失败后恢复原来的声音
    fn restore_previous(&mut self) {
        if !self.state.is_playing {
            return;
        }
        let previous = self
            .state
            .current_sound
            .as_ref()
            .and_then(|id| self.catalog.get(id))
            .cloned();

        match previous.map(|entry| self.start_output(&entry)) {
            Some(Ok(handle)) => {
                log::info!("kept previous sound playing");
                self.active = Some(handle);
            }
            Some(Err(e)) => {
                log::warn!("could not restore previous sound: {e}");
                self.enter_idle();
            }
            None => self.enter_idle(),
        }
    }

    /// 释放资源、取消所有订阅并发布空闲状态
    fn enter_idle(&mut self) {
        if let Some(handle) = self.active.take() {
            self.device.stop(handle);
        }
        self.sleep_timer = None;
        self.health_check = None;
        self.resume = None;
        self.interrupted = false;
        self.state.is_playing = false;
        self.state.current_sound = None;
        self.state.timer = None;
        self.surface.clear();
        self.publish();
    }

    fn arm_health_check(&mut self) {
        let generation = self.next_generation();
        let subscription = self.timers.every(
            self.tuning.health_check_period,
            TimerMsg::HealthCheck(generation),
        );
        self.health_check = Some(Armed {
            generation,
            _subscription: subscription,
        });
    }

    fn cancel_resume(&mut self) {
        self.resume = None;
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn publish(&mut self) {
        {
            let mut published = self.published.lock().unwrap_or_else(|e| e.into_inner());
            if *published == self.state {
                return;
            }
            *published = self.state.clone();
        }
        log::debug!("state -> {:?}", self.state.phase());
        self.broadcast(PlayerEvent::StateChanged(self.state.clone()));
    }

    fn broadcast(&mut self, event: PlayerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl<D, T, N> Drop for PlaybackController<D, T, N>
where
    D: OutputDevice,
    T: TimerSource,
    N: NowPlayingSurface,
{
    fn drop(&mut self) {
        if let Some(handle) = self.active.take() {
            self.device.stop(handle);
        }
    }
}
