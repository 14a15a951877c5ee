//! 控制线程集成测试

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use moonnest_player::{
    spawn_player, InboundEvent, MemorySettingsStore, OutputDevice, OutputError, OutputHandle,
    PlaybackState, PlayerConfig, PlayerError, PlayerEvent, PlayerHandle, SharedSurface,
    SoundCatalog, Transition, TransportCommand, Tuning,
};

#[derive(Debug, Default)]
struct DeviceLog {
    next_id: u64,
    playing: HashMap<u64, (String, bool)>,
    max_loaded: usize,
}

#[derive(Debug, Clone, Default)]
struct RecordingDevice(Arc<Mutex<DeviceLog>>);

impl RecordingDevice {
    fn loaded(&self) -> Vec<String> {
        let log = self.0.lock().unwrap();
        log.playing.values().map(|(r, _)| r.clone()).collect()
    }

    fn max_loaded(&self) -> usize {
        self.0.lock().unwrap().max_loaded
    }

    fn silence(&self) {
        for entry in self.0.lock().unwrap().playing.values_mut() {
            entry.1 = false;
        }
    }
}

impl OutputDevice for RecordingDevice {
    fn load(&mut self, resource_ref: &str) -> Result<OutputHandle, OutputError> {
        let mut log = self.0.lock().unwrap();
        log.next_id += 1;
        let id = log.next_id;
        log.playing.insert(id, (resource_ref.to_string(), false));
        log.max_loaded = log.max_loaded.max(log.playing.len());
        Ok(OutputHandle::new(id))
    }

    fn play(&mut self, handle: &OutputHandle) -> Result<(), OutputError> {
        if let Some(entry) = self.0.lock().unwrap().playing.get_mut(&handle.raw()) {
            entry.1 = true;
        }
        Ok(())
    }

    fn stop(&mut self, handle: OutputHandle) {
        self.0.lock().unwrap().playing.remove(&handle.raw());
    }

    fn set_volume(&mut self, _handle: &OutputHandle, _volume: f32) {}

    fn is_actually_playing(&self, handle: &OutputHandle) -> bool {
        self.0
            .lock()
            .unwrap()
            .playing
            .get(&handle.raw())
            .is_some_and(|e| e.1)
    }
}

fn fast_tuning() -> Tuning {
    Tuning {
        countdown_period: Duration::from_millis(20),
        health_check_period: Duration::from_millis(20),
        resume_grace: Duration::from_millis(20),
    }
}

fn start() -> (PlayerHandle, RecordingDevice) {
    let device = RecordingDevice::default();
    let for_thread = device.clone();
    let handle = spawn_player(
        move || for_thread,
        SharedSurface::default(),
        Box::new(MemorySettingsStore::default()),
        PlayerConfig {
            catalog: SoundCatalog::builtin(),
            tuning: fast_tuning(),
        },
    );
    (handle, device)
}

fn wait_for(handle: &PlayerHandle, pred: impl Fn(&PlaybackState) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if pred(&handle.state()) {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn test_play_stop_through_control_thread() {
    let (player, device) = start();

    assert_eq!(player.play("rain"), Ok(Transition::Changed));
    let state = player.state();
    assert!(state.is_playing);
    assert_eq!(state.current_sound, Some("rain".into()));
    assert_eq!(device.loaded(), vec!["rain".to_string()]);

    assert_eq!(player.stop(), Ok(Transition::Changed));
    assert_eq!(player.stop(), Ok(Transition::NoOp));
    assert!(!player.state().is_playing);
    assert!(device.loaded().is_empty());
}

#[test]
fn test_unknown_sound_is_reported_to_subscribers() {
    let (player, device) = start();
    let events = player.subscribe().unwrap();

    let result = player.play("unknown_id");
    assert_eq!(result, Err(PlayerError::ResourceNotFound("unknown_id".into())));
    assert!(device.loaded().is_empty());

    let saw_error = events
        .iter()
        .take(2)
        .any(|e| matches!(e, PlayerEvent::Error(PlayerError::ResourceNotFound(_))));
    assert!(saw_error);
}

#[test]
fn test_sleep_timer_stops_playback() {
    let (player, device) = start();
    player.play("ocean_waves").unwrap();
    player.schedule_stop(3).unwrap();
    assert_eq!(player.state().timer.map(|t| t.total_secs), Some(3));

    assert!(wait_for(&player, |s| !s.is_playing && s.timer.is_none()));
    assert!(device.loaded().is_empty());
}

#[test]
fn test_cancel_timer_keeps_playing() {
    let (player, _device) = start();
    player.play("rain").unwrap();
    player.schedule_stop(2).unwrap();
    assert_eq!(player.cancel_timer(), Ok(Transition::Changed));

    thread::sleep(Duration::from_millis(150));
    let state = player.state();
    assert!(state.is_playing);
    assert_eq!(state.timer, None);
}

#[test]
fn test_route_lost_and_remote_commands() {
    let (player, device) = start();
    player.play("heartbeat").unwrap();

    player.dispatch(InboundEvent::RouteLost).unwrap();
    assert!(!player.state().is_playing);
    assert!(device.loaded().is_empty());

    player
        .dispatch(InboundEvent::RemoteTransport(TransportCommand::Toggle))
        .unwrap();
    assert_eq!(player.state().current_sound, Some("heartbeat".into()));
}

#[test]
fn test_silent_device_stop_is_detected() {
    let (player, device) = start();
    player.play("fireplace").unwrap();
    device.silence();

    assert!(wait_for(&player, |s| !s.is_playing));
    assert!(device.loaded().is_empty());
}

#[test]
fn test_concurrent_toggles_never_load_two_sounds() {
    let (player, device) = start();
    let player = Arc::new(player);
    let ids = ["rain", "wind", "lullaby", "car_ride"];

    let workers: Vec<_> = ids
        .iter()
        .map(|id| {
            let player = Arc::clone(&player);
            let id = id.to_string();
            thread::spawn(move || {
                for _ in 0..25 {
                    let _ = player.toggle(id.as_str());
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    assert!(device.max_loaded() <= 1);
    let state = player.state();
    assert_eq!(state.is_playing, state.current_sound.is_some());
    assert_eq!(device.loaded().len(), usize::from(state.is_playing));
}

#[test]
fn test_shutdown_releases_output() {
    let (player, device) = start();
    player.play("wind").unwrap();
    player.shutdown();
    assert!(device.loaded().is_empty());
}
