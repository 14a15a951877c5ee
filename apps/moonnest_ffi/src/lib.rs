//! MoonNest FFI - C ABI wrapper for the Flutter/Dart and Swift shells.
//!
//! Command functions return `0` when the state changed, `1` for a no-op,
//! and a negative code on failure:
//!
//! | code | meaning |
//! |------|---------|
//! | -1   | NULL or invalid string argument |
//! | -2   | player not initialized |
//! | -3   | no audio resource for the sound |
//! | -4   | audio output unavailable |
//! | -5   | control thread not responding |
//! | -6   | invalid argument value |

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uchar};
use std::sync::Mutex;

use moonnest_audio::CpalDevice;
use moonnest_player::{
    render_artwork_png, spawn_player, CommandResult, InboundEvent, JsonSettingsStore,
    PlayerConfig, PlayerError, PlayerHandle, SharedSurface, SoundCatalog, Transition,
    TransportCommand, ARTWORK_SIZE,
};

const ERR_ARG: c_int = -1;
const ERR_NOT_INITIALIZED: c_int = -2;
const ERR_RESOURCE_NOT_FOUND: c_int = -3;
const ERR_OUTPUT_UNAVAILABLE: c_int = -4;
const ERR_ENGINE_UNAVAILABLE: c_int = -5;
const ERR_VALUE: c_int = -6;

struct Player {
    handle: PlayerHandle,
    surface: SharedSurface,
}

static PLAYER: Mutex<Option<Player>> = Mutex::new(None);

#[cfg(target_os = "android")]
fn init_logging() {
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(log::LevelFilter::Debug)
            .with_tag("MoonNest"),
    );
}

#[cfg(not(target_os = "android"))]
fn init_logging() {}

fn cstr_to_string(ptr: *const c_char) -> Result<String, c_int> {
    if ptr.is_null() {
        return Err(ERR_ARG);
    }
    let s = unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| ERR_ARG)?
        .to_string();
    if s.is_empty() {
        return Err(ERR_ARG);
    }
    Ok(s)
}

fn result_code(result: CommandResult) -> c_int {
    match result {
        Ok(Transition::Changed) => 0,
        Ok(Transition::NoOp) => 1,
        Err(PlayerError::ResourceNotFound(_)) => ERR_RESOURCE_NOT_FOUND,
        Err(PlayerError::OutputUnavailable(_)) => ERR_OUTPUT_UNAVAILABLE,
        Err(PlayerError::EngineUnavailable) => ERR_ENGINE_UNAVAILABLE,
    }
}

fn with_player<R>(f: impl FnOnce(&Player) -> R) -> Option<R> {
    let guard = PLAYER.lock().unwrap_or_else(|e| e.into_inner());
    guard.as_ref().map(f)
}

fn command(f: impl FnOnce(&PlayerHandle) -> CommandResult) -> c_int {
    with_player(|p| result_code(f(&p.handle))).unwrap_or(ERR_NOT_INITIALIZED)
}

/// Hands `bytes` to the caller. The caller must release them with `moonnest_free_bytes`.
///
/// # Safety
/// `out_ptr` and `out_len` must be valid writable pointers.
unsafe fn give_bytes(bytes: Vec<u8>, out_ptr: *mut *mut c_uchar, out_len: *mut usize) {
    let mut bytes = bytes.into_boxed_slice();
    let len = bytes.len();
    let ptr = bytes.as_mut_ptr();
    std::mem::forget(bytes);

    unsafe {
        *out_ptr = ptr;
        *out_len = len;
    }
}

/// Starts the player. Calling it again replaces the running player.
///
/// # Safety
/// `resource_dir` and `settings_path` must be valid NUL-terminated C string pointers (or NULL).
#[no_mangle]
pub unsafe extern "C" fn moonnest_init(
    resource_dir: *const c_char,
    settings_path: *const c_char,
) -> c_int {
    init_logging();

    let resource_dir = match cstr_to_string(resource_dir) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let settings_path = match cstr_to_string(settings_path) {
        Ok(s) => s,
        Err(e) => return e,
    };

    let surface = SharedSurface::default();
    let handle = spawn_player(
        move || CpalDevice::new(resource_dir),
        surface.clone(),
        Box::new(JsonSettingsStore::new(settings_path)),
        PlayerConfig::default(),
    );

    let previous = PLAYER
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .replace(Player { handle, surface });
    if let Some(previous) = previous {
        log::debug!("replacing running player");
        previous.handle.shutdown();
    }
    0
}

/// Stops playback and ends the control thread.
#[no_mangle]
pub extern "C" fn moonnest_shutdown() {
    let player = PLAYER.lock().unwrap_or_else(|e| e.into_inner()).take();
    if let Some(player) = player {
        player.handle.shutdown();
    }
}

/// # Safety
/// `sound_id` must be a valid NUL-terminated C string pointer (or NULL).
#[no_mangle]
pub unsafe extern "C" fn moonnest_play(sound_id: *const c_char) -> c_int {
    match cstr_to_string(sound_id) {
        Ok(id) => command(|h| h.play(id)),
        Err(e) => e,
    }
}

/// # Safety
/// `sound_id` must be a valid NUL-terminated C string pointer (or NULL).
#[no_mangle]
pub unsafe extern "C" fn moonnest_toggle(sound_id: *const c_char) -> c_int {
    match cstr_to_string(sound_id) {
        Ok(id) => command(|h| h.toggle(id)),
        Err(e) => e,
    }
}

#[no_mangle]
pub extern "C" fn moonnest_stop() -> c_int {
    command(|h| h.stop())
}

/// Volume in `[0.0, 1.0]`; values outside are clamped.
#[no_mangle]
pub extern "C" fn moonnest_set_volume(volume: f32) -> c_int {
    command(|h| h.set_volume(volume))
}

/// Persists the default volume (percent) and applies it.
#[no_mangle]
pub extern "C" fn moonnest_set_default_volume(percent: c_int) -> c_int {
    match u8::try_from(percent) {
        Ok(p) if p <= 100 => command(|h| h.set_default_volume(p)),
        _ => ERR_VALUE,
    }
}

#[no_mangle]
pub extern "C" fn moonnest_schedule_stop(seconds: u32) -> c_int {
    command(|h| h.schedule_stop(seconds))
}

#[no_mangle]
pub extern "C" fn moonnest_cancel_timer() -> c_int {
    command(|h| h.cancel_timer())
}

#[no_mangle]
pub extern "C" fn moonnest_interruption_began() -> c_int {
    command(|h| h.dispatch(InboundEvent::InterruptionBegan))
}

#[no_mangle]
pub extern "C" fn moonnest_interruption_ended(should_resume: bool) -> c_int {
    command(|h| h.dispatch(InboundEvent::InterruptionEnded { should_resume }))
}

/// The previous output device went away (headphones unplugged).
#[no_mangle]
pub extern "C" fn moonnest_route_lost() -> c_int {
    command(|h| h.dispatch(InboundEvent::RouteLost))
}

/// Remote transport: 0 = play, 1 = pause, 2 = stop, 3 = toggle.
#[no_mangle]
pub extern "C" fn moonnest_remote_command(code: c_int) -> c_int {
    let transport = match code {
        0 => TransportCommand::Play,
        1 => TransportCommand::Pause,
        2 => TransportCommand::Stop,
        3 => TransportCommand::Toggle,
        _ => return ERR_VALUE,
    };
    command(|h| h.dispatch(InboundEvent::RemoteTransport(transport)))
}

/// Current playback state as UTF-8 JSON.
/// Caller must call `moonnest_free_bytes`.
///
/// # Safety
/// `out_ptr` and `out_len` must be valid writable pointers.
#[no_mangle]
pub unsafe extern "C" fn moonnest_state_json(
    out_ptr: *mut *mut c_uchar,
    out_len: *mut usize,
) -> c_int {
    if out_ptr.is_null() || out_len.is_null() {
        return ERR_ARG;
    }
    let Some(state) = with_player(|p| p.handle.state()) else {
        return ERR_NOT_INITIALIZED;
    };
    match serde_json::to_vec(&state) {
        Ok(bytes) => {
            unsafe { give_bytes(bytes, out_ptr, out_len) };
            0
        }
        Err(_) => ERR_VALUE,
    }
}

/// Now-playing metadata as UTF-8 JSON; `null` when nothing is playing.
/// Caller must call `moonnest_free_bytes`.
///
/// # Safety
/// `out_ptr` and `out_len` must be valid writable pointers.
#[no_mangle]
pub unsafe extern "C" fn moonnest_now_playing_json(
    out_ptr: *mut *mut c_uchar,
    out_len: *mut usize,
) -> c_int {
    if out_ptr.is_null() || out_len.is_null() {
        return ERR_ARG;
    }
    let Some(info) = with_player(|p| p.surface.current()) else {
        return ERR_NOT_INITIALIZED;
    };
    match serde_json::to_vec(&info) {
        Ok(bytes) => {
            unsafe { give_bytes(bytes, out_ptr, out_len) };
            0
        }
        Err(_) => ERR_VALUE,
    }
}

/// Built-in sound list as UTF-8 JSON. Works without `moonnest_init`.
/// Caller must call `moonnest_free_bytes`.
///
/// # Safety
/// `out_ptr` and `out_len` must be valid writable pointers.
#[no_mangle]
pub unsafe extern "C" fn moonnest_catalog_json(
    out_ptr: *mut *mut c_uchar,
    out_len: *mut usize,
) -> c_int {
    if out_ptr.is_null() || out_len.is_null() {
        return ERR_ARG;
    }
    let catalog = with_player(|p| p.handle.catalog().clone()).unwrap_or_else(SoundCatalog::builtin);
    match serde_json::to_vec(catalog.entries()) {
        Ok(bytes) => {
            unsafe { give_bytes(bytes, out_ptr, out_len) };
            0
        }
        Err(_) => ERR_VALUE,
    }
}

/// Now-playing artwork as PNG bytes, titled with the current sound.
/// Plain gradient when nothing is playing.
/// Caller must call `moonnest_free_bytes`.
///
/// # Safety
/// `out_ptr` and `out_len` must be valid writable pointers.
#[no_mangle]
pub unsafe extern "C" fn moonnest_artwork_png(
    out_ptr: *mut *mut c_uchar,
    out_len: *mut usize,
) -> c_int {
    if out_ptr.is_null() || out_len.is_null() {
        return ERR_ARG;
    }
    let Some(info) = with_player(|p| p.surface.current()) else {
        return ERR_NOT_INITIALIZED;
    };
    let rendered = match info {
        Some(info) => info.render_artwork(),
        None => render_artwork_png("", ARTWORK_SIZE),
    };
    match rendered {
        Ok(bytes) => {
            unsafe { give_bytes(bytes, out_ptr, out_len) };
            0
        }
        Err(e) => {
            log::warn!("artwork rendering failed: {e}");
            ERR_VALUE
        }
    }
}

/// Frees bytes returned by the `*_json` / `*_png` functions.
///
/// # Safety
/// - `ptr`/`len` must come from this library, and be freed exactly once.
#[no_mangle]
pub unsafe extern "C" fn moonnest_free_bytes(ptr: *mut c_uchar, len: usize) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        let slice = std::ptr::slice_from_raw_parts_mut(ptr, len);
        drop(Box::from_raw(slice));
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;
    use std::ptr;

    use super::*;

    // 全局播放器在测试之间共享
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn take_bytes(f: unsafe extern "C" fn(*mut *mut c_uchar, *mut usize) -> c_int) -> Vec<u8> {
        let mut out_ptr: *mut c_uchar = ptr::null_mut();
        let mut out_len = 0usize;
        let code = unsafe { f(&mut out_ptr, &mut out_len) };
        assert_eq!(code, 0);
        let bytes = unsafe { std::slice::from_raw_parts(out_ptr, out_len) }.to_vec();
        unsafe { moonnest_free_bytes(out_ptr, out_len) };
        bytes
    }

    #[test]
    fn test_commands_require_init() {
        let _guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        moonnest_shutdown();

        assert_eq!(moonnest_stop(), ERR_NOT_INITIALIZED);
        assert_eq!(moonnest_route_lost(), ERR_NOT_INITIALIZED);
        assert_eq!(unsafe { moonnest_play(ptr::null()) }, ERR_ARG);

        let mut out_ptr: *mut c_uchar = ptr::null_mut();
        let mut out_len = 0usize;
        assert_eq!(
            unsafe { moonnest_artwork_png(&mut out_ptr, &mut out_len) },
            ERR_NOT_INITIALIZED
        );

        let catalog: serde_json::Value =
            serde_json::from_slice(&take_bytes(moonnest_catalog_json)).unwrap();
        assert_eq!(catalog.as_array().map(Vec::len), Some(10));
    }

    #[test]
    fn test_idle_player_round_trip() {
        let _guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let resources = CString::new(dir.path().to_string_lossy().as_bytes()).unwrap();
        let settings =
            CString::new(dir.path().join("settings.json").to_string_lossy().as_bytes()).unwrap();

        assert_eq!(
            unsafe { moonnest_init(resources.as_ptr(), settings.as_ptr()) },
            0
        );

        let unknown = CString::new("unknown_id").unwrap();
        assert_eq!(
            unsafe { moonnest_play(unknown.as_ptr()) },
            ERR_RESOURCE_NOT_FOUND
        );
        assert_eq!(moonnest_stop(), 1);
        assert_eq!(moonnest_cancel_timer(), 1);
        assert_eq!(moonnest_remote_command(9), ERR_VALUE);
        assert_eq!(moonnest_remote_command(0), 1);
        assert_eq!(moonnest_set_default_volume(101), ERR_VALUE);
        assert_eq!(moonnest_set_default_volume(50), 0);

        let state: serde_json::Value =
            serde_json::from_slice(&take_bytes(moonnest_state_json)).unwrap();
        assert_eq!(state["is_playing"], false);
        assert_eq!(state["volume"], 0.5);

        let info: serde_json::Value =
            serde_json::from_slice(&take_bytes(moonnest_now_playing_json)).unwrap();
        assert!(info.is_null());

        let png = take_bytes(moonnest_artwork_png);
        assert_eq!(png, render_artwork_png("", ARTWORK_SIZE).unwrap());

        moonnest_shutdown();
        assert_eq!(moonnest_stop(), ERR_NOT_INITIALIZED);
    }
}
