//! moonnest-cli - 命令行播放器
//!
//! 列出内置声音、播放（可带睡眠定时器）、写入默认音量。

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use moonnest_audio::CpalDevice;
use moonnest_player::{
    spawn_player, JsonSettingsStore, LogSurface, PlayerConfig, PlayerEvent, SettingsStore,
    SoundCatalog, SoundId,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_RESOURCES: &str = "assets/sounds";
const DEFAULT_SETTINGS: &str = "moonnest-settings.json";

#[derive(Debug, Parser)]
#[command(name = "moonnest-cli", version, about = "MoonNest sleep sound player")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 列出内置声音
    List,
    /// 播放声音，直到定时器到期或被中断
    Play {
        id: String,
        /// 睡眠定时器（秒）
        #[arg(long)]
        timer: Option<u32>,
        /// 音量百分比，默认取设置文件
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        volume: Option<u8>,
        #[arg(long, default_value = DEFAULT_RESOURCES)]
        resources: PathBuf,
        #[arg(long, default_value = DEFAULT_SETTINGS)]
        settings: PathBuf,
    },
    /// 写入默认音量
    SetVolume {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,
        #[arg(long, default_value = DEFAULT_SETTINGS)]
        settings: PathBuf,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::List => {
            list(&SoundCatalog::builtin());
            Ok(())
        }
        Command::Play {
            id,
            timer,
            volume,
            resources,
            settings,
        } => play(SoundId::new(id), timer, volume, resources, settings),
        Command::SetVolume { percent, settings } => {
            let store = JsonSettingsStore::new(settings);
            let mut current = store.load()?;
            current.default_volume = percent;
            store.save(&current)?;
            println!("Default volume: {percent}%");
            Ok(())
        }
    }
}

fn list(catalog: &SoundCatalog) {
    for entry in catalog.entries() {
        println!("{:<16} {}", entry.id.as_str(), entry.display_name);
    }
}

fn play(
    id: SoundId,
    timer: Option<u32>,
    volume: Option<u8>,
    resources: PathBuf,
    settings: PathBuf,
) -> Result<(), Box<dyn Error>> {
    let player = spawn_player(
        move || CpalDevice::new(resources),
        LogSurface,
        Box::new(JsonSettingsStore::new(settings)),
        PlayerConfig::default(),
    );

    if let Some(percent) = volume {
        player.set_volume(f32::from(percent) / 100.0)?;
    }
    player.play(id.clone())?;
    if let Some(secs) = timer {
        player.schedule_stop(secs)?;
    }

    let name = player.catalog().display_name(&id);
    println!("Playing {name}");

    // 首个事件是当前状态
    let events = player.subscribe()?;
    for event in events.iter() {
        match event {
            PlayerEvent::StateChanged(state) => {
                if !state.is_playing {
                    break;
                }
                if let Some(remaining) = state.formatted_remaining() {
                    print!("\r{name}  {remaining} ");
                    let _ = std::io::stdout().flush();
                }
            }
            PlayerEvent::Error(e) => log::warn!("{e}"),
        }
    }

    println!();
    println!("Stopped");
    player.shutdown();
    Ok(())
}
