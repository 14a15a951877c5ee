//! 锁屏 / 系统“正在播放”信息

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{ImageFormat, Rgba, RgbaImage};
use serde::Serialize;

pub const NOW_PLAYING_ARTIST: &str = "MoonNest";
pub const NOW_PLAYING_ALBUM: &str = "Sleep Sounds";

/// 封面边长（像素）
pub const ARTWORK_SIZE: u32 = 300;

const ARTWORK_TOP: [f32; 3] = [0.53, 0.81, 0.92];
const ARTWORK_BOTTOM: [f32; 3] = [0.29, 0.0, 0.51];
const TITLE_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
/// 点阵字形边长
const GLYPH_PX: u32 = 8;

/// 正在播放信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NowPlayingInfo {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub is_playing: bool,
    /// 时长提示，0 表示无限循环
    pub duration_hint: f64,
}

impl NowPlayingInfo {
    pub fn for_sound(display_name: &str) -> Self {
        Self {
            title: display_name.to_string(),
            artist: NOW_PLAYING_ARTIST.to_string(),
            album: NOW_PLAYING_ALBUM.to_string(),
            is_playing: true,
            duration_hint: 0.0,
        }
    }

    /// 按需生成封面 (PNG)
    pub fn render_artwork(&self) -> Result<Vec<u8>, image::ImageError> {
        render_artwork_png(&self.title, ARTWORK_SIZE)
    }
}

/// 竖直渐变封面，标题白字居中
pub fn render_artwork_png(title: &str, size: u32) -> Result<Vec<u8>, image::ImageError> {
    let span = size.saturating_sub(1).max(1) as f32;
    let mut img = RgbaImage::from_fn(size, size, |_, y| {
        let t = y as f32 / span;
        let mix = |i: usize| {
            let v = ARTWORK_TOP[i] + (ARTWORK_BOTTOM[i] - ARTWORK_TOP[i]) * t;
            (v * 255.0).round() as u8
        };
        Rgba([mix(0), mix(1), mix(2), 255])
    });
    draw_title(&mut img, title);

    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

fn draw_title(img: &mut RgbaImage, title: &str) {
    let chars: Vec<char> = title.chars().collect();
    if chars.is_empty() {
        return;
    }
    let (width, height) = img.dimensions();
    let text_px = GLYPH_PX * chars.len() as u32;

    // 300px 封面约 24px 字高，放不下时缩小
    let mut scale = (height / 100).max(1);
    while scale > 1 && text_px * scale > width {
        scale -= 1;
    }

    let origin_x = (i64::from(width) - i64::from(text_px * scale)) / 2;
    let origin_y = (i64::from(height) - i64::from(GLYPH_PX * scale)) / 2;

    for (n, ch) in chars.iter().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(*ch) else {
            continue;
        };
        let glyph_x = origin_x + i64::from(GLYPH_PX * scale) * n as i64;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_PX {
                if bits & (1 << col) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let x = glyph_x + i64::from(col * scale + dx);
                        let y = origin_y + (row as i64) * i64::from(scale) + i64::from(dy);
                        if let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) {
                            if x < width && y < height {
                                img.put_pixel(x, y, TITLE_COLOR);
                            }
                        }
                    }
                }
            }
        }
    }
}

/// 系统媒体信息展示面
pub trait NowPlayingSurface {
    fn publish(&mut self, info: NowPlayingInfo);
    fn clear(&mut self);
}

impl<S: NowPlayingSurface + ?Sized> NowPlayingSurface for Box<S> {
    fn publish(&mut self, info: NowPlayingInfo) {
        (**self).publish(info)
    }

    fn clear(&mut self) {
        (**self).clear()
    }
}

/// 只记录日志
#[derive(Debug, Default)]
pub struct LogSurface;

impl NowPlayingSurface for LogSurface {
    fn publish(&mut self, info: NowPlayingInfo) {
        log::debug!("now playing: {} ({})", info.title, info.album);
    }

    fn clear(&mut self) {
        log::debug!("now playing cleared");
    }
}

/// 保存最新信息，供宿主轮询
#[derive(Debug, Clone, Default)]
pub struct SharedSurface {
    inner: Arc<Mutex<Option<NowPlayingInfo>>>,
}

impl SharedSurface {
    pub fn current(&self) -> Option<NowPlayingInfo> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl NowPlayingSurface for SharedSurface {
    fn publish(&mut self, info: NowPlayingInfo) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = Some(info);
    }

    fn clear(&mut self) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
