//! Built-in deterministic rendering engine.
//!
//! [`IdenticonEngine`] derives a horizontally mirrored block pattern and a
//! foreground colour from the SHA-256 digest of the seed, and encodes it as
//! PNG. Names are built from two word lists and a three digit suffix, also
//! picked from the digest.
//!
//! Rendering is CPU bound, so it runs on Tokio's blocking pool rather than on
//! the worker task that awaits it.

use crate::{EngineError, RenderEngine, Size};
use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use sha2::{Digest, Sha256};
use std::io::Cursor;

/// Cells per side of the block pattern.
const GRID: u32 = 5;

const BACKGROUND: Rgba<u8> = Rgba([240, 240, 240, 255]);

const ADJECTIVES: &[&str] = &[
    "Agile", "Brave", "Calm", "Daring", "Eager", "Fancy", "Gentle", "Happy", "Icy", "Jolly",
    "Keen", "Lucky", "Mellow", "Nimble", "Odd", "Proud", "Quiet", "Rusty", "Shiny", "Tidy",
    "Upbeat", "Vivid", "Witty", "Young", "Zesty", "Bold", "Clever", "Dusty", "Frosty", "Grumpy",
    "Humble", "Lively",
];

const NOUNS: &[&str] = &[
    "Anvil", "Bolt", "Cog", "Dynamo", "Engine", "Flux", "Gear", "Hinge", "Ingot", "Jack",
    "Kettle", "Lever", "Magnet", "Nut", "Oscillator", "Piston", "Quartz", "Rivet", "Sprocket",
    "Turbine", "Unit", "Valve", "Widget", "Xenon", "Yoke", "Zinc", "Circuit", "Diode", "Gasket",
    "Pulley", "Relay", "Spindle",
];

/// Deterministic identicon renderer backed by SHA-256.
#[derive(Clone, Debug, Default)]
pub struct IdenticonEngine;

impl IdenticonEngine {
    pub const fn new() -> Self {
        Self
    }
}

impl RenderEngine for IdenticonEngine {
    async fn render(&self, seed: &str, size: Size) -> Result<Bytes, EngineError> {
        let seed = seed.to_owned();
        tokio::task::spawn_blocking(move || render_png(&seed, size))
            .await
            .map_err(|e| EngineError::new(format!("render task failed: {e}")))?
    }

    async fn name(&self, seed: &str) -> Result<String, EngineError> {
        Ok(roboname(seed))
    }
}

fn render_png(seed: &str, size: Size) -> Result<Bytes, EngineError> {
    let digest = Sha256::digest(seed.as_bytes());
    let px = size.pixels();
    let foreground = Rgba([digest[0] / 2, digest[1] / 2, digest[2] / 2, 255]);

    let mut img = RgbaImage::from_pixel(px, px, BACKGROUND);
    let cell = px / (GRID + 1);
    let offset = (px - cell * GRID) / 2;

    // Only the left half (plus the middle column) is drawn from the digest, the
    // right half mirrors it.
    let half = GRID.div_ceil(2);
    for row in 0..GRID {
        for col in 0..half {
            let bit = (row * half + col) as usize;
            let byte = digest[3 + bit / 8];
            if (byte >> (bit % 8)) & 1 == 0 {
                continue;
            }
            for mirrored in [col, GRID - 1 - col] {
                let x0 = offset + mirrored * cell;
                let y0 = offset + row * cell;
                for y in y0..y0 + cell {
                    for x in x0..x0 + cell {
                        img.put_pixel(x, y, foreground);
                    }
                }
            }
        }
    }

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .map_err(|e| EngineError::new(format!("png encoding failed: {e}")))?;
    Ok(Bytes::from(out.into_inner()))
}

fn roboname(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    let adjective = ADJECTIVES[digest[0] as usize % ADJECTIVES.len()];
    let noun = NOUNS[digest[1] as usize % NOUNS.len()];
    let number = u16::from_be_bytes([digest[2], digest[3]]) % 1000;
    format!("{adjective}{noun}{number:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

    #[tokio::test]
    async fn renders_deterministic_png() {
        let engine = IdenticonEngine::new();
        let first = engine.render("seed-a", Size::Small).await.unwrap();
        let second = engine.render("seed-a", Size::Small).await.unwrap();
        assert!(first.starts_with(PNG_SIGNATURE));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn size_and_seed_change_the_output() {
        let engine = IdenticonEngine::new();
        let small = engine.render("seed-a", Size::Small).await.unwrap();
        let large = engine.render("seed-a", Size::Large).await.unwrap();
        let other = engine.render("seed-b", Size::Small).await.unwrap();
        assert_ne!(small, large);
        assert_ne!(small, other);

        let decoded = image::load_from_memory(&large).unwrap();
        assert_eq!(decoded.width(), 256);
        assert_eq!(decoded.height(), 256);
    }

    #[tokio::test]
    async fn names_are_stable() {
        let engine = IdenticonEngine::new();
        let name = engine.name("seed-a").await.unwrap();
        assert_eq!(name, engine.name("seed-a").await.unwrap());
        let digits = &name[name.len() - 3..];
        assert!(digits.chars().all(|c| c.is_ascii_digit()), "{name}");
    }
}
