use crate::config::{AppConfig, CategoryStyle};
use crate::context::AppContext;
use crate::types::{Category, Place};
use anyhow::{Context, Result};
use image::{ImageBuffer, Rgba, RgbaImage};
use rayon::prelude::*;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::fs;

// Constants for Web Mercator
pub const TILE_SIZE: u32 = 256;
const MAX_LATITUDE: f64 = 85.051_128_78;

const OUTLINE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const OUTLINE_WIDTH: f64 = 1.5;

/// Render every category into its own tile pyramid:
/// `{tile_dir}/{slug}/{z}/{x}/{y}.png`. Returns the number of tiles written.
pub fn generate_tiles(ctx: &AppContext) -> Result<usize> {
    ctx.config.validate()?;
    let output = &ctx.config.output;
    tracing::info!(
        "Generating tiles from min_zoom {} to max_zoom {}...",
        output.min_zoom,
        output.max_zoom
    );

    let mut written = 0;
    for category in Category::ALL {
        let places: Vec<&Place> = ctx.in_category(category).collect();
        if places.is_empty() {
            continue;
        }
        tracing::info!("Rendering {} ({} places)", category, places.len());

        let style = ctx.config.categories.style(category);
        let counts = (output.min_zoom..=output.max_zoom)
            .into_par_iter()
            .map(|z| render_zoom_level(&ctx.config, category, style, z, &places))
            .collect::<Result<Vec<usize>>>()?;
        written += counts.iter().sum::<usize>();
    }

    tracing::info!("Wrote {} tiles", written);
    Ok(written)
}

fn render_zoom_level(
    config: &AppConfig,
    category: Category,
    style: &CategoryStyle,
    zoom: u8,
    places: &[&Place],
) -> Result<usize> {
    let fill = hex_to_rgba(&style.color);
    let reach = style.radius + OUTLINE_WIDTH;
    let tiles_per_side = 1u32 << zoom;
    let mut local_tiles: HashMap<(u32, u32), RgbaImage> = HashMap::new();

    for place in places {
        let (wx, wy) = world_pixel(place.latitude(), place.longitude(), zoom);

        // A marker near a tile edge spills into its neighbours.
        let first_x = ((wx - reach) / TILE_SIZE as f64).floor().max(0.0) as u32;
        let last_x = (((wx + reach) / TILE_SIZE as f64).floor() as u32).min(tiles_per_side - 1);
        let first_y = ((wy - reach) / TILE_SIZE as f64).floor().max(0.0) as u32;
        let last_y = (((wy + reach) / TILE_SIZE as f64).floor() as u32).min(tiles_per_side - 1);

        for tx in first_x..=last_x {
            for ty in first_y..=last_y {
                let tile_img = local_tiles
                    .entry((tx, ty))
                    .or_insert_with(|| ImageBuffer::new(TILE_SIZE, TILE_SIZE));
                let cx = wx - tx as f64 * TILE_SIZE as f64;
                let cy = wy - ty as f64 * TILE_SIZE as f64;
                draw_marker(tile_img, cx, cy, style.radius, fill);
            }
        }
    }

    let z_dir = config
        .output
        .tile_dir
        .join(category.slug())
        .join(zoom.to_string());
    fs::create_dir_all(&z_dir).context("Failed to create zoom directory")?;

    local_tiles
        .par_iter()
        .map(|((x, y), img)| {
            let x_dir = z_dir.join(x.to_string());
            fs::create_dir_all(&x_dir)
                .with_context(|| format!("Failed to create tile directory: {:?}", x_dir))?;
            let path = x_dir.join(format!("{}.png", y));
            img.save(&path)
                .with_context(|| format!("Failed to save tile {:?}", path))
        })
        .collect::<Result<Vec<()>>>()?;

    Ok(local_tiles.len())
}

/// Filled circle with a white outline centred on (cx, cy) in tile pixels.
fn draw_marker(img: &mut RgbaImage, cx: f64, cy: f64, radius: f64, fill: Rgba<u8>) {
    let outer = radius + OUTLINE_WIDTH / 2.0;
    let inner = radius - OUTLINE_WIDTH / 2.0;

    let min_x = (cx - outer).floor().max(0.0) as u32;
    let min_y = (cy - outer).floor().max(0.0) as u32;
    let max_x = ((cx + outer).ceil().max(0.0) as u32).min(img.width());
    let max_y = ((cy + outer).ceil().max(0.0) as u32).min(img.height());

    for py in min_y..max_y {
        for px in min_x..max_x {
            let dx = px as f64 + 0.5 - cx;
            let dy = py as f64 + 0.5 - cy;
            let d = (dx * dx + dy * dy).sqrt();
            if d <= inner {
                img.put_pixel(px, py, fill);
            } else if d <= outer {
                img.put_pixel(px, py, OUTLINE);
            }
        }
    }
}

pub fn hex_to_rgba(hex: &str) -> Rgba<u8> {
    let hex = hex.trim_start_matches('#');
    let channel = |i: usize| {
        hex.get(i..i + 2)
            .and_then(|c| u8::from_str_radix(c, 16).ok())
            .unwrap_or(0)
    };
    Rgba([channel(0), channel(2), channel(4), 255])
}

// Coordinate conversions

/// Web Mercator position in global pixels at `zoom`.
pub fn world_pixel(lat: f64, lon: f64, zoom: u8) -> (f64, f64) {
    let n = 2.0_f64.powi(zoom as i32) * TILE_SIZE as f64;
    let lat_rad = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (lon + 180.0) / 360.0 * n;
    let y = (1.0 - (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() / PI) / 2.0 * n;
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PlaceRecord, TierFlags};

    #[test]
    fn hex_colors_parse() {
        assert_eq!(hex_to_rgba("#ff9500"), Rgba([255, 149, 0, 255]));
        assert_eq!(hex_to_rgba("007aff"), Rgba([0, 122, 255, 255]));
        assert_eq!(hex_to_rgba("#f"), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn world_pixel_origin_and_scale() {
        let (x, y) = world_pixel(0.0, 0.0, 0);
        assert!((x - 128.0).abs() < 1e-9 && (y - 128.0).abs() < 1e-9);
        let (x1, _) = world_pixel(0.0, 90.0, 1);
        assert!((x1 - 384.0).abs() < 1e-9);
        let (_, top) = world_pixel(89.9, 0.0, 0);
        assert!(top.abs() < 1e-6);
    }

    #[test]
    fn marker_has_fill_and_outline() {
        let mut img: RgbaImage = ImageBuffer::new(32, 32);
        let fill = Rgba([1, 2, 3, 255]);
        draw_marker(&mut img, 16.0, 16.0, 6.0, fill);
        assert_eq!(*img.get_pixel(16, 16), fill);
        assert_eq!(*img.get_pixel(22, 16), OUTLINE);
        assert_eq!(img.get_pixel(30, 30).0[3], 0);
    }

    #[test]
    fn excessive_zoom_is_rejected_before_rendering() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.output.tile_dir = dir.path().to_path_buf();
        config.output.min_zoom = 31;
        config.output.max_zoom = 32;
        let ctx = AppContext::build(
            config,
            vec![PlaceRecord {
                name: "Alert".into(),
                province: "NU".into(),
                latitude: 82.5,
                longitude: -62.35,
                flags: TierFlags::default(),
            }],
        );
        assert!(generate_tiles(&ctx).is_err());
        assert!(!dir.path().join("full").exists());
    }

    #[test]
    fn tiles_are_written_per_category() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.output.tile_dir = dir.path().to_path_buf();
        config.output.min_zoom = 0;
        config.output.max_zoom = 1;
        let ctx = AppContext::build(
            config,
            vec![PlaceRecord {
                name: "Churchill".into(),
                province: "MB".into(),
                latitude: 58.77,
                longitude: -94.17,
                flags: TierFlags { micro_listed: true, short_listed: true, ..Default::default() },
            }],
        );

        assert_eq!(generate_tiles(&ctx).unwrap(), 2);
        let tile = dir.path().join("micro").join("1").join("0").join("0.png");
        assert!(tile.exists());
        assert!(!dir.path().join("full").exists());

        let img = image::open(dir.path().join("micro/0/0/0.png")).unwrap().to_rgba8();
        let (x, y) = world_pixel(58.77, -94.17, 0);
        assert_eq!(*img.get_pixel(x as u32, y as u32), hex_to_rgba("#ff3b30"));
    }
}
