use crate::types::Category;
use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub map: MapConfig,
    pub categories: CategoriesConfig,
    pub search: SearchConfig,
    pub clustering: ClusterConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    /// Place dataset (.json, .geojson or .csv)
    pub dataset: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self { dataset: PathBuf::from("data/places.json") }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    /// [lat, lon]
    pub center: [f64; 2],
    pub zoom: u8,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// [[south, west], [north, east]]
    pub max_bounds: [[f64; 2]; 2],
    /// Zoom used when jumping to a search result.
    pub focus_zoom: u8,
    pub default_base: String,
    pub base_layers: Vec<BaseLayerConfig>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center: [64.0, -100.0],
            zoom: 4,
            min_zoom: 4,
            max_zoom: 17,
            max_bounds: [[30.0, -150.0], [90.0, -40.0]],
            focus_zoom: 16,
            default_base: "satellite".to_string(),
            base_layers: default_base_layers(),
        }
    }
}

/// A base map. Several tile URLs are stacked in order (imagery + labels).
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BaseLayerConfig {
    pub key: String,
    pub label: String,
    pub tiles: Vec<String>,
}

fn default_base_layers() -> Vec<BaseLayerConfig> {
    let layer = |key: &str, label: &str, tiles: &[&str]| BaseLayerConfig {
        key: key.to_string(),
        label: label.to_string(),
        tiles: tiles.iter().map(|t| t.to_string()).collect(),
    };
    vec![
        layer(
            "satellite",
            "Satellite",
            &[
                "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}",
                "https://server.arcgisonline.com/ArcGIS/rest/services/Reference/World_Boundaries_and_Places/MapServer/tile/{z}/{y}/{x}",
            ],
        ),
        layer("osm", "OpenStreetMap", &["https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png"]),
        layer("topo", "Topographic", &["https://{s}.tile.opentopomap.org/{z}/{x}/{y}.png"]),
        layer("light", "Light", &["https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png"]),
    ]
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CategoryStyle {
    pub label: String,
    pub color: String, // Hex code
    pub radius: f64,
    pub z_index: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CategoriesConfig {
    pub indig: CategoryStyle,
    pub micro: CategoryStyle,
    pub short: CategoryStyle,
    pub full: CategoryStyle,
}

impl Default for CategoriesConfig {
    fn default() -> Self {
        let style = |label: &str, color: &str, radius: f64, z_index: u32| CategoryStyle {
            label: label.to_string(),
            color: color.to_string(),
            radius,
            z_index,
        };
        Self {
            indig: style("Indigenous", "#007aff", 7.0, 630),
            micro: style("MicroList", "#ff3b30", 6.0, 600),
            short: style("ShortList", "#ff9500", 5.0, 610),
            full: style("FullList", "#af52de", 4.0, 620),
        }
    }
}

impl CategoriesConfig {
    pub fn style(&self, category: Category) -> &CategoryStyle {
        match category {
            Category::Indigenous => &self.indig,
            Category::Micro => &self.micro,
            Category::Short => &self.short,
            Category::Full => &self.full,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub min_query_len: usize,
    pub limit: usize,
    pub debounce_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { min_query_len: 2, limit: 50, debounce_ms: 150 }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ClusterConfig {
    /// Screen pixels.
    pub max_cluster_radius: f64,
    pub disable_clustering_at_zoom: u8,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { max_cluster_radius: 60.0, disable_clustering_at_zoom: 7 }
    }
}

/// Deepest zoom the tile renderer accepts.
pub const MAX_TILE_ZOOM: u8 = 22;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub tile_dir: PathBuf,
    pub export_dir: PathBuf,
    pub min_zoom: u8,
    pub max_zoom: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            tile_dir: PathBuf::from("output/tiles"),
            export_dir: PathBuf::from("output/exports"),
            min_zoom: 4,
            max_zoom: 8,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000, static_dir: PathBuf::from("static") }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let output = &self.output;
        ensure!(
            output.min_zoom <= output.max_zoom,
            "output.min_zoom ({}) is above output.max_zoom ({})",
            output.min_zoom,
            output.max_zoom
        );
        ensure!(
            output.max_zoom <= MAX_TILE_ZOOM,
            "output.max_zoom ({}) exceeds {}",
            output.max_zoom,
            MAX_TILE_ZOOM
        );
        Ok(())
    }
}
