//! Filtered JSON exports of the dataset.
//!
//! Filters read the raw list flags rather than the display category, so a
//! ShortList export includes MicroList places.

use crate::search::compare_names;
use crate::types::Place;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportList {
    Full,
    Short,
    Micro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportShape {
    /// Flat place records.
    Places,
    /// Names grouped by province.
    Names,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportKind {
    pub shape: ExportShape,
    pub list: ExportList,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown export '{0}' (expected places-full, places-short, places-micro, names-full, names-short or names-micro)")]
pub struct UnknownExportKind(pub String);

impl ExportKind {
    pub const ALL: [ExportKind; 6] = [
        ExportKind { shape: ExportShape::Places, list: ExportList::Full },
        ExportKind { shape: ExportShape::Places, list: ExportList::Short },
        ExportKind { shape: ExportShape::Places, list: ExportList::Micro },
        ExportKind { shape: ExportShape::Names, list: ExportList::Full },
        ExportKind { shape: ExportShape::Names, list: ExportList::Short },
        ExportKind { shape: ExportShape::Names, list: ExportList::Micro },
    ];

    pub fn filename(&self) -> String {
        let shape = match self.shape {
            ExportShape::Places => "places",
            ExportShape::Names => "names",
        };
        let list = match self.list {
            ExportList::Full => "full",
            ExportList::Short => "shortlist",
            ExportList::Micro => "microlist",
        };
        format!("{}-{}.json", shape, list)
    }

    fn includes(&self, place: &Place) -> bool {
        match self.list {
            ExportList::Full => true,
            ExportList::Short => place.flags.short_listed,
            ExportList::Micro => place.flags.micro_listed,
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self.shape {
            ExportShape::Places => "places",
            ExportShape::Names => "names",
        };
        let list = match self.list {
            ExportList::Full => "full",
            ExportList::Short => "short",
            ExportList::Micro => "micro",
        };
        write!(f, "{}-{}", shape, list)
    }
}

impl FromStr for ExportKind {
    type Err = UnknownExportKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExportKind::ALL
            .into_iter()
            .find(|k| k.to_string() == s.trim())
            .ok_or_else(|| UnknownExportKind(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportPlace {
    pub name: String,
    pub province: String,
    pub latitude: f64,
    pub longitude: f64,
    pub indigenous: bool,
}

impl From<&Place> for ExportPlace {
    fn from(p: &Place) -> Self {
        Self {
            name: p.name.clone(),
            province: p.province.clone(),
            latitude: p.latitude(),
            longitude: p.longitude(),
            indigenous: p.flags.indigenous,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExportPayload {
    Places(Vec<ExportPlace>),
    Names(BTreeMap<String, Vec<String>>),
}

pub fn build(kind: ExportKind, places: &[Place]) -> ExportPayload {
    let selected = places.iter().filter(|p| kind.includes(p));
    match kind.shape {
        ExportShape::Places => ExportPayload::Places(selected.map(ExportPlace::from).collect()),
        ExportShape::Names => ExportPayload::Names(group_by_province(selected)),
    }
}

fn group_by_province<'a>(places: impl Iterator<Item = &'a Place>) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for p in places {
        groups.entry(p.province.clone()).or_default().push(p.name.clone());
    }
    for names in groups.values_mut() {
        names.sort_by(|a, b| compare_names(a, b));
    }
    groups
}

/// Pretty-printed JSON body of an export.
pub fn render(kind: ExportKind, places: &[Place]) -> Result<String> {
    serde_json::to_string_pretty(&build(kind, places))
        .with_context(|| format!("Failed to serialize export {}", kind))
}

pub fn write(kind: ExportKind, places: &[Place], dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create export directory: {:?}", dir))?;
    let path = dir.join(kind.filename());
    fs::write(&path, render(kind, places)?)
        .with_context(|| format!("Failed to write export: {:?}", path))?;
    tracing::info!("Wrote {} to {:?}", kind, path);
    Ok(path)
}
