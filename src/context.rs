use crate::config::AppConfig;
use crate::data;
use crate::search::normalize;
use crate::stats::TierCounts;
use crate::types::{lookup_key, Category, Place, PlaceId, PlaceRecord};
use anyhow::{Context, Result};
use geo::{Point, Rect};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use std::collections::HashMap;

/// Spatial index entry pointing back into `AppContext::places`.
pub struct PlaceEntry {
    pub id: PlaceId,
    position: [f64; 2],
}

impl RTreeObject for PlaceEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

/// Everything a session needs, built once from the dataset and read-only
/// afterwards.
pub struct AppContext {
    pub config: AppConfig,
    pub places: Vec<Place>,
    pub lookup: HashMap<String, PlaceId>,
    pub counts: TierCounts,
    layers: HashMap<Category, RTree<PlaceEntry>>,
}

impl AppContext {
    /// Load the configured dataset. A dataset that cannot be read is fatal.
    pub fn load(config: AppConfig) -> Result<Self> {
        let records = data::load_dataset(&config.input.dataset)
            .with_context(|| format!("Missing dataset: {:?}", config.input.dataset))?;
        Ok(Self::build(config, records))
    }

    pub fn build(config: AppConfig, records: Vec<PlaceRecord>) -> Self {
        let places: Vec<Place> = records
            .into_par_iter()
            .enumerate()
            .map(|(id, record)| {
                let category = Category::classify(&record.flags);
                Place {
                    id,
                    search_key: normalize(&record.name),
                    point: Point::new(record.longitude, record.latitude),
                    name: record.name,
                    province: record.province,
                    flags: record.flags,
                    category,
                }
            })
            .collect();

        let mut lookup = HashMap::with_capacity(places.len());
        let mut counts = TierCounts::default();
        let mut entries: HashMap<Category, Vec<PlaceEntry>> = HashMap::new();
        for place in &places {
            lookup.entry(place.lookup_key()).or_insert(place.id);
            counts.add(place.category);
            entries.entry(place.category).or_default().push(PlaceEntry {
                id: place.id,
                position: [place.longitude(), place.latitude()],
            });
        }

        let layers = Category::ALL
            .into_iter()
            .map(|cat| (cat, RTree::bulk_load(entries.remove(&cat).unwrap_or_default())))
            .collect();

        tracing::info!(
            "Indexed {} places ({} indig, {} micro, {} short, {} full)",
            places.len(),
            counts.get(Category::Indigenous),
            counts.get(Category::Micro),
            counts.get(Category::Short),
            counts.get(Category::Full),
        );

        Self { config, places, lookup, counts, layers }
    }

    pub fn place(&self, id: PlaceId) -> Option<&Place> {
        self.places.get(id)
    }

    pub fn find(&self, name: &str, province: &str) -> Option<&Place> {
        self.lookup.get(&lookup_key(name, province)).and_then(|&id| self.place(id))
    }

    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &Place> {
        self.places.iter().filter(move |p| p.category == category)
    }

    /// Places of one category inside a lon/lat rectangle, in id order.
    pub fn in_bounds(&self, category: Category, bounds: &Rect<f64>) -> Vec<&Place> {
        let Some(tree) = self.layers.get(&category) else {
            return Vec::new();
        };
        let envelope = AABB::from_corners(
            [bounds.min().x, bounds.min().y],
            [bounds.max().x, bounds.max().y],
        );
        let mut ids: Vec<PlaceId> = tree
            .locate_in_envelope(&envelope)
            .map(|entry| entry.id)
            .collect();
        ids.sort_unstable();
        ids.into_iter().filter_map(|id| self.place(id)).collect()
    }
}
