use crate::config::{BaseLayerConfig, MapConfig};
use crate::context::AppContext;
use crate::types::{Category, PlaceDetail, PlaceId, UnknownCategory};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Which category layers are on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerSet([bool; 4]);

impl Default for LayerSet {
    fn default() -> Self {
        LayerSet([true; 4])
    }
}

impl LayerSet {
    pub fn none() -> Self {
        LayerSet([false; 4])
    }

    pub fn is_visible(&self, category: Category) -> bool {
        self.0[category.rank()]
    }

    /// Flip a layer, returning its new visibility.
    pub fn toggle(&mut self, category: Category) -> bool {
        let slot = &mut self.0[category.rank()];
        *slot = !*slot;
        *slot
    }

    pub fn ensure_visible(&mut self, category: Category) {
        self.0[category.rank()] = true;
    }

    pub fn visible(&self) -> impl Iterator<Item = Category> + '_ {
        Category::ALL.into_iter().filter(|c| self.is_visible(*c))
    }
}

impl FromStr for LayerSet {
    type Err = UnknownCategory;

    /// Comma-separated slugs; an empty string hides every layer.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut set = LayerSet::none();
        for slug in s.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            set.ensure_visible(slug.parse()?);
        }
        Ok(set)
    }
}

impl fmt::Display for LayerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slugs: Vec<&str> = self.visible().map(Category::slug).collect();
        f.write_str(&slugs.join(","))
    }
}

impl Serialize for LayerSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.visible())
    }
}

/// Where the map goes when a search result is picked.
#[derive(Debug, Serialize)]
pub struct FocusView {
    pub place: PlaceDetail,
    /// [lat, lon]
    pub center: [f64; 2],
    pub zoom: u8,
    pub layers: LayerSet,
}

/// Centre on a place and make sure its layer is showing.
pub fn focus(ctx: &AppContext, id: PlaceId, mut layers: LayerSet) -> Option<FocusView> {
    let place = ctx.place(id)?;
    if !layers.is_visible(place.category) {
        tracing::debug!("Showing {} layer for {}", place.category, place.name);
        layers.ensure_visible(place.category);
    }
    Some(FocusView {
        place: PlaceDetail::from(place),
        center: [place.latitude(), place.longitude()],
        zoom: ctx.config.map.focus_zoom,
        layers,
    })
}

/// Focus on a place by the `name|province` key a search suggestion carries.
pub fn focus_by_key(
    ctx: &AppContext,
    name: &str,
    province: &str,
    layers: LayerSet,
) -> Option<FocusView> {
    let place = ctx.find(name, province)?;
    focus(ctx, place.id, layers)
}

/// The single active base map; unknown keys leave the map without one.
pub fn select_base<'a>(map: &'a MapConfig, key: &str) -> Option<&'a BaseLayerConfig> {
    map.base_layers.iter().find(|layer| layer.key == key)
}
