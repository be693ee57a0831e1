//! Greedy screen-space clustering of markers, one tier at a time.

use crate::context::AppContext;
use crate::layers::LayerSet;
use crate::render::world_pixel;
use crate::types::{Category, PlaceId};
use geo::Rect;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    pub category: Category,
    pub count: usize,
    /// [lat, lon] centroid of the members.
    pub center: [f64; 2],
    /// Set when the cluster is a single marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place: Option<PlaceId>,
    pub icon_size: u32,
}

/// 1 digit = 30px, 2 = 34px, 3 = 38px...
pub fn icon_size(count: usize) -> u32 {
    let digits = count.max(1).ilog10() + 1;
    26 + digits * 4
}

struct Seed {
    pixel: (f64, f64),
    members: Vec<PlaceId>,
    lat_sum: f64,
    lon_sum: f64,
}

/// Cluster one category's places inside `bounds` at `zoom`.
pub fn cluster_category(
    ctx: &AppContext,
    category: Category,
    zoom: u8,
    bounds: &Rect<f64>,
) -> Vec<Cluster> {
    let settings = &ctx.config.clustering;
    let places = ctx.in_bounds(category, bounds);

    if zoom >= settings.disable_clustering_at_zoom {
        return places
            .into_iter()
            .map(|p| Cluster {
                category,
                count: 1,
                center: [p.latitude(), p.longitude()],
                place: Some(p.id),
                icon_size: icon_size(1),
            })
            .collect();
    }

    let radius = settings.max_cluster_radius.max(1.0);
    let mut seeds: Vec<Seed> = Vec::new();
    let mut grid: HashMap<(i64, i64), Vec<usize>> = HashMap::new();

    for place in places {
        let pixel = world_pixel(place.latitude(), place.longitude(), zoom);
        let cell = ((pixel.0 / radius).floor() as i64, (pixel.1 / radius).floor() as i64);

        let mut nearest: Option<usize> = None;
        for dx in -1..=1 {
            for dy in -1..=1 {
                let Some(candidates) = grid.get(&(cell.0 + dx, cell.1 + dy)) else {
                    continue;
                };
                for &idx in candidates {
                    let seed = &seeds[idx];
                    let dist = (seed.pixel.0 - pixel.0).hypot(seed.pixel.1 - pixel.1);
                    if dist <= radius && nearest.map_or(true, |n| idx < n) {
                        nearest = Some(idx);
                    }
                }
            }
        }

        let idx = match nearest {
            Some(idx) => idx,
            None => {
                seeds.push(Seed { pixel, members: Vec::new(), lat_sum: 0.0, lon_sum: 0.0 });
                grid.entry(cell).or_default().push(seeds.len() - 1);
                seeds.len() - 1
            }
        };
        let seed = &mut seeds[idx];
        seed.members.push(place.id);
        seed.lat_sum += place.latitude();
        seed.lon_sum += place.longitude();
    }

    seeds
        .into_iter()
        .map(|seed| {
            let count = seed.members.len();
            Cluster {
                category,
                count,
                center: [seed.lat_sum / count as f64, seed.lon_sum / count as f64],
                place: (count == 1).then(|| seed.members[0]),
                icon_size: icon_size(count),
            }
        })
        .collect()
}

/// Clusters for every visible layer. Tiers never share a cluster.
pub fn clusters(ctx: &AppContext, zoom: u8, bounds: &Rect<f64>, layers: &LayerSet) -> Vec<Cluster> {
    layers
        .visible()
        .flat_map(|category| cluster_category(ctx, category, zoom, bounds))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::types::{PlaceRecord, TierFlags};
    use geo::coord;

    fn canada() -> Rect<f64> {
        Rect::new(coord! { x: -150.0, y: 30.0 }, coord! { x: -40.0, y: 90.0 })
    }

    fn record(name: &str, lat: f64, lon: f64, flags: TierFlags) -> PlaceRecord {
        PlaceRecord { name: name.into(), province: "ON".into(), latitude: lat, longitude: lon, flags }
    }

    fn ottawa_area() -> AppContext {
        let short = TierFlags { short_listed: true, ..Default::default() };
        AppContext::build(
            AppConfig::default(),
            vec![
                record("Ottawa", 45.42, -75.69, TierFlags::default()),
                record("Gatineau", 45.48, -75.70, TierFlags::default()),
                record("Kanata", 45.31, -75.90, short),
                record("Thunder Bay", 48.38, -89.25, TierFlags::default()),
            ],
        )
    }

    #[test]
    fn icon_grows_with_digits() {
        assert_eq!(icon_size(1), 30);
        assert_eq!(icon_size(42), 34);
        assert_eq!(icon_size(100), 38);
        assert_eq!(icon_size(0), 30);
    }

    #[test]
    fn nearby_places_of_one_tier_merge() {
        let ctx = ottawa_area();
        let full = cluster_category(&ctx, Category::Full, 4, &canada());
        assert_eq!(full.len(), 2);
        assert_eq!(full[0].count, 2);
        assert_eq!(full[0].place, None);
        assert!((full[0].center[0] - 45.45).abs() < 1e-9);
        assert_eq!(full[1].place, Some(3));
    }

    #[test]
    fn tiers_are_clustered_separately() {
        let ctx = ottawa_area();
        let all = clusters(&ctx, 4, &canada(), &LayerSet::default());
        let total: usize = all.iter().map(|c| c.count).sum();
        assert_eq!(total, 4);
        assert!(all.iter().any(|c| c.category == Category::Short && c.place == Some(2)));

        let only_short: LayerSet = "short".parse().unwrap();
        let visible = clusters(&ctx, 4, &canada(), &only_short);
        assert_eq!(visible.len(), 1);
    }

    #[test]
    fn high_zoom_disables_clustering() {
        let ctx = ottawa_area();
        let full = cluster_category(&ctx, Category::Full, 7, &canada());
        assert_eq!(full.len(), 3);
        assert!(full.iter().all(|c| c.count == 1 && c.place.is_some()));
    }

    #[test]
    fn bounds_limit_members() {
        let ctx = ottawa_area();
        let west = Rect::new(coord! { x: -95.0, y: 45.0 }, coord! { x: -85.0, y: 50.0 });
        let full = cluster_category(&ctx, Category::Full, 4, &west);
        assert_eq!(full.len(), 1);
        assert_eq!(full[0].place, Some(3));
    }
}
