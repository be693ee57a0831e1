use geo::Point;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Stable identifier of a place: its index in load order.
pub type PlaceId = usize;

/// Display category of a place. Variants are declared in precedence order,
/// so the derived `Ord` sorts Indigenous first and FullList last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[serde(rename = "indig")]
    Indigenous,
    Micro,
    Short,
    Full,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown category '{0}' (expected indig, micro, short or full)")]
pub struct UnknownCategory(pub String);

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Indigenous,
        Category::Micro,
        Category::Short,
        Category::Full,
    ];

    /// First match wins: Indigenous > Micro > Short > Full.
    pub fn classify(flags: &TierFlags) -> Self {
        if flags.indigenous {
            Category::Indigenous
        } else if flags.micro_listed {
            Category::Micro
        } else if flags.short_listed {
            Category::Short
        } else {
            Category::Full
        }
    }

    /// Position in the precedence order, 0 being the highest.
    pub fn rank(self) -> usize {
        self as usize
    }

    pub fn slug(self) -> &'static str {
        match self {
            Category::Indigenous => "indig",
            Category::Micro => "micro",
            Category::Short => "short",
            Category::Full => "full",
        }
    }

    pub fn status_text(self) -> &'static str {
        match self {
            Category::Indigenous => "First Nation, included in all lists",
            Category::Micro => "Included in all lists",
            Category::Short => "Included in short and full lists",
            Category::Full => "Included in full-list only",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.slug())
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.slug().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Raw list membership as it appears in the dataset. The flags overlap;
/// `Category::classify` turns them into one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierFlags {
    pub indigenous: bool,
    pub micro_listed: bool,
    pub short_listed: bool,
}

/// A dataset row that passed validation, before ids and search keys exist.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceRecord {
    pub name: String,
    pub province: String,
    pub latitude: f64,
    pub longitude: f64,
    pub flags: TierFlags,
}

#[derive(Debug, Clone)]
pub struct Place {
    pub id: PlaceId,
    pub name: String,
    pub province: String,
    pub point: Point<f64>, // x = longitude, y = latitude
    pub flags: TierFlags,
    pub category: Category,
    pub search_key: String,
}

impl Place {
    pub fn latitude(&self) -> f64 {
        self.point.y()
    }

    pub fn longitude(&self) -> f64 {
        self.point.x()
    }

    pub fn lookup_key(&self) -> String {
        lookup_key(&self.name, &self.province)
    }
}

pub fn lookup_key(name: &str, province: &str) -> String {
    format!("{}|{}", name, province)
}

pub fn province_name(code: &str) -> Option<&'static str> {
    let name = match code {
        "BC" => "British Columbia",
        "AB" => "Alberta",
        "SK" => "Saskatchewan",
        "MB" => "Manitoba",
        "ON" => "Ontario",
        "QC" => "Quebec",
        "NB" => "New Brunswick",
        "NS" => "Nova Scotia",
        "PE" => "Prince Edward Island",
        "NL" => "Newfoundland and Labrador",
        "YT" => "Yukon",
        "NT" => "Northwest Territories",
        "NU" => "Nunavut",
        _ => return None,
    };
    Some(name)
}

/// Popup content for a single place.
#[derive(Debug, Clone, Serialize)]
pub struct PlaceDetail {
    pub id: PlaceId,
    pub name: String,
    pub province: String,
    pub province_name: String,
    pub category: Category,
    pub status: &'static str,
    pub coords: String,
    pub fact_check_url: String,
}

impl From<&Place> for PlaceDetail {
    fn from(place: &Place) -> Self {
        Self {
            id: place.id,
            name: place.name.clone(),
            province: place.province.clone(),
            province_name: province_name(&place.province)
                .unwrap_or(&place.province)
                .to_string(),
            category: place.category,
            status: place.category.status_text(),
            coords: format!("{:.4}, {:.4}", place.latitude(), place.longitude()),
            fact_check_url: format!(
                "https://www.google.com/maps/search/?api=1&query={},{}",
                place.latitude(),
                place.longitude()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(indigenous: bool, micro_listed: bool, short_listed: bool) -> TierFlags {
        TierFlags { indigenous, micro_listed, short_listed }
    }

    #[test]
    fn classification_precedence_holds_for_every_flag_combination() {
        for bits in 0u8..8 {
            let f = flags(bits & 1 != 0, bits & 2 != 0, bits & 4 != 0);
            let expected = if f.indigenous {
                Category::Indigenous
            } else if f.micro_listed {
                Category::Micro
            } else if f.short_listed {
                Category::Short
            } else {
                Category::Full
            };
            assert_eq!(Category::classify(&f), expected, "flags {:?}", f);
        }
    }

    #[test]
    fn indigenous_wins_over_list_flags() {
        assert_eq!(Category::classify(&flags(true, true, true)), Category::Indigenous);
        assert_eq!(Category::classify(&flags(false, true, true)), Category::Micro);
    }

    #[test]
    fn ordering_follows_precedence() {
        let mut cats = vec![Category::Full, Category::Indigenous, Category::Short, Category::Micro];
        cats.sort();
        assert_eq!(cats, Category::ALL.to_vec());
        assert_eq!(Category::Indigenous.rank(), 0);
        assert_eq!(Category::Full.rank(), 3);
    }

    #[test]
    fn slugs_parse_back() {
        for cat in Category::ALL {
            assert_eq!(cat.slug().parse::<Category>(), Ok(cat));
        }
        assert_eq!(" MICRO ".parse::<Category>(), Ok(Category::Micro));
        assert!("fn".parse::<Category>().is_err());
    }

    #[test]
    fn detail_formats_coordinates_and_province() {
        let place = Place {
            id: 3,
            name: "Saint-André".into(),
            province: "QC".into(),
            point: Point::new(-73.123456, 45.987654),
            flags: TierFlags::default(),
            category: Category::Full,
            search_key: "st andre".into(),
        };
        let detail = PlaceDetail::from(&place);
        assert_eq!(detail.province_name, "Quebec");
        assert_eq!(detail.coords, "45.9877, -73.1235");
        assert_eq!(detail.status, "Included in full-list only");
        assert!(detail.fact_check_url.ends_with("query=45.987654,-73.123456"));
    }

    #[test]
    fn unknown_province_is_shown_verbatim() {
        assert_eq!(province_name("XX"), None);
        assert_eq!(province_name("NU"), Some("Nunavut"));
    }
}
