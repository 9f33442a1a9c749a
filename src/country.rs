//! Country resolution: ISO3 code to display name and bounding box.
//!
//! Names come from the ISO 3166-1 registry. The bounding box is not part of
//! the registry; it is derived from the level-0 administrative boundary and
//! attached with [`Country::with_bounds`] once the boundary is known.

use geo::BoundingRect;
use geo_types::{Geometry, Rect};
use isocountry::CountryCode;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StarterKitError};

/// Geographic extent in degrees (EPSG:4326).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Smallest box enclosing every geometry, or `None` for an empty set.
    pub fn of_geometries<'a>(geometries: impl IntoIterator<Item = &'a Geometry<f64>>) -> Option<Self> {
        geometries
            .into_iter()
            .filter_map(|g| g.bounding_rect())
            .map(BoundingBox::from)
            .reduce(|a, b| a.union(&b))
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            west: self.west.min(other.west),
            south: self.south.min(other.south),
            east: self.east.max(other.east),
            north: self.north.max(other.north),
        }
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        BoundingBox {
            west: rect.min().x,
            south: rect.min().y,
            east: rect.max().x,
            north: rect.max().y,
        }
    }
}

/// A resolved country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    /// Upper-case ISO 3166-1 alpha-3 code.
    pub iso3: String,

    /// Registry short name, e.g. "Kenya".
    pub name: String,

    /// Extent of the level-0 boundary, when it has been resolved.
    pub bounds: Option<BoundingBox>,
}

impl Country {
    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Lower-case code, as used in WorldPop file names.
    pub fn iso3_lower(&self) -> String {
        self.iso3.to_lowercase()
    }
}

/// Resolve an ISO3 code against the ISO 3166-1 registry.
///
/// Matching is case-insensitive; surrounding whitespace is ignored.
pub fn resolve_country(code: &str) -> Result<Country> {
    let normalized = code.trim().to_uppercase();
    if normalized.len() != 3 {
        return Err(StarterKitError::UnknownCountry(code.to_string()));
    }

    let entry = CountryCode::for_alpha3(&normalized)
        .map_err(|_| StarterKitError::UnknownCountry(code.to_string()))?;

    Ok(Country {
        iso3: entry.alpha3().to_string(),
        name: entry.name().to_string(),
        bounds: None,
    })
}

/// Convenience wrapper returning only the display name.
pub fn resolve_country_name(code: &str) -> Result<String> {
    resolve_country(code).map(|c| c.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{LineString, Point, Polygon};

    #[test]
    fn test_resolve_known_codes() {
        let kenya = resolve_country("KEN").unwrap();
        assert_eq!(kenya.iso3, "KEN");
        assert_eq!(kenya.name, "Kenya");
        assert!(kenya.bounds.is_none());

        for code in ["NGA", "UGA", "MOZ", "BEN", "ETH"] {
            let name = resolve_country_name(code).unwrap();
            assert!(!name.is_empty(), "{code} resolved to an empty name");
        }
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let country = resolve_country(" ken ").unwrap();
        assert_eq!(country.iso3, "KEN");
        assert_eq!(country.iso3_lower(), "ken");
    }

    #[test]
    fn test_resolve_unknown_code() {
        for code in ["XXX", "", "KE", "KENYA"] {
            let err = resolve_country(code).unwrap_err();
            assert!(matches!(err, StarterKitError::UnknownCountry(_)), "{code}");
        }
    }

    #[test]
    fn test_bounding_box_of_geometries() {
        let square = Polygon::new(
            LineString::from(vec![(34.0, -4.0), (41.0, -4.0), (41.0, 5.0), (34.0, 5.0), (34.0, -4.0)]),
            vec![],
        );
        let island = Point::new(42.5, -1.0);
        let geoms = vec![Geometry::Polygon(square), Geometry::Point(island)];

        let bbox = BoundingBox::of_geometries(&geoms).unwrap();
        assert_eq!(bbox, BoundingBox::new(34.0, -4.0, 42.5, 5.0));

        let empty: Vec<Geometry<f64>> = Vec::new();
        assert!(BoundingBox::of_geometries(&empty).is_none());
    }
}
