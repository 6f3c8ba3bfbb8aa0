//! GeoJSON text (as produced by `ST_AsGeoJSON`) to `geo` polygons.

use std::str::FromStr;

use geo::{Geometry, MultiPolygon};
use geojson::GeoJson;

use hexpop_common::HexPopError;

/// Parse a GeoJSON geometry into a multipolygon. Plain polygons are wrapped.
pub fn parse_multipolygon(text: &str) -> Result<MultiPolygon<f64>, HexPopError> {
    let geojson = GeoJson::from_str(text)
        .map_err(|e| HexPopError::GraphConstruction(format!("invalid GeoJSON: {e}")))?;
    let GeoJson::Geometry(geometry) = geojson else {
        return Err(HexPopError::GraphConstruction(
            "expected a GeoJSON geometry, got a feature or collection".to_string(),
        ));
    };
    let geometry = Geometry::<f64>::try_from(geometry)
        .map_err(|e| HexPopError::GraphConstruction(format!("unsupported geometry: {e}")))?;

    match geometry {
        Geometry::Polygon(polygon) => Ok(MultiPolygon::new(vec![polygon])),
        Geometry::MultiPolygon(multi) => Ok(multi),
        other => Err(HexPopError::GraphConstruction(format!(
            "expected a polygon, got {}",
            geometry_kind(&other)
        ))),
    }
}

fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::LineString(_) => "LineString",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        _ => "non-polygon geometry",
    }
}
