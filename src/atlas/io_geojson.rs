// Primitives for reading GeoJSON layers.

use geo::{Coord, LineString, MultiPolygon, Polygon};
use log::{debug, info, warn};
use serde_json::json;
use serde_json::Value as JSValue;
use snafu::prelude::*;

use vote_synergy::spatial::CoordinateReference;

use crate::atlas::*;

#[derive(PartialEq, Debug, Clone)]
pub struct LayerFeature {
    /// The value of the name property, if the feature has one.
    pub name: Option<String>,
    /// Already aligned to WGS84.
    pub geometry: MultiPolygon<f64>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Layer {
    /// The reference the layer was declared in.
    pub reference: CoordinateReference,
    pub features: Vec<LayerFeature>,
}

fn read_position(v: &JSValue) -> Result<Coord<f64>, String> {
    match v.as_array().map(|a| a.as_slice()) {
        Some([x, y, ..]) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Ok(Coord { x, y }),
            _ => Err(format!("invalid position {}", v)),
        },
        _ => Err(format!("invalid position {}", v)),
    }
}

fn read_ring(v: &JSValue) -> Result<LineString<f64>, String> {
    let positions = v.as_array().ok_or_else(|| format!("invalid ring {}", v))?;
    let coords: Vec<Coord<f64>> = positions
        .iter()
        .map(read_position)
        .collect::<Result<Vec<_>, _>>()?;
    if coords.len() < 3 {
        return Err(format!("ring with {} positions", coords.len()));
    }
    Ok(LineString::new(coords))
}

fn read_polygon(v: &JSValue) -> Result<Polygon<f64>, String> {
    let rings = v.as_array().ok_or_else(|| format!("invalid polygon {}", v))?;
    let mut rings = rings
        .iter()
        .map(read_ring)
        .collect::<Result<Vec<_>, _>>()?
        .into_iter();
    let exterior = rings.next().ok_or_else(|| "polygon without ring".to_string())?;
    Ok(Polygon::new(exterior, rings.collect()))
}

/// Reads an areal geometry. Other geometry types give `Ok(None)`.
fn read_geometry(v: &JSValue) -> Result<Option<MultiPolygon<f64>>, String> {
    let coordinates = &v["coordinates"];
    match v["type"].as_str() {
        Some("Polygon") => Ok(Some(MultiPolygon::new(vec![read_polygon(coordinates)?]))),
        Some("MultiPolygon") => {
            let polygons = coordinates
                .as_array()
                .ok_or_else(|| "invalid multipolygon".to_string())?
                .iter()
                .map(read_polygon)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(MultiPolygon::new(polygons)))
        }
        Some(_) => Ok(None),
        None => Err(format!("geometry without type: {}", v)),
    }
}

fn property_name(v: &JSValue) -> Option<String> {
    match v {
        JSValue::String(s) => Some(s.trim().to_string()),
        JSValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads a FeatureCollection of polygons, named by `name_property`.
///
/// The geometries are brought into WGS84 longitude/latitude. Features without
/// geometry or with a non-areal geometry are skipped.
pub fn read_layer(path: &str, contents: &str, name_property: &str) -> AtlasResult<Layer> {
    let js: JSValue = serde_json::from_str(contents).context(ParsingJsonSnafu { path })?;
    if js["type"].as_str() != Some("FeatureCollection") {
        return InvalidGeoJsonSnafu {
            path,
            reason: "not a FeatureCollection",
        }
        .fail();
    }
    let reference = match js.pointer("/crs/properties/name").and_then(|v| v.as_str()) {
        Some(name) => {
            CoordinateReference::from_name(name).context(UnsupportedCrsSnafu { crs: name, path })?
        }
        None => CoordinateReference::Wgs84,
    };
    let raw_features = js["features"].as_array().context(InvalidGeoJsonSnafu {
        path,
        reason: "missing features",
    })?;

    let mut features: Vec<LayerFeature> = Vec::new();
    for (idx, f) in raw_features.iter().enumerate() {
        let name = property_name(&f["properties"][name_property]);
        if f["geometry"].is_null() {
            warn!("read_layer: {}: feature {} ({:?}) has no geometry", path, idx, name);
            continue;
        }
        let geometry = read_geometry(&f["geometry"]).map_err(|reason| {
            InvalidGeoJsonSnafu {
                path,
                reason: format!("feature {}: {}", idx, reason),
            }
            .build()
        })?;
        match geometry {
            Some(g) => features.push(LayerFeature {
                name,
                geometry: reference.align(&g),
            }),
            None => debug!(
                "read_layer: {}: skipping non-areal feature {} ({:?})",
                path, idx, name
            ),
        }
    }
    info!(
        "read_layer: {}: {} features, reference {:?}",
        path,
        features.len(),
        reference
    );
    Ok(Layer {
        reference,
        features,
    })
}

fn ring_to_json(ring: &LineString<f64>) -> JSValue {
    JSValue::Array(ring.coords().map(|c| json!([c.x, c.y])).collect())
}

/// The GeoJSON geometry object of a multipolygon.
pub fn geometry_to_json(geometry: &MultiPolygon<f64>) -> JSValue {
    let polygons: Vec<JSValue> = geometry
        .0
        .iter()
        .map(|p| {
            let mut rings = vec![ring_to_json(p.exterior())];
            rings.extend(p.interiors().iter().map(ring_to_json));
            JSValue::Array(rings)
        })
        .collect();
    json!({"type": "MultiPolygon", "coordinates": polygons})
}
