//! Assignment of polling places to administrative regions.

use geo::{BoundingRect, Coord, Intersects, MapCoords, MultiPolygon, Point, Rect};
use log::{debug, info};

use crate::config::*;

// --------------------------------------------------------------------------
// Coordinate references

/// Converts coordinates of some reference system into WGS84 longitude/latitude.
pub trait Projection {
    fn to_wgs84(&self, input: Coord<f64>) -> Coord<f64>;
}

/// The coordinate references a geometry layer can be declared in.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum CoordinateReference {
    /// EPSG:4326 / CRS84, longitude first. This is what the points use.
    Wgs84,
    /// EPSG:3857, spherical web mercator in meters.
    WebMercator,
}

const EARTH_RADIUS_M: f64 = 6_378_137.0;

impl Projection for CoordinateReference {
    fn to_wgs84(&self, input: Coord<f64>) -> Coord<f64> {
        match self {
            CoordinateReference::Wgs84 => input,
            CoordinateReference::WebMercator => {
                let longitude = (input.x / EARTH_RADIUS_M).to_degrees();
                let latitude = (2.0 * (input.y / EARTH_RADIUS_M).exp().atan()
                    - std::f64::consts::FRAC_PI_2)
                    .to_degrees();
                Coord {
                    x: longitude,
                    y: latitude,
                }
            }
        }
    }
}

impl CoordinateReference {
    /// Reads the name of a coordinate reference, as found in the `crs` member of
    /// a GeoJSON document (`EPSG:3857`, `urn:ogc:def:crs:EPSG::4326`,
    /// `urn:ogc:def:crs:OGC:1.3:CRS84`, ...).
    pub fn from_name(name: &str) -> Option<CoordinateReference> {
        let code = name.trim().rsplit(':').next().unwrap_or("").to_uppercase();
        match code.as_str() {
            "4326" | "CRS84" => Some(CoordinateReference::Wgs84),
            "3857" | "900913" | "3785" => Some(CoordinateReference::WebMercator),
            _ => None,
        }
    }

    /// Brings a geometry into the reference of the vote points.
    pub fn align(&self, geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        match self {
            CoordinateReference::Wgs84 => geometry.clone(),
            _ => geometry.map_coords(|c| self.to_wgs84(c)),
        }
    }
}

// --------------------------------------------------------------------------
// Regions

/// A named administrative boundary, in WGS84 longitude/latitude.
#[derive(PartialEq, Debug, Clone)]
pub struct Region {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

#[derive(PartialEq, Debug, Clone)]
struct IndexedRegion {
    region: Region,
    bounds: Option<Rect<f64>>,
}

/// The regions a point can be assigned to, in layer order.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct RegionSet {
    regions: Vec<IndexedRegion>,
}

fn rect_contains(rect: &Rect<f64>, c: &Coord<f64>) -> bool {
    c.x >= rect.min().x && c.x <= rect.max().x && c.y >= rect.min().y && c.y <= rect.max().y
}

impl RegionSet {
    pub fn new(regions: Vec<Region>) -> RegionSet {
        RegionSet {
            regions: regions
                .into_iter()
                .map(|region| IndexedRegion {
                    bounds: region.geometry.bounding_rect(),
                    region,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter().map(|ir| &ir.region)
    }

    /// The region intersecting the point, if any.
    ///
    /// A point on a boundary shared by several regions goes to the first one in
    /// layer order, so that its votes are only counted once.
    pub fn locate(&self, latitude: f64, longitude: f64) -> Option<&Region> {
        let c = Coord {
            x: longitude,
            y: latitude,
        };
        self.regions
            .iter()
            .filter(|ir| ir.bounds.map(|b| rect_contains(&b, &c)).unwrap_or(false))
            .find(|ir| ir.region.geometry.intersects(&Point::from(c)))
            .map(|ir| &ir.region)
    }
}

/// Left join of the records on the regions.
///
/// Returns the assigned records, in input order, and the number of records
/// that did not match any region.
pub fn assign_regions(
    records: Vec<SanitizedVoteRecord>,
    regions: &RegionSet,
) -> (Vec<AssignedVoteRecord>, usize) {
    let mut unmatched: usize = 0;
    let res: Vec<AssignedVoteRecord> = records
        .into_iter()
        .map(|record| {
            let region = regions
                .locate(record.latitude, record.longitude)
                .map(|r| r.name.clone());
            if region.is_none() {
                debug!(
                    "assign_regions: no region for {:?} at ({}, {})",
                    record.location, record.latitude, record.longitude
                );
                unmatched += 1;
            }
            AssignedVoteRecord { record, region }
        })
        .collect();
    info!(
        "assign_regions: {} records, {} regions, {} unassigned",
        res.len(),
        regions.len(),
        unmatched
    );
    (res, unmatched)
}

// --------------------------------------------------------------------------
// Map framing

/// The outline of the municipality. Only used to frame the map.
#[derive(PartialEq, Debug, Clone)]
pub struct MapFrame {
    pub outline: MultiPolygon<f64>,
    pub bounds: Rect<f64>,
}

impl MapFrame {
    /// Returns `None` for an empty outline.
    pub fn from_outline(outline: MultiPolygon<f64>) -> Option<MapFrame> {
        let bounds = outline.bounding_rect()?;
        Some(MapFrame { outline, bounds })
    }

    pub fn center(&self) -> GeoPosition {
        let c = self.bounds.center();
        GeoPosition {
            latitude: c.y,
            longitude: c.x,
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox {
            min_latitude: self.bounds.min().y,
            max_latitude: self.bounds.max().y,
            min_longitude: self.bounds.min().x,
            max_longitude: self.bounds.max().x,
        }
    }
}
