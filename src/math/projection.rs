// Copyright 2016 Google Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Planar coordinate systems that tiled meshes may be delivered in.

use crate::errors::*;
use crate::math::WGS84_EQUATORIAL_RADIUS_M;
use nav_types::{ENU, WGS84};
use std::f64::consts::FRAC_PI_2;
use std::fmt::Debug;

/// 2.0 * E.powf(PI).arctan() - FRAC_PI_2;
/// In degrees, it's 85.051129 (cf. [Wikipedia](https://en.wikipedia.org/wiki/Web_Mercator_projection#Formulas))
const LAT_BOUND_RAD: f64 = 1.484_422_229_745_332_4;

/// Converts planar coordinates of some coordinate reference system into
/// geodetic longitude/latitude in degrees.
pub trait Projection: Debug + Send + Sync {
    fn to_geodetic(&self, x: f64, y: f64) -> (f64, f64);
}

/// EPSG:4326, coordinates already are longitude/latitude.
#[derive(Debug, Clone, Copy, Default)]
pub struct Wgs84;

impl Projection for Wgs84 {
    fn to_geodetic(&self, x: f64, y: f64) -> (f64, f64) {
        (x, y)
    }
}

/// EPSG:3857, spherical mercator in meters.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercator;

impl Projection for WebMercator {
    fn to_geodetic(&self, x: f64, y: f64) -> (f64, f64) {
        let longitude = x / WGS84_EQUATORIAL_RADIUS_M;
        let latitude = 2.0 * (y / WGS84_EQUATORIAL_RADIUS_M).exp().atan() - FRAC_PI_2;
        let latitude = nalgebra::clamp(latitude, -LAT_BOUND_RAD, LAT_BOUND_RAD);
        (longitude.to_degrees(), latitude.to_degrees())
    }
}

/// Meters east and north of a geodetic origin.
#[derive(Debug, Clone, Copy)]
pub struct LocalTangentPlane {
    origin: WGS84<f64>,
}

impl LocalTangentPlane {
    pub fn new(longitude: f64, latitude: f64, height: f64) -> Self {
        LocalTangentPlane {
            origin: WGS84::from_degrees_and_meters(latitude, longitude, height),
        }
    }
}

impl Projection for LocalTangentPlane {
    fn to_geodetic(&self, x: f64, y: f64) -> (f64, f64) {
        let position = self.origin + ENU::new(x, y, 0.0);
        (position.longitude_degrees(), position.latitude_degrees())
    }
}

/// Parses `EPSG:4326`, `EPSG:3857` or `local:<lon>,<lat>,<height>`.
pub fn parse_projection(name: &str) -> Result<Box<dyn Projection>> {
    let normalized = name.trim().to_uppercase();
    match normalized.as_str() {
        "EPSG:4326" | "WGS84" => return Ok(Box::new(Wgs84)),
        "EPSG:3857" | "EPSG:900913" => return Ok(Box::new(WebMercator)),
        _ => (),
    }
    if let Some(origin) = normalized.strip_prefix("LOCAL:") {
        let values = origin
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| ErrorKind::UnknownProjection(name.to_string()))?;
        return match values.as_slice() {
            [lon, lat] => Ok(Box::new(LocalTangentPlane::new(*lon, *lat, 0.0))),
            [lon, lat, height] => Ok(Box::new(LocalTangentPlane::new(*lon, *lat, *height))),
            _ => Err(ErrorKind::UnknownProjection(name.to_string()).into()),
        };
    }
    Err(ErrorKind::UnknownProjection(name.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn web_mercator_ground_truth() {
        let (lon, lat) = WebMercator.to_geodetic(0., 0.);
        assert_abs_diff_eq!(lon, 0.);
        assert_abs_diff_eq!(lat, 0.);

        // Florence, Italy.
        let (lon, lat) = WebMercator.to_geodetic(1_252_344.27, 5_429_917.87);
        assert_abs_diff_eq!(lon, 11.25, epsilon = 1e-6);
        assert_abs_diff_eq!(lat, 43.77, epsilon = 1e-6);
    }

    #[test]
    fn web_mercator_clamps_latitude() {
        let (_, lat) = WebMercator.to_geodetic(0., 1e9);
        assert_abs_diff_eq!(lat, 85.051129, epsilon = 1e-6);
    }

    #[test]
    fn local_tangent_plane_offsets() {
        let plane = LocalTangentPlane::new(0., 0., 0.);
        let (lon, lat) = plane.to_geodetic(0., 0.);
        assert_abs_diff_eq!(lon, 0., epsilon = 1e-9);
        assert_abs_diff_eq!(lat, 0., epsilon = 1e-9);

        // One degree of longitude at the equator is about 111.32 km.
        let (lon, lat) = plane.to_geodetic(111_319.49, 0.);
        assert_abs_diff_eq!(lon, 1., epsilon = 1e-3);
        assert_abs_diff_eq!(lat, 0., epsilon = 1e-6);
    }

    #[test]
    fn parse_known_projections() {
        assert!(parse_projection("EPSG:4326").is_ok());
        assert!(parse_projection("epsg:3857").is_ok());
        assert!(parse_projection("local:11.25,43.77,50").is_ok());
        assert!(parse_projection("local:11.25").is_err());
        assert!(parse_projection("EPSG:32632").is_err());
    }
}
