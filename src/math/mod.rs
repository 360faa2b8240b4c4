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

use nalgebra::{Matrix4, Point3, UnitQuaternion, Vector3};
use nav_types::{ECEF, WGS84};
use std::f64::consts::{FRAC_PI_2, PI};

pub mod projection;
pub use projection::{parse_projection, LocalTangentPlane, Projection, WebMercator, Wgs84};

/// Semi-major axis of the WGS84 ellipsoid.
pub const WGS84_EQUATORIAL_RADIUS_M: f64 = 6_378_137.0;
/// Semi-minor axis of the WGS84 ellipsoid.
pub const WGS84_POLAR_RADIUS_M: f64 = 6_356_752.314_245_179_3;

fn radii_squared() -> Vector3<f64> {
    Vector3::new(
        WGS84_EQUATORIAL_RADIUS_M * WGS84_EQUATORIAL_RADIUS_M,
        WGS84_EQUATORIAL_RADIUS_M * WGS84_EQUATORIAL_RADIUS_M,
        WGS84_POLAR_RADIUS_M * WGS84_POLAR_RADIUS_M,
    )
}

/// Divides by the length, but never by anything smaller than 1.
fn normalize_clamped(vector: &Vector3<f64>) -> Vector3<f64> {
    vector / vector.norm().max(1.0)
}

/// Geodetic position (degrees, meters above the ellipsoid) to earth-centered,
/// earth-fixed coordinates.
pub fn to_ecef(longitude: f64, latitude: f64, height: f64) -> Point3<f64> {
    let longitude = longitude.to_radians();
    let latitude = latitude.to_radians();
    let cos_latitude = latitude.cos();
    let normal = normalize_clamped(&Vector3::new(
        cos_latitude * longitude.cos(),
        cos_latitude * longitude.sin(),
        latitude.sin(),
    ));
    let k = radii_squared().component_mul(&normal);
    let gamma = normal.dot(&k).sqrt();
    Point3::from(k / gamma + normal * height)
}

/// Rotates `point` into a tangent frame centered at `origin` (both ECEF). The
/// origin's radial direction becomes +Y of the result, which is the up axis of
/// glTF scenes.
pub fn localize(point: &Point3<f64>, origin: &Point3<f64>) -> Vector3<f64> {
    let to_tangent_frame = if origin.coords.norm() == 0.0 {
        UnitQuaternion::identity()
    } else {
        let normal = normalize_clamped(&origin.coords);
        UnitQuaternion::rotation_between(&normal, &Vector3::z())
            .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector3::x_axis(), PI))
    };
    // Intrinsic XYZ Euler rotation (-90°, 0, -90°).
    let to_scene = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -FRAC_PI_2)
        * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -FRAC_PI_2);
    to_scene * (to_tangent_frame * (point - origin))
}

/// The east-north-up frame at the given geodetic position expressed in ECEF,
/// with the axes scaled uniformly by `scale`.
pub fn enu_to_ecef_transform(
    longitude: f64,
    latitude: f64,
    height: f64,
    scale: f64,
) -> Matrix4<f64> {
    let lon = longitude.to_radians();
    let lat = latitude.to_radians();
    let east = Vector3::new(-lon.sin(), lon.cos(), 0.) * scale;
    let north = Vector3::new(-lat.sin() * lon.cos(), -lat.sin() * lon.sin(), lat.cos()) * scale;
    let up = Vector3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()) * scale;
    let origin = ECEF::from(WGS84::from_radians_and_meters(lat, lon, height));
    #[rustfmt::skip]
    let transform = Matrix4::new(
        east.x, north.x, up.x, origin.x(),
        east.y, north.y, up.y, origin.y(),
        east.z, north.z, up.z, origin.z(),
        0., 0., 0., 1.,
    );
    transform
}

/// Flattens a matrix in column-major order, as 3D Tiles expects it.
pub fn to_column_major(matrix: &Matrix4<f64>) -> [f64; 16] {
    let mut flat = [0.; 16];
    flat.copy_from_slice(matrix.as_slice());
    flat
}
