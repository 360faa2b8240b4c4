// Copyright 2016 The Cartographer Authors
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

//! Turns vector features into triangulated polyhedral surfaces in ECEF.
//! Polygons are optionally extruded between a lower and an upper height,
//! lines and points are buffered into polygons first.

use crate::errors::*;
use crate::feature::{Feature, Geometry, Position};
use crate::math::{to_ecef, WGS84_EQUATORIAL_RADIUS_M};
use nalgebra::{Point3, Vector2};
use std::f64::consts::PI;
use std::fmt;

/// Number of segments used to approximate the circle around a point.
const POINT_BUFFER_SEGMENTS: usize = 16;
const DEFAULT_WIDTH_M: f64 = 1.0;
const METERS_PER_DEGREE: f64 = WGS84_EQUATORIAL_RADIUS_M * PI / 180.0;

/// Per feature parameters of the surface construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryOptions {
    pub lower_limit: Option<f64>,
    pub upper_limit: Option<f64>,
    pub translate_z: Option<f64>,
    /// Buffer width in meters for points and lines.
    pub width: Option<f64>,
    pub remove_bottom_surface: bool,
}

/// Four ECEF vertices, the first one repeated to close the triangle.
pub type Triangle = [Point3<f64>; 4];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolyhedralSurface {
    pub triangles: Vec<Triangle>,
}

impl PolyhedralSurface {
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    fn append(&mut self, mut other: PolyhedralSurface) {
        self.triangles.append(&mut other.triangles);
    }

    /// Well-known text of the surface. Coordinates are ECEF, i.e. SRID 4978.
    pub fn to_wkt(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PolyhedralSurface {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.triangles.is_empty() {
            return write!(f, "POLYHEDRALSURFACE Z EMPTY");
        }
        write!(f, "POLYHEDRALSURFACE Z (")?;
        for (i, triangle) in self.triangles.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "((")?;
            for (j, v) in triangle.iter().enumerate() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{} {} {}", v.x, v.y, v.z)?;
            }
            write!(f, "))")?;
        }
        write!(f, ")")
    }
}

/// A ring of longitude, latitude, height.
type GeodeticRing = Vec<Point3<f64>>;

/// Builds the surface of a single feature. Multi geometries are built part by
/// part and concatenated. Fails if a polygon cannot be triangulated.
pub fn build(feature: &Feature, options: &GeometryOptions) -> Result<PolyhedralSurface> {
    let width = options.width.unwrap_or(DEFAULT_WIDTH_M);
    let polygons: Vec<Vec<Vec<Position>>> = match &feature.geometry {
        Geometry::Polygon(rings) => vec![rings.clone()],
        Geometry::MultiPolygon(polygons) => polygons.clone(),
        Geometry::LineString(line) => line_to_polygons(line, width),
        Geometry::MultiLineString(lines) => lines
            .iter()
            .flat_map(|line| line_to_polygons(line, width))
            .collect(),
        Geometry::Point(point) => vec![vec![point_to_ring(point, width)]],
        Geometry::MultiPoint(points) => points
            .iter()
            .map(|point| vec![point_to_ring(point, width)])
            .collect(),
    };
    let mut surface = PolyhedralSurface::default();
    for rings in &polygons {
        surface.append(build_polygon(rings, options)?);
    }
    Ok(surface)
}

fn build_polygon(rings: &[Vec<Position>], options: &GeometryOptions) -> Result<PolyhedralSurface> {
    match rings.first() {
        Some(outer) if outer.len() >= 3 => (),
        _ => return Ok(PolyhedralSurface::default()),
    }
    let rings: Vec<&Vec<Position>> = rings.iter().filter(|ring| ring.len() >= 3).collect();
    let translate_z = options.translate_z.unwrap_or(0.);

    if options.lower_limit.is_none() && options.upper_limit.is_none() {
        let native = elevate(&rings, None, translate_z);
        return Ok(PolyhedralSurface {
            triangles: triangulate(&native, false)?,
        });
    }

    let mut lower = elevate(&rings, options.lower_limit, translate_z);
    let mut upper = elevate(&rings, options.upper_limit, translate_z);
    if mean_z(&lower[0]) > mean_z(&upper[0]) {
        std::mem::swap(&mut lower, &mut upper);
    }
    if lower == upper {
        return Ok(PolyhedralSurface {
            triangles: triangulate(&upper, false)?,
        });
    }

    let mut triangles = triangulate(&upper, false)?;
    for (lower_ring, upper_ring) in lower.iter().zip(&upper) {
        triangles.extend(walls(lower_ring, upper_ring));
    }
    if !options.remove_bottom_surface {
        triangles.extend(triangulate(&lower, true)?);
    }
    Ok(PolyhedralSurface { triangles })
}

/// Places every ring at `z` if given, at its native height otherwise, and
/// closes rings that are open.
fn elevate(rings: &[&Vec<Position>], z: Option<f64>, translate_z: f64) -> Vec<GeodeticRing> {
    rings
        .iter()
        .map(|ring| {
            let mut elevated: GeodeticRing = ring
                .iter()
                .map(|p| Point3::new(p.x, p.y, z.or(p.z).unwrap_or(0.) + translate_z))
                .collect();
            if let (Some(&first), Some(&last)) = (elevated.first(), elevated.last()) {
                if first.x != last.x || first.y != last.y {
                    elevated.push(first);
                }
            }
            elevated
        })
        .collect()
}

fn mean_z(ring: &[Point3<f64>]) -> f64 {
    ring.iter().map(|p| p.z).sum::<f64>() / ring.len() as f64
}

fn ecef(p: &Point3<f64>) -> Point3<f64> {
    to_ecef(p.x, p.y, p.z)
}

/// Ear-cuts the outer ring (first) with its holes in the XY plane and maps
/// the result back onto the ECEF vertices. With `reverse`, the winding of
/// every triangle is flipped.
fn triangulate(rings: &[GeodeticRing], reverse: bool) -> Result<Vec<Triangle>> {
    let mut flat = Vec::new();
    let mut hole_indices = Vec::new();
    let mut vertices = Vec::new();
    for (i, ring) in rings.iter().enumerate() {
        if i > 0 {
            hole_indices.push(vertices.len());
        }
        for p in ring {
            flat.extend_from_slice(&[p.x, p.y]);
            vertices.push(ecef(p));
        }
    }
    let indices = earcutr::earcut(&flat, &hole_indices, 2).map_err(|err| {
        Error::from(ErrorKind::InvalidInput(format!(
            "Could not triangulate polygon with {} vertices: {:?}",
            vertices.len(),
            err
        )))
    })?;
    Ok(indices
        .chunks_exact(3)
        .map(|t| {
            let (a, b, c) = (vertices[t[0]], vertices[t[1]], vertices[t[2]]);
            if reverse {
                [a, c, b, a]
            } else {
                [a, b, c, a]
            }
        })
        .collect())
}

/// Two triangles per edge, connecting the lower ring to the upper ring.
fn walls(lower: &[Point3<f64>], upper: &[Point3<f64>]) -> Vec<Triangle> {
    let lower: Vec<Point3<f64>> = lower.iter().map(ecef).collect();
    let upper: Vec<Point3<f64>> = upper.iter().map(ecef).collect();
    let mut triangles = Vec::with_capacity(2 * lower.len());
    for i in 0..lower.len().saturating_sub(1) {
        let (bottom_left, top_left) = (lower[i], upper[i]);
        let (bottom_right, top_right) = (lower[i + 1], upper[i + 1]);
        triangles.push([bottom_left, top_left, bottom_right, bottom_left]);
        triangles.push([bottom_right, top_left, top_right, bottom_right]);
    }
    triangles
}

/// Equirectangular approximation around a reference latitude, good enough
/// for buffers of a few meters.
struct LocalMetric {
    origin: Vector2<f64>,
    meters_per_degree_x: f64,
}

impl LocalMetric {
    fn new(origin: &Position) -> Self {
        LocalMetric {
            origin: Vector2::new(origin.x, origin.y),
            meters_per_degree_x: METERS_PER_DEGREE * origin.y.to_radians().cos().max(1e-6),
        }
    }

    fn to_meters(&self, p: &Position) -> Vector2<f64> {
        Vector2::new(
            (p.x - self.origin.x) * self.meters_per_degree_x,
            (p.y - self.origin.y) * METERS_PER_DEGREE,
        )
    }

    fn to_degrees(&self, v: &Vector2<f64>, z: Option<f64>) -> Position {
        Position::new(
            self.origin.x + v.x / self.meters_per_degree_x,
            self.origin.y + v.y / METERS_PER_DEGREE,
            z,
        )
    }
}

fn point_to_ring(point: &Position, width: f64) -> Vec<Position> {
    let metric = LocalMetric::new(point);
    let mut ring: Vec<Position> = (0..POINT_BUFFER_SEGMENTS)
        .map(|k| {
            let angle = 2. * PI * k as f64 / POINT_BUFFER_SEGMENTS as f64;
            metric.to_degrees(&(width * Vector2::new(angle.cos(), angle.sin())), point.z)
        })
        .collect();
    ring.push(ring[0]);
    ring
}

/// Splits a line at vertices where it turns by 90° or more and buffers every
/// piece into a polygon of the given width.
fn line_to_polygons(line: &[Position], width: f64) -> Vec<Vec<Vec<Position>>> {
    let mut points: Vec<Position> = Vec::with_capacity(line.len());
    for p in line {
        if points.last().map_or(true, |last| last.x != p.x || last.y != p.y) {
            points.push(*p);
        }
    }
    if points.len() < 2 {
        return Vec::new();
    }
    let metric = LocalMetric::new(&points[0]);
    let xy: Vec<Vector2<f64>> = points.iter().map(|p| metric.to_meters(p)).collect();

    let mut pieces = Vec::new();
    let mut start = 0;
    for i in 1..points.len() - 1 {
        let incoming = xy[i - 1] - xy[i];
        let outgoing = xy[i + 1] - xy[i];
        let angle = incoming.angle(&outgoing);
        if angle <= PI / 2. {
            pieces.push((start, i));
            start = i;
        }
    }
    pieces.push((start, points.len() - 1));

    pieces
        .into_iter()
        .map(|(from, to)| {
            let left = offset_polyline(&xy[from..=to], width / 2.);
            let right = offset_polyline(&xy[from..=to], -width / 2.);
            let heights = &points[from..=to];
            let mut ring: Vec<Position> = left
                .iter()
                .zip(heights)
                .map(|(v, p)| metric.to_degrees(v, p.z))
                .collect();
            ring.extend(
                right
                    .iter()
                    .zip(heights)
                    .rev()
                    .map(|(v, p)| metric.to_degrees(v, p.z)),
            );
            ring.push(ring[0]);
            vec![ring]
        })
        .collect()
}

/// Offsets a polyline to the left by `distance` (right if negative), joining
/// segments with miters.
fn offset_polyline(line: &[Vector2<f64>], distance: f64) -> Vec<Vector2<f64>> {
    let normals: Vec<Vector2<f64>> = line
        .windows(2)
        .map(|w| {
            let d = (w[1] - w[0]).normalize();
            Vector2::new(-d.y, d.x)
        })
        .collect();
    (0..line.len())
        .map(|i| {
            let normal = if i == 0 {
                normals[0]
            } else if i == normals.len() {
                normals[i - 1]
            } else {
                let miter = (normals[i - 1] + normals[i]).normalize();
                // Pieces never turn by more than 90°, so the miter is bounded.
                miter / miter.dot(&normals[i])
            };
            line[i] + normal * distance
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn square(min: f64, max: f64, z: Option<f64>) -> Vec<Position> {
        vec![
            Position::new(min, min, z),
            Position::new(max, min, z),
            Position::new(max, max, z),
            Position::new(min, max, z),
            Position::new(min, min, z),
        ]
    }

    fn polygon(rings: Vec<Vec<Position>>) -> Feature {
        Feature::new(Geometry::Polygon(rings), Map::new())
    }

    fn extruded(lower: f64, upper: f64) -> GeometryOptions {
        GeometryOptions {
            lower_limit: Some(lower),
            upper_limit: Some(upper),
            ..Default::default()
        }
    }

    fn contains_vertex(vertices: &[Point3<f64>], v: &Point3<f64>) -> bool {
        vertices.iter().any(|candidate| (candidate - v).norm() < 1e-6)
    }

    fn upward(triangle: &Triangle) -> bool {
        let normal = (triangle[1] - triangle[0]).cross(&(triangle[2] - triangle[0]));
        normal.dot(&triangle[0].coords) > 0.
    }

    #[test]
    fn test_triangle_count_without_holes() {
        let surface = build(&polygon(vec![square(0., 0.001, Some(0.))]), &GeometryOptions::default()).unwrap();
        assert_eq!(2, surface.len());

        let hexagon: Vec<Position> = (0..=6)
            .map(|k| {
                let angle = 2. * PI * (k % 6) as f64 / 6.;
                Position::new(0.001 * angle.cos(), 0.001 * angle.sin(), None)
            })
            .collect();
        let surface = build(&polygon(vec![hexagon]), &GeometryOptions::default()).unwrap();
        assert_eq!(4, surface.len());
    }

    #[test]
    fn test_footprint_at_geodetic_scale() {
        // A small building footprint, a few meters per side.
        let ring: Vec<Position> = [
            (11.25558, 43.76958),
            (11.25571, 43.76961),
            (11.25568, 43.76972),
            (11.25562, 43.76970),
            (11.25560, 43.76975),
            (11.25553, 43.76973),
        ]
        .iter()
        .map(|&(x, y)| Position::new(x, y, None))
        .collect();
        let feature = polygon(vec![ring]);
        let surface = build(&feature, &GeometryOptions::default()).unwrap();
        assert_eq!(6 - 2, surface.len());
        // Top, six walls of two triangles each, bottom.
        assert_eq!(4 + 12 + 4, build(&feature, &extruded(0., 12.)).unwrap().len());
    }

    #[test]
    fn test_triangle_count_with_holes() {
        let rings = vec![square(0., 0.003, Some(2.)), square(0.001, 0.002, Some(2.))];
        let input: Vec<Point3<f64>> = rings
            .iter()
            .flatten()
            .map(|p| to_ecef(p.x, p.y, 2.))
            .collect();
        let surface = build(&polygon(rings), &GeometryOptions::default()).unwrap();
        // 8 distinct vertices, one hole.
        assert_eq!(8 + 2 * 1 - 2, surface.len());
        for triangle in &surface.triangles {
            assert_eq!(triangle[0], triangle[3]);
            for v in triangle {
                assert!(contains_vertex(&input, v));
            }
        }
    }

    #[test]
    fn test_short_rings_yield_nothing() {
        let ring = vec![Position::new(0., 0., None), Position::new(1., 0., None)];
        assert!(build(&polygon(vec![ring]), &extruded(0., 10.)).unwrap().is_empty());
        assert!(build(&polygon(vec![]), &GeometryOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn test_extrusion() {
        let feature = polygon(vec![square(0., 0.001, None)]);
        let surface = build(&feature, &extruded(0., 10.)).unwrap();
        // Top, four walls of two triangles each, bottom.
        assert_eq!(2 + 8 + 2, surface.len());
        assert!(upward(&surface.triangles[0]) != upward(&surface.triangles[11]));
        assert!(surface.triangles[0][0].coords.norm() > surface.triangles[11][0].coords.norm());

        let options = GeometryOptions {
            remove_bottom_surface: true,
            ..extruded(0., 10.)
        };
        assert_eq!(2 + 8, build(&feature, &options).unwrap().len());
    }

    #[test]
    fn test_inverted_limits_keep_top_first() {
        let feature = polygon(vec![square(0., 0.001, None)]);
        let normal = build(&feature, &extruded(0., 10.)).unwrap();
        let inverted = build(&feature, &extruded(10., 0.)).unwrap();
        assert_eq!(normal, inverted);
    }

    #[test]
    fn test_single_limit_uses_native_height() {
        let feature = polygon(vec![square(0., 0.001, Some(5.))]);
        let options = GeometryOptions {
            upper_limit: Some(20.),
            ..Default::default()
        };
        let surface = build(&feature, &options).unwrap();
        assert_eq!(12, surface.len());
        let bottom = surface.triangles[11][0];
        assert!((bottom.coords.norm() - to_ecef(0., 0., 5.).coords.norm()).abs() < 0.1);
    }

    #[test]
    fn test_degenerate_extrusion_has_no_walls() {
        let feature = polygon(vec![square(0., 0.001, None)]);
        let surface = build(&feature, &extruded(3., 3.)).unwrap();
        assert_eq!(2, surface.len());
    }

    #[test]
    fn test_translate_z() {
        let feature = polygon(vec![square(0., 0.001, Some(1.))]);
        let options = GeometryOptions {
            translate_z: Some(4.),
            ..Default::default()
        };
        let surface = build(&feature, &options).unwrap();
        let expected = to_ecef(0., 0., 5.);
        assert!(surface
            .triangles
            .iter()
            .any(|triangle| contains_vertex(triangle, &expected)));
    }

    #[test]
    fn test_multi_polygon_concatenates() {
        let feature = Feature::new(
            Geometry::MultiPolygon(vec![
                vec![square(0., 0.001, None)],
                vec![square(0.002, 0.003, None)],
            ]),
            Map::new(),
        );
        assert_eq!(24, build(&feature, &extruded(0., 10.)).unwrap().len());
    }

    #[test]
    fn test_points_and_lines_are_buffered() {
        let point = Feature::new(Geometry::Point(Position::new(11., 43., Some(0.))), Map::new());
        let surface = build(&point, &GeometryOptions::default()).unwrap();
        assert_eq!(POINT_BUFFER_SEGMENTS - 2, surface.len());

        let straight = Feature::new(
            Geometry::LineString(vec![
                Position::new(11., 43., None),
                Position::new(11.001, 43., None),
                Position::new(11.002, 43.0001, None),
            ]),
            Map::new(),
        );
        // Six vertices around the buffered line.
        assert_eq!(4, build(&straight, &GeometryOptions::default()).unwrap().len());

        let hairpin = Feature::new(
            Geometry::LineString(vec![
                Position::new(11., 43., None),
                Position::new(11.001, 43., None),
                Position::new(11., 43.0001, None),
            ]),
            Map::new(),
        );
        // Split into two pieces of four vertices each.
        assert_eq!(4, build(&hairpin, &GeometryOptions::default()).unwrap().len());
    }

    #[test]
    fn test_wkt() {
        let a = Point3::new(1., 2., 3.);
        let b = Point3::new(4., 5., 6.);
        let c = Point3::new(7., 8., 9.5);
        let surface = PolyhedralSurface {
            triangles: vec![[a, b, c, a], [a, c, b, a]],
        };
        assert_eq!(
            "POLYHEDRALSURFACE Z (((1 2 3, 4 5 6, 7 8 9.5, 1 2 3)), ((1 2 3, 7 8 9.5, 4 5 6, 1 2 3)))",
            surface.to_wkt()
        );
        assert_eq!(
            "POLYHEDRALSURFACE Z EMPTY",
            PolyhedralSurface::default().to_wkt()
        );
    }
}
