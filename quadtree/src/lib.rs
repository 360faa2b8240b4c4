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

//! Addressing for quadtree tile pyramids. Tiles are addressed by level and
//! (x, y), where x grows towards east and y grows towards south, i.e. the
//! tile (0, 0) of every level touches the north-west corner of the root.

use nalgebra::{Point2, Vector2};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct Rect {
    min: Point2<f64>,
    max: Point2<f64>,
}

impl Rect {
    pub fn new(min: Point2<f64>, max: Point2<f64>) -> Self {
        Rect { min, max }
    }

    /// A rectangle of the given extent around `center`.
    pub fn from_center(center: Point2<f64>, width: f64, height: f64) -> Self {
        let half = Vector2::new(width / 2., height / 2.);
        Rect::new(center - half, center + half)
    }

    pub fn min(&self) -> Point2<f64> {
        self.min
    }

    pub fn max(&self) -> Point2<f64> {
        self.max
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// The center of the box.
    pub fn center(&self) -> Point2<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// The quadrant of this rectangle that belongs to `child_index`.
    pub fn quadrant(&self, child_index: ChildIndex) -> Rect {
        let center = self.center();
        let (min_x, max_x) = if child_index.is_east() {
            (center.x, self.max.x)
        } else {
            (self.min.x, center.x)
        };
        let (min_y, max_y) = if child_index.is_south() {
            (self.min.y, center.y)
        } else {
            (center.y, self.max.y)
        };
        Rect::new(Point2::new(min_x, min_y), Point2::new(max_x, max_y))
    }
}

/// Represents a child of a quadtree tile. Bit 0b01 selects the southern half,
/// bit 0b10 the eastern half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildIndex(u8);

impl ChildIndex {
    /// Children in row-major order: north-west, north-east, south-west, south-east.
    pub const ALL: [ChildIndex; 4] = [
        ChildIndex(0b00),
        ChildIndex(0b10),
        ChildIndex(0b01),
        ChildIndex(0b11),
    ];

    pub fn from_u8(index: u8) -> Self {
        assert!(index < 4);
        ChildIndex(index)
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }

    pub fn is_east(self) -> bool {
        self.0 & 0b10 != 0
    }

    pub fn is_south(self) -> bool {
        self.0 & 0b01 != 0
    }
}

#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SpatialNodeId {
    level: u8,
    x: u64,
    y: u64,
}

impl SpatialNodeId {
    pub fn new(level: u8, x: u64, y: u64) -> Self {
        Self { level, x, y }
    }

    pub fn root() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn x(&self) -> u64 {
        self.x
    }

    pub fn y(&self) -> u64 {
        self.y
    }

    pub fn child(&self, child_index: ChildIndex) -> Self {
        Self::new(
            self.level + 1,
            2 * self.x + u64::from(child_index.is_east()),
            2 * self.y + u64::from(child_index.is_south()),
        )
    }

    /// Returns the parent's id or None if this is the root.
    pub fn parent(&self) -> Option<Self> {
        if self.level == 0 {
            return None;
        }
        Some(Self::new(self.level - 1, self.x / 2, self.y / 2))
    }

    /// The child index of this node in its parent.
    pub fn child_index(&self) -> Option<ChildIndex> {
        if self.level == 0 {
            return None;
        }
        Some(ChildIndex(((self.x & 1) << 1 | (self.y & 1)) as u8))
    }

    /// File name of the content rendered for this tile, e.g. `2_3_1.glb`.
    pub fn content_name(&self, extension: &str) -> String {
        format!("{}.{}", self, extension)
    }
}

/// Formats as `{level}_{y}_{x}`.
impl fmt::Display for SpatialNodeId {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "{}_{}_{}", self.level, self.y, self.x)
    }
}

#[derive(Debug, PartialEq)]
pub enum ParseSpatialNodeIdError {
    MissingPart,
    TooManyParts,
    Int(ParseIntError),
}

impl fmt::Display for ParseSpatialNodeIdError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseSpatialNodeIdError::MissingPart => write!(f, "expected level_y_x"),
            ParseSpatialNodeIdError::TooManyParts => write!(f, "too many parts in tile id"),
            ParseSpatialNodeIdError::Int(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ParseSpatialNodeIdError {}

impl From<ParseIntError> for ParseSpatialNodeIdError {
    fn from(error: ParseIntError) -> Self {
        ParseSpatialNodeIdError::Int(error)
    }
}

impl FromStr for SpatialNodeId {
    type Err = ParseSpatialNodeIdError;

    /// Parses `{level}_{y}_{x}`. No checking is done if x and y fit the level.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let mut parts = name.split('_');
        let mut next = || parts.next().ok_or(ParseSpatialNodeIdError::MissingPart);
        let level = next()?.parse()?;
        let y = next()?.parse()?;
        let x = next()?.parse()?;
        if parts.next().is_some() {
            return Err(ParseSpatialNodeIdError::TooManyParts);
        }
        Ok(Self::new(level, x, y))
    }
}

#[derive(Debug, Clone)]
pub struct Tile {
    pub id: SpatialNodeId,
    pub bounding_rect: Rect,
}

impl Tile {
    pub fn root_with_bounding_rect(rect: Rect) -> Self {
        Tile {
            id: SpatialNodeId::root(),
            bounding_rect: rect,
        }
    }

    pub fn get_child(&self, child_index: ChildIndex) -> Tile {
        Tile {
            id: self.id.child(child_index),
            bounding_rect: self.bounding_rect.quadrant(child_index),
        }
    }

    /// All four children in row-major order.
    pub fn children(&self) -> impl Iterator<Item = Tile> + '_ {
        ChildIndex::ALL.iter().map(move |index| self.get_child(*index))
    }

    /// Returns the level of this tile in the quadtree, with 0 being the root.
    pub fn level(&self) -> u8 {
        self.id.level()
    }
}

#[cfg(test)]
mod tests {
    use super::{ChildIndex, Rect, SpatialNodeId, Tile};
    use nalgebra::Point2;
    use std::str::FromStr;

    #[test]
    fn test_content_name() {
        assert_eq!(
            "2_3_1.glb",
            SpatialNodeId::new(2, 1, 3).content_name("glb")
        );
        assert_eq!("0_0_0", SpatialNodeId::root().to_string());
    }

    #[test]
    fn test_from_str() {
        assert_eq!(
            Ok(SpatialNodeId::new(3, 4, 5)),
            SpatialNodeId::from_str("3_5_4")
        );
        assert!(SpatialNodeId::from_str("3_5").is_err());
        assert!(SpatialNodeId::from_str("3_5_4_1").is_err());
        assert!(SpatialNodeId::from_str("a_5_4").is_err());
    }

    #[test]
    fn test_parent_and_child_index() {
        let id = SpatialNodeId::new(3, 5, 2);
        assert_eq!(Some(SpatialNodeId::new(2, 2, 1)), id.parent());
        assert_eq!(Some(ChildIndex::from_u8(0b10)), id.child_index());
        let parent = id.parent().unwrap();
        assert_eq!(id, parent.child(id.child_index().unwrap()));
        assert_eq!(None, SpatialNodeId::root().parent());
    }

    #[test]
    fn test_children_order_and_extent() {
        let root = Tile::root_with_bounding_rect(Rect::new(
            Point2::new(0., 0.),
            Point2::new(4., 2.),
        ));
        let children: Vec<Tile> = root.children().collect();
        let ids: Vec<String> = children.iter().map(|c| c.id.to_string()).collect();
        assert_eq!(vec!["1_0_0", "1_0_1", "1_1_0", "1_1_1"], ids);

        // The first child is the north-west quadrant.
        assert_eq!(
            Rect::new(Point2::new(0., 1.), Point2::new(2., 2.)),
            children[0].bounding_rect
        );
        // The last child is the south-east quadrant.
        assert_eq!(
            Rect::new(Point2::new(2., 0.), Point2::new(4., 1.)),
            children[3].bounding_rect
        );
    }

    #[test]
    fn test_from_center() {
        let rect = Rect::from_center(Point2::new(10., 20.), 4., 2.);
        assert_eq!(Point2::new(8., 19.), rect.min());
        assert_eq!(Point2::new(12., 21.), rect.max());
        assert_eq!(4., rect.width());
        assert_eq!(2., rect.height());
    }
}
