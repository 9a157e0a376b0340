//! Minimal planar geometry model
//!
//! Covers what the expression functions need: vertex access, bounding boxes,
//! planar measurements and WKT conversion. Spatial predicates and
//! constructive operations (buffer, intersection, ...) live in a geometry
//! engine and are not part of this crate.

pub mod measure;
pub mod wkt;

pub use measure::{AreaUnit, DistanceArea, DistanceUnit, PlanarDistanceArea};

/// A coordinate with optional z and m ordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
    pub m: Option<f64>,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            m: None,
        }
    }

    pub fn with_z(mut self, z: f64) -> Self {
        self.z = Some(z);
        self
    }

    pub fn with_m(mut self, m: f64) -> Self {
        self.m = Some(m);
        self
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }

    fn same_xy(&self, other: &Point) -> bool {
        self.x == other.x && self.y == other.y
    }
}

/// Axis-aligned bounding rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl Rect {
    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    pub fn to_geometry(&self) -> Geometry {
        Geometry::Polygon(vec![vec![
            Point::new(self.x_min, self.y_min),
            Point::new(self.x_max, self.y_min),
            Point::new(self.x_max, self.y_max),
            Point::new(self.x_min, self.y_max),
            Point::new(self.x_min, self.y_min),
        ]])
    }
}

/// Broad geometry family, as used by accessors that only apply to one family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryType {
    Point,
    Line,
    Polygon,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// `None` is `POINT EMPTY`
    Point(Option<Point>),
    LineString(Vec<Point>),
    /// Exterior ring first, then holes
    Polygon(Vec<Vec<Point>>),
    MultiPoint(Vec<Point>),
    MultiLineString(Vec<Vec<Point>>),
    MultiPolygon(Vec<Vec<Vec<Point>>>),
    GeometryCollection(Vec<Geometry>),
}

impl From<Point> for Geometry {
    fn from(point: Point) -> Self {
        Geometry::Point(Some(point))
    }
}

impl Geometry {
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Point(_) | Geometry::MultiPoint(_) => GeometryType::Point,
            Geometry::LineString(_) | Geometry::MultiLineString(_) => GeometryType::Line,
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => GeometryType::Polygon,
            Geometry::GeometryCollection(_) => GeometryType::Unknown,
        }
    }

    pub fn is_multipart(&self) -> bool {
        matches!(
            self,
            Geometry::MultiPoint(_)
                | Geometry::MultiLineString(_)
                | Geometry::MultiPolygon(_)
                | Geometry::GeometryCollection(_)
        )
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Geometry::Point(point) => point.is_none(),
            Geometry::LineString(points) | Geometry::MultiPoint(points) => points.is_empty(),
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => rings.is_empty(),
            Geometry::MultiPolygon(polygons) => polygons.is_empty(),
            Geometry::GeometryCollection(parts) => parts.iter().all(Geometry::is_empty),
        }
    }

    pub fn has_z(&self) -> bool {
        self.vertices().first().is_some_and(|p| p.z.is_some())
    }

    pub fn has_m(&self) -> bool {
        self.vertices().first().is_some_and(|p| p.m.is_some())
    }

    /// Every vertex in storage order
    pub fn vertices(&self) -> Vec<Point> {
        match self {
            Geometry::Point(p) => p.iter().copied().collect(),
            Geometry::LineString(points) | Geometry::MultiPoint(points) => points.clone(),
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                rings.iter().flatten().copied().collect()
            }
            Geometry::MultiPolygon(polygons) => {
                polygons.iter().flatten().flatten().copied().collect()
            }
            Geometry::GeometryCollection(parts) => {
                parts.iter().flat_map(Geometry::vertices).collect()
            }
        }
    }

    pub fn num_points(&self) -> usize {
        self.vertices().len()
    }

    pub fn num_geometries(&self) -> usize {
        match self {
            Geometry::MultiPoint(points) => points.len(),
            Geometry::MultiLineString(lines) => lines.len(),
            Geometry::MultiPolygon(polygons) => polygons.len(),
            Geometry::GeometryCollection(parts) => parts.len(),
            _ if self.is_empty() => 0,
            _ => 1,
        }
    }

    /// Ring count for polygonal geometries
    pub fn num_rings(&self) -> Option<usize> {
        match self {
            Geometry::Polygon(rings) => Some(rings.len()),
            Geometry::MultiPolygon(polygons) => Some(polygons.iter().map(Vec::len).sum()),
            Geometry::GeometryCollection(parts) => {
                let counts: Vec<usize> = parts.iter().filter_map(Geometry::num_rings).collect();
                (!counts.is_empty()).then(|| counts.iter().sum())
            }
            _ => None,
        }
    }

    pub fn num_interior_rings(&self) -> Option<usize> {
        match self {
            Geometry::Polygon(rings) => Some(rings.len().saturating_sub(1)),
            _ => None,
        }
    }

    /// Part `index` (0-based) of a collection, or the geometry itself for index 0
    pub fn geometry_n(&self, index: usize) -> Option<Geometry> {
        match self {
            Geometry::MultiPoint(points) => points.get(index).copied().map(Geometry::from),
            Geometry::MultiLineString(lines) => lines.get(index).cloned().map(Geometry::LineString),
            Geometry::MultiPolygon(polygons) => {
                polygons.get(index).cloned().map(Geometry::Polygon)
            }
            Geometry::GeometryCollection(parts) => parts.get(index).cloned(),
            _ => (index == 0).then(|| self.clone()),
        }
    }

    pub fn exterior_ring(&self) -> Option<Geometry> {
        match self {
            Geometry::Polygon(rings) => rings.first().cloned().map(Geometry::LineString),
            _ => None,
        }
    }

    /// Interior ring `index` (0-based)
    pub fn interior_ring(&self, index: usize) -> Option<Geometry> {
        match self {
            Geometry::Polygon(rings) => rings.get(index + 1).cloned().map(Geometry::LineString),
            _ => None,
        }
    }

    /// Whether a line is closed; `None` for non-line geometries
    pub fn is_closed(&self) -> Option<bool> {
        fn ring_closed(points: &[Point]) -> bool {
            match (points.first(), points.last()) {
                (Some(first), Some(last)) => first.same_xy(last),
                _ => false,
            }
        }

        match self {
            Geometry::LineString(points) => Some(ring_closed(points)),
            Geometry::MultiLineString(lines) => {
                Some(!lines.is_empty() && lines.iter().all(|l| ring_closed(l)))
            }
            _ => None,
        }
    }

    pub fn bounding_box(&self) -> Option<Rect> {
        let vertices = self.vertices();
        let first = vertices.first()?;
        let mut rect = Rect {
            x_min: first.x,
            y_min: first.y,
            x_max: first.x,
            y_max: first.y,
        };
        for p in &vertices[1..] {
            rect.x_min = rect.x_min.min(p.x);
            rect.y_min = rect.y_min.min(p.y);
            rect.x_max = rect.x_max.max(p.x);
            rect.y_max = rect.y_max.max(p.y);
        }
        Some(rect)
    }

    /// Planar area; zero for non-polygonal geometries
    pub fn area(&self) -> f64 {
        match self {
            Geometry::Polygon(rings) => polygon_area(rings),
            Geometry::MultiPolygon(polygons) => polygons.iter().map(|p| polygon_area(p)).sum(),
            Geometry::GeometryCollection(parts) => parts.iter().map(Geometry::area).sum(),
            _ => 0.0,
        }
    }

    /// Planar length of linear geometries; zero for points and polygons
    pub fn length(&self) -> f64 {
        match self {
            Geometry::LineString(points) => line_length(points),
            Geometry::MultiLineString(lines) => lines.iter().map(|l| line_length(l)).sum(),
            Geometry::GeometryCollection(parts) => parts.iter().map(Geometry::length).sum(),
            _ => 0.0,
        }
    }

    /// Planar perimeter of polygonal geometries, all rings included
    pub fn perimeter(&self) -> f64 {
        match self {
            Geometry::Polygon(rings) => rings.iter().map(|r| line_length(r)).sum(),
            Geometry::MultiPolygon(polygons) => polygons
                .iter()
                .flat_map(|p| p.iter())
                .map(|r| line_length(r))
                .sum(),
            Geometry::GeometryCollection(parts) => parts.iter().map(Geometry::perimeter).sum(),
            _ => 0.0,
        }
    }

    /// Planar centroid, weighted by area, then length, then vertex count
    pub fn centroid(&self) -> Option<Point> {
        if self.is_empty() {
            return None;
        }
        let area = self.area();
        if area > 0.0 {
            let (mut cx, mut cy) = (0.0, 0.0);
            for rings in self.polygons() {
                for (index, ring) in rings.iter().enumerate() {
                    let (ring_area, rx, ry) = ring_centroid(ring);
                    let sign = if index == 0 { 1.0 } else { -1.0 };
                    cx += sign * ring_area * rx;
                    cy += sign * ring_area * ry;
                }
            }
            return Some(Point::new(cx / area, cy / area));
        }
        let length = self.length() + self.perimeter();
        if length > 0.0 {
            let (mut cx, mut cy) = (0.0, 0.0);
            for line in self.lines() {
                for pair in line.windows(2) {
                    let segment = pair[0].distance(&pair[1]);
                    cx += segment * (pair[0].x + pair[1].x) / 2.0;
                    cy += segment * (pair[0].y + pair[1].y) / 2.0;
                }
            }
            return Some(Point::new(cx / length, cy / length));
        }
        let vertices = self.vertices();
        let count = vertices.len() as f64;
        let (sx, sy) = vertices
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(Point::new(sx / count, sy / count))
    }

    pub fn reversed(&self) -> Geometry {
        fn rev(points: &[Point]) -> Vec<Point> {
            points.iter().rev().copied().collect()
        }
        match self {
            Geometry::Point(_) | Geometry::MultiPoint(_) => self.clone(),
            Geometry::LineString(points) => Geometry::LineString(rev(points)),
            Geometry::Polygon(rings) => Geometry::Polygon(rings.iter().map(|r| rev(r)).collect()),
            Geometry::MultiLineString(lines) => {
                Geometry::MultiLineString(lines.iter().map(|l| rev(l)).collect())
            }
            Geometry::MultiPolygon(polygons) => Geometry::MultiPolygon(
                polygons
                    .iter()
                    .map(|p| p.iter().map(|r| rev(r)).collect())
                    .collect(),
            ),
            Geometry::GeometryCollection(parts) => {
                Geometry::GeometryCollection(parts.iter().map(Geometry::reversed).collect())
            }
        }
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Geometry {
        self.map_points(&|p| Point {
            x: p.x + dx,
            y: p.y + dy,
            ..p
        })
    }

    /// Coordinates rounded to `precision` decimals
    pub fn rounded(&self, precision: i32) -> Geometry {
        let factor = 10f64.powi(precision.clamp(0, 15));
        let round = |v: f64| (v * factor).round() / factor;
        self.map_points(&|p| Point {
            x: round(p.x),
            y: round(p.y),
            z: p.z.map(round),
            m: p.m.map(round),
        })
    }

    fn map_points(&self, f: &dyn Fn(Point) -> Point) -> Geometry {
        let line = |points: &Vec<Point>| points.iter().map(|p| f(*p)).collect::<Vec<_>>();
        match self {
            Geometry::Point(p) => Geometry::Point(p.map(f)),
            Geometry::LineString(points) => Geometry::LineString(line(points)),
            Geometry::MultiPoint(points) => Geometry::MultiPoint(line(points)),
            Geometry::Polygon(rings) => Geometry::Polygon(rings.iter().map(line).collect()),
            Geometry::MultiLineString(lines) => {
                Geometry::MultiLineString(lines.iter().map(line).collect())
            }
            Geometry::MultiPolygon(polygons) => Geometry::MultiPolygon(
                polygons
                    .iter()
                    .map(|p| p.iter().map(line).collect())
                    .collect(),
            ),
            Geometry::GeometryCollection(parts) => {
                Geometry::GeometryCollection(parts.iter().map(|g| g.map_points(f)).collect())
            }
        }
    }

    fn polygons(&self) -> Vec<&Vec<Vec<Point>>> {
        match self {
            Geometry::Polygon(rings) => vec![rings],
            Geometry::MultiPolygon(polygons) => polygons.iter().collect(),
            Geometry::GeometryCollection(parts) => {
                parts.iter().flat_map(Geometry::polygons).collect()
            }
            _ => Vec::new(),
        }
    }

    fn lines(&self) -> Vec<&Vec<Point>> {
        match self {
            Geometry::LineString(points) => vec![points],
            Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => lines.iter().collect(),
            Geometry::MultiPolygon(polygons) => polygons.iter().flatten().collect(),
            Geometry::GeometryCollection(parts) => parts.iter().flat_map(Geometry::lines).collect(),
            _ => Vec::new(),
        }
    }

    /// Combine geometries into the matching multi-part type, or a collection
    /// when their families differ.
    pub fn collect(geometries: Vec<Geometry>) -> Option<Geometry> {
        let first_type = geometries.first()?.geometry_type();
        let homogeneous = geometries.iter().all(|g| g.geometry_type() == first_type);
        if !homogeneous || first_type == GeometryType::Unknown {
            return Some(Geometry::GeometryCollection(geometries));
        }
        let collected = match first_type {
            GeometryType::Point => {
                Geometry::MultiPoint(geometries.iter().flat_map(Geometry::vertices).collect())
            }
            GeometryType::Line => Geometry::MultiLineString(
                geometries
                    .iter()
                    .flat_map(|g| g.lines().into_iter().cloned())
                    .collect(),
            ),
            GeometryType::Polygon => Geometry::MultiPolygon(
                geometries
                    .iter()
                    .flat_map(|g| g.polygons().into_iter().cloned())
                    .collect(),
            ),
            GeometryType::Unknown => Geometry::GeometryCollection(geometries),
        };
        Some(collected)
    }

    pub fn to_wkt(&self) -> String {
        wkt::write(self)
    }

    pub fn from_wkt(text: &str) -> Result<Geometry, String> {
        wkt::read(text)
    }
}

fn line_length(points: &[Point]) -> f64 {
    points.windows(2).map(|pair| pair[0].distance(&pair[1])).sum()
}

/// Signed shoelace area and centroid of one ring
fn ring_centroid(ring: &[Point]) -> (f64, f64, f64) {
    let mut twice_area = 0.0;
    let (mut cx, mut cy) = (0.0, 0.0);
    for pair in ring.windows(2) {
        let cross = pair[0].x * pair[1].y - pair[1].x * pair[0].y;
        twice_area += cross;
        cx += (pair[0].x + pair[1].x) * cross;
        cy += (pair[0].y + pair[1].y) * cross;
    }
    if twice_area == 0.0 {
        return (0.0, 0.0, 0.0);
    }
    let area = twice_area / 2.0;
    (area.abs(), cx / (3.0 * twice_area), cy / (3.0 * twice_area))
}

fn polygon_area(rings: &[Vec<Point>]) -> f64 {
    rings
        .iter()
        .enumerate()
        .map(|(index, ring)| {
            let (area, _, _) = ring_centroid(ring);
            if index == 0 { area } else { -area }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Geometry {
        Geometry::from_wkt("POLYGON((0 0, 4 0, 4 4, 0 4, 0 0))").unwrap()
    }

    #[test]
    fn test_polygon_measurements() {
        let g = square();
        assert_eq!(g.area(), 16.0);
        assert_eq!(g.perimeter(), 16.0);
        assert_eq!(g.length(), 0.0);
        assert_eq!(g.centroid(), Some(Point::new(2.0, 2.0)));
    }

    #[test]
    fn test_polygon_with_hole() {
        let g = Geometry::from_wkt(
            "POLYGON((0 0, 10 0, 10 10, 0 10, 0 0),(2 2, 4 2, 4 4, 2 4, 2 2))",
        )
        .unwrap();
        assert_eq!(g.area(), 96.0);
        assert_eq!(g.num_interior_rings(), Some(1));
        assert_eq!(g.num_rings(), Some(2));
    }

    #[test]
    fn test_line_accessors() {
        let g = Geometry::from_wkt("LINESTRING(0 0, 3 4, 3 0)").unwrap();
        assert_eq!(g.length(), 9.0);
        assert_eq!(g.is_closed(), Some(false));
        assert_eq!(g.num_points(), 3);
        assert_eq!(
            g.reversed(),
            Geometry::from_wkt("LINESTRING(3 0, 3 4, 0 0)").unwrap()
        );
    }

    #[test]
    fn test_bounding_box() {
        let rect = Geometry::from_wkt("LINESTRING(-1 2, 3 -4)")
            .unwrap()
            .bounding_box()
            .unwrap();
        assert_eq!((rect.width(), rect.height()), (4.0, 6.0));
    }

    #[test]
    fn test_collect_points() {
        let collected = Geometry::collect(vec![
            Geometry::from(Point::new(1.0, 2.0)),
            Geometry::from(Point::new(3.0, 4.0)),
        ])
        .unwrap();
        assert_eq!(collected.to_wkt(), "MultiPoint ((1 2),(3 4))");
    }
}
