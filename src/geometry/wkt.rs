//! Well-known text reading and writing

use super::{Geometry, Point};

/// Serialize a geometry as WKT, e.g. `LineString (0 0, 1 1)`
pub fn write(geometry: &Geometry) -> String {
    let suffix = dimension_suffix(geometry);
    let (name, body) = match geometry {
        Geometry::Point(Some(p)) => ("Point", format!("({})", coordinate(p))),
        Geometry::Point(None) => ("Point", String::new()),
        Geometry::LineString(points) => ("LineString", sequence(points)),
        Geometry::Polygon(rings) => ("Polygon", rings_text(rings)),
        Geometry::MultiPoint(points) => (
            "MultiPoint",
            format!(
                "({})",
                points
                    .iter()
                    .map(|p| format!("({})", coordinate(p)))
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        ),
        Geometry::MultiLineString(lines) => ("MultiLineString", rings_text(lines)),
        Geometry::MultiPolygon(polygons) => (
            "MultiPolygon",
            format!(
                "({})",
                polygons
                    .iter()
                    .map(|p| rings_text(p))
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        ),
        Geometry::GeometryCollection(parts) => (
            "GeometryCollection",
            format!(
                "({})",
                parts.iter().map(write).collect::<Vec<_>>().join(",")
            ),
        ),
    };
    if geometry.is_empty() {
        format!("{name}{suffix} EMPTY")
    } else {
        format!("{name}{suffix} {body}")
    }
}

fn dimension_suffix(geometry: &Geometry) -> &'static str {
    match (geometry.has_z(), geometry.has_m()) {
        (true, true) => "ZM",
        (true, false) => "Z",
        (false, true) => "M",
        (false, false) => "",
    }
}

fn coordinate(p: &Point) -> String {
    let mut text = format!("{} {}", p.x, p.y);
    if let Some(z) = p.z {
        text.push_str(&format!(" {z}"));
    }
    if let Some(m) = p.m {
        text.push_str(&format!(" {m}"));
    }
    text
}

fn sequence(points: &[Point]) -> String {
    format!(
        "({})",
        points.iter().map(coordinate).collect::<Vec<_>>().join(", ")
    )
}

fn rings_text(rings: &[Vec<Point>]) -> String {
    format!(
        "({})",
        rings.iter().map(|r| sequence(r)).collect::<Vec<_>>().join(",")
    )
}

/// Parse WKT text into a geometry
pub fn read(text: &str) -> Result<Geometry, String> {
    let mut reader = WktReader {
        input: text.as_bytes(),
        pos: 0,
    };
    let geometry = reader.geometry()?;
    reader.skip_whitespace();
    if reader.pos != reader.input.len() {
        return Err(format!("Unexpected trailing text in WKT '{text}'"));
    }
    Ok(geometry)
}

#[derive(Debug, Clone, Copy, Default)]
struct Dimensions {
    z: bool,
    m: bool,
}

struct WktReader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl WktReader<'_> {
    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<(), String> {
        match self.peek() {
            Some(b) if b == byte => {
                self.pos += 1;
                Ok(())
            }
            Some(b) => Err(format!(
                "Expected '{}' but found '{}' at position {}",
                byte as char, b as char, self.pos
            )),
            None => Err(format!("Expected '{}' but reached end of WKT", byte as char)),
        }
    }

    fn word(&mut self) -> String {
        self.skip_whitespace();
        let start = self.pos;
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_alphabetic() {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).to_ascii_uppercase()
    }

    fn geometry(&mut self) -> Result<Geometry, String> {
        let mut keyword = self.word();
        let mut dims = Dimensions::default();
        for (suffix, z, m) in [("ZM", true, true), ("Z", true, false), ("M", false, true)] {
            if keyword.len() > suffix.len() && keyword.ends_with(suffix) {
                keyword.truncate(keyword.len() - suffix.len());
                dims = Dimensions { z, m };
                break;
            }
        }

        let save = self.pos;
        match self.word().as_str() {
            "ZM" => dims = Dimensions { z: true, m: true },
            "Z" => dims = Dimensions { z: true, m: false },
            "M" => dims = Dimensions { z: false, m: true },
            "EMPTY" => return self.empty(&keyword),
            _ => self.pos = save,
        }
        let save = self.pos;
        if self.word() == "EMPTY" {
            return self.empty(&keyword);
        }
        self.pos = save;

        match keyword.as_str() {
            "POINT" => {
                self.expect(b'(')?;
                let point = self.point(dims)?;
                self.expect(b')')?;
                Ok(Geometry::Point(Some(point)))
            }
            "LINESTRING" => Ok(Geometry::LineString(self.point_list(dims)?)),
            "POLYGON" => Ok(Geometry::Polygon(self.ring_list(dims)?)),
            "MULTIPOINT" => {
                self.expect(b'(')?;
                let mut points = Vec::new();
                loop {
                    if self.peek() == Some(b'(') {
                        self.pos += 1;
                        points.push(self.point(dims)?);
                        self.expect(b')')?;
                    } else {
                        points.push(self.point(dims)?);
                    }
                    if self.peek() == Some(b',') {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                self.expect(b')')?;
                Ok(Geometry::MultiPoint(points))
            }
            "MULTILINESTRING" => Ok(Geometry::MultiLineString(self.ring_list(dims)?)),
            "MULTIPOLYGON" => {
                self.expect(b'(')?;
                let mut polygons = vec![self.ring_list(dims)?];
                while self.peek() == Some(b',') {
                    self.pos += 1;
                    polygons.push(self.ring_list(dims)?);
                }
                self.expect(b')')?;
                Ok(Geometry::MultiPolygon(polygons))
            }
            "GEOMETRYCOLLECTION" => {
                self.expect(b'(')?;
                let mut parts = vec![self.geometry()?];
                while self.peek() == Some(b',') {
                    self.pos += 1;
                    parts.push(self.geometry()?);
                }
                self.expect(b')')?;
                Ok(Geometry::GeometryCollection(parts))
            }
            other => Err(format!("Unknown WKT geometry type '{other}'")),
        }
    }

    fn empty(&self, keyword: &str) -> Result<Geometry, String> {
        match keyword {
            "LINESTRING" => Ok(Geometry::LineString(Vec::new())),
            "POLYGON" => Ok(Geometry::Polygon(Vec::new())),
            "POINT" => Ok(Geometry::Point(None)),
            "MULTIPOINT" => Ok(Geometry::MultiPoint(Vec::new())),
            "MULTILINESTRING" => Ok(Geometry::MultiLineString(Vec::new())),
            "MULTIPOLYGON" => Ok(Geometry::MultiPolygon(Vec::new())),
            "GEOMETRYCOLLECTION" => Ok(Geometry::GeometryCollection(Vec::new())),
            other => Err(format!("Unknown WKT geometry type '{other}'")),
        }
    }

    fn number(&mut self) -> Result<f64, String> {
        self.skip_whitespace();
        let start = self.pos;
        while self.pos < self.input.len()
            && matches!(self.input[self.pos], b'0'..=b'9' | b'.' | b'-' | b'+' | b'e' | b'E')
        {
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.input[start..self.pos]);
        text.parse::<f64>()
            .map_err(|_| format!("Invalid coordinate '{text}' at position {start}"))
    }

    fn point(&mut self, dims: Dimensions) -> Result<Point, String> {
        let mut ordinates = vec![self.number()?, self.number()?];
        while matches!(self.peek(), Some(b'0'..=b'9' | b'-' | b'+' | b'.')) {
            ordinates.push(self.number()?);
        }
        let mut point = Point::new(ordinates[0], ordinates[1]);
        match (ordinates.len(), dims.z, dims.m) {
            (2, _, _) => {}
            (3, false, true) => point.m = Some(ordinates[2]),
            (3, _, _) => point.z = Some(ordinates[2]),
            (4, _, _) => {
                point.z = Some(ordinates[2]);
                point.m = Some(ordinates[3]);
            }
            (n, _, _) => return Err(format!("Coordinate has {n} ordinates")),
        }
        Ok(point)
    }

    fn point_list(&mut self, dims: Dimensions) -> Result<Vec<Point>, String> {
        self.expect(b'(')?;
        let mut points = vec![self.point(dims)?];
        while self.peek() == Some(b',') {
            self.pos += 1;
            points.push(self.point(dims)?);
        }
        self.expect(b')')?;
        Ok(points)
    }

    fn ring_list(&mut self, dims: Dimensions) -> Result<Vec<Vec<Point>>, String> {
        self.expect(b'(')?;
        let mut rings = vec![self.point_list(dims)?];
        while self.peek() == Some(b',') {
            self.pos += 1;
            rings.push(self.point_list(dims)?);
        }
        self.expect(b')')?;
        Ok(rings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("POINT(1 2)", "Point (1 2)")]
    #[case("point z (1 2 3)", "PointZ (1 2 3)")]
    #[case("PointM (1 2 5)", "PointM (1 2 5)")]
    #[case("LINESTRING (0 0, 1.5 1)", "LineString (0 0, 1.5 1)")]
    #[case(
        "POLYGON((0 0,1 0,1 1,0 0))",
        "Polygon ((0 0, 1 0, 1 1, 0 0))"
    )]
    #[case("MULTIPOINT(1 2, 3 4)", "MultiPoint ((1 2),(3 4))")]
    #[case("LINESTRING EMPTY", "LineString EMPTY")]
    #[case("POINT EMPTY", "Point EMPTY")]
    #[case("MULTIPOINT EMPTY", "MultiPoint EMPTY")]
    fn test_normalised_output(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(read(input).unwrap().to_wkt(), expected);
    }

    #[test]
    fn test_empty_point_keeps_its_type() {
        let empty = read("Point EMPTY").unwrap();
        assert_eq!(empty, Geometry::Point(None));
        assert!(empty.is_empty());
        assert!(empty.vertices().is_empty());
        assert_eq!(read(&empty.to_wkt()).unwrap(), empty);
    }

    #[test]
    fn test_rejects_unknown_type() {
        assert!(read("CIRCLE(0 0, 1)").is_err());
        assert!(read("POINT(1 2").is_err());
    }
}
