//! Raster to polygon conversion
//!
//! Groups connected cells of equal value into polygons that follow cell
//! edges exactly. Boundaries are traced as directed edges with the region on
//! the right (screen orientation, rows growing downward), which makes outer
//! rings positive and holes negative under the shoelace formula in grid
//! space. Output polygons are reoriented in map space so exterior rings run
//! counter-clockwise and holes clockwise, as GeoJSON expects, whatever the
//! sign of the pixel height.

use geo::orient::{Direction, Orient};
use geo::{Contains, Coord, LineString, MultiPolygon, Point, Polygon};
use std::collections::{HashMap, VecDeque};
use waterbodies_core::raster::Raster;
use waterbodies_core::vector::{Feature, FeatureCollection};
use waterbodies_core::{Algorithm, Error, RasterElement, Result};

/// Cell adjacency used to group cells into polygons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// Edge neighbours only
    #[default]
    Four,
    /// Edge and corner neighbours
    Eight,
}

impl Connectivity {
    fn offsets(&self) -> &'static [(isize, isize)] {
        const FOUR: [(isize, isize); 4] = [(-1, 0), (0, 1), (1, 0), (0, -1)];
        const EIGHT: [(isize, isize); 8] = [
            (-1, 0), (-1, 1), (0, 1), (1, 1), (1, 0), (1, -1), (0, -1), (-1, -1),
        ];
        match self {
            Connectivity::Four => &FOUR,
            Connectivity::Eight => &EIGHT,
        }
    }
}

impl std::str::FromStr for Connectivity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "4" => Ok(Connectivity::Four),
            "8" => Ok(Connectivity::Eight),
            _ => Err(Error::InvalidParameter {
                name: "connectivity",
                value: s.to_string(),
                reason: "must be 4 or 8".into(),
            }),
        }
    }
}

/// Parameters for polygonizing a raster
#[derive(Debug, Clone)]
pub struct PolygonizeParams {
    /// Attribute column receiving each polygon's cell value
    pub attribute_col: String,
    /// Cell adjacency
    pub connectivity: Connectivity,
    /// Cells where the mask is 0 produce no polygons
    pub mask: Option<Raster<u8>>,
}

impl Default for PolygonizeParams {
    fn default() -> Self {
        Self {
            attribute_col: "attribute".to_string(),
            connectivity: Connectivity::Four,
            mask: None,
        }
    }
}

/// Polygonize algorithm
#[derive(Debug, Clone, Default)]
pub struct Polygonize;

impl Algorithm for Polygonize {
    type Input = Raster<f64>;
    type Output = FeatureCollection;
    type Params = PolygonizeParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Polygonize"
    }

    fn description(&self) -> &'static str {
        "Vectorize connected regions of equal value into polygons"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        polygonize(&input, &params)
    }
}

/// One connected region of equal-valued cells
pub(crate) struct Region<T> {
    pub value: T,
    pub cells: Vec<(usize, usize)>,
}

/// Label connected regions of valid, equal-valued cells in row-major order
/// of their first cell.
pub(crate) fn label_regions<T: RasterElement>(
    raster: &Raster<T>,
    mask: Option<&Raster<u8>>,
    connectivity: Connectivity,
) -> Result<(Vec<u32>, Vec<Region<T>>)> {
    if let Some(m) = mask {
        raster.ensure_same_shape(m)?;
    }

    let (rows, cols) = raster.shape();
    let valid = |row: usize, col: usize| -> bool {
        let v = unsafe { raster.get_unchecked(row, col) };
        let masked = mask.is_some_and(|m| unsafe { m.get_unchecked(row, col) } == 0);
        !raster.is_nodata(v) && !masked
    };

    let mut labels = vec![0u32; rows * cols];
    let mut regions = Vec::new();
    let mut queue: VecDeque<(usize, usize)> = VecDeque::new();

    for row in 0..rows {
        for col in 0..cols {
            if labels[row * cols + col] != 0 || !valid(row, col) {
                continue;
            }

            let value = unsafe { raster.get_unchecked(row, col) };
            let label = regions.len() as u32 + 1;
            let mut cells = Vec::new();
            labels[row * cols + col] = label;
            queue.push_back((row, col));

            while let Some((r, c)) = queue.pop_front() {
                cells.push((r, c));
                for &(dr, dc) in connectivity.offsets() {
                    let nr = r as isize + dr;
                    let nc = c as isize + dc;
                    if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                        continue;
                    }
                    let (nr, nc) = (nr as usize, nc as usize);
                    let idx = nr * cols + nc;
                    if labels[idx] != 0 || !valid(nr, nc) {
                        continue;
                    }
                    if unsafe { raster.get_unchecked(nr, nc) } == value {
                        labels[idx] = label;
                        queue.push_back((nr, nc));
                    }
                }
            }

            regions.push(Region { value, cells });
        }
    }

    Ok((labels, regions))
}

// Directions in grid space: 0 = east, 1 = south, 2 = west, 3 = north.
struct Edge {
    from: (usize, usize),
    to: (usize, usize),
    dir: u8,
}

/// Trace the boundary rings of one labelled region as (col, row) corner
/// coordinates, collinear vertices removed and rings closed.
fn trace_rings(
    labels: &[u32],
    rows: usize,
    cols: usize,
    label: u32,
    cells: &[(usize, usize)],
    connectivity: Connectivity,
) -> Vec<Vec<(usize, usize)>> {
    let inside = |r: isize, c: isize| -> bool {
        r >= 0
            && c >= 0
            && (r as usize) < rows
            && (c as usize) < cols
            && labels[r as usize * cols + c as usize] == label
    };

    let mut edges: Vec<Edge> = Vec::new();
    for &(r, c) in cells {
        let (ri, ci) = (r as isize, c as isize);
        if !inside(ri - 1, ci) {
            edges.push(Edge { from: (c, r), to: (c + 1, r), dir: 0 });
        }
        if !inside(ri, ci + 1) {
            edges.push(Edge { from: (c + 1, r), to: (c + 1, r + 1), dir: 1 });
        }
        if !inside(ri + 1, ci) {
            edges.push(Edge { from: (c + 1, r + 1), to: (c, r + 1), dir: 2 });
        }
        if !inside(ri, ci - 1) {
            edges.push(Edge { from: (c, r + 1), to: (c, r), dir: 3 });
        }
    }

    let mut outgoing: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
    for (i, e) in edges.iter().enumerate() {
        outgoing.entry(e.from).or_default().push(i);
    }

    // At a vertex shared by two diagonal cells of the region, four-connected
    // regions wrap tightly (right turn), eight-connected ones cross (left turn).
    let preferred_turn = match connectivity {
        Connectivity::Four => 1,
        Connectivity::Eight => 3,
    };

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for start in 0..edges.len() {
        if used[start] {
            continue;
        }

        let mut path: Vec<(usize, usize, u8)> = Vec::new();
        let mut current = start;
        loop {
            used[current] = true;
            let edge = &edges[current];
            path.push((edge.from.0, edge.from.1, edge.dir));

            let candidates = outgoing.get(&edge.to).map(Vec::as_slice).unwrap_or(&[]);
            let next = match candidates {
                [] => break,
                [only] => *only,
                [first, ..] => {
                    let wanted = (edge.dir + preferred_turn) % 4;
                    candidates
                        .iter()
                        .copied()
                        .find(|&i| edges[i].dir == wanted)
                        .unwrap_or(*first)
                }
            };

            if used[next] {
                break;
            }
            current = next;
        }

        // Keep only vertices where the direction changes
        let n = path.len();
        let mut ring: Vec<(usize, usize)> = (0..n)
            .filter(|&i| path[i].2 != path[(i + n - 1) % n].2)
            .map(|i| (path[i].0, path[i].1))
            .collect();
        if let Some(&first) = ring.first() {
            ring.push(first);
        }
        if ring.len() >= 4 {
            rings.push(ring);
        }
    }

    rings
}

fn signed_area(ring: &[(usize, usize)]) -> f64 {
    ring.windows(2)
        .map(|w| {
            let (x0, y0) = (w[0].0 as f64, w[0].1 as f64);
            let (x1, y1) = (w[1].0 as f64, w[1].1 as f64);
            x0 * y1 - x1 * y0
        })
        .sum::<f64>()
        / 2.0
}

fn to_linestring<T: RasterElement>(raster: &Raster<T>, ring: &[(usize, usize)]) -> LineString<f64> {
    let transform = raster.transform();
    LineString::from(
        ring.iter()
            .map(|&(c, r)| {
                let (x, y) = transform.pixel_to_geo_corner(c, r);
                Coord { x, y }
            })
            .collect::<Vec<_>>(),
    )
}

/// Build the polygon geometry of a region from its traced rings.
fn assemble<T: RasterElement>(
    raster: &Raster<T>,
    rings: Vec<Vec<(usize, usize)>>,
) -> Option<geo::Geometry<f64>> {
    let (exteriors, holes): (Vec<_>, Vec<_>) =
        rings.into_iter().partition(|ring| signed_area(ring) > 0.0);

    let mut polygons: Vec<Polygon<f64>> = exteriors
        .iter()
        .map(|ring| Polygon::new(to_linestring(raster, ring), vec![]))
        .collect();

    for hole in &holes {
        let ls = to_linestring(raster, hole);
        let target = if polygons.len() == 1 {
            Some(0)
        } else {
            // Probe with the centre of the hole's first edge; it never sits on
            // the exterior ring of the owning polygon.
            let probe = Point::new(
                (ls.0[0].x + ls.0[1].x) / 2.0,
                (ls.0[0].y + ls.0[1].y) / 2.0,
            );
            polygons
                .iter()
                .position(|p| Polygon::new(p.exterior().clone(), vec![]).contains(&probe))
        };
        if let Some(i) = target {
            polygons[i].interiors_push(ls);
        }
    }

    let mut polygons: Vec<Polygon<f64>> = polygons.iter().map(|p| p.orient(Direction::Default)).collect();
    match polygons.len() {
        0 => None,
        1 => polygons.pop().map(geo::Geometry::Polygon),
        _ => Some(geo::Geometry::MultiPolygon(MultiPolygon::new(polygons))),
    }
}

/// Vectorize a raster into polygons.
///
/// Every connected region of equal, valid cells becomes one feature whose
/// `attribute_col` holds the region's value. Nodata cells and cells masked
/// out produce nothing. The output carries the raster's CRS.
///
/// # Arguments
/// * `raster` - Input raster
/// * `params` - Attribute column, connectivity and optional mask
pub fn polygonize<T: RasterElement>(raster: &Raster<T>, params: &PolygonizeParams) -> Result<FeatureCollection> {
    let (rows, cols) = raster.shape();
    let (labels, regions) = label_regions(raster, params.mask.as_ref(), params.connectivity)?;

    let mut out = FeatureCollection::with_columns([params.attribute_col.as_str()]);
    out.set_crs(raster.crs().cloned());

    for (i, region) in regions.iter().enumerate() {
        let rings = trace_rings(&labels, rows, cols, i as u32 + 1, &region.cells, params.connectivity);
        let Some(geometry) = assemble(raster, rings) else {
            continue;
        };
        let value = region.value.to_f64().unwrap_or(f64::NAN);
        out.push(Feature::new(geometry).with_property(params.attribute_col.as_str(), value));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::{Area, Geometry, Winding};
    use waterbodies_core::vector::{AttributeTable, AttributeValue};
    use waterbodies_core::GeoTransform;

    fn grid(rows: usize, cols: usize, cells: &[(usize, usize)]) -> Raster<u8> {
        let mut r = Raster::new(rows, cols);
        r.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        for &(row, col) in cells {
            r.set(row, col, 1).unwrap();
        }
        r
    }

    fn polygons_with_value(fc: &FeatureCollection, value: f64) -> Vec<&Geometry<f64>> {
        fc.iter()
            .filter(|f| f.get_property("attribute") == Some(&AttributeValue::Float(value)))
            .filter_map(|f| f.geometry.as_ref())
            .collect()
    }

    #[test]
    fn uniform_raster_is_one_square() {
        let r = grid(3, 3, &[]);
        let fc = polygonize(&r, &PolygonizeParams::default()).unwrap();
        assert_eq!(fc.len(), 1);
        match fc.features()[0].geometry.as_ref().unwrap() {
            Geometry::Polygon(p) => {
                assert_eq!(p.exterior().0.len(), 5);
                assert_relative_eq!(p.signed_area(), 9.0);
            }
            g => panic!("expected polygon, got {:?}", g),
        }
    }

    #[test]
    fn rings_follow_geojson_winding() {
        let ones: Vec<_> = (0..3)
            .flat_map(|r| (0..3).map(move |c| (r, c)))
            .filter(|&rc| rc != (1, 1))
            .collect();
        let north_up = grid(3, 3, &ones);
        let mut south_up = north_up.clone();
        south_up.set_transform(GeoTransform::new(0.0, 0.0, 1.0, 1.0));

        for r in [north_up, south_up] {
            let fc = polygonize(&r, &PolygonizeParams::default()).unwrap();
            for geometry in fc.iter().filter_map(|f| f.geometry.as_ref()) {
                let Geometry::Polygon(p) = geometry else {
                    panic!("expected polygon, got {:?}", geometry);
                };
                assert!(p.exterior().is_ccw());
                assert!(p.interiors().iter().all(|ring| ring.is_cw()));
                assert!(p.signed_area() > 0.0);
            }
        }
    }

    #[test]
    fn ring_with_hole() {
        // 3x3 block of ones around a zero centre
        let ones: Vec<_> = (0..3)
            .flat_map(|r| (0..3).map(move |c| (r, c)))
            .filter(|&rc| rc != (1, 1))
            .collect();
        let r = grid(3, 3, &ones);
        let fc = polygonize(&r, &PolygonizeParams::default()).unwrap();
        assert_eq!(fc.len(), 2);

        let water = polygons_with_value(&fc, 1.0);
        match water[0] {
            Geometry::Polygon(p) => {
                assert_eq!(p.interiors().len(), 1);
                assert_relative_eq!(p.unsigned_area(), 8.0);
            }
            g => panic!("expected polygon, got {:?}", g),
        }
    }

    #[test]
    fn diagonal_cells_depend_on_connectivity() {
        let mut r = grid(2, 2, &[(0, 0), (1, 1)]);
        r.set_nodata(Some(0));

        let four = polygonize(&r, &PolygonizeParams::default()).unwrap();
        assert_eq!(four.len(), 2);

        let params = PolygonizeParams {
            connectivity: Connectivity::Eight,
            ..Default::default()
        };
        let eight = polygonize(&r, &params).unwrap();
        assert_eq!(eight.len(), 1);
        let area: f64 = eight.iter().filter_map(|f| f.geometry.as_ref()).map(|g| g.unsigned_area()).sum();
        assert_relative_eq!(area, 2.0);
    }

    #[test]
    fn pinched_region_under_four_connectivity() {
        // A C-shape whose tips touch diagonally around a hole
        //   1 1 1
        //   1 0 1
        //   1 1 0   <- (2,2) empty; (1,2) and (2,1) touch diagonally
        let cells = [(0, 0), (0, 1), (0, 2), (1, 0), (1, 2), (2, 0), (2, 1)];
        let mut r = grid(3, 3, &cells);
        r.set_nodata(Some(0));
        let fc = polygonize(&r, &PolygonizeParams::default()).unwrap();
        assert_eq!(fc.len(), 1);
        let area: f64 = fc.iter().filter_map(|f| f.geometry.as_ref()).map(|g| g.unsigned_area()).sum();
        assert_relative_eq!(area, 7.0);
    }

    #[test]
    fn mask_and_nodata_are_skipped() {
        let mut r = grid(2, 3, &[(0, 0), (0, 1), (0, 2)]);
        r.set_nodata(Some(0));
        let mut mask: Raster<u8> = Raster::filled(2, 3, 1);
        mask.set(0, 2, 0).unwrap();

        let params = PolygonizeParams {
            mask: Some(mask),
            attribute_col: "wet".into(),
            ..Default::default()
        };
        let fc = polygonize(&r, &params).unwrap();
        assert_eq!(fc.len(), 1);
        assert_eq!(fc.columns(), ["wet"]);
        assert_eq!(fc.value(0, "wet"), &AttributeValue::Float(1.0));
        assert_relative_eq!(fc.features()[0].geometry.as_ref().unwrap().unsigned_area(), 2.0);
    }

    #[test]
    fn mask_shape_must_match() {
        let r = grid(2, 2, &[]);
        let params = PolygonizeParams {
            mask: Some(Raster::filled(3, 3, 1)),
            ..Default::default()
        };
        assert!(matches!(polygonize(&r, &params), Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn connectivity_parses() {
        assert_eq!("8".parse::<Connectivity>().unwrap(), Connectivity::Eight);
        assert!("6".parse::<Connectivity>().is_err());
    }
}
