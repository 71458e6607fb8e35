//! Z-order decomposition of lat/lon boxes for spatial index costing.
//!
//! A spatial index stores one z-value per row: the bits of the scaled latitude
//! and longitude, interleaved (latitude first). A query box is covered by a
//! handful of z-cells; each cell is a contiguous z-value range, hence one
//! index range scan.
//!
//! Z-value layout (as an `i64`): bit 63 is zero, the cell's bits are
//! left-justified starting at bit 62, and the low 6 bits hold the cell length.

/// Most cells a box is decomposed into.
pub const MAX_Z: usize = 4;

const MAX_LENGTH: u32 = 57;
const LENGTH_BITS: u32 = 6;
const LENGTH_MASK: i64 = 0x3f;

const MIN_LAT: f64 = -90.0;
const MAX_LAT: f64 = 90.0;
const MIN_LON: f64 = -180.0;
const MAX_LON: f64 = 180.0;

/// Lowest z-value inside cell `z`.
pub fn z_lo(z: i64) -> i64 {
    z
}

/// Highest z-value inside cell `z`: the unused bits filled with ones, the
/// length left intact.
pub fn z_hi(z: i64) -> i64 {
    let length = (z & LENGTH_MASK) as u32;
    let mask = ((1i64 << (MAX_LENGTH - length)) - 1) << LENGTH_BITS;
    z | mask
}

/// Number of cell bits encoded in `z`.
pub fn z_length(z: i64) -> u32 {
    (z & LENGTH_MASK) as u32
}

/// A lat/lon box, already split at the antimeridian if it wraps.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxLatLon {
    parts: Vec<LatLonRect>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct LatLonRect {
    lat_lo: f64,
    lat_hi: f64,
    lon_lo: f64,
    lon_hi: f64,
}

impl BoxLatLon {
    /// Latitude is clamped to the poles. Longitude outside `[-180, 180]`
    /// wraps around, producing a second rectangle.
    pub fn new(lat_lo: f64, lat_hi: f64, lon_lo: f64, lon_hi: f64) -> Self {
        let lat_lo = lat_lo.clamp(MIN_LAT, MAX_LAT);
        let lat_hi = lat_hi.clamp(MIN_LAT, MAX_LAT);
        let rect = |lon_lo: f64, lon_hi: f64| LatLonRect {
            lat_lo,
            lat_hi,
            lon_lo,
            lon_hi,
        };
        let parts = if lon_hi - lon_lo >= MAX_LON - MIN_LON {
            vec![rect(MIN_LON, MAX_LON)]
        } else if lon_lo < MIN_LON {
            vec![rect(lon_lo + 360.0, MAX_LON), rect(MIN_LON, lon_hi)]
        } else if lon_hi > MAX_LON {
            vec![rect(lon_lo, MAX_LON), rect(MIN_LON, lon_hi - 360.0)]
        } else {
            vec![rect(lon_lo, lon_hi)]
        };
        Self { parts }
    }

    /// Box of half-width `radius` degrees around a point.
    pub fn around(lat: f64, lon: f64, radius: f64) -> Self {
        Self::new(lat - radius, lat + radius, lon - radius, lon + radius)
    }

    pub fn wraps(&self) -> bool {
        self.parts.len() > 1
    }
}

/// Integer coordinate range, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    lo: u64,
    hi: u64,
}

impl Span {
    fn intersects(&self, other: &Span) -> bool {
        self.lo <= other.hi && other.lo <= self.hi
    }

    fn covers(&self, other: &Span) -> bool {
        self.lo <= other.lo && other.hi <= self.hi
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cell {
    prefix: u64,
    length: u32,
}

/// Two-dimensional lat/lon space with `bits_per_dimension` of resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Space {
    bits_per_dimension: u32,
}

impl Space {
    /// `bits_per_dimension` is capped so a full-resolution z-value fits the
    /// encoding.
    pub fn lat_lon(bits_per_dimension: u32) -> Self {
        Self {
            bits_per_dimension: bits_per_dimension.clamp(1, MAX_LENGTH / 2),
        }
    }

    pub fn z_bits(&self) -> u32 {
        2 * self.bits_per_dimension
    }

    /// Covering z-cells for `region`, at most `max_z`, ordered by z-value.
    pub fn decompose(&self, region: &BoxLatLon, max_z: usize) -> Vec<i64> {
        let mut out = Vec::with_capacity(max_z);
        let n = region.parts.len();
        for (i, part) in region.parts.iter().enumerate() {
            // Split the budget between the two halves of a wrapped box.
            let budget = (max_z / n + usize::from(i < max_z % n)).max(1);
            out.extend(self.decompose_rect(part, budget));
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    fn decompose_rect(&self, rect: &LatLonRect, max_z: usize) -> Vec<i64> {
        let target = [
            Span {
                lo: self.scale(rect.lat_lo.min(rect.lat_hi), MIN_LAT, MAX_LAT),
                hi: self.scale(rect.lat_lo.max(rect.lat_hi), MIN_LAT, MAX_LAT),
            },
            Span {
                lo: self.scale(rect.lon_lo.min(rect.lon_hi), MIN_LON, MAX_LON),
                hi: self.scale(rect.lon_lo.max(rect.lon_hi), MIN_LON, MAX_LON),
            },
        ];

        let mut cells = vec![Cell {
            prefix: 0,
            length: 0,
        }];
        loop {
            // Refine the coarsest cell that is only partially inside the box.
            let candidate = cells
                .iter()
                .enumerate()
                .filter(|(_, c)| c.length < self.z_bits() && !self.covered(c, &target))
                .min_by_key(|(_, c)| c.length)
                .map(|(i, _)| i);
            let Some(i) = candidate else { break };
            let cell = cells[i];
            let children: Vec<Cell> = [0u64, 1]
                .iter()
                .map(|&bit| Cell {
                    prefix: (cell.prefix << 1) | bit,
                    length: cell.length + 1,
                })
                .filter(|c| self.intersects(c, &target))
                .collect();
            if cells.len() - 1 + children.len() > max_z {
                break;
            }
            cells.remove(i);
            for (k, child) in children.into_iter().enumerate() {
                cells.insert(i + k, child);
            }
        }
        cells.iter().map(|c| encode(*c)).collect()
    }

    fn scale(&self, v: f64, min: f64, max: f64) -> u64 {
        let top = (1u64 << self.bits_per_dimension) - 1;
        let x = ((v - min) / (max - min) * top as f64).round();
        x.clamp(0.0, top as f64) as u64
    }

    /// Coordinate spans covered by a cell, latitude then longitude.
    fn spans(&self, cell: &Cell) -> [Span; 2] {
        let mut coords = [0u64; 2];
        let mut used = [0u32; 2];
        for p in 0..cell.length {
            let bit = (cell.prefix >> (cell.length - 1 - p)) & 1;
            let d = (p % 2) as usize;
            coords[d] = (coords[d] << 1) | bit;
            used[d] += 1;
        }
        let mut out = [Span { lo: 0, hi: 0 }; 2];
        for d in 0..2 {
            let free = self.bits_per_dimension - used[d];
            let lo = coords[d] << free;
            out[d] = Span {
                lo,
                hi: lo | ((1u64 << free) - 1),
            };
        }
        out
    }

    fn intersects(&self, cell: &Cell, target: &[Span; 2]) -> bool {
        let s = self.spans(cell);
        s[0].intersects(&target[0]) && s[1].intersects(&target[1])
    }

    fn covered(&self, cell: &Cell, target: &[Span; 2]) -> bool {
        let s = self.spans(cell);
        target[0].covers(&s[0]) && target[1].covers(&s[1])
    }
}

fn encode(cell: Cell) -> i64 {
    if cell.length == 0 {
        return 0;
    }
    ((cell.prefix << (63 - cell.length)) | u64::from(cell.length)) as i64
}
