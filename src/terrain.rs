//! Terrain generation: seeded LCG, multi-octave value-noise fields, and the
//! weighted biome classifier.
//!
//! Generation is a pure function of `(width, height, seed, weights)` — the
//! same inputs always produce a bit-identical grid. A single LCG drives all
//! octave offsets and probabilistic draws in a fixed order, so the stream
//! never desynchronizes when weights change.

use crate::types::{TerrainType, TerrainWeights};
use serde::{Deserialize, Serialize};

/// Octaves accumulated per noise field.
const OCTAVES: usize = 5;

/// Base wavelength of the lowest octave, in cells.
const BASE_WAVELENGTH: f64 = 48.0;

/// Above this many cells the hash-per-cell fast classifier is used.
pub const FAST_PATH_CELLS: u64 = 1 << 20;

// Classifier bands. Multiplied by the per-biome weight multiplier, so a
// weight of 0 collapses the band to nothing.
const OCEAN_BAND: f64 = 0.08;
const RIVER_BAND: f64 = 0.05;
const MOUNTAIN_BAND: f64 = 0.06;
const HILLS_BAND: f64 = 0.10;
const SWAMP_CHANCE: f64 = 0.50;
const DESERT_CHANCE: f64 = 0.60;
const FOREST_CHANCE: f64 = 0.50;

// ---------------------------------------------------------------------------
// Terrain grid
// ---------------------------------------------------------------------------

/// Dense 2-D terrain array indexed `[row][col]` (row = y, col = x).
///
/// Distinct from the sparse per-entity grid; immutable once generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainGrid {
    width: u32,
    height: u32,
    rows: Vec<Vec<TerrainType>>,
}

impl TerrainGrid {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> Option<TerrainType> {
        self.rows
            .get(y as usize)
            .and_then(|row| row.get(x as usize))
            .copied()
    }

    pub fn rows(&self) -> &[Vec<TerrainType>] {
        &self.rows
    }

    /// Number of cells of the given type.
    pub fn count_of(&self, terrain: TerrainType) -> usize {
        self.rows
            .iter()
            .map(|row| row.iter().filter(|t| **t == terrain).count())
            .sum()
    }

    /// Fraction of horizontally/vertically adjacent cell pairs that share a
    /// terrain type. A pure-noise grid scores near `1/8`; natural-looking
    /// terrain clusters well above that.
    pub fn adjacency_agreement(&self) -> f64 {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut pairs = 0u64;
        let mut same = 0u64;
        for y in 0..h {
            for x in 0..w {
                if x + 1 < w {
                    pairs += 1;
                    if self.rows[y][x] == self.rows[y][x + 1] {
                        same += 1;
                    }
                }
                if y + 1 < h {
                    pairs += 1;
                    if self.rows[y][x] == self.rows[y + 1][x] {
                        same += 1;
                    }
                }
            }
        }
        if pairs == 0 {
            return 1.0;
        }
        same as f64 / pairs as f64
    }
}

// ---------------------------------------------------------------------------
// Seeded LCG
// ---------------------------------------------------------------------------

/// Linear-congruential generator behind every random decision in this module.
#[derive(Debug, Clone)]
struct Lcg {
    state: u64,
}

impl Lcg {
    const MUL: u64 = 6364136223846793005;
    const INC: u64 = 1442695040888963407;

    fn new(seed: u64) -> Self {
        // One warm-up step so seed 0 does not start at the raw increment.
        let mut lcg = Self { state: seed };
        lcg.next_u64();
        lcg
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(Self::MUL)
            .wrapping_add(Self::INC);
        self.state
    }

    /// Uniform draw in `[0, 1)` from the high 53 bits.
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// splitmix64-style avalanche, used for noise lattice corners and the
/// fast-path per-cell classifier.
fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e3779b97f4a7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

fn smoothstep(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

// ---------------------------------------------------------------------------
// Value noise
// ---------------------------------------------------------------------------

/// One smooth noise field: five octaves of lattice value noise, each octave
/// translated by a seeded offset to decorrelate it from the others.
#[derive(Debug, Clone)]
struct NoiseField {
    seed: u64,
    salt: u64,
    offsets: [(f64, f64); OCTAVES],
}

impl NoiseField {
    fn new(seed: u64, salt: u64, rng: &mut Lcg) -> Self {
        let mut offsets = [(0.0, 0.0); OCTAVES];
        for slot in offsets.iter_mut() {
            *slot = (rng.next_f64() * 1024.0, rng.next_f64() * 1024.0);
        }
        Self {
            seed,
            salt,
            offsets,
        }
    }

    fn lattice(&self, ix: i64, iy: i64, octave: usize) -> f64 {
        let h = mix64(
            self.seed
                ^ self.salt.wrapping_mul(0x2545f4914f6cdd1d)
                ^ (ix as u64).wrapping_mul(0x9e3779b97f4a7c15)
                ^ (iy as u64).wrapping_mul(0xc2b2ae3d27d4eb4f)
                ^ ((octave as u64) << 56),
        );
        (h >> 11) as f64 / (1u64 << 53) as f64
    }

    fn sample_octave(&self, x: f64, y: f64, octave: usize) -> f64 {
        let ix = x.floor() as i64;
        let iy = y.floor() as i64;
        let fx = smoothstep(x - ix as f64);
        let fy = smoothstep(y - iy as f64);

        let c00 = self.lattice(ix, iy, octave);
        let c10 = self.lattice(ix + 1, iy, octave);
        let c01 = self.lattice(ix, iy + 1, octave);
        let c11 = self.lattice(ix + 1, iy + 1, octave);

        let top = c00 + (c10 - c00) * fx;
        let bottom = c01 + (c11 - c01) * fx;
        top + (bottom - top) * fy
    }

    /// Accumulate all octaves at cell `(x, y)`, normalized to `[0, 1]` with
    /// a smoothstep contrast curve.
    fn sample(&self, x: f64, y: f64) -> f64 {
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut max_amplitude = 0.0;
        let mut frequency = 1.0 / BASE_WAVELENGTH;

        for octave in 0..OCTAVES {
            let (ox, oy) = self.offsets[octave];
            total += amplitude * self.sample_octave(x * frequency + ox, y * frequency + oy, octave);
            max_amplitude += amplitude;
            amplitude *= 0.5;
            frequency *= 2.0;
        }

        smoothstep(total / max_amplitude)
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Deterministic terrain generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerrainGenerator;

impl TerrainGenerator {
    /// Generate a `height × width` grid. Total: any positive dimensions and
    /// any weights are accepted; out-of-range weights clamp.
    pub fn generate(
        width: u32,
        height: u32,
        seed: u64,
        weights: &TerrainWeights,
    ) -> TerrainGrid {
        let weights = weights.clamped();
        let cells = u64::from(width) * u64::from(height);
        if cells > FAST_PATH_CELLS {
            Self::generate_hashed(width, height, seed, &weights)
        } else {
            Self::generate_smooth(width, height, seed, &weights)
        }
    }

    /// Multi-octave path: three independent smooth fields plus per-cell
    /// probability draws, consumed row-major.
    fn generate_smooth(
        width: u32,
        height: u32,
        seed: u64,
        weights: &TerrainWeights,
    ) -> TerrainGrid {
        let mut rng = Lcg::new(seed);
        // Field construction order is part of the format: elevation,
        // moisture, temperature, then per-cell draws.
        let elevation = NoiseField::new(seed, 1, &mut rng);
        let moisture = NoiseField::new(seed, 2, &mut rng);
        let temperature = NoiseField::new(seed, 3, &mut rng);

        let mut rows = Vec::with_capacity(height as usize);
        for y in 0..height {
            let mut row = Vec::with_capacity(width as usize);
            for x in 0..width {
                let (fx, fy) = (f64::from(x), f64::from(y));
                let e = elevation.sample(fx, fy);
                let m = moisture.sample(fx, fy);
                let t = temperature.sample(fx, fy);
                // All three draws are consumed whether or not the matching
                // branch is reached, keeping the stream weight-independent.
                let draws = [rng.next_f64(), rng.next_f64(), rng.next_f64()];
                row.push(classify(e, m, t, &draws, weights));
            }
            rows.push(row);
        }

        TerrainGrid {
            width,
            height,
            rows,
        }
    }

    /// Fast path for very large maps: one integer hash per cell, no octave
    /// accumulation. Same weight semantics and the same hard-disable rule,
    /// trading smooth clustering for bounded generation time.
    fn generate_hashed(
        width: u32,
        height: u32,
        seed: u64,
        weights: &TerrainWeights,
    ) -> TerrainGrid {
        let mut rows = Vec::with_capacity(height as usize);
        for y in 0..height {
            let mut row = Vec::with_capacity(width as usize);
            for x in 0..width {
                let h = mix64(
                    seed ^ (u64::from(x) << 32 | u64::from(y)).wrapping_mul(0x9e3779b97f4a7c15),
                );
                // Coarse lattice sampling keeps a little spatial coherence:
                // elevation/moisture/temperature come from the cell's 8×8
                // block, decision draws from the cell itself.
                let block = mix64(
                    seed.wrapping_add(1)
                        ^ (u64::from(x / 8) << 32 | u64::from(y / 8))
                            .wrapping_mul(0xc2b2ae3d27d4eb4f),
                );
                let e = (block & 0xFFFF) as f64 / 65536.0;
                let m = ((block >> 16) & 0xFFFF) as f64 / 65536.0;
                let t = ((block >> 32) & 0xFFFF) as f64 / 65536.0;
                let draws = [
                    (h & 0xFFFFF) as f64 / 1_048_576.0,
                    ((h >> 20) & 0xFFFFF) as f64 / 1_048_576.0,
                    ((h >> 40) & 0xFFFFF) as f64 / 1_048_576.0,
                ];
                row.push(classify(e, m, t, &draws, weights));
            }
            rows.push(row);
        }

        TerrainGrid {
            width,
            height,
            rows,
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify one cell from its field values, in strict descending priority:
/// ocean → river → mountain → hills → swamp → desert → forest → plains.
fn classify(
    elevation: f64,
    moisture: f64,
    temperature: f64,
    draws: &[f64; 3],
    weights: &TerrainWeights,
) -> TerrainType {
    let water = TerrainWeights::multiplier(weights.water);
    let mountain = TerrainWeights::multiplier(weights.mountain);
    let hills = TerrainWeights::multiplier(weights.hills);
    let swamp = TerrainWeights::multiplier(weights.swamp);
    let desert = TerrainWeights::multiplier(weights.desert);
    let forest = TerrainWeights::multiplier(weights.forest);

    let ocean_level = OCEAN_BAND * water;
    if elevation < ocean_level {
        return TerrainType::Ocean;
    }
    // Shallow water fringing the coast.
    if water > 0.0 && elevation < ocean_level + RIVER_BAND * water {
        return TerrainType::River;
    }

    let mountain_level = 1.0 - MOUNTAIN_BAND * mountain;
    if mountain > 0.0 && elevation > mountain_level {
        return TerrainType::Mountain;
    }
    if hills > 0.0 && elevation > mountain_level - HILLS_BAND * hills {
        return TerrainType::Hills;
    }

    if elevation < 0.45 && moisture > 0.65 && (0.3..0.7).contains(&temperature) {
        let p = (SWAMP_CHANCE * swamp).min(1.0);
        if draws[0] < p {
            return TerrainType::Swamp;
        }
    }

    if moisture < 0.35 && temperature > 0.6 {
        let p = (DESERT_CHANCE * desert).min(1.0);
        if draws[1] < p {
            return TerrainType::Desert;
        }
    }

    if moisture > 0.45 {
        // Denser canopy where moisture is very high.
        let density = if moisture > 0.75 { 1.4 } else { 1.0 };
        let p = (FOREST_CHANCE * forest * density).min(1.0);
        if draws[2] < p {
            return TerrainType::Forest;
        }
    }

    TerrainType::Plains
}
