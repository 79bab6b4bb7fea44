//! Mergeable approximate distinct-count sketch
//!
//! [`HllSketch`] is a HyperLogLog with three representations:
//!
//! - empty: nothing inserted yet
//! - explicit: the sorted set of distinct 64-bit hashes, exact while small
//! - full: `2^precision` one-byte registers
//!
//! Values are hashed with MurmurHash64A. A hash selects a register by its low
//! `precision` bits, and the register keeps the largest run length seen in the
//! remaining bits. Two full sketches merge by taking the register-wise maximum, so
//! merging shard sketches gives the sketch of the union.

use crate::row_store::Arena;

pub const DEFAULT_PRECISION: u8 = 14;
pub const MIN_PRECISION: u8 = 4;
pub const MAX_PRECISION: u8 = 18;
pub const DEFAULT_EXPLICIT_THRESHOLD: usize = 160;

const MURMUR_PRIME: u64 = 0xc6a4_a793_5bd1_e995;
const MURMUR_SEED: u32 = 0xadc8_3b19;

/// Which representation a sketch currently uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SketchKind {
    Empty,
    Explicit,
    Full,
}

#[derive(Debug, Clone, PartialEq)]
enum Representation {
    Empty,
    Explicit(Vec<u64>),
    Full(Box<[u8]>),
}

/// HyperLogLog distinct-count sketch
#[derive(Debug, Clone, PartialEq)]
pub struct HllSketch {
    precision: u8,
    explicit_threshold: usize,
    repr: Representation,
}

impl Default for HllSketch {
    fn default() -> Self {
        Self::new(DEFAULT_PRECISION, DEFAULT_EXPLICIT_THRESHOLD)
    }
}

impl HllSketch {
    /// Create an empty sketch; precision is clamped to the supported range
    pub fn new(precision: u8, explicit_threshold: usize) -> Self {
        Self {
            precision: precision.clamp(MIN_PRECISION, MAX_PRECISION),
            explicit_threshold,
            repr: Representation::Empty,
        }
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn register_count(&self) -> usize {
        1usize << self.precision
    }

    pub fn kind(&self) -> SketchKind {
        match self.repr {
            Representation::Empty => SketchKind::Empty,
            Representation::Explicit(_) => SketchKind::Explicit,
            Representation::Full(_) => SketchKind::Full,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.repr, Representation::Empty)
    }

    /// Insert a raw byte value
    pub fn insert_bytes(&mut self, bytes: &[u8]) {
        self.insert_hash(murmur_hash64a(bytes, MURMUR_SEED));
    }

    pub fn insert_str(&mut self, value: &str) {
        self.insert_bytes(value.as_bytes());
    }

    pub fn insert_u64(&mut self, value: u64) {
        self.insert_bytes(&value.to_le_bytes());
    }

    pub fn insert_i64(&mut self, value: i64) {
        self.insert_bytes(&value.to_le_bytes());
    }

    /// Insert an already hashed value
    pub fn insert_hash(&mut self, hash: u64) {
        self.insert_hash_with(hash, None);
    }

    /// Merge `other` into this sketch
    ///
    /// Register buffers needed for the result come from `pool`. Sketches of
    /// different precision are reconciled by folding the finer one down.
    pub fn merge(&mut self, other: &HllSketch, pool: &Arena) {
        match &other.repr {
            Representation::Empty => {}
            Representation::Explicit(hashes) => {
                for &hash in hashes {
                    self.insert_hash_with(hash, Some(pool));
                }
            }
            Representation::Full(other_registers) => {
                if other.precision < self.precision {
                    self.reduce_precision(other.precision, pool);
                }
                let folded;
                let source: &[u8] = if other.precision > self.precision {
                    folded = fold_registers(other_registers, other.precision, self.precision, pool);
                    &folded[..]
                } else {
                    &other_registers[..]
                };

                self.ensure_full(pool);
                if let Representation::Full(registers) = &mut self.repr {
                    for (dst, &src) in registers.iter_mut().zip(source) {
                        if src > *dst {
                            *dst = src;
                        }
                    }
                }
            }
        }
    }

    /// Estimated number of distinct values inserted
    pub fn estimate(&self) -> u64 {
        match &self.repr {
            Representation::Empty => 0,
            Representation::Explicit(hashes) => hashes.len() as u64,
            Representation::Full(registers) => estimate_registers(registers),
        }
    }

    fn insert_hash_with(&mut self, hash: u64, pool: Option<&Arena>) {
        // Zero hashes carry no rank information.
        if hash == 0 {
            return;
        }
        match &mut self.repr {
            Representation::Empty => {
                self.repr = Representation::Explicit(vec![hash]);
            }
            Representation::Explicit(hashes) => {
                if let Err(pos) = hashes.binary_search(&hash) {
                    hashes.insert(pos, hash);
                }
                if hashes.len() > self.explicit_threshold {
                    self.promote(pool);
                }
            }
            Representation::Full(registers) => {
                update_register(registers, self.precision, hash);
            }
        }
    }

    fn ensure_full(&mut self, pool: &Arena) {
        if !matches!(self.repr, Representation::Full(_)) {
            self.promote(Some(pool));
        }
    }

    fn promote(&mut self, pool: Option<&Arena>) {
        let count = self.register_count();
        let mut registers = match pool {
            Some(pool) => pool.alloc_registers(count),
            None => vec![0u8; count].into_boxed_slice(),
        };
        if let Representation::Explicit(hashes) = &self.repr {
            for &hash in hashes {
                update_register(&mut registers, self.precision, hash);
            }
        }
        self.repr = Representation::Full(registers);
    }

    fn reduce_precision(&mut self, precision: u8, pool: &Arena) {
        if let Representation::Full(registers) = &self.repr {
            let folded = fold_registers(registers, self.precision, precision, pool);
            self.repr = Representation::Full(folded);
        }
        self.precision = precision;
    }
}

fn update_register(registers: &mut [u8], precision: u8, hash: u64) {
    let index = (hash & ((1u64 << precision) - 1)) as usize;
    let mut shifted = hash >> precision;
    shifted |= 1u64 << (64 - precision as u32);
    let rank = shifted.trailing_zeros() as u8 + 1;
    if registers[index] < rank {
        registers[index] = rank;
    }
}

/// Re-bucket registers of precision `from` into `2^to` registers, `to < from`
fn fold_registers(registers: &[u8], from: u8, to: u8, pool: &Arena) -> Box<[u8]> {
    let mut folded = pool.alloc_registers(1usize << to);
    let mask = (1usize << to) - 1;
    for (index, &rank) in registers.iter().enumerate() {
        if rank == 0 {
            continue;
        }
        let upper = index >> to;
        let new_rank = if upper != 0 {
            upper.trailing_zeros() as u8 + 1
        } else {
            (from - to) + rank
        };
        let slot = &mut folded[index & mask];
        if new_rank > *slot {
            *slot = new_rank;
        }
    }
    folded
}

fn estimate_registers(registers: &[u8]) -> u64 {
    let num_streams = registers.len() as f64;
    let alpha = match registers.len() {
        16 => 0.673,
        32 => 0.697,
        64 => 0.709,
        _ => 0.7213 / (1.0 + 1.079 / num_streams),
    };

    let mut harmonic_mean = 0.0f64;
    let mut zero_registers = 0usize;
    for &register in registers {
        harmonic_mean += 2_f64.powi(-(register as i32));
        if register == 0 {
            zero_registers += 1;
        }
    }

    let mut estimate = alpha * num_streams * num_streams / harmonic_mean;
    if estimate <= num_streams * 2.5 && zero_registers != 0 {
        estimate = num_streams * (num_streams / zero_registers as f64).ln();
    } else if registers.len() == 16 * 1024 && estimate < 72_000.0 {
        let bias = 5.9119e-18 * estimate.powi(4) - 1.4253e-12 * estimate.powi(3) + 1.2940e-7 * estimate.powi(2)
            - 5.2921e-3 * estimate
            + 83.3216;
        estimate -= estimate * (bias / 100.0);
    }

    estimate.max(0.0).round() as u64
}

fn murmur_hash64a(data: &[u8], seed: u32) -> u64 {
    let r: u32 = 47;
    let mut h = (seed as u64) ^ (data.len() as u64).wrapping_mul(MURMUR_PRIME);

    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        let mut block = [0u8; 8];
        block.copy_from_slice(chunk);
        let mut k = u64::from_le_bytes(block);
        k = k.wrapping_mul(MURMUR_PRIME);
        k ^= k >> r;
        k = k.wrapping_mul(MURMUR_PRIME);
        h ^= k;
        h = h.wrapping_mul(MURMUR_PRIME);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        for (idx, byte) in tail.iter().enumerate() {
            h ^= (*byte as u64) << (idx * 8);
        }
        h = h.wrapping_mul(MURMUR_PRIME);
    }

    h ^= h >> r;
    h = h.wrapping_mul(MURMUR_PRIME);
    h ^= h >> r;
    h
}
