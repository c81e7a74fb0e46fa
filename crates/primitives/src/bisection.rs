//! Decimal bisection of an instruction trace.
//!
//! The trace `[0, N)` is padded to `[0, 10^k)` and every round splits the disputed range into ten
//! equal parts. The prover reveals the state at the nine interior boundaries, the verifier picks
//! the part it disagrees with, and after `k` rounds a single instruction remains.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{BisectionError, BisectionResult};

/// Number of parts each round splits the current range into.
pub const RADIX: u64 = 10;

/// Number of interior boundaries revealed per round.
pub const BOUNDARIES_PER_ROUND: usize = RADIX as usize - 1;

/// Identifies the round that first introduces a boundary and the sub-range it closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundaryTag {
    /// One-based round for interior boundaries, zero for the two absolute ends.
    pub round: u8,

    /// Index of the sub-range the boundary closes within that round. The two absolute ends use `0`
    /// for the start and `1` for the end of the trace.
    pub digit: u8,
}

/// Maps selection paths to instruction ranges for a trace of a given length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bisection {
    total_instructions: u64,
    iterations: u8,
    total: u64,
}

impl Bisection {
    /// Creates the addressor for a trace with `total_instructions` instructions.
    pub fn new(total_instructions: u64) -> BisectionResult<Self> {
        if total_instructions == 0 {
            return Err(BisectionError::EmptyTrace);
        }

        let mut iterations = 0u8;
        let mut total = 1u64;
        while total < total_instructions {
            total = total
                .checked_mul(RADIX)
                .ok_or(BisectionError::TraceTooLarge(total_instructions))?;
            iterations += 1;
        }

        Ok(Self {
            total_instructions,
            iterations,
            total,
        })
    }

    /// Number of instructions in the trace.
    pub const fn total_instructions(&self) -> u64 {
        self.total_instructions
    }

    /// Number of bisection rounds, `ceil(log10(total_instructions))`.
    pub const fn iterations(&self) -> u8 {
        self.iterations
    }

    /// Size of the padded trace, `10^iterations`.
    pub const fn total(&self) -> u64 {
        self.total
    }

    fn check_path(&self, path: &[u8], max_len: usize) -> BisectionResult<()> {
        if path.len() > max_len {
            return Err(BisectionError::PathOverflow {
                len: path.len(),
                iterations: self.iterations,
            });
        }

        match path.iter().find(|d| u64::from(**d) >= RADIX) {
            Some(bad) => Err(BisectionError::InvalidDigit(*bad)),
            None => Ok(()),
        }
    }

    /// Returns the half-open range `[left, right)` selected by `path`.
    pub fn range_for_path(&self, path: &[u8]) -> BisectionResult<(u64, u64)> {
        self.check_path(path, self.iterations as usize)?;

        Ok(path.iter().fold((0, self.total), |(left, right), digit| {
            let step = (right - left) / RADIX;
            let left = left + u64::from(*digit) * step;
            (left, left + step)
        }))
    }

    /// Returns the nine interior boundaries of the range selected by `path`.
    ///
    /// These are the instruction indices whose states the next round reveals, so a full path
    /// (whose range holds a single instruction) has none and is rejected.
    pub fn boundaries_for_path(&self, path: &[u8]) -> BisectionResult<[u64; BOUNDARIES_PER_ROUND]> {
        if path.len() >= self.iterations as usize {
            return Err(BisectionError::PathOverflow {
                len: path.len(),
                iterations: self.iterations,
            });
        }

        let (left, right) = self.range_for_path(path)?;
        let step = (right - left) / RADIX;
        Ok(std::array::from_fn(|i| left + (i as u64 + 1) * step))
    }

    /// Returns the instruction a full selection path points at.
    pub fn leaf_index(&self, path: &[u8]) -> BisectionResult<u64> {
        if path.len() != self.iterations as usize {
            return Err(BisectionError::PathOverflow {
                len: path.len(),
                iterations: self.iterations,
            });
        }

        Ok(self.range_for_path(path)?.0)
    }

    /// Returns which round first introduces `index` as a boundary, or `None` if `index` lies
    /// outside `[0, total]`.
    pub fn boundary_tag(&self, index: u64) -> Option<BoundaryTag> {
        if index == 0 {
            return Some(BoundaryTag { round: 0, digit: 0 });
        }
        if index == self.total {
            return Some(BoundaryTag { round: 0, digit: 1 });
        }
        if index > self.total {
            return None;
        }

        let mut step = self.total;
        for round in 1..=self.iterations {
            step /= RADIX;
            if index % step == 0 {
                let digit = (index / step) % RADIX - 1;
                return Some(BoundaryTag {
                    round,
                    digit: digit as u8,
                });
            }
        }

        None
    }

    /// Returns every boundary revealed while following `path`, tagged by the round introducing it.
    ///
    /// The map holds the two absolute ends plus nine interior boundaries for every round up to and
    /// including the one following `path`.
    pub fn revealed_boundaries(&self, path: &[u8]) -> BisectionResult<BTreeMap<u64, BoundaryTag>> {
        // validates the length once for the longest prefix
        self.boundaries_for_path(path)?;

        let mut map = BTreeMap::new();
        for index in [0, self.total] {
            if let Some(tag) = self.boundary_tag(index) {
                map.insert(index, tag);
            }
        }

        for len in 0..=path.len() {
            for index in self.boundaries_for_path(&path[..len])? {
                if let Some(tag) = self.boundary_tag(index) {
                    map.insert(index, tag);
                }
            }
        }

        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_iterations() {
        let cases = [(1, 0, 1), (9, 1, 10), (10, 1, 10), (11, 2, 100), (1_000_000, 6, 1_000_000)];
        for (n, iterations, total) in cases {
            let b = Bisection::new(n).unwrap();
            assert_eq!((b.iterations(), b.total()), (iterations, total), "n = {n}");
        }

        assert_eq!(Bisection::new(0), Err(BisectionError::EmptyTrace));
    }

    #[test]
    fn test_largest_trace() {
        let largest = 10u64.pow(19);
        let b = Bisection::new(largest).unwrap();
        assert_eq!((b.iterations(), b.total()), (19, largest));

        assert_eq!(
            Bisection::new(largest + 1),
            Err(BisectionError::TraceTooLarge(largest + 1))
        );
        assert_eq!(
            Bisection::new(u64::MAX),
            Err(BisectionError::TraceTooLarge(u64::MAX))
        );
    }

    #[test]
    fn test_narrowing_million_instructions() {
        let b = Bisection::new(1_000_000).unwrap();

        assert_eq!(b.range_for_path(&[]).unwrap(), (0, 1_000_000));
        assert_eq!(b.range_for_path(&[3]).unwrap(), (300_000, 400_000));
        assert_eq!(b.range_for_path(&[3, 0]).unwrap(), (300_000, 310_000));

        let full = [3, 0, 0, 0, 0, 0];
        assert_eq!(b.range_for_path(&full).unwrap(), (300_000, 300_001));
        assert_eq!(b.leaf_index(&full).unwrap(), 300_000);

        assert_eq!(
            b.boundaries_for_path(&[3]).unwrap(),
            [310_000, 320_000, 330_000, 340_000, 350_000, 360_000, 370_000, 380_000, 390_000]
        );
    }

    #[test]
    fn test_path_errors() {
        let b = Bisection::new(1000).unwrap();

        assert_eq!(
            b.range_for_path(&[0, 0, 0, 0]),
            Err(BisectionError::PathOverflow {
                len: 4,
                iterations: 3
            })
        );
        assert!(matches!(
            b.boundaries_for_path(&[1, 2, 3]),
            Err(BisectionError::PathOverflow { .. })
        ));
        assert_eq!(
            b.range_for_path(&[10]),
            Err(BisectionError::InvalidDigit(10))
        );
    }

    #[test]
    fn test_boundary_tags() {
        let b = Bisection::new(1000).unwrap();

        assert_eq!(b.boundary_tag(0), Some(BoundaryTag { round: 0, digit: 0 }));
        assert_eq!(b.boundary_tag(1000), Some(BoundaryTag { round: 0, digit: 1 }));
        assert_eq!(b.boundary_tag(300), Some(BoundaryTag { round: 1, digit: 2 }));
        assert_eq!(b.boundary_tag(310), Some(BoundaryTag { round: 2, digit: 0 }));
        assert_eq!(b.boundary_tag(319), Some(BoundaryTag { round: 3, digit: 8 }));
        assert_eq!(b.boundary_tag(1001), None);
    }

    #[test]
    fn test_revealed_boundaries_along_full_path() {
        let b = Bisection::new(1_000_000).unwrap();
        let path = [3, 0, 0, 0, 0];

        let map = b.revealed_boundaries(&path).unwrap();
        assert_eq!(map.len(), BOUNDARIES_PER_ROUND * b.iterations() as usize + 2);
        assert!(map.values().all(|tag| tag.round <= b.iterations()));
    }

    #[test]
    fn test_boundaries_tile_every_round() {
        let b = Bisection::new(1000).unwrap();

        for round in 0..b.iterations() as usize {
            let mut ranges = Vec::new();
            for prefix in 0..10u64.pow(round as u32) {
                let path: Vec<u8> = (0..round)
                    .rev()
                    .map(|pos| ((prefix / 10u64.pow(pos as u32)) % 10) as u8)
                    .collect();
                let (left, right) = b.range_for_path(&path).unwrap();
                let inner = b.boundaries_for_path(&path).unwrap();

                let mut points = vec![left];
                points.extend(inner);
                points.push(right);
                for (digit, pair) in points.windows(2).enumerate() {
                    let mut child = path.clone();
                    child.push(digit as u8);
                    assert_eq!(b.range_for_path(&child).unwrap(), (pair[0], pair[1]));
                    ranges.push((pair[0], pair[1]));
                }
            }

            ranges.sort();
            assert_eq!(ranges.len(), 10usize.pow(round as u32 + 1));
            assert_eq!(ranges.first().map(|r| r.0), Some(0));
            assert_eq!(ranges.last().map(|r| r.1), Some(b.total()));
            assert!(ranges.windows(2).all(|w| w[0].1 == w[1].0 && w[0].0 < w[0].1));
        }
    }

    proptest! {
        #[test]
        fn proptest_full_path_is_single_instruction(
            path in proptest::collection::vec(0u8..10, 6)
        ) {
            let b = Bisection::new(999_999).unwrap();
            let (left, right) = b.range_for_path(&path).unwrap();
            prop_assert_eq!(right - left, 1);

            let expected = path.iter().fold(0u64, |acc, d| acc * 10 + u64::from(*d));
            prop_assert_eq!(b.leaf_index(&path).unwrap(), expected);
        }
    }
}
