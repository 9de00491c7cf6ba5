//! Region filling: ink mask to solid silhouette.
//!
//! Everything reachable from the canvas border without crossing ink is
//! outside; everything else that is not ink itself is the icon interior.
//! Reachability is computed by 4-connected flood fills started from eight
//! border seeds (the corners and the edge midpoints). A single seed is not
//! enough: line art that touches the edge in several places splits the
//! background into disjoint pieces.

use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

use super::Mask;
use crate::error::MaskError;
use crate::pool::PixelBuffer;

/// Marker written by the flood fill. Distinct from both mask values.
pub const SENTINEL: u8 = 128;

/// Computes fill masks from ink masks.
#[derive(Clone, Default)]
pub struct RegionFiller {
    seed_pool: Option<Arc<ThreadPool>>,
}

impl RegionFiller {
    /// Runs all seeds one after another on a single scratch plane.
    pub fn sequential() -> Self {
        Self { seed_pool: None }
    }

    /// Runs seeds concurrently on `pool`, each on its own copy of the ink.
    pub fn concurrent(pool: Arc<ThreadPool>) -> Self {
        Self {
            seed_pool: Some(pool),
        }
    }

    /// Builds a filler with a dedicated seed pool of `workers` threads.
    ///
    /// One worker (or zero) means sequential filling.
    pub fn with_workers(workers: usize) -> Result<Self, ThreadPoolBuildError> {
        if workers <= 1 {
            return Ok(Self::sequential());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("fill-seed-{i}"))
            .build()?;
        Ok(Self::concurrent(Arc::new(pool)))
    }

    pub fn is_concurrent(&self) -> bool {
        self.seed_pool.is_some()
    }

    /// The eight border seeds for a `side`×`side` grid.
    pub fn seed_points(side: u32) -> [(u32, u32); 8] {
        let last = side.saturating_sub(1);
        let mid = side / 2;
        [
            (0, 0),
            (last, 0),
            (0, last),
            (last, last),
            (mid, 0),
            (mid, last),
            (0, mid),
            (last, mid),
        ]
    }

    /// Derives the fill mask of `ink`, reusing `scratch` as its storage.
    ///
    /// An ink mask without an enclosed region yields an empty fill mask.
    pub fn fill(&self, ink: &Mask, scratch: PixelBuffer) -> Result<Mask, MaskError> {
        let side = ink.ensure_square()?;

        let mut plane = if scratch.shape() == (side, side) {
            scratch
        } else {
            PixelBuffer::zeroed(side, side)
        };
        plane.as_mut_slice().copy_from_slice(ink.as_bytes());

        let side = side as usize;
        let seeds: Vec<usize> = Self::seed_points(side as u32)
            .iter()
            .map(|&(x, y)| y as usize * side + x as usize)
            .collect();

        match &self.seed_pool {
            None => {
                let cells = plane.as_mut_slice();
                for &seed in &seeds {
                    if cells[seed] == Mask::OFF {
                        flood(cells, side, seed, SENTINEL);
                    }
                }
            }
            Some(pool) => {
                let ink_bytes = ink.as_bytes();
                let reached: Vec<Vec<u8>> = pool.install(|| {
                    seeds
                        .par_iter()
                        .filter(|&&seed| ink_bytes[seed] == Mask::OFF)
                        .map(|&seed| {
                            let mut copy = ink_bytes.to_vec();
                            flood(&mut copy, side, seed, SENTINEL);
                            copy
                        })
                        .collect()
                });

                let cells = plane.as_mut_slice();
                for copy in &reached {
                    for (cell, &marked) in cells.iter_mut().zip(copy) {
                        if marked == SENTINEL {
                            *cell = SENTINEL;
                        }
                    }
                }
            }
        }

        for cell in plane.as_mut_slice() {
            *cell = if *cell == Mask::OFF { Mask::ON } else { Mask::OFF };
        }

        Ok(Mask::from_buffer(plane))
    }
}

impl std::fmt::Debug for RegionFiller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionFiller")
            .field("concurrent", &self.is_concurrent())
            .finish()
    }
}

/// 4-connected flood fill of the region containing `start` with `value`.
fn flood(cells: &mut [u8], side: usize, start: usize, value: u8) {
    let target = cells[start];
    if target == value {
        return;
    }

    let mut stack = vec![start];
    cells[start] = value;

    while let Some(idx) = stack.pop() {
        let x = idx % side;
        let y = idx / side;

        let mut visit = |n: usize| {
            if cells[n] == target {
                cells[n] = value;
                stack.push(n);
            }
        };

        if x > 0 {
            visit(idx - 1);
        }
        if x + 1 < side {
            visit(idx + 1);
        }
        if y > 0 {
            visit(idx - side);
        }
        if y + 1 < side {
            visit(idx + side);
        }
    }
}
