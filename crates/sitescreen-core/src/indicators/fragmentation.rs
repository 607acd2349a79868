//! Habitat fragmentation from natural land-cover density.

use crate::grid::Grid;
use crate::landcover::{code_of, NATURAL};
use crate::sample::Sample;

/// Default moving-window size in cells.
pub const DEFAULT_WINDOW: usize = 3;

/// True where the cell holds natural or semi-natural cover.
pub fn natural_mask(land_cover: &Grid) -> Vec<bool> {
    land_cover
        .data
        .iter()
        .map(|&s| code_of(s).is_some_and(|c| NATURAL.contains(&c)))
        .collect()
}

/// Share of valid cells that are natural; `None` without valid cells.
pub fn natural_fraction(land_cover: &Grid) -> Option<f64> {
    let valid = land_cover.valid_count();
    if valid == 0 {
        return None;
    }
    let natural = natural_mask(land_cover).iter().filter(|&&n| n).count();
    Some(natural as f64 / valid as f64)
}

/// Local share of natural cells in a `window × window` neighbourhood.
///
/// Values near 1 mean contiguous natural cover, near 0 converted or
/// fragmented land. Edges repeat the nearest row or column. Missing land
/// cover counts as non-natural inside a window and is missing in the output.
pub fn fragmentation_index(land_cover: &Grid, window: usize) -> Grid {
    let (w, h) = (land_cover.width, land_cover.height);
    let mut out = Grid::missing(w, h);
    if land_cover.valid_count() == 0 || window == 0 {
        return out;
    }
    let natural: Vec<f64> = natural_mask(land_cover)
        .into_iter()
        .map(|n| if n { 1.0 } else { 0.0 })
        .collect();

    // Separable box filter; window starts `window / 2` cells before the centre.
    let half = (window / 2) as isize;
    let clamp = |i: isize, n: usize| i.clamp(0, n as isize - 1) as usize;
    let mut rows = vec![0.0; w * h];
    for r in 0..h {
        for c in 0..w {
            rows[r * w + c] = (0..window as isize)
                .map(|k| natural[r * w + clamp(c as isize - half + k, w)])
                .sum::<f64>();
        }
    }
    let area = (window * window) as f64;
    for r in 0..h {
        for c in 0..w {
            if land_cover.get(r, c).is_missing() {
                continue;
            }
            let sum: f64 = (0..window as isize)
                .map(|k| rows[clamp(r as isize - half + k, h) * w + c])
                .sum();
            out.set(r, c, Sample::finite(sum / area));
        }
    }
    out
}
