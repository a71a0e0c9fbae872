//! src/mods/peaks.rs
//! Local maxima above a height, thinned by value-first non-maximum suppression.

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub position: usize,
    pub value: f32,
}

/// Strict local maxima with `value >= threshold`. End points are compared to their one
/// neighbour. A single-element input has no neighbour at all and is still reported when it
/// meets the threshold: that is the pattern-equals-search case, whose one alignment is the
/// whole answer.
pub fn local_maxima(x: &[f32], threshold: f32) -> Vec<Peak> {
    let n = x.len();
    let mut out = Vec::new();
    if n == 0 {
        return out;
    }
    if n == 1 {
        if x[0] >= threshold {
            out.push(Peak { position: 0, value: x[0] });
        }
        return out;
    }
    for i in 0..n {
        let v = x[i];
        if v < threshold {
            continue;
        }
        let above_left = i == 0 || v > x[i - 1];
        let above_right = i == n - 1 || v > x[i + 1];
        if above_left && above_right {
            out.push(Peak { position: i, value: v });
        }
    }
    out
}

/// Peaks of `x` at least `threshold` high and more than `distance` samples apart, sorted by
/// position. Within a neighbourhood the highest value wins; ties go to the earlier position.
/// `distance == 0` disables suppression.
pub fn find_peaks(x: &[f32], threshold: f32, distance: usize) -> Vec<Peak> {
    let mut candidates = local_maxima(x, threshold);
    if distance == 0 || candidates.len() < 2 {
        return candidates;
    }

    candidates.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(Ordering::Equal)
            .then(a.position.cmp(&b.position))
    });

    let mut suppressed = vec![false; x.len()];
    let mut keep: Vec<Peak> = Vec::new();
    for p in candidates {
        if suppressed[p.position] {
            continue;
        }
        keep.push(p);
        let s = p.position.saturating_sub(distance);
        let e = p.position.saturating_add(distance).saturating_add(1).min(x.len());
        suppressed[s..e].fill(true);
    }
    keep.sort_by_key(|p| p.position);
    keep
}
