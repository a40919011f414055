use crate::content::Representation;

use super::types::ResolutionLimit;

/// Only keep the Representations whose bitrate is lower or equal to `bitrate_ceiling`.
///
/// `representations` has to be sorted by ascending bitrate. The lowest Representation is always
/// kept, even if above the ceiling.
pub fn filter_by_bitrate(
    representations: &[Representation],
    bitrate_ceiling: f64,
) -> Vec<Representation> {
    let first = match representations.first() {
        None => return vec![],
        Some(first) => first,
    };
    let ceiling = bitrate_ceiling.max(first.bitrate);
    let first_too_high = representations
        .iter()
        .position(|r| r.bitrate > ceiling)
        .unwrap_or(representations.len());
    representations[..first_too_high].to_vec()
}

/// Only keep the Representations whose resolution does not go too far above the given limit.
///
/// We keep every Representation up to the smallest one covering the limit, so the chosen
/// quality never looks worse than what the screen can display. Representations with no known
/// width are always kept.
///
/// Does nothing if either dimension of the limit is unknown, or if no Representation covers it.
pub fn filter_by_resolution(
    representations: &[Representation],
    limit: &ResolutionLimit,
) -> Vec<Representation> {
    let (width, height) = match (limit.width, limit.height) {
        (Some(width), Some(height)) => (width, height),
        _ => return representations.to_vec(),
    };
    let min_width = f64::from(width) * limit.pixel_ratio;
    let min_height = f64::from(height) * limit.pixel_ratio;

    let mut covering_width: Option<u32> = None;
    for rep in representations {
        if let (Some(w), Some(h)) = (rep.width, rep.height) {
            if f64::from(w) >= min_width
                && f64::from(h) >= min_height
                && covering_width.map_or(true, |c| w < c)
            {
                covering_width = Some(w);
            }
        }
    }
    match covering_width {
        None => representations.to_vec(),
        Some(max_width) => representations
            .iter()
            .filter(|r| r.width.map_or(true, |w| w <= max_width))
            .cloned()
            .collect(),
    }
}

/// Apply both the bitrate and the resolution filters to `representations`.
pub fn get_filtered_representations(
    representations: &[Representation],
    resolution_limit: Option<&ResolutionLimit>,
    bitrate_throttle: f64,
) -> Vec<Representation> {
    let mut filtered = if bitrate_throttle < f64::INFINITY {
        filter_by_bitrate(representations, bitrate_throttle)
    } else {
        representations.to_vec()
    };
    if let Some(limit) = resolution_limit {
        filtered = filter_by_resolution(&filtered, limit);
    }
    filtered
}

/// Choose the Representation best fitting `wanted_bitrate`: the last one whose bitrate is lower
/// or equal to it, or the lowest one if all are higher.
///
/// `representations` has to be sorted by ascending bitrate. Returns `None` only if it is empty.
pub fn select_optimal_representation(
    representations: &[Representation],
    wanted_bitrate: f64,
) -> Option<&Representation> {
    let first_too_high = representations
        .iter()
        .position(|r| r.bitrate > wanted_bitrate);
    match first_too_high {
        None => representations.last(),
        Some(0) => representations.first(),
        Some(idx) => representations.get(idx - 1),
    }
}
