use rankboard_core::Rank;

/// Score of a first-place result; ranks above 1 never score higher.
pub const TOP_SCORE: f64 = 6.0;
/// Score for anything past the last control point, including out-of-range.
pub const OUT_OF_RANGE_SCORE: f64 = 1.5;

const CONTROL_POINTS: [(f64, f64); 5] = [
    (1.0, 6.0),
    (5.0, 5.0),
    (20.0, 4.0),
    (50.0, 3.0),
    (100.0, 2.0),
];

/// Chart score for a rank. Unrecognized markers map to NaN, which plots as a
/// gap.
pub fn to_score(rank: &Rank) -> f64 {
    match rank {
        Rank::Position(position) => position_score(f64::from(*position)),
        Rank::OutOfRange => OUT_OF_RANGE_SCORE,
        Rank::Unrecognized(_) => f64::NAN,
    }
}

/// Piecewise-linear score between the control points. Accepts fractional
/// positions, e.g. an averaged rank.
pub fn position_score(position: f64) -> f64 {
    if position.is_nan() {
        return f64::NAN;
    }

    for window in CONTROL_POINTS.windows(2) {
        let (low_rank, low_score) = window[0];
        let (high_rank, high_score) = window[1];
        if position >= low_rank && position <= high_rank {
            let ratio = (position - low_rank) / (high_rank - low_rank);
            return low_score - ratio * (low_score - high_score);
        }
    }

    if position < CONTROL_POINTS[0].0 {
        TOP_SCORE
    } else {
        OUT_OF_RANGE_SCORE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(left: f64, right: f64) -> bool {
        (left - right).abs() < 1e-9
    }

    #[test]
    fn control_points_map_exactly() {
        for (rank, score) in CONTROL_POINTS {
            assert!(approx_eq(position_score(rank), score), "rank {rank}");
        }
    }

    #[test]
    fn fractional_positions_interpolate() {
        assert!(approx_eq(position_score(12.5), 4.5));
        assert!(approx_eq(position_score(3.0), 5.5));
        assert!(approx_eq(position_score(75.0), 2.5));
    }

    #[test]
    fn scores_outside_control_range_are_clamped() {
        assert!(approx_eq(position_score(0.5), TOP_SCORE));
        assert!(approx_eq(position_score(101.0), OUT_OF_RANGE_SCORE));
        assert!(approx_eq(to_score(&Rank::OutOfRange), OUT_OF_RANGE_SCORE));
    }

    #[test]
    fn out_of_range_scores_below_last_position() {
        assert!(to_score(&Rank::OutOfRange) < to_score(&Rank::Position(100)));
    }

    #[test]
    fn score_never_increases_with_worse_rank() {
        let mut previous = to_score(&Rank::Position(1));
        for position in 2..=150 {
            let score = to_score(&Rank::Position(position));
            assert!(score <= previous, "score rose at rank {position}");
            previous = score;
        }
    }

    #[test]
    fn unrecognized_marker_is_a_gap() {
        assert!(to_score(&Rank::Unrecognized("エラー".to_owned())).is_nan());
        assert!(position_score(f64::NAN).is_nan());
    }
}
