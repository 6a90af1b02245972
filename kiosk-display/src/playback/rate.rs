//! Playback-rate limits

/// Slowest rate a media element accepts
pub const MIN_RATE: f64 = 0.0625;

/// Fastest rate a media element accepts
pub const MAX_RATE: f64 = 16.0;

/// Crawl rate used while priming and at the ends of each ramp
pub const PRIMER_RATE: f64 = 0.065;

/// Clamp a computed rate into `[MIN_RATE, MAX_RATE]`
///
/// NaN maps to the minimum so a bad computation slows playback instead of stalling it.
pub fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        return MIN_RATE;
    }
    rate.clamp(MIN_RATE, MAX_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_rate_grid() {
        let cases = [
            (0.0, MIN_RATE),
            (-3.0, MIN_RATE),
            (0.01, MIN_RATE),
            (PRIMER_RATE, PRIMER_RATE),
            (0.7, 0.7),
            (1.0, 1.0),
            (16.0, 16.0),
            (40.0, MAX_RATE),
            (f64::INFINITY, MAX_RATE),
            (f64::NEG_INFINITY, MIN_RATE),
            (f64::NAN, MIN_RATE),
        ];
        for (input, expected) in cases {
            assert_eq!(clamp_rate(input), expected, "clamp_rate({input})");
        }
    }

    #[test]
    fn test_primer_rate_within_limits() {
        assert_eq!(clamp_rate(PRIMER_RATE), PRIMER_RATE);
        assert!(PRIMER_RATE > MIN_RATE);
    }
}
