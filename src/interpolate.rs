/// Returns the slope from `(x0, y0)` to `(x1, y1)`, or `None` if `x1` is not
/// greater than `x0`.
pub fn slope(x0: f32, x1: f32, y0: f32, y1: f32) -> Option<f32> {
    if x1 > x0 {
        Some((y1 - y0) / (x1 - x0))
    } else {
        None
    }
}

/// Follows a line through `(x0, y0)` with the given slope up to `x`.
pub fn interpolate(x0: f32, y0: f32, slope: f32, x: f32) -> f32 {
    y0 + (x - x0) * slope
}

/// Index of the last value in the ascending slice `xs` that is not greater
/// than `x`.
pub fn segment<T: PartialOrd>(xs: &[T], x: &T) -> Option<usize> {
    xs.partition_point(|value| value <= x).checked_sub(1)
}

#[cfg(test)]
mod tests {
    #[test]
    fn interpolate() {
        assert_eq!(super::interpolate(0.0, 0.0, 10.0, 0.0), 0.0);
        assert_eq!(super::interpolate(0.0, 0.0, 10.0, 2.0), 20.0);
        assert_eq!(super::interpolate(0.0, 0.0, 10.0, 5.0), 50.0);
        assert_eq!(super::interpolate(0.0, 0.0, 10.0, 8.0), 80.0);
        assert_eq!(super::interpolate(0.0, 0.0, 10.0, 10.0), 100.0);
    }

    #[test]
    fn interpolate_flipped_y() {
        assert_eq!(super::interpolate(0.0, 100.0, -10.0, 0.0), 100.0);
        assert_eq!(super::interpolate(0.0, 100.0, -10.0, 2.0), 80.0);
        assert_eq!(super::interpolate(0.0, 100.0, -10.0, 10.0), 0.0);
    }

    #[test]
    fn extrapolates_past_the_end() {
        assert_eq!(super::interpolate(0.0, 0.0, 10.0, 12.0), 120.0);
    }

    #[test]
    fn slope() {
        assert_eq!(super::slope(0.0, 10.0, 0.0, 100.0), Some(10.0));
        assert_eq!(super::slope(0.0, 10.0, 100.0, 0.0), Some(-10.0));
        assert_eq!(super::slope(5.0, 5.0, 0.0, 100.0), None);
        assert_eq!(super::slope(6.0, 5.0, 0.0, 100.0), None);
    }

    #[test]
    fn segment() {
        let xs = [10, 20, 30];
        assert_eq!(super::segment(&xs, &5), None);
        assert_eq!(super::segment(&xs, &10), Some(0));
        assert_eq!(super::segment(&xs, &25), Some(1));
        assert_eq!(super::segment(&xs, &30), Some(2));
        assert_eq!(super::segment(&xs, &99), Some(2));
    }
}
