use crate::processing::contrib::ContributionTable;
use crate::processing::geometry::BYTES_PER_PIXEL;

/// Truncates an accumulated channel value into 8 bits.
#[inline]
pub fn clamp_channel(value: f64) -> u8 {
    (value as i32).clamp(0, 255) as u8
}

/// Resamples one RGB row horizontally. `dst` must hold `table.len()` pixels
/// and `src` must hold `table.source_len()` pixels.
pub fn scale_row(table: &ContributionTable, src: &[u8], dst: &mut [u8]) {
    debug_assert_eq!(src.len(), table.source_len() * BYTES_PER_PIXEL);
    debug_assert_eq!(dst.len(), table.len() * BYTES_PER_PIXEL);

    for (i, out) in dst.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
        let (mut r, mut g, mut b) = (0.0, 0.0, 0.0);
        for tap in table.taps(i) {
            let s = &src[tap.source * BYTES_PER_PIXEL..tap.source * BYTES_PER_PIXEL + 3];
            r += s[0] as f64 * tap.weight;
            g += s[1] as f64 * tap.weight;
            b += s[2] as f64 * tap.weight;
        }
        out[0] = clamp_channel(r);
        out[1] = clamp_channel(g);
        out[2] = clamp_channel(b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_and_truncates() {
        assert_eq!(clamp_channel(-12.0), 0);
        assert_eq!(clamp_channel(300.7), 255);
        assert_eq!(clamp_channel(127.9), 127);
    }

    #[test]
    fn flat_row_stays_close_to_flat() {
        let table = ContributionTable::build(1500, 512, 256);
        let src = [200u8, 100, 50].repeat(1500);
        let mut dst = vec![0u8; 512 * 3];
        scale_row(&table, &src, &mut dst);
        for px in dst.chunks_exact(3) {
            assert!((px[0] as i32 - 200).abs() <= 6, "{px:?}");
            assert!((px[1] as i32 - 100).abs() <= 3, "{px:?}");
            assert!((px[2] as i32 - 50).abs() <= 2, "{px:?}");
        }
    }

    #[test]
    fn hard_edge_rings_are_clamped() {
        let table = ContributionTable::build(40, 256, 256);
        let mut src = vec![0u8; 40 * 3];
        for px in src[60..].iter_mut() {
            *px = 255;
        }
        let mut dst = vec![0u8; 256 * 3];
        scale_row(&table, &src, &mut dst);
        // left side dark, right side bright, no wraparound from overshoot
        assert!(dst[10 * 3] < 20);
        assert!(dst[250 * 3] > 235);
    }
}
