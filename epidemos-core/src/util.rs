//! Contains a collection of useful utility functions.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::Float;
use crate::Result;

/// Reads a file at the given path to a String.
pub fn read_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut s = String::new();
    file.read_to_string(&mut s)?;
    Ok(s)
}

/// Create a static deser object from a toml file at the given path.
pub fn deser_struct_from_path<T>(file_path: &Path) -> Result<T>
where
    for<'de> T: serde::Deserialize<'de>,
{
    let string = read_file(file_path)?;
    let d: T = toml::from_str(&string)?;
    Ok(d)
}

/// Piecewise-linear interpolation of `x` over the sample points `(xs, ys)`.
///
/// `xs` must be sorted ascending. Values outside the sampled range are
/// clamped to the first/last sample.
pub fn interp(x: Float, xs: &[Float], ys: &[Float]) -> Float {
    debug_assert_eq!(xs.len(), ys.len());
    if xs.is_empty() {
        return 0.;
    }
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[xs.len() - 1] {
        return ys[ys.len() - 1];
    }
    let mut i = 1;
    while xs[i] < x {
        i += 1;
    }
    let t = (x - xs[i - 1]) / (xs[i] - xs[i - 1]);
    ys[i - 1] + t * (ys[i] - ys[i - 1])
}

/// Truncates string to specified size (ignoring last bytes if they form a partial `char`).
#[inline]
pub(crate) fn truncate_str(slice: &str, size: u8) -> &str {
    if slice.is_char_boundary(size.into()) {
        unsafe { slice.get_unchecked(..size.into()) }
    } else if (size as usize) < slice.len() {
        let mut index = size.saturating_sub(1) as usize;
        while !slice.is_char_boundary(index) {
            index = index.saturating_sub(1);
        }
        unsafe { slice.get_unchecked(..index) }
    } else {
        slice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interp_clamps_and_interpolates() {
        let xs = [0., 10., 20.];
        let ys = [1., 3., 3.];
        assert_eq!(interp(-5., &xs, &ys), 1.);
        assert_eq!(interp(25., &xs, &ys), 3.);
        assert!((interp(5., &xs, &ys) - 2.).abs() < 1e-12);
        assert_eq!(interp(10., &xs, &ys), 3.);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_str("abcdef", 3), "abc");
        assert_eq!(truncate_str("ab", 10), "ab");
        // multi-byte char straddling the cut point gets dropped whole
        assert_eq!(truncate_str("aé", 2), "a");
    }
}
