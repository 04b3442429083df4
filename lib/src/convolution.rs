//! Finite-support complex convolution and cross-correlation
//!
//! Sequences carry an explicit start index so that filters centred on a
//! negative lag can be convolved without shifting buffers around. Both
//! functions use direct summation; the sequences handled here are a few
//! dozen samples long at most.

use num_complex::Complex64;

/// Convolve `in1` (first sample at index `index1`) with `in2` (first sample
/// at index `index2`).
///
/// `corr[k]` receives the convolution at index `index_corr + k`, for
/// `k in 0..corr.len()`. Output indices outside the support of the full
/// convolution are written as zero.
pub fn cconv(
    in1: &[Complex64],
    index1: isize,
    in2: &[Complex64],
    index2: isize,
    index_corr: isize,
    corr: &mut [Complex64],
) {
    let num1 = in1.len() as isize;
    let num2 = in2.len() as isize;

    for (k, out) in corr.iter_mut().enumerate() {
        let i = index_corr + k as isize;
        let jlo = index1.max(i - index2 - num2 + 1);
        let jhi = (index1 + num1 - 1).min(i - index2);

        let mut sum = Complex64::new(0.0, 0.0);
        let mut j = jlo;
        while j <= jhi {
            sum += in1[(j - index1) as usize] * in2[(i - j - index2) as usize];
            j += 1;
        }
        *out = sum;
    }
}

/// Cross-correlate `in1` with `in2`.
///
/// Equivalent to [`cconv`] of the reversed and conjugated `in1` (first sample
/// at index `-(index1 + in1.len() - 1)`) against `in2`, so that
/// `corr[k] = sum_q conj(in1(q)) * in2(q + index_corr + k)`.
pub fn cxcor(
    in1: &[Complex64],
    index1: isize,
    in2: &[Complex64],
    index2: isize,
    index_corr: isize,
    corr: &mut [Complex64],
) {
    let num1 = in1.len() as isize;
    let num2 = in2.len() as isize;

    for (k, out) in corr.iter_mut().enumerate() {
        let lag = index_corr + k as isize;
        // q runs over in1 positions with q + lag inside the support of in2
        let qlo = index1.max(index2 - lag);
        let qhi = (index1 + num1 - 1).min(index2 + num2 - 1 - lag);

        let mut sum = Complex64::new(0.0, 0.0);
        let mut q = qlo;
        while q <= qhi {
            sum += in1[(q - index1) as usize].conj() * in2[(q + lag - index2) as usize];
            q += 1;
        }
        *out = sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    fn real(values: &[f64]) -> Vec<Complex64> {
        values.iter().map(|&v| c(v, 0.0)).collect()
    }

    fn assert_close(a: &[Complex64], b: &[Complex64]) {
        assert_eq!(a.len(), b.len());
        for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            assert!((x - y).norm() < 1e-12, "index {}: {} != {}", i, x, y);
        }
    }

    #[test]
    fn test_cconv_full_support() {
        let in1 = real(&[1.0, 2.0]);
        let in2 = real(&[1.0, 1.0]);
        let mut corr = vec![Complex64::default(); 3];
        cconv(&in1, 0, &in2, 0, 0, &mut corr);
        assert_close(&corr, &real(&[1.0, 3.0, 2.0]));
    }

    #[test]
    fn test_cconv_outside_support_is_zero() {
        let in1 = real(&[1.0, 2.0]);
        let in2 = real(&[1.0, 1.0]);
        let mut corr = vec![c(9.0, 9.0); 6];
        cconv(&in1, 0, &in2, 0, -2, &mut corr);
        assert_close(&corr, &real(&[0.0, 0.0, 1.0, 3.0, 2.0, 0.0]));
    }

    #[test]
    fn test_cconv_index_offsets() {
        // in1 at indices -1..=1, in2 at 0..=1; output window 0..2
        let in1 = real(&[1.0, 0.0, -1.0]);
        let in2 = real(&[2.0, 3.0]);
        let mut corr = vec![Complex64::default(); 2];
        cconv(&in1, -1, &in2, 0, 0, &mut corr);
        // Full result at indices -1..=2: [2, 3, -2, -3]
        assert_close(&corr, &real(&[3.0, -2.0]));
    }

    #[test]
    fn test_cconv_complex_values() {
        let in1 = vec![c(0.0, 1.0)];
        let in2 = vec![c(1.0, 1.0), c(2.0, 0.0)];
        let mut corr = vec![Complex64::default(); 2];
        cconv(&in1, 0, &in2, 0, 0, &mut corr);
        assert_close(&corr, &[c(-1.0, 1.0), c(0.0, 2.0)]);
    }

    #[test]
    fn test_cxcor_autocorrelation() {
        let x = vec![c(1.0, 1.0), c(2.0, -1.0), c(0.0, 3.0)];
        let mut corr = vec![Complex64::default(); 3];
        cxcor(&x, 0, &x, 0, 0, &mut corr);

        // Lag 0: sum |x|^2
        assert!((corr[0] - c(2.0 + 5.0 + 9.0, 0.0)).norm() < 1e-12);
        // Lag 1: conj(x0) x1 + conj(x1) x2
        let lag1 = x[0].conj() * x[1] + x[1].conj() * x[2];
        assert!((corr[1] - lag1).norm() < 1e-12);
        // Lag 2: conj(x0) x2
        assert!((corr[2] - x[0].conj() * x[2]).norm() < 1e-12);
    }

    #[test]
    fn test_cxcor_matches_reversed_conjugated_cconv() {
        let in1 = vec![c(1.0, 2.0), c(-0.5, 0.25), c(3.0, -1.0)];
        let in2 = vec![c(0.5, 0.5), c(1.0, -2.0), c(2.0, 1.0), c(-1.0, 0.0)];
        let index1 = 2;
        let index2 = -1;

        let reversed: Vec<Complex64> = in1.iter().rev().map(|v| v.conj()).collect();
        let rev_index = -(index1 + in1.len() as isize - 1);

        let mut expected = vec![Complex64::default(); 9];
        cconv(&reversed, rev_index, &in2, index2, -6, &mut expected);

        let mut corr = vec![Complex64::default(); 9];
        cxcor(&in1, index1, &in2, index2, -6, &mut corr);

        assert_close(&corr, &expected);
    }

    #[test]
    fn test_cxcor_conjugates_first_input() {
        let in1 = vec![c(0.0, 1.0)];
        let in2 = vec![c(0.0, 1.0)];
        let mut corr = vec![Complex64::default(); 1];
        cxcor(&in1, 0, &in2, 0, 0, &mut corr);
        // conj(i) * i = 1, a plain reversal would give -1
        assert_close(&corr, &[c(1.0, 0.0)]);
    }
}
