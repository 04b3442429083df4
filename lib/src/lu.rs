//! Small dense LU solver
//!
//! Crout decomposition with partial pivoting and implicit row scaling,
//! used to solve the per-frequency normal equations of the prediction
//! filter. Matrices are square, row-major and flat.
//!
//! The decomposition overwrites its input matrix with the LU factors. A
//! caller that still needs the original matrix afterwards must copy it
//! before calling [`lu_decomposition`].

/// Pivot value substituted for an exactly zero pivot
pub const TINY_PIVOT: f64 = 1.0e-10;

/// Decompose the `n x n` matrix `a` in place.
///
/// On return `a` holds L (unit diagonal, below) and U (on and above the
/// diagonal) of a row-wise permutation of the input, and `indx[..n]` records
/// the permutation. `scale[..n]` is scratch space for the implicit row
/// scaling.
///
/// Singular input never fails: a zero pivot is replaced by [`TINY_PIVOT`]
/// and an all-zero row gets unit scaling. Returns the number of pivots
/// that were substituted.
pub fn lu_decomposition(a: &mut [f64], n: usize, indx: &mut [usize], scale: &mut [f64]) -> usize {
    let mut degenerate_pivots = 0;

    for i in 0..n {
        let big = a[i * n..(i + 1) * n]
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        scale[i] = if big == 0.0 { 1.0 } else { 1.0 / big };
    }

    for j in 0..n {
        for i in 0..j {
            let mut sum = a[i * n + j];
            for k in 0..i {
                sum -= a[i * n + k] * a[k * n + j];
            }
            a[i * n + j] = sum;
        }

        let mut big = 0.0;
        let mut imax = j;
        for i in j..n {
            let mut sum = a[i * n + j];
            for k in 0..j {
                sum -= a[i * n + k] * a[k * n + j];
            }
            a[i * n + j] = sum;

            let dum = scale[i] * sum.abs();
            if dum >= big {
                big = dum;
                imax = i;
            }
        }

        if j != imax {
            for k in 0..n {
                a.swap(imax * n + k, j * n + k);
            }
            scale[imax] = scale[j];
        }
        indx[j] = imax;

        if a[j * n + j] == 0.0 {
            a[j * n + j] = TINY_PIVOT;
            degenerate_pivots += 1;
        }

        if j + 1 != n {
            let dum = 1.0 / a[j * n + j];
            for i in (j + 1)..n {
                a[i * n + j] *= dum;
            }
        }
    }

    degenerate_pivots
}

/// Solve `A x = b` given the factors produced by [`lu_decomposition`].
///
/// `b[..n]` is overwritten with the solution.
pub fn lu_back_sub(a: &[f64], n: usize, indx: &[usize], b: &mut [f64]) {
    let mut first_nonzero: Option<usize> = None;

    for i in 0..n {
        let ip = indx[i];
        let mut sum = b[ip];
        b[ip] = b[i];
        match first_nonzero {
            Some(ii) => {
                for j in ii..i {
                    sum -= a[i * n + j] * b[j];
                }
            }
            None => {
                if sum != 0.0 {
                    first_nonzero = Some(i);
                }
            }
        }
        b[i] = sum;
    }

    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= a[i * n + j] * b[j];
        }
        b[i] = sum / a[i * n + i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solve(matrix: &[f64], rhs: &[f64]) -> (Vec<f64>, usize) {
        let n = rhs.len();
        let mut a = matrix.to_vec();
        let mut b = rhs.to_vec();
        let mut indx = vec![0; n];
        let mut scale = vec![0.0; n];
        let degenerate = lu_decomposition(&mut a, n, &mut indx, &mut scale);
        lu_back_sub(&a, n, &indx, &mut b);
        (b, degenerate)
    }

    #[test]
    fn test_two_by_two() {
        let (x, degenerate) = solve(&[4.0, 3.0, 6.0, 3.0], &[1.0, 2.0]);
        assert!((x[0] - 0.5).abs() < 1e-12);
        assert!((x[1] + 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(degenerate, 0);
    }

    #[test]
    fn test_requires_pivoting() {
        // Zero in the leading position forces a row swap
        let mut a = vec![0.0, 1.0, 1.0, 0.0];
        let mut b = vec![3.0, 7.0];
        let mut indx = vec![0; 2];
        let mut scale = vec![0.0; 2];
        assert_eq!(lu_decomposition(&mut a, 2, &mut indx, &mut scale), 0);
        assert_eq!(indx, vec![1, 1]);
        lu_back_sub(&a, 2, &indx, &mut b);
        assert!((b[0] - 7.0).abs() < 1e-12);
        assert!((b[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_three_by_three_residual() {
        let m = [2.0, -1.0, 0.5, 1.0, 3.0, -2.0, 0.25, 1.5, 4.0];
        let b = [1.0, -2.0, 0.5];
        let (x, _) = solve(&m, &b);
        for i in 0..3 {
            let r: f64 = (0..3).map(|j| m[i * 3 + j] * x[j]).sum();
            assert!((r - b[i]).abs() < 1e-12, "row {} residual {}", i, r - b[i]);
        }
    }

    #[test]
    fn test_decomposition_consumes_matrix() {
        let original = vec![4.0, 3.0, 6.0, 3.0];
        let mut a = original.clone();
        let mut indx = vec![0; 2];
        let mut scale = vec![0.0; 2];
        lu_decomposition(&mut a, 2, &mut indx, &mut scale);
        assert_ne!(a, original);
    }

    #[test]
    fn test_zero_matrix_uses_tiny_pivot() {
        let (x, degenerate) = solve(&[0.0; 16], &[0.0; 4]);
        assert_eq!(degenerate, 4);
        assert!(x.iter().all(|v| v.is_finite()));
        assert!(x.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_singular_matrix_stays_finite() {
        let (x, degenerate) = solve(&[1.0, 2.0, 2.0, 4.0], &[1.0, 2.0]);
        assert!(degenerate > 0);
        assert!(x.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_oversized_scratch() {
        let n = 2;
        let mut a = vec![4.0, 3.0, 6.0, 3.0];
        let mut b = vec![1.0, 2.0];
        let mut indx = vec![0; 8];
        let mut scale = vec![0.0; 8];
        lu_decomposition(&mut a, n, &mut indx, &mut scale);
        lu_back_sub(&a, n, &indx, &mut b);
        assert!((b[0] - 0.5).abs() < 1e-12);
    }
}
