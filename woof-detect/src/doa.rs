//! Direction-of-arrival estimation for a uniform linear array (ULA), in
//! scope for this port (unlike the classifier/tagger/harmonic oracles,
//! this math is fully specified rather than black-boxed).

use rustfft::num_complex::Complex64;

pub struct DoaEstimate {
    pub bartlett: i32,
    pub capon: i32,
    pub mem: i32,
}

const FRONT_FACING: DoaEstimate = DoaEstimate {
    bartlett: 90,
    capon: 90,
    mem: 90,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    FarLeft,
    Left,
    Front,
    Right,
    FarRight,
}

/// Partitions `[0, 180]` degrees into coarse human-facing directions.
pub fn angle_to_direction(degrees: i32) -> Direction {
    if degrees < 30 {
        Direction::FarLeft
    } else if degrees < 60 {
        Direction::Left
    } else if degrees < 120 {
        Direction::Front
    } else if degrees < 150 {
        Direction::Right
    } else {
        Direction::FarRight
    }
}

/// A small row-major complex matrix, just large enough for the array
/// sizes this spec targets (a handful of microphone elements).
struct CMatrix {
    n: usize,
    data: Vec<Complex64>,
}

impl CMatrix {
    fn zeros(n: usize) -> Self {
        CMatrix {
            n,
            data: vec![Complex64::new(0.0, 0.0); n * n],
        }
    }

    fn get(&self, r: usize, c: usize) -> Complex64 {
        self.data[r * self.n + c]
    }

    fn set(&mut self, r: usize, c: usize, v: Complex64) {
        self.data[r * self.n + c] = v;
    }

    /// Gauss-Jordan inversion with partial pivoting. `None` on a singular
    /// (or near-singular) matrix.
    fn invert(&self) -> Option<CMatrix> {
        let n = self.n;
        let mut a = self.data.clone();
        let mut inv = vec![Complex64::new(0.0, 0.0); n * n];
        for i in 0..n {
            inv[i * n + i] = Complex64::new(1.0, 0.0);
        }

        for col in 0..n {
            let mut pivot_row = col;
            let mut pivot_mag = a[col * n + col].norm();
            for row in (col + 1)..n {
                let mag = a[row * n + col].norm();
                if mag > pivot_mag {
                    pivot_mag = mag;
                    pivot_row = row;
                }
            }

            if pivot_mag < 1e-12 {
                return None;
            }

            if pivot_row != col {
                for k in 0..n {
                    a.swap(col * n + k, pivot_row * n + k);
                    inv.swap(col * n + k, pivot_row * n + k);
                }
            }

            let pivot = a[col * n + col];
            for k in 0..n {
                a[col * n + k] /= pivot;
                inv[col * n + k] /= pivot;
            }

            for row in 0..n {
                if row == col {
                    continue;
                }
                let factor = a[row * n + col];
                if factor.norm() == 0.0 {
                    continue;
                }
                for k in 0..n {
                    a[row * n + k] -= factor * a[col * n + k];
                    inv[row * n + k] -= factor * inv[col * n + k];
                }
            }
        }

        Some(CMatrix { n, data: inv })
    }
}

fn sample_covariance(channels: &[Vec<f32>]) -> CMatrix {
    let n = channels.len();
    let t = channels.iter().map(|c| c.len()).min().unwrap_or(0).max(1);
    let mut r = CMatrix::zeros(n);

    for i in 0..n {
        for j in 0..n {
            let mut acc = 0.0f64;
            for s in 0..t {
                acc += f64::from(channels[i][s]) * f64::from(channels[j][s]);
            }
            r.set(i, j, Complex64::new(acc / t as f64, 0.0));
        }
    }

    r
}

fn steering_vector(theta_deg: i32, n: usize, element_spacing: f32) -> Vec<Complex64> {
    let theta = (theta_deg as f64).to_radians();
    let d = f64::from(element_spacing);
    (0..n)
        .map(|k| {
            let phase = -2.0 * std::f64::consts::PI * k as f64 * d * theta.sin();
            Complex64::new(phase.cos(), phase.sin())
        })
        .collect()
}

/// `a^H M a`, the steering vector quadratic form used by all three
/// spectra.
fn quadratic_form(a: &[Complex64], m: &CMatrix) -> Complex64 {
    let n = a.len();
    let mut result = Complex64::new(0.0, 0.0);
    for i in 0..n {
        let mut row_sum = Complex64::new(0.0, 0.0);
        for j in 0..n {
            row_sum += m.get(i, j) * a[j];
        }
        result += a[i].conj() * row_sum;
    }
    result
}

pub fn estimate(
    channels: &[Vec<f32>],
    element_spacing: f32,
    angle_min: i32,
    angle_max: i32,
) -> DoaEstimate {
    let n = channels.len();
    if n < 2 {
        return FRONT_FACING;
    }

    let r = sample_covariance(channels);
    let Some(r_inv) = r.invert() else {
        return FRONT_FACING;
    };

    let mut best_bartlett = (angle_min, f64::MIN);
    let mut best_capon = (angle_min, f64::MIN);
    let mut best_mem = (angle_min, f64::MIN);

    // First column of R^-1, used by the MEM spectrum.
    let e1: Vec<Complex64> = (0..n).map(|i| r_inv.get(i, 0)).collect();

    for theta in angle_min..=angle_max {
        let a = steering_vector(theta, n, element_spacing);

        let bartlett_val = quadratic_form(&a, &r).re;
        if bartlett_val > best_bartlett.1 {
            best_bartlett = (theta, bartlett_val);
        }

        let capon_denom = quadratic_form(&a, &r_inv).re;
        let capon_val = if capon_denom.abs() > 1e-12 {
            1.0 / capon_denom
        } else {
            f64::MIN
        };
        if capon_val > best_capon.1 {
            best_capon = (theta, capon_val);
        }

        let mut inner = Complex64::new(0.0, 0.0);
        for i in 0..n {
            inner += a[i].conj() * e1[i];
        }
        let mem_denom = inner.norm_sqr();
        let mem_val = if mem_denom > 1e-12 {
            1.0 / mem_denom
        } else {
            f64::MIN
        };
        if mem_val > best_mem.1 {
            best_mem = (theta, mem_val);
        }
    }

    DoaEstimate {
        bartlett: best_bartlett.0,
        capon: best_capon.0,
        mem: best_mem.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_channel_is_front_facing() {
        let channels = vec![vec![0.1f32; 100]];
        let e = estimate(&channels, 0.1, 0, 180);
        assert_eq!(e.bartlett, 90);
        assert_eq!(e.capon, 90);
        assert_eq!(e.mem, 90);
    }

    #[test]
    fn identical_channels_collapse_covariance_and_front_face() {
        // A singular covariance (perfectly correlated channels) must not panic.
        let channels = vec![vec![0.2f32; 200], vec![0.2f32; 200]];
        let e = estimate(&channels, 0.1, 0, 180);
        assert_eq!(e.bartlett, 90);
    }

    #[test]
    fn direction_boundaries_match_partition_table() {
        assert_eq!(angle_to_direction(0), Direction::FarLeft);
        assert_eq!(angle_to_direction(29), Direction::FarLeft);
        assert_eq!(angle_to_direction(30), Direction::Left);
        assert_eq!(angle_to_direction(59), Direction::Left);
        assert_eq!(angle_to_direction(60), Direction::Front);
        assert_eq!(angle_to_direction(119), Direction::Front);
        assert_eq!(angle_to_direction(120), Direction::Right);
        assert_eq!(angle_to_direction(149), Direction::Right);
        assert_eq!(angle_to_direction(150), Direction::FarRight);
        assert_eq!(angle_to_direction(180), Direction::FarRight);
    }
}
