// src/quartic.rs
//! Closed-form polynomial root finding over the complex numbers.
//!
//! The ballistics solver (`ballistics.rs`) needs the roots of a quartic
//! in flight time; rather than special-case real/complex coefficients,
//! everything here works in `Complex<f64>` and callers filter the
//! results down to the physically meaningful positive-real root.

use num_complex::Complex64;

const EPS: f64 = 1e-9;

fn principal_sqrt(z: Complex64) -> Complex64 {
    let (r, theta) = z.to_polar();
    Complex64::from_polar(r.sqrt(), theta / 2.0)
}

fn principal_cbrt(z: Complex64) -> Complex64 {
    let (r, theta) = z.to_polar();
    Complex64::from_polar(r.cbrt(), theta / 3.0)
}

/// Roots of `a*x^2 + b*x + c = 0`. Degrades to a linear solve if `a == 0`.
pub fn solve_quadratic(a: Complex64, b: Complex64, c: Complex64) -> Vec<Complex64> {
    if a.norm() < EPS {
        if b.norm() < EPS {
            return Vec::new();
        }
        return vec![-c / b];
    }
    let disc = b * b - Complex64::new(4.0, 0.0) * a * c;
    let sq = principal_sqrt(disc);
    let two_a = Complex64::new(2.0, 0.0) * a;
    vec![(-b + sq) / two_a, (-b - sq) / two_a]
}

/// Roots of `a*x^3 + b*x^2 + c*x + d = 0` via Cardano's method, using the
/// single-cube-root trick (`t_k = C*ω^k - p/(3*C*ω^k)`) to avoid the usual
/// branch-matching ambiguity between the two auxiliary cube roots.
pub fn solve_cubic(a: Complex64, b: Complex64, c: Complex64, d: Complex64) -> Vec<Complex64> {
    if a.norm() < EPS {
        return solve_quadratic(b, c, d);
    }
    let b = b / a;
    let c = c / a;
    let d = d / a;

    // Depress: x = t - b/3, giving t^3 + p*t + q = 0.
    let p = c - b * b / Complex64::new(3.0, 0.0);
    let q = Complex64::new(2.0, 0.0) * b * b * b / Complex64::new(27.0, 0.0)
        - b * c / Complex64::new(3.0, 0.0)
        + d;

    let shift = b / Complex64::new(3.0, 0.0);

    if p.norm() < EPS && q.norm() < EPS {
        return vec![-shift; 3];
    }

    let disc_sqrt = principal_sqrt(q * q / Complex64::new(4.0, 0.0) + p * p * p / Complex64::new(27.0, 0.0));
    let mut term = -q / Complex64::new(2.0, 0.0) + disc_sqrt;
    if term.norm() < EPS {
        term = -q / Complex64::new(2.0, 0.0) - disc_sqrt;
    }
    let c_root = principal_cbrt(term);

    if c_root.norm() < EPS {
        // p == q == 0 was already handled above, so this only happens in
        // degenerate numerical edge cases; fall back to the triple root.
        return vec![-shift; 3];
    }

    let omega = Complex64::new(-0.5, 3f64.sqrt() / 2.0);
    let omega2 = omega * omega;
    let three = Complex64::new(3.0, 0.0);

    let t0 = c_root - p / (three * c_root);
    let t1 = c_root * omega - p / (three * c_root * omega);
    let t2 = c_root * omega2 - p / (three * c_root * omega2);

    vec![t0 - shift, t1 - shift, t2 - shift]
}

/// Roots of `a*x^4 + b*x^3 + c*x^2 + d*x + e = 0` via Ferrari's method.
/// Degrades to `solve_cubic` if `a == 0`.
pub fn solve_quartic(
    a: Complex64,
    b: Complex64,
    c: Complex64,
    d: Complex64,
    e: Complex64,
) -> Vec<Complex64> {
    if a.norm() < EPS {
        return solve_cubic(b, c, d, e);
    }
    let b = b / a;
    let c = c / a;
    let d = d / a;
    let e = e / a;

    // Depress: x = y - b/4, giving y^4 + p*y^2 + q*y + r = 0.
    let p = c - Complex64::new(3.0, 0.0) * b * b / Complex64::new(8.0, 0.0);
    let q = b * b * b / Complex64::new(8.0, 0.0) - b * c / Complex64::new(2.0, 0.0) + d;
    let r = -Complex64::new(3.0, 0.0) * b * b * b * b / Complex64::new(256.0, 0.0)
        + b * b * c / Complex64::new(16.0, 0.0)
        - b * d / Complex64::new(4.0, 0.0)
        + e;

    let shift = b / Complex64::new(4.0, 0.0);

    let ys: Vec<Complex64> = if q.norm() < EPS {
        // Biquadratic: z^2 + p*z + r = 0, y = +/- sqrt(z).
        let mut ys = Vec::with_capacity(4);
        for z in solve_quadratic(Complex64::new(1.0, 0.0), p, r) {
            let s = principal_sqrt(z);
            ys.push(s);
            ys.push(-s);
        }
        ys
    } else {
        // Resolvent cubic: 8m^3 + 8p*m^2 + (2p^2 - 8r)*m - q^2 = 0.
        let cubic_roots = solve_cubic(
            Complex64::new(8.0, 0.0),
            Complex64::new(8.0, 0.0) * p,
            Complex64::new(2.0, 0.0) * p * p - Complex64::new(8.0, 0.0) * r,
            -(q * q),
        );
        let m = cubic_roots
            .into_iter()
            .max_by(|x, y| x.norm().partial_cmp(&y.norm()).unwrap())
            .unwrap_or(Complex64::new(0.0, 0.0));

        let s = principal_sqrt(Complex64::new(2.0, 0.0) * m);
        let term = q / (Complex64::new(2.0, 0.0) * s);
        let half_p_plus_m = p / Complex64::new(2.0, 0.0) + m;

        let mut ys = solve_quadratic(Complex64::new(1.0, 0.0), -s, half_p_plus_m + term);
        ys.extend(solve_quadratic(Complex64::new(1.0, 0.0), s, half_p_plus_m - term));
        ys
    };

    ys.into_iter().map(|y| y - shift).collect()
}

/// Smallest positive real root among a root set, where "real" means the
/// imaginary part is below `tolerance` in magnitude. Returns `None` if no
/// such root exists.
pub fn smallest_positive_real_root(roots: &[Complex64], tolerance: f64) -> Option<f64> {
    roots
        .iter()
        .filter(|r| r.im.abs() < tolerance && r.re > 0.0)
        .map(|r| r.re)
        .fold(None, |acc, re| match acc {
            None => Some(re),
            Some(best) if re < best => Some(re),
            Some(best) => Some(best),
        })
}
