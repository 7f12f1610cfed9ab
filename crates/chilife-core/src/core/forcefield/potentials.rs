/// Molar gas constant in kcal/(mol K).
pub const GAS_CONSTANT: f64 = 1.98720425864083e-3;

#[inline]
pub fn lennard_jones_12_6(dist: f64, r_min: f64, well_depth: f64) -> f64 {
    if dist < 1e-6 {
        return 1e10;
    }
    let rho = r_min / dist;
    let rho6 = rho.powi(6);
    let rho12 = rho6 * rho6;
    well_depth * (rho12 - 2.0 * rho6)
}

/// Repulsive branch of the 12-6 potential, clipped to `[0, cap]`.
#[inline]
pub fn lennard_jones_repulsive(dist: f64, r_min: f64, well_depth: f64, cap: f64) -> f64 {
    if dist < 1e-6 {
        return cap;
    }
    lennard_jones_12_6(dist, r_min, well_depth).clamp(0.0, cap)
}

/// Lorentz-Berthelot style combination used by the clash potential.
#[inline]
pub fn combine_lj(rmin_half_i: f64, rmin_half_j: f64, eps_i: f64, eps_j: f64, forgive: f64) -> (f64, f64) {
    ((rmin_half_i + rmin_half_j) * forgive, (eps_i * eps_j).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    #[test]
    fn lennard_jones_12_6_at_minimum_is_negative_well_depth() {
        assert!(f64_approx_equal(lennard_jones_12_6(3.5, 3.5, 0.2), -0.2));
    }

    #[test]
    fn lennard_jones_12_6_handles_zero_distance() {
        assert_eq!(lennard_jones_12_6(0.0, 3.5, 0.2), 1e10);
    }

    #[test]
    fn repulsive_is_zero_at_and_beyond_minimum() {
        assert_eq!(lennard_jones_repulsive(3.5, 3.5, 0.2, 10.0), 0.0);
        assert_eq!(lennard_jones_repulsive(6.0, 3.5, 0.2, 10.0), 0.0);
    }

    #[test]
    fn repulsive_turns_on_at_the_zero_crossing() {
        let crossing = 3.5 * 2f64.powf(-1.0 / 6.0);
        assert_eq!(lennard_jones_repulsive(crossing + 1e-3, 3.5, 0.2, 10.0), 0.0);
        assert!(lennard_jones_repulsive(crossing - 1e-3, 3.5, 0.2, 10.0) > 0.0);
    }

    #[test]
    fn repulsive_is_positive_inside_contact_distance() {
        let dist = 3.0;
        let rho6 = (3.5f64 / dist).powi(6);
        let expected = 0.2 * (rho6 * rho6 - 2.0 * rho6);
        let energy = lennard_jones_repulsive(dist, 3.5, 0.2, 10.0);
        assert!(energy > 0.0);
        assert!(f64_approx_equal(energy, expected));
    }

    #[test]
    fn repulsive_is_capped() {
        assert_eq!(lennard_jones_repulsive(1.0, 3.5, 0.2, 10.0), 10.0);
        assert_eq!(lennard_jones_repulsive(0.0, 3.5, 0.2, 7.5), 7.5);
    }

    #[test]
    fn combine_lj_scales_radius_and_takes_geometric_mean_depth() {
        let (r_min, eps) = combine_lj(1.9, 1.7, 0.1, 0.4, 0.5);
        assert!(f64_approx_equal(r_min, 1.8));
        assert!(f64_approx_equal(eps, 0.2));
    }
}
