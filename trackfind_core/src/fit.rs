//! Trajectory models and fits.
//!
//! Tracks are circles in the xy projection, parameterised at their point of
//! closest approach to the origin (the perigee):
//!
//! - `curvature` ω: signed inverse radius, positive for counter-clockwise motion
//! - `phi0`: direction of flight at the perigee
//! - `impact` d0: signed distance of the perigee from the origin along the
//!   left normal `n = (-sin φ0, cos φ0)`
//!
//! Along the flight the z coordinate is a straight line in arc length
//! (`z = z0 + tanλ · s`).

use nalgebra::{Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::hits::{HitId, HitStore, WireHit};

/// Below this |ω| (1/cm) circle formulas switch to their straight-line limit.
const STRAIGHT_CURVATURE: f64 = 1e-9;

/// Largest radius the circle fit accepts before falling back to a line (cm).
const MAX_FIT_RADIUS: f64 = 1e5;

// ============================================================================
// 2D TRAJECTORY
// ============================================================================

/// Circle (or line) in the xy plane in perigee parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trajectory2D {
    pub curvature: f64,
    pub phi0: f64,
    pub impact: f64,
}

impl Trajectory2D {
    pub fn new(curvature: f64, phi0: f64, impact: f64) -> Self {
        Self {
            curvature,
            phi0,
            impact,
        }
    }

    /// Straight line with the given direction and signed distance to the origin.
    pub fn line(phi0: f64, impact: f64) -> Self {
        Self::new(0.0, phi0, impact)
    }

    /// Circle passing through the origin.
    pub fn through_origin(curvature: f64, phi0: f64) -> Self {
        Self::new(curvature, phi0, 0.0)
    }

    /// Circle with the given center and radius. Counter-clockwise circles
    /// get a positive curvature.
    pub fn from_center_radius(center: Vector2<f64>, radius: f64, counter_clockwise: bool) -> Self {
        let norm = center.norm();
        let towards_center = if norm > 0.0 {
            center / norm
        } else {
            Vector2::new(1.0, 0.0)
        };
        let perigee = center - towards_center * radius;
        let (curvature, normal) = if counter_clockwise {
            (1.0 / radius, towards_center)
        } else {
            (-1.0 / radius, -towards_center)
        };
        let phi0 = (-normal.x).atan2(normal.y);
        Self::new(curvature, phi0, perigee.dot(&normal))
    }

    /// Unit direction of flight at the perigee.
    pub fn direction(&self) -> Vector2<f64> {
        Vector2::new(self.phi0.cos(), self.phi0.sin())
    }

    /// Unit left normal at the perigee.
    pub fn normal(&self) -> Vector2<f64> {
        Vector2::new(-self.phi0.sin(), self.phi0.cos())
    }

    pub fn perigee(&self) -> Vector2<f64> {
        self.normal() * self.impact
    }

    pub fn is_straight(&self) -> bool {
        self.curvature.abs() < STRAIGHT_CURVATURE
    }

    /// Circle center, `None` for straight lines.
    pub fn center(&self) -> Option<Vector2<f64>> {
        if self.is_straight() {
            None
        } else {
            Some(self.perigee() + self.normal() / self.curvature)
        }
    }

    pub fn radius(&self) -> f64 {
        if self.is_straight() {
            f64::INFINITY
        } else {
            1.0 / self.curvature.abs()
        }
    }

    /// Signed distance of a point, positive on the left of the direction of flight.
    ///
    /// Evaluated as `2A / (1 + sqrt(1 - 2ωA))` with `A = q·n - ω|q|²/2`,
    /// which stays exact for nearly straight tracks.
    pub fn distance(&self, point: &Vector2<f64>) -> f64 {
        let q = point - self.perigee();
        let a = q.dot(&self.normal()) - 0.5 * self.curvature * q.norm_squared();
        let u = (1.0 - 2.0 * self.curvature * a).max(0.0).sqrt();
        2.0 * a / (1.0 + u)
    }

    /// Signed distance and its derivatives by (ω, φ0, d0).
    pub fn distance_with_gradient(&self, point: &Vector2<f64>) -> (f64, Vector3<f64>) {
        let omega = self.curvature;
        let n = self.normal();
        let q = point - self.perigee();
        let qn = q.dot(&n);
        let qu = q.dot(&self.direction());
        let a = qn - 0.5 * omega * q.norm_squared();
        let u = (1.0 - 2.0 * omega * a).max(0.0).sqrt();
        let distance = 2.0 * a / (1.0 + u);

        let u_safe = u.max(1e-12);
        let by_a = 2.0 / (1.0 + u) + 2.0 * a * omega / (u_safe * (1.0 + u) * (1.0 + u));
        let by_omega = by_a * (-0.5 * q.norm_squared()) + 2.0 * a * a / (u_safe * (1.0 + u) * (1.0 + u));
        let by_phi0 = by_a * (-qu * (1.0 + omega * self.impact));
        let by_impact = by_a * (omega * qn - 1.0);
        (distance, Vector3::new(by_omega, by_phi0, by_impact))
    }

    /// Arc length from the perigee to the closest approach of a point.
    ///
    /// Lies in (-π/|ω|, π/|ω|] for circles.
    pub fn arc_length(&self, point: &Vector2<f64>) -> f64 {
        let q = point - self.perigee();
        let along = self.direction().dot(&q);
        if self.is_straight() {
            return along;
        }
        let across = 1.0 - self.curvature * q.dot(&self.normal());
        (self.curvature * along).atan2(across) / self.curvature
    }

    /// Point reached after travelling the arc length `s` from the perigee.
    pub fn point_at(&self, s: f64) -> Vector2<f64> {
        let alpha = self.curvature * s;
        if alpha.abs() < 1e-12 {
            return self.perigee() + self.direction() * s;
        }
        let phi = self.phi0 + alpha;
        let chord = Vector2::new(phi.sin() - self.phi0.sin(), self.phi0.cos() - phi.cos());
        self.perigee() + chord / self.curvature
    }

    /// Direction of flight after the arc length `s`.
    pub fn direction_at(&self, s: f64) -> Vector2<f64> {
        let phi = self.phi0 + self.curvature * s;
        Vector2::new(phi.cos(), phi.sin())
    }

    /// Point of the trajectory closest to the given point.
    pub fn closest_point(&self, point: &Vector2<f64>) -> Vector2<f64> {
        self.point_at(self.arc_length(point))
    }

    /// Same circle traversed in the opposite direction.
    pub fn reversed(&self) -> Self {
        Self::new(-self.curvature, normalize_angle(self.phi0 + PI), -self.impact)
    }

    /// Arc length of a full turn, infinite for lines.
    pub fn period(&self) -> f64 {
        if self.is_straight() {
            f64::INFINITY
        } else {
            2.0 * PI / self.curvature.abs()
        }
    }
}

/// Maps an angle into [-π, π).
pub fn normalize_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}

// ============================================================================
// SZ TRAJECTORY
// ============================================================================

/// Straight line in the arc length / z plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SzTrajectory {
    pub tan_lambda: f64,
    pub z0: f64,
}

impl SzTrajectory {
    pub fn new(tan_lambda: f64, z0: f64) -> Self {
        Self { tan_lambda, z0 }
    }

    #[inline]
    pub fn z_at(&self, s: f64) -> f64 {
        self.z0 + self.tan_lambda * s
    }
}

/// Result of a least squares fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitResult<T> {
    pub trajectory: T,
    pub chi2: f64,
    pub ndf: usize,
}

impl<T> FitResult<T> {
    /// χ² per degree of freedom; zero when the fit has no freedom left.
    pub fn chi2_per_ndf(&self) -> f64 {
        if self.ndf == 0 {
            0.0
        } else {
            self.chi2 / self.ndf as f64
        }
    }
}

/// Weighted linear regression of z against arc length.
#[derive(Debug, Clone, Default)]
pub struct SzFitter;

impl SzFitter {
    /// Fits `(s, z, variance)` points. Needs two distinct arc lengths.
    pub fn fit(&self, points: &[(f64, f64, f64)]) -> Option<FitResult<SzTrajectory>> {
        if points.len() < 2 {
            return None;
        }
        let (mut sw, mut ss, mut sz, mut sss, mut ssz) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for &(s, z, variance) in points {
            let w = 1.0 / variance.max(f64::MIN_POSITIVE);
            sw += w;
            ss += w * s;
            sz += w * z;
            sss += w * s * s;
            ssz += w * s * z;
        }
        let det = sw * sss - ss * ss;
        if det.abs() <= 1e-12 * sw * sss.max(1.0) {
            return None;
        }
        let tan_lambda = (sw * ssz - ss * sz) / det;
        let z0 = (sz - tan_lambda * ss) / sw;
        let trajectory = SzTrajectory::new(tan_lambda, z0);

        let chi2 = points
            .iter()
            .map(|&(s, z, variance)| {
                let r = z - trajectory.z_at(s);
                r * r / variance.max(f64::MIN_POSITIVE)
            })
            .sum();

        Some(FitResult {
            trajectory,
            chi2,
            ndf: points.len() - 2,
        })
    }
}

// ============================================================================
// STEREO RECONSTRUCTION
// ============================================================================

/// z position of a stereo hit along a 2D trajectory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoPosition {
    /// Arc length of the reconstructed position
    pub s: f64,
    /// Reconstructed z
    pub z: f64,
    /// Variance of z
    pub variance: f64,
}

/// Both left/right solutions for the z at which a skewed wire's drift
/// circle touches the trajectory, restricted to the wire's z extent.
pub fn stereo_candidates(hit: &WireHit, trajectory: &Trajectory2D) -> Vec<StereoPosition> {
    if hit.is_axial() {
        return Vec::new();
    }

    let s0 = trajectory.arc_length(&hit.ref_position);
    let direction = trajectory.direction_at(s0);
    let left = Vector2::new(-direction.y, direction.x);

    // Signed distance as a function of z, linearised around z = 0
    let d0 = trajectory.distance(&hit.ref_position);
    let slope = left.dot(&hit.skew);
    if slope.abs() < 1e-9 {
        return Vec::new();
    }

    let variance = hit.drift_length_variance / (slope * slope);
    [-1.0, 1.0]
        .iter()
        .filter_map(|side| {
            let z = (side * hit.drift_length - d0) / slope;
            if !hit.contains_z(z) {
                return None;
            }
            let s = trajectory.arc_length(&hit.position_at(z));
            Some(StereoPosition { s, z, variance })
        })
        .collect()
}

/// Single z estimate of a stereo hit: the wire crossing of the trajectory,
/// with the left/right ambiguity folded into the variance.
pub fn stereo_midpoint(hit: &WireHit, trajectory: &Trajectory2D) -> Option<StereoPosition> {
    if hit.is_axial() {
        return None;
    }
    let s0 = trajectory.arc_length(&hit.ref_position);
    let direction = trajectory.direction_at(s0);
    let left = Vector2::new(-direction.y, direction.x);
    let slope = left.dot(&hit.skew);
    if slope.abs() < 1e-9 {
        return None;
    }
    let z = -trajectory.distance(&hit.ref_position) / slope;
    if !hit.contains_z(z) {
        return None;
    }
    Some(StereoPosition {
        s: trajectory.arc_length(&hit.position_at(z)),
        z,
        variance: (hit.drift_length_variance + hit.drift_length * hit.drift_length) / (slope * slope),
    })
}

/// Fits the sz line of the stereo hits of a track.
///
/// A first pass uses the ambiguity-free midpoints, the second picks for every
/// hit the left/right candidate closest to that first line.
pub fn fit_stereo_hits(
    hits: &[&WireHit],
    trajectory: &Trajectory2D,
    fitter: &SzFitter,
) -> Option<FitResult<SzTrajectory>> {
    let midpoints: Vec<(f64, f64, f64)> = hits
        .iter()
        .filter_map(|hit| stereo_midpoint(hit, trajectory))
        .map(|p| (p.s, p.z, p.variance))
        .collect();
    let first = fitter.fit(&midpoints)?;

    let resolved: Vec<(f64, f64, f64)> = hits
        .iter()
        .filter_map(|hit| {
            stereo_candidates(hit, trajectory).into_iter().min_by(|a, b| {
                let da = (a.z - first.trajectory.z_at(a.s)).abs();
                let db = (b.z - first.trajectory.z_at(b.s)).abs();
                da.total_cmp(&db)
            })
        })
        .map(|p| (p.s, p.z, p.variance))
        .collect();

    fitter.fit(&resolved).or(Some(first))
}

// ============================================================================
// CIRCLE FIT
// ============================================================================

/// Algebraic circle fit with a line fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircleFitter {
    /// Left/right refinement passes on the drift circles
    pub drift_iterations: usize,
}

impl Default for CircleFitter {
    fn default() -> Self {
        Self { drift_iterations: 4 }
    }
}

impl CircleFitter {
    pub fn new(drift_iterations: usize) -> Self {
        Self { drift_iterations }
    }

    /// Fits weighted points, oriented from the first towards the last point.
    ///
    /// Minimises `Σ w (x² + y² + a·x + b·y + c)²` on data centred at the
    /// weighted mean. Falls back to the principal axis for fewer than three
    /// points, collinear data or radii beyond the fit range.
    pub fn fit_points(&self, points: &[(Vector2<f64>, f64)]) -> Option<Trajectory2D> {
        if points.len() < 2 {
            return None;
        }
        let total: f64 = points.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return None;
        }
        let mean = points.iter().fold(Vector2::zeros(), |acc, (p, w)| acc + p * *w) / total;

        if points.len() >= 3 {
            if let Some(circle) = self.fit_circle(points, &mean) {
                return Some(circle);
            }
        }
        self.fit_line(points, &mean)
    }

    fn fit_circle(&self, points: &[(Vector2<f64>, f64)], mean: &Vector2<f64>) -> Option<Trajectory2D> {
        let mut m = Matrix3::zeros();
        let mut rhs = Vector3::zeros();
        for (p, w) in points {
            let q = p - mean;
            let row = Vector3::new(q.x, q.y, 1.0);
            let z = q.norm_squared();
            m += row * row.transpose() * *w;
            rhs -= row * (z * w);
        }
        let solution = m.lu().solve(&rhs)?;
        let center_local = Vector2::new(-0.5 * solution.x, -0.5 * solution.y);
        let radius_sq = center_local.norm_squared() - solution.z;
        if radius_sq.is_nan() || radius_sq <= 0.0 {
            return None;
        }
        let radius = radius_sq.sqrt();
        if radius > MAX_FIT_RADIUS {
            return None;
        }
        let center = center_local + mean;

        // Orientation from the accumulated turning around the center
        let turning: f64 = points
            .windows(2)
            .map(|pair| {
                let a = pair[0].0 - center;
                let b = pair[1].0 - center;
                a.x * b.y - a.y * b.x
            })
            .sum();
        Some(Trajectory2D::from_center_radius(center, radius, turning >= 0.0))
    }

    fn fit_line(&self, points: &[(Vector2<f64>, f64)], mean: &Vector2<f64>) -> Option<Trajectory2D> {
        let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
        for (p, w) in points {
            let q = p - mean;
            sxx += w * q.x * q.x;
            sxy += w * q.x * q.y;
            syy += w * q.y * q.y;
        }
        let angle = 0.5 * (2.0 * sxy).atan2(sxx - syy);
        let mut direction = Vector2::new(angle.cos(), angle.sin());

        let first = points.first()?.0;
        let last = points.last()?.0;
        if (last - first).dot(&direction) < 0.0 {
            direction = -direction;
        }
        let phi0 = direction.y.atan2(direction.x);
        let normal = Vector2::new(-direction.y, direction.x);
        Some(Trajectory2D::line(phi0, normal.dot(mean)))
    }

    /// Fits wire hits in their given order, using drift circles.
    ///
    /// Stereo hits contribute at z = 0. Three or more hits get a geometric
    /// fit of the perigee parameters to the signed drift circles, started
    /// from a line and from a circle through the wires. Each start resolves
    /// the left/right sides from its own fit for up to `drift_iterations`
    /// rounds, then tries to flip the worst hits one at a time. The start
    /// with the lower χ² wins.
    pub fn fit_hits(&self, hits: &[&WireHit]) -> Option<FitResult<Trajectory2D>> {
        let wires: Vec<(Vector2<f64>, f64)> = hits
            .iter()
            .map(|h| (h.ref_position, 1.0 / (h.drift_length_variance + h.drift_length * h.drift_length)))
            .collect();

        let trajectory = if hits.len() < 3 {
            let mut trajectory = self.fit_points(&wires)?;
            let touching: Vec<(Vector2<f64>, f64)> = hits
                .iter()
                .map(|h| (h.touching_point(&trajectory, 0.0), 1.0 / h.drift_length_variance))
                .collect();
            if let Some(refined) = self.fit_points(&touching) {
                trajectory = refined;
            }
            trajectory
        } else {
            let total: f64 = wires.iter().map(|(_, w)| w).sum();
            if total <= 0.0 {
                return None;
            }
            let mean = wires.iter().fold(Vector2::zeros(), |acc, (p, w)| acc + p * *w) / total;
            let seeds = [self.fit_line(&wires, &mean), self.fit_circle(&wires, &mean)];
            seeds
                .into_iter()
                .flatten()
                .map(|seed| {
                    let fitted = self.fit_drift_circles(hits, seed);
                    (hit_chi2(hits, &fitted), fitted)
                })
                .filter(|(chi2, _)| chi2.is_finite())
                .min_by(|a, b| a.0.total_cmp(&b.0))
                .map(|(_, fitted)| fitted)?
        };

        let free = if hits.len() >= 3 { 3 } else { 2 };
        Some(FitResult {
            trajectory,
            chi2: hit_chi2(hits, &trajectory),
            ndf: hits.len().saturating_sub(free),
        })
    }

    fn fit_drift_circles(&self, hits: &[&WireHit], seed: Trajectory2D) -> Trajectory2D {
        let mut sides = drift_sides(hits, &seed);
        let (mut trajectory, mut chi2) = fit_with_sides(hits, &sides, seed);
        for _ in 1..self.drift_iterations.max(1) {
            let resolved = drift_sides(hits, &trajectory);
            if resolved == sides {
                break;
            }
            sides = resolved;
            (trajectory, chi2) = fit_with_sides(hits, &sides, trajectory);
        }

        // Flip the sides of badly fitting hits, worst first
        let mut outliers: Vec<(usize, f64)> = hits
            .iter()
            .zip(&sides)
            .enumerate()
            .map(|(i, (h, side))| {
                let r = trajectory.distance(&h.ref_position) - side * h.drift_length;
                (i, r * r / h.drift_length_variance)
            })
            .filter(|&(_, pull)| pull > FLIP_PULL)
            .collect();
        outliers.sort_by(|a, b| b.1.total_cmp(&a.1));
        for (i, _) in outliers {
            sides[i] = -sides[i];
            let (flipped, flipped_chi2) = fit_with_sides(hits, &sides, trajectory);
            if flipped_chi2 < chi2 {
                trajectory = flipped;
                chi2 = flipped_chi2;
            } else {
                sides[i] = -sides[i];
            }
        }
        trajectory
    }

    /// Fits the hits with the given ids.
    pub fn fit_ids(&self, ids: &[HitId], store: &HitStore) -> Option<FitResult<Trajectory2D>> {
        let hits: Vec<&WireHit> = ids.iter().map(|&id| store.get(id)).collect();
        self.fit_hits(&hits)
    }
}

/// Squared pull above which a hit's drift side is tried the other way.
const FLIP_PULL: f64 = 9.0;

/// Damped Gauss-Newton steps per side assignment.
const MAX_FIT_STEPS: usize = 20;

fn hit_chi2(hits: &[&WireHit], trajectory: &Trajectory2D) -> f64 {
    hits.iter()
        .map(|h| {
            let r = h.residual(trajectory);
            r * r / h.drift_length_variance
        })
        .sum()
}

/// Side of every wire relative to the trajectory, +1 on the left.
fn drift_sides(hits: &[&WireHit], trajectory: &Trajectory2D) -> Vec<f64> {
    hits.iter()
        .map(|h| if trajectory.distance(&h.ref_position) >= 0.0 { 1.0 } else { -1.0 })
        .collect()
}

fn signed_chi2(hits: &[&WireHit], sides: &[f64], trajectory: &Trajectory2D) -> f64 {
    hits.iter()
        .zip(sides)
        .map(|(h, side)| {
            let r = trajectory.distance(&h.ref_position) - side * h.drift_length;
            r * r / h.drift_length_variance
        })
        .sum()
}

/// Levenberg-Marquardt fit of (ω, φ0, d0) to drift circles on fixed sides.
fn fit_with_sides(hits: &[&WireHit], sides: &[f64], start: Trajectory2D) -> (Trajectory2D, f64) {
    let mut params = Vector3::new(start.curvature, start.phi0, start.impact);
    let mut chi2 = signed_chi2(hits, sides, &start);
    let mut lambda = 1e-3;

    for _ in 0..MAX_FIT_STEPS {
        let trajectory = Trajectory2D::new(params.x, params.y, params.z);
        let mut normal = Matrix3::zeros();
        let mut gradient = Vector3::zeros();
        for (h, side) in hits.iter().zip(sides) {
            let weight = 1.0 / h.drift_length_variance;
            let (distance, jacobian) = trajectory.distance_with_gradient(&h.ref_position);
            let r = distance - side * h.drift_length;
            normal += jacobian * jacobian.transpose() * weight;
            gradient += jacobian * (r * weight);
        }

        let mut accepted = None;
        while lambda < 1e10 {
            let mut damped = normal;
            for i in 0..3 {
                damped[(i, i)] = normal[(i, i)] * (1.0 + lambda) + 1e-12;
            }
            if let Some(step) = damped.lu().solve(&(-gradient)) {
                let candidate = params + step;
                let candidate_chi2 =
                    signed_chi2(hits, sides, &Trajectory2D::new(candidate.x, candidate.y, candidate.z));
                if candidate_chi2.is_finite() && candidate_chi2 < chi2 {
                    accepted = Some((candidate, candidate_chi2));
                    lambda = (lambda * 0.1).max(1e-9);
                    break;
                }
            }
            lambda *= 10.0;
        }

        let Some((candidate, candidate_chi2)) = accepted else {
            break;
        };
        let gain = chi2 - candidate_chi2;
        params = candidate;
        chi2 = candidate_chi2;
        if gain <= 1e-9 * chi2.max(1.0) {
            break;
        }
    }

    (
        Trajectory2D::new(params.x, normalize_angle(params.y), params.z),
        chi2,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_line_distance_and_arc_length() {
        let line = Trajectory2D::line(0.0, 2.0);
        let p = Vector2::new(5.0, 3.0);
        assert_relative_eq!(line.distance(&p), 1.0, epsilon = 1e-12);
        assert_relative_eq!(line.arc_length(&p), 5.0, epsilon = 1e-12);
        assert_relative_eq!(line.point_at(5.0), Vector2::new(5.0, 2.0), epsilon = 1e-12);
    }

    #[test]
    fn test_circle_through_origin() {
        // Counter-clockwise circle of radius 50 starting along +x
        let circle = Trajectory2D::through_origin(0.02, 0.0);
        let center = circle.center().unwrap();
        assert_relative_eq!(center, Vector2::new(0.0, 50.0), epsilon = 1e-9);

        // Quarter turn
        let s = 0.25 * circle.period();
        let p = circle.point_at(s);
        assert_relative_eq!(p, Vector2::new(50.0, 50.0), epsilon = 1e-9);
        assert_relative_eq!(circle.arc_length(&p), s, epsilon = 1e-9);
        assert_relative_eq!(circle.distance(&p), 0.0, epsilon = 1e-9);

        // Inside the circle is on the left of a counter-clockwise track
        assert_relative_eq!(circle.distance(&Vector2::new(0.0, 10.0)), 10.0, epsilon = 1e-9);
        assert_relative_eq!(circle.distance(&Vector2::new(0.0, -10.0)), -10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_clockwise_circle_signs() {
        let circle = Trajectory2D::through_origin(-0.02, 0.0);
        let center = circle.center().unwrap();
        assert_relative_eq!(center, Vector2::new(0.0, -50.0), epsilon = 1e-9);
        assert!(circle.point_at(10.0).y < 0.0);
        // The origin side of the circle is still on the left
        assert!(circle.distance(&Vector2::new(0.0, 1.0)) > 0.0);
    }

    #[test]
    fn test_from_center_radius_roundtrip() {
        let original = Trajectory2D::new(-0.013, 1.1, 0.7);
        let rebuilt = Trajectory2D::from_center_radius(
            original.center().unwrap(),
            original.radius(),
            original.curvature > 0.0,
        );
        assert_relative_eq!(rebuilt.curvature, original.curvature, epsilon = 1e-12);
        assert_relative_eq!(rebuilt.phi0, original.phi0, epsilon = 1e-9);
        assert_relative_eq!(rebuilt.impact, original.impact, epsilon = 1e-9);
    }

    #[test]
    fn test_reversed_keeps_circle() {
        let t = Trajectory2D::new(0.01, 0.3, -1.5);
        let r = t.reversed();
        assert_relative_eq!(r.center().unwrap(), t.center().unwrap(), epsilon = 1e-9);
        let p = Vector2::new(12.0, -4.0);
        assert_relative_eq!(r.distance(&p), -t.distance(&p), epsilon = 1e-9);
    }

    #[test]
    fn test_circle_fit_recovers_points() {
        let truth = Trajectory2D::through_origin(-0.01, 0.4);
        let points: Vec<(Vector2<f64>, f64)> =
            (1..20).map(|i| (truth.point_at(i as f64 * 4.0), 1.0)).collect();

        let fit = CircleFitter::default().fit_points(&points).unwrap();
        assert_relative_eq!(fit.curvature, truth.curvature, epsilon = 1e-9);
        assert_relative_eq!(fit.phi0, truth.phi0, epsilon = 1e-7);
        assert_relative_eq!(fit.impact, 0.0, epsilon = 1e-7);
    }

    #[test]
    fn test_collinear_points_fall_back_to_line() {
        let points: Vec<(Vector2<f64>, f64)> =
            (0..5).map(|i| (Vector2::new(i as f64, 1.0), 1.0)).collect();
        let fit = CircleFitter::default().fit_points(&points).unwrap();
        assert!(fit.is_straight());
        assert_relative_eq!(fit.phi0, 0.0, epsilon = 1e-12);
        assert_relative_eq!(fit.impact, 1.0, epsilon = 1e-12);

        let reversed: Vec<_> = points.into_iter().rev().collect();
        let fit = CircleFitter::default().fit_points(&reversed).unwrap();
        assert_relative_eq!(fit.phi0.abs(), PI, epsilon = 1e-12);
    }

    #[test]
    fn test_sz_fit() {
        let points: Vec<(f64, f64, f64)> =
            (0..6).map(|i| (i as f64 * 2.0, 3.0 + 0.5 * i as f64 * 2.0, 0.1)).collect();
        let fit = SzFitter.fit(&points).unwrap();
        assert_relative_eq!(fit.trajectory.tan_lambda, 0.5, epsilon = 1e-9);
        assert_relative_eq!(fit.trajectory.z0, 3.0, epsilon = 1e-9);
        assert_eq!(fit.ndf, 4);
        assert!(SzFitter.fit(&points[..1]).is_none());
    }

    #[test]
    fn test_normalize_angle() {
        assert_relative_eq!(normalize_angle(3.0 * PI), -PI, epsilon = 1e-12);
        assert_relative_eq!(normalize_angle(-0.5), -0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_distance_gradient_matches_differences() {
        let trajectory = Trajectory2D::new(0.012, 0.8, -0.3);
        let point = Vector2::new(20.0, 35.0);
        let (distance, gradient) = trajectory.distance_with_gradient(&point);
        assert_relative_eq!(distance, trajectory.distance(&point), epsilon = 1e-12);

        let steps = [1e-7, 1e-6, 1e-6];
        for (i, step) in steps.iter().enumerate() {
            let mut up = Vector3::new(trajectory.curvature, trajectory.phi0, trajectory.impact);
            let mut down = up;
            up[i] += step;
            down[i] -= step;
            let numeric = (Trajectory2D::new(up.x, up.y, up.z).distance(&point)
                - Trajectory2D::new(down.x, down.y, down.z).distance(&point))
                / (2.0 * step);
            assert_relative_eq!(gradient[i], numeric, epsilon = 1e-4, max_relative = 1e-5);
        }
    }

    #[test]
    fn test_drift_fit_of_superlayer_pair() {
        use crate::track::tests::circle_hits;
        use trackfind_env::CylindricalGeometry;

        // Two short clumps, as a segment pair sees them
        let geometry = CylindricalGeometry::default();
        let truth = Trajectory2D::through_origin(0.004, 0.5);
        let raw = circle_hits(&geometry, &truth, &[0, 2]);
        let store = HitStore::build(&raw, &geometry).unwrap();
        let ids: Vec<HitId> = store.iter().map(|h| h.id).collect();

        let fit = CircleFitter::default().fit_ids(&ids, &store).unwrap();
        assert!(fit.chi2_per_ndf() < 1.0, "chi2/ndf {}", fit.chi2_per_ndf());
        assert_relative_eq!(fit.trajectory.curvature, truth.curvature, epsilon = 2e-4);
        assert_relative_eq!(fit.trajectory.phi0, truth.phi0, epsilon = 1e-2);
        for &id in &ids {
            assert!(store.get(id).residual(&fit.trajectory) < 0.01);
        }
    }

    #[test]
    fn test_drift_fit_resolves_sides_of_curved_track() {
        use crate::track::tests::circle_hits;
        use trackfind_env::CylindricalGeometry;

        let geometry = CylindricalGeometry::default();
        let truth = Trajectory2D::through_origin(-0.009, 2.4);
        let raw = circle_hits(&geometry, &truth, &[0, 2, 4, 6, 8]);
        let store = HitStore::build(&raw, &geometry).unwrap();
        let ids: Vec<HitId> = store.iter().map(|h| h.id).collect();

        let fit = CircleFitter::default().fit_ids(&ids, &store).unwrap();
        assert_eq!(fit.ndf, ids.len() - 3);
        assert!(fit.chi2_per_ndf() < 1.0, "chi2/ndf {}", fit.chi2_per_ndf());
        assert_relative_eq!(fit.trajectory.curvature, truth.curvature, epsilon = 1e-4);
    }
}
