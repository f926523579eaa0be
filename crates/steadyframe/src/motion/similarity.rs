use nalgebra::{Matrix2, Matrix3, Vector2};

/// 4-DOF partial affine transform
///
/// ```text
/// [x']   [a  -b] [x]   [tx]
/// [y'] = [b   a] [y] + [ty]
/// ```
///
/// i.e. rotation by `atan2(b, a)`, uniform scale `hypot(a, b)`, translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform {
    pub a: f64,
    pub b: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Default for SimilarityTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl SimilarityTransform {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        tx: 0.0,
        ty: 0.0,
    };

    #[inline]
    pub fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        [
            self.a * p[0] - self.b * p[1] + self.tx,
            self.b * p[0] + self.a * p[1] + self.ty,
        ]
    }

    /// Squared distance between `apply(src)` and `dst`.
    #[inline]
    pub fn residual_sq(&self, src: [f64; 2], dst: [f64; 2]) -> f64 {
        let q = self.apply(src);
        let dx = q[0] - dst[0];
        let dy = q[1] - dst[1];
        dx * dx + dy * dy
    }

    pub fn rotation(&self) -> f64 {
        self.b.atan2(self.a)
    }

    pub fn scale(&self) -> f64 {
        self.a.hypot(self.b)
    }

    /// Homogeneous 3x3 matrix.
    pub fn to_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.a, -self.b, self.tx, //
            self.b, self.a, self.ty, //
            0.0, 0.0, 1.0,
        )
    }

    /// Finite with a strictly positive scale.
    pub fn is_usable(&self) -> bool {
        self.a.is_finite()
            && self.b.is_finite()
            && self.tx.is_finite()
            && self.ty.is_finite()
            && self.scale() > 1e-9
    }

    /// Exact transform through two correspondences, `None` when the two
    /// source points coincide.
    ///
    /// Treating points as complex numbers, `a + ib = (q1 - q0) / (p1 - p0)`.
    pub fn from_two_points(p0: [f64; 2], p1: [f64; 2], q0: [f64; 2], q1: [f64; 2]) -> Option<Self> {
        let (ux, uy) = (p1[0] - p0[0], p1[1] - p0[1]);
        let (vx, vy) = (q1[0] - q0[0], q1[1] - q0[1]);
        let den = ux * ux + uy * uy;
        if den < 1e-12 {
            return None;
        }
        let a = (vx * ux + vy * uy) / den;
        let b = (vy * ux - vx * uy) / den;
        let tx = q0[0] - (a * p0[0] - b * p0[1]);
        let ty = q0[1] - (b * p0[0] + a * p0[1]);
        Some(Self { a, b, tx, ty })
    }

    /// Closed-form least-squares fit on centred coordinates.
    ///
    /// `None` for fewer than two pairs or when every source point coincides.
    pub fn fit_least_squares(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Option<Self> {
        let n = src.len().min(dst.len());
        if n < 2 {
            return None;
        }
        let inv_n = 1.0 / n as f64;
        let mut ps = Vector2::zeros();
        let mut qs = Vector2::zeros();
        for i in 0..n {
            ps += Vector2::new(src[i][0], src[i][1]);
            qs += Vector2::new(dst[i][0], dst[i][1]);
        }
        let pc = ps * inv_n;
        let qc = qs * inv_n;

        let (mut dot, mut cross, mut norm) = (0.0, 0.0, 0.0);
        for i in 0..n {
            let p = Vector2::new(src[i][0], src[i][1]) - pc;
            let q = Vector2::new(dst[i][0], dst[i][1]) - qc;
            dot += p.dot(&q);
            cross += p.x * q.y - p.y * q.x;
            norm += p.norm_squared();
        }
        if norm < 1e-12 {
            return None;
        }
        let a = dot / norm;
        let b = cross / norm;
        let tx = qc.x - (a * pc.x - b * pc.y);
        let ty = qc.y - (b * pc.x + a * pc.y);
        Some(Self { a, b, tx, ty })
    }
}

/// Eigenvalues `(min, max)` of the scatter matrix of `points`.
pub(crate) fn spread_eigenvalues(points: &[[f64; 2]]) -> (f64, f64) {
    if points.is_empty() {
        return (0.0, 0.0);
    }
    let inv_n = 1.0 / points.len() as f64;
    let mean = points
        .iter()
        .fold(Vector2::zeros(), |acc, p| acc + Vector2::new(p[0], p[1]))
        * inv_n;
    let mut cov = Matrix2::zeros();
    for p in points {
        let d = Vector2::new(p[0], p[1]) - mean;
        cov += d * d.transpose();
    }
    cov *= inv_n;
    let eig = cov.symmetric_eigenvalues();
    (eig.min(), eig.max())
}
