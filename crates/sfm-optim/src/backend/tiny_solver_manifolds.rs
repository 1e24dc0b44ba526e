use std::num::NonZero;

use nalgebra::{convert, DVector, DVectorView, RealField, Vector3};
use tiny_solver::manifold::{AutoDiffManifold, Manifold};

/// Unit sphere S² ⊂ R³, used for translation directions.
///
/// Ambient size 3, tangent size 2. Tangent coordinates are expressed in an
/// orthonormal basis of the tangent plane at `x`; `plus` is the exponential
/// map and `minus` the logarithm.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitVector3Manifold;

const TANGENT_DIM: NonZero<usize> = NonZero::<usize>::MIN.saturating_add(1);

// Below this angle the sphere is treated as flat.
const SMALL_ANGLE: f64 = 1e-8;

fn unit3<T: RealField>(x: DVectorView<T>) -> Vector3<T> {
    debug_assert_eq!(x.len(), 3);
    Vector3::new(x[0].clone(), x[1].clone(), x[2].clone()).normalize()
}

/// Orthonormal basis of the tangent plane at unit `x`.
///
/// The reference axis is the one along which `x` has the smallest component,
/// so it is never close to parallel with `x`.
fn tangent_basis<T: RealField>(x: &Vector3<T>) -> (Vector3<T>, Vector3<T>) {
    let (ax, ay, az) = (x.x.clone().abs(), x.y.clone().abs(), x.z.clone().abs());
    let axis = if ax <= ay && ax <= az {
        Vector3::x()
    } else if ay <= az {
        Vector3::y()
    } else {
        Vector3::z()
    };
    let b1 = (axis.clone() - x * x.dot(&axis)).normalize();
    let b2 = x.cross(&b1);
    (b1, b2)
}

impl<T: RealField> AutoDiffManifold<T> for UnitVector3Manifold {
    fn plus(&self, x: DVectorView<T>, delta: DVectorView<T>) -> DVector<T> {
        debug_assert_eq!(delta.len(), 2);
        let x = unit3(x);
        let (b1, b2) = tangent_basis(&x);
        let v = b1 * delta[0].clone() + b2 * delta[1].clone();

        let theta2 = v.norm_squared();
        let (cos_t, sinc_t) = if theta2 < convert::<f64, T>(SMALL_ANGLE * SMALL_ANGLE) {
            let half: T = convert(0.5);
            let sixth: T = convert(1.0 / 6.0);
            (
                T::one() - theta2.clone() * half,
                T::one() - theta2 * sixth,
            )
        } else {
            let theta = theta2.sqrt();
            let (sin_t, cos_t) = theta.clone().sin_cos();
            (cos_t, sin_t / theta)
        };

        let y = (x * cos_t + v * sinc_t).normalize();
        DVector::from_column_slice(y.as_slice())
    }

    fn minus(&self, y: DVectorView<T>, x: DVectorView<T>) -> DVector<T> {
        let x = unit3(x);
        let y = unit3(y);
        let (b1, b2) = tangent_basis(&x);

        let cos_t = x.dot(&y);
        let sin_t = x.cross(&y).norm();
        let tangent = y - x * cos_t.clone();

        let w = if sin_t < convert::<f64, T>(SMALL_ANGLE) {
            if cos_t > T::zero() {
                Vector3::zeros()
            } else {
                // Antipodal: any direction is a geodesic, take b1.
                b1.clone() * T::pi()
            }
        } else {
            let theta = sin_t.clone().atan2(cos_t);
            tangent * (theta / sin_t)
        };

        DVector::from_column_slice(&[b1.dot(&w), b2.dot(&w)])
    }
}

impl Manifold for UnitVector3Manifold {
    fn tangent_size(&self) -> NonZero<usize> {
        TANGENT_DIM
    }
}
