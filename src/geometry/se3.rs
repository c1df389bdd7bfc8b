//! SE3: 6-DOF rigid transformation (rotation + translation).
//!
//! Naming follows `t_target_source`: `t_world_device` maps points from the
//! device frame into the world frame, `p_world = t_world_device * p_device`.

use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion, Vector3};

/// Tolerance on the quaternion norm used by [`SE3::is_valid`].
const UNIT_NORM_TOLERANCE: f64 = 1e-6;

/// Rigid body transformation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    /// Identity transformation.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Construct from a rotation matrix and a translation.
    pub fn from_rt(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let rot3 = Rotation3::from_matrix_unchecked(rotation);
        Self {
            rotation: UnitQuaternion::from_rotation_matrix(&rot3),
            translation,
        }
    }

    /// Pure translation.
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation,
        }
    }

    /// Inverse transformation.
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            rotation,
            translation: -(rotation * self.translation),
        }
    }

    /// Composition `self * other` (apply `other` first).
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Transform a point.
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    /// Rotate a direction (translation ignored).
    pub fn transform_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * v
    }

    /// Homogeneous 4x4 matrix `[R | t; 0 | 1]`.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(self.rotation.to_rotation_matrix().matrix());
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    /// True if all components are finite and the rotation is a unit quaternion.
    pub fn is_valid(&self) -> bool {
        let q = self.rotation.quaternion();
        q.coords.iter().all(|c| c.is_finite())
            && self.translation.iter().all(|c| c.is_finite())
            && (q.norm() - 1.0).abs() < UNIT_NORM_TOLERANCE
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Quaternion;

    fn sample_pose() -> SE3 {
        SE3 {
            rotation: UnitQuaternion::from_euler_angles(0.1, -0.4, 0.7),
            translation: Vector3::new(0.5, -1.0, 2.0),
        }
    }

    #[test]
    fn test_inverse_composes_to_identity() {
        let pose = sample_pose();
        let id = pose.compose(&pose.inverse());

        assert_relative_eq!(id.translation, Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(id.rotation.angle(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_compose_matches_sequential_transform() {
        let a = sample_pose();
        let b = SE3::from_translation(Vector3::new(0.0, 0.3, -0.2));
        let p = Vector3::new(1.0, 2.0, 3.0);

        let direct = a.compose(&b).transform_point(&p);
        let sequential = a.transform_point(&b.transform_point(&p));

        assert_relative_eq!(direct, sequential, epsilon = 1e-12);
    }

    #[test]
    fn test_to_matrix_matches_transform_point() {
        let pose = sample_pose();
        let p = Vector3::new(-0.3, 0.2, 4.0);
        let m = pose.to_matrix();
        let h = m * p.push(1.0);

        assert_relative_eq!(h.xyz(), pose.transform_point(&p), epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_pose_detection() {
        assert!(SE3::identity().is_valid());

        let mut nan_pose = SE3::identity();
        nan_pose.translation.x = f64::NAN;
        assert!(!nan_pose.is_valid());

        let skewed = SE3 {
            rotation: UnitQuaternion::new_unchecked(Quaternion::new(2.0, 0.0, 0.0, 0.0)),
            translation: Vector3::zeros(),
        };
        assert!(!skewed.is_valid());
    }
}
