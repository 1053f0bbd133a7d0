//! Linear algebra type system for trajectory evaluation
//!
//! Short aliases over nalgebra so the engine reads in terms of poses,
//! rotations and points rather than generic matrices.

use nalgebra::{Isometry3, Matrix3, Matrix4, UnitQuaternion, Vector3};

// ===== Tolerances =====
pub const SO3_TOLERANCE: f64 = 1e-6; // orthonormality / determinant slack
pub const QUATERNION_NORM_TOLERANCE: f64 = 1e-4; // loader-supplied quaternions
pub const TIMESTAMP_EPSILON: f64 = 1e-9; // seconds

// ===== Rigid transforms =====
pub type Se3 = Isometry3<f64>;
pub type Rot3 = UnitQuaternion<f64>;
pub type Vec3 = Vector3<f64>;

// ===== Matrices =====
pub type Mat3 = Matrix3<f64>; // rotations, cross-covariance
pub type Mat4 = Matrix4<f64>; // homogeneous SE(3) / Sim(3)

/// `(i, j)` indices into a paired pose sequence, `i < j`
pub type IndexPair = (usize, usize);
