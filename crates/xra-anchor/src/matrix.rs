//! Matrix helpers for anchor poses.
//!
//! XR devices report poses as 16 floats, column-major, right-handed. The
//! engine stores them as [`glam::Mat4`] with the same flat layout, so copying
//! is a straight `from_cols_array`.

use glam::Mat4;

use crate::Pose;

/// Flat indices negated when switching a model matrix between right- and
/// left-handed conventions (mirror across the Z axis).
const HAND_TOGGLE_INDICES: [usize; 5] = [2, 6, 8, 9, 14];

/// Copy the pose's 16 components into a matrix.
pub fn from_pose(pose: &Pose) -> Mat4 {
    Mat4::from_cols_array(&pose.matrix)
}

/// Convert a model matrix between right- and left-handed conventions in place.
///
/// Applying it twice restores the original matrix.
pub fn toggle_model_matrix_hand_in_place(m: &mut Mat4) {
    let mut cols = m.to_cols_array();
    for i in HAND_TOGGLE_INDICES {
        cols[i] = -cols[i];
    }
    *m = Mat4::from_cols_array(&cols);
}

/// Place a session-local anchor matrix under a world parent.
///
/// The local transform is applied first, then the parent's world transform.
pub fn apply_world_parent(local: Mat4, parent_world: Mat4) -> Mat4 {
    parent_world * local
}
