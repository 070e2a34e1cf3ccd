//! Back-to-front ordering of translucent collections.
//!
//! Collections with any alpha below one are drawn after every opaque
//! collection, without writing depth. Their instance records are kept on the
//! CPU and re-sorted farthest-first whenever the eye moves, so instances blend
//! over whatever lies behind them.

use glam::Vec3;
use scene3d_core::layout::RecordLayout;

use crate::dynamic_buffer::Allocation;

/// Returns true if any record in `data` has an alpha below one.
#[must_use]
pub fn has_translucency(data: &[f32], layout: &RecordLayout) -> bool {
    let Some(alpha) = layout.alpha else {
        return false;
    };
    data.chunks_exact(layout.floats)
        .any(|record| record[alpha] < 1.0)
}

fn center(group: &[f32]) -> Vec3 {
    Vec3::new(group[0], group[1], group[2])
}

/// Reorders groups of `group_floats` floats so the group whose center is
/// farthest from `eye` comes first. Centers are the first three floats.
#[must_use]
pub fn sort_back_to_front(data: &[f32], group_floats: usize, eye: Vec3) -> Vec<f32> {
    let mut groups: Vec<(&[f32], f32)> = data
        .chunks_exact(group_floats)
        .map(|group| (group, center(group).distance_squared(eye)))
        .collect();
    groups.sort_by(|a, b| b.1.total_cmp(&a.1));
    groups.into_iter().flat_map(|(group, _)| group).copied().collect()
}

/// Mean distance from `eye` to the group centers.
#[must_use]
pub fn mean_distance(data: &[f32], group_floats: usize, eye: Vec3) -> f32 {
    let (sum, count) = data
        .chunks_exact(group_floats)
        .fold((0.0, 0usize), |(sum, count), group| {
            (sum + center(group).distance(eye), count + 1)
        });
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

/// CPU copy of a translucent collection's visual records.
#[derive(Debug, Clone)]
pub struct TranslucentRecords {
    records: Vec<f32>,
    /// Floats per instance; several records for axis rings.
    group_floats: usize,
    buffer: wgpu::Buffer,
    offset: u64,
    sorted_for: Option<Vec3>,
    distance: f32,
}

impl TranslucentRecords {
    /// Wraps `records`, already written unsorted at `allocation`.
    #[must_use]
    pub fn new(records: Vec<f32>, group_floats: usize, allocation: &Allocation) -> Self {
        Self {
            records,
            group_floats: group_floats.max(1),
            buffer: allocation.buffer.clone(),
            offset: allocation.offset,
            sorted_for: None,
            distance: 0.0,
        }
    }

    /// Rewrites the instance slice in back-to-front order for `eye`.
    /// Does nothing if it is already sorted for that eye.
    pub fn sort_for(&mut self, queue: &wgpu::Queue, eye: Vec3) {
        if self.sorted_for == Some(eye) {
            return;
        }
        let sorted = sort_back_to_front(&self.records, self.group_floats, eye);
        queue.write_buffer(&self.buffer, self.offset, bytemuck::cast_slice(&sorted));
        self.distance = mean_distance(&self.records, self.group_floats, eye);
        self.sorted_for = Some(eye);
    }

    /// Mean instance distance from the eye of the last sort.
    #[must_use]
    pub fn distance(&self) -> f32 {
        self.distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene3d_core::layout::{POINT_CLOUD_RENDER, SOLID_RENDER};

    #[test]
    fn test_translucency_follows_alpha_field() {
        // x y z r g b alpha size
        let opaque = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.1];
        assert!(!has_translucency(&opaque, &POINT_CLOUD_RENDER));

        let mut mixed = opaque.repeat(2);
        mixed[14] = 0.5;
        assert!(has_translucency(&mixed, &POINT_CLOUD_RENDER));

        assert!(!has_translucency(&[], &SOLID_RENDER));
    }

    #[test]
    fn test_farthest_group_first() {
        let data = [0.0, 1.0, 0.0, 10.0, 0.0, 5.0, 0.0, 20.0, 0.0, 3.0, 0.0, 30.0];
        let sorted = sort_back_to_front(&data, 4, Vec3::ZERO);
        assert_eq!(
            sorted,
            vec![0.0, 5.0, 0.0, 20.0, 0.0, 3.0, 0.0, 30.0, 0.0, 1.0, 0.0, 10.0]
        );
    }

    #[test]
    fn test_ring_groups_stay_together() {
        // Two ellipsoids with three ring records of 4 floats each
        let near = [0.0, 1.0, 0.0, 1.0].repeat(3);
        let far = [0.0, 9.0, 0.0, 2.0].repeat(3);
        let data = [near.clone(), far.clone()].concat();
        let sorted = sort_back_to_front(&data, 12, Vec3::ZERO);
        assert_eq!(sorted, [far, near].concat());
    }

    #[test]
    fn test_mean_distance() {
        let data = [0.0, 2.0, 0.0, 0.0, 4.0, 0.0];
        assert!((mean_distance(&data, 3, Vec3::ZERO) - 3.0).abs() < 1e-6);
        assert!(mean_distance(&[], 3, Vec3::ZERO).abs() < 1e-6);
    }
}
