//! Growable instance buffers shared by all collections.
//!
//! There is one buffer for visual records and one for picking records. Both
//! always have the same capacity and are recreated together. Each has its own
//! write cursor, reset at every rebuild; picking records are appended lazily
//! on the first pick after a rebuild.

use crate::buffer::create_instance_buffer;

/// Alignment of every collection's slice inside the buffers.
pub const ALIGNMENT: u64 = wgpu::COPY_BUFFER_ALIGNMENT;

/// Rounds `value` up to a multiple of `alignment`.
#[must_use]
pub fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// Capacity needed for collections taking `collection_bytes` each, with slack.
#[must_use]
pub fn required_capacity(collection_bytes: impl IntoIterator<Item = u64>, slack: f32) -> u64 {
    let total: u64 = collection_bytes
        .into_iter()
        .map(|bytes| align_up(bytes, ALIGNMENT))
        .sum();
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let padded = (total as f64 * f64::from(slack.max(1.0))).ceil() as u64;
    align_up(padded, ALIGNMENT)
}

/// Returns true if `capacity` cannot hold `required` bytes.
#[must_use]
pub fn needs_growth(capacity: u64, required: u64) -> bool {
    required > capacity
}

/// Append-only write position inside one buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferCursor {
    offset: u64,
}

impl BufferCursor {
    /// Reserves `len` bytes at the next aligned offset, or `None` if they do
    /// not fit in `capacity`.
    pub fn allocate(&mut self, len: u64, capacity: u64) -> Option<u64> {
        let start = align_up(self.offset, ALIGNMENT);
        let end = start.checked_add(len)?;
        if end > capacity {
            return None;
        }
        self.offset = end;
        Some(start)
    }

    /// Current end of the written region.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Rewinds to the start of the buffer.
    pub fn reset(&mut self) {
        self.offset = 0;
    }
}

/// Where a collection's records landed.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub buffer: wgpu::Buffer,
    pub offset: u64,
    pub size: u64,
}

/// The visual and picking instance buffers.
#[derive(Debug, Default)]
pub struct DynamicBuffers {
    render: Option<wgpu::Buffer>,
    picking: Option<wgpu::Buffer>,
    capacity: u64,
    render_cursor: BufferCursor,
    picking_cursor: BufferCursor,
    reallocations: u64,
}

impl DynamicBuffers {
    /// Creates an empty pair; nothing is allocated until the first rebuild.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recreates both buffers if `required` exceeds the current capacity.
    ///
    /// Returns true if the buffers were recreated.
    pub fn ensure_capacity(&mut self, device: &wgpu::Device, required: u64) -> bool {
        if !needs_growth(self.capacity, required) {
            return false;
        }
        self.destroy_buffers();
        self.render = Some(create_instance_buffer(device, required, "render instance buffer"));
        self.picking = Some(create_instance_buffer(device, required, "picking instance buffer"));
        log::debug!(
            "instance buffers grown from {} to {required} bytes",
            self.capacity
        );
        self.capacity = required;
        self.reallocations += 1;
        true
    }

    /// Rewinds both cursors.
    pub fn reset_cursors(&mut self) {
        self.render_cursor.reset();
        self.picking_cursor.reset();
    }

    /// Appends visual records.
    pub fn write_render(&mut self, queue: &wgpu::Queue, data: &[f32]) -> Option<Allocation> {
        Self::write(
            queue,
            self.render.as_ref()?,
            &mut self.render_cursor,
            self.capacity,
            data,
        )
    }

    /// Appends picking records.
    pub fn write_picking(&mut self, queue: &wgpu::Queue, data: &[f32]) -> Option<Allocation> {
        Self::write(
            queue,
            self.picking.as_ref()?,
            &mut self.picking_cursor,
            self.capacity,
            data,
        )
    }

    fn write(
        queue: &wgpu::Queue,
        buffer: &wgpu::Buffer,
        cursor: &mut BufferCursor,
        capacity: u64,
        data: &[f32],
    ) -> Option<Allocation> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let size = bytes.len() as u64;
        let offset = cursor.allocate(size, capacity)?;
        queue.write_buffer(buffer, offset, bytes);
        Some(Allocation {
            buffer: buffer.clone(),
            offset,
            size,
        })
    }

    /// Current capacity of each buffer in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// How many times the buffers have been recreated.
    #[must_use]
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    fn destroy_buffers(&mut self) {
        for buffer in [self.render.take(), self.picking.take()].into_iter().flatten() {
            buffer.destroy();
        }
    }

    /// Destroys both buffers and forgets the capacity.
    pub fn destroy(&mut self) {
        self.destroy_buffers();
        self.capacity = 0;
        self.reset_cursors();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 4), 0);
        assert_eq!(align_up(1, 4), 4);
        assert_eq!(align_up(4, 4), 4);
        assert_eq!(align_up(21, 4), 24);
    }

    #[test]
    fn test_required_capacity_doubles_total() {
        // 3 points at 32 bytes, 2 cuboids at 40 bytes
        assert_eq!(required_capacity([96, 80], 2.0), 352);
        assert_eq!(required_capacity([96, 80], 1.0), 176);
        assert_eq!(required_capacity(std::iter::empty(), 2.0), 0);
    }

    #[test]
    fn test_required_capacity_aligns_each_collection() {
        assert_eq!(required_capacity([5, 5], 1.0), 16);
        assert_eq!(required_capacity([6], 1.5), 12);
    }

    #[test]
    fn test_slack_never_shrinks() {
        assert_eq!(required_capacity([100], 0.25), 100);
    }

    #[test]
    fn test_identical_input_does_not_grow() {
        let required = required_capacity([96, 80], 2.0);
        assert!(needs_growth(0, required));
        assert!(!needs_growth(required, required));
        assert!(!needs_growth(required, required_capacity([96, 80], 2.0)));
        assert!(needs_growth(required, required_capacity([400], 2.0)));
    }

    #[test]
    fn test_cursor_aligns_and_bounds() {
        let mut cursor = BufferCursor::default();
        assert_eq!(cursor.allocate(20, 64), Some(0));
        assert_eq!(cursor.allocate(6, 64), Some(20));
        assert_eq!(cursor.offset(), 26);
        assert_eq!(cursor.allocate(8, 64), Some(28));
        assert_eq!(cursor.allocate(64, 64), None);
        // A failed allocation leaves the cursor alone
        assert_eq!(cursor.offset(), 36);

        cursor.reset();
        assert_eq!(cursor.allocate(64, 64), Some(0));
    }

    proptest! {
        #[test]
        fn prop_required_capacity_fits_every_collection(
            lens in prop::collection::vec(0u64..4096, 0..16),
            slack in 1.0f32..4.0,
        ) {
            let capacity = required_capacity(lens.iter().copied(), slack);
            prop_assert_eq!(capacity % ALIGNMENT, 0);

            let mut cursor = BufferCursor::default();
            let mut previous_end = 0;
            for &len in &lens {
                let start = cursor.allocate(len, capacity);
                prop_assert!(start.is_some());
                let start = start.unwrap_or_default();
                prop_assert_eq!(start % ALIGNMENT, 0);
                prop_assert!(start >= previous_end);
                previous_end = start + len;
            }
            prop_assert!(cursor.offset() <= capacity);
        }
    }
}
