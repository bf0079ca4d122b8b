use tracing::debug;

use crate::buffer::BufferHandle;
use crate::error::InitError;

/// Maps backend slot ids to the host output buffers bound at initialization.
///
/// Slot `i` is the `i`-th buffer handed to the backend. The mapping is fixed once populated;
/// only `clear` on teardown empties it.
#[derive(Debug)]
pub struct FrameSlotRegistry {
    slots: Vec<BufferHandle>,
}

impl FrameSlotRegistry {
    /// Build the registry from the full output buffer set.
    ///
    /// `max_slots` is the negotiated output buffer count and `min_capacity` the bytes each
    /// buffer needs for one frame.
    pub fn populate(
        buffers: Vec<BufferHandle>,
        max_slots: usize,
        min_capacity: usize,
    ) -> Result<Self, InitError> {
        if buffers.is_empty() {
            return Err(InitError::EmptyPool);
        }
        if buffers.len() > max_slots {
            return Err(InitError::PoolTooLarge {
                count: buffers.len(),
                max: max_slots,
            });
        }
        for (index, handle) in buffers.iter().enumerate() {
            let buffer = handle.buffer();
            if buffer.is_null() {
                return Err(InitError::NullBuffer(index));
            }
            if buffer.capacity() < min_capacity {
                return Err(InitError::BufferTooSmall {
                    index,
                    capacity: buffer.capacity(),
                    required: min_capacity,
                });
            }
        }

        debug!(slots = buffers.len(), max_slots, "frame slot registry populated");
        Ok(FrameSlotRegistry { slots: buffers })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The buffer bound to a backend-reported slot id, if the id is in range.
    pub fn lookup(&self, slot: i32) -> Option<&BufferHandle> {
        usize::try_from(slot).ok().and_then(|i| self.slots.get(i))
    }

    /// Slot id of the buffer `handle` refers to.
    pub fn slot_of(&self, handle: &BufferHandle) -> Option<usize> {
        self.slots.iter().position(|slot| slot.same_buffer(handle))
    }

    /// Buffer addresses in slot order, as bound to the backend.
    pub fn addresses(&self) -> Vec<usize> {
        self.slots.iter().map(BufferHandle::address).collect()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::HostBuffer;

    fn pool(count: usize, capacity: usize) -> Vec<BufferHandle> {
        (0..count)
            .map(|_| BufferHandle::new(HostBuffer::zeroed(capacity)))
            .collect()
    }

    #[test]
    fn test_lookup_in_and_out_of_range() {
        let registry = FrameSlotRegistry::populate(pool(3, 16), 3, 16).unwrap();
        assert!(registry.lookup(0).is_some());
        assert!(registry.lookup(2).is_some());
        assert!(registry.lookup(3).is_none());
        assert!(registry.lookup(-1).is_none());
        assert!(registry.lookup(i32::MIN).is_none());
    }

    #[test]
    fn test_lookup_preserves_identity() {
        let buffers = pool(2, 16);
        let registry = FrameSlotRegistry::populate(buffers.clone(), 2, 16).unwrap();
        assert!(registry.lookup(1).unwrap().same_buffer(&buffers[1]));
        assert_eq!(registry.slot_of(&buffers[1]), Some(1));
        assert_eq!(registry.addresses()[0], buffers[0].address());
    }

    #[test]
    fn test_populate_rejects_bad_pools() {
        assert!(matches!(
            FrameSlotRegistry::populate(Vec::new(), 4, 0),
            Err(InitError::EmptyPool)
        ));
        assert!(matches!(
            FrameSlotRegistry::populate(pool(5, 16), 4, 16),
            Err(InitError::PoolTooLarge { count: 5, max: 4 })
        ));
        assert!(matches!(
            FrameSlotRegistry::populate(pool(2, 8), 4, 16),
            Err(InitError::BufferTooSmall { index: 0, .. })
        ));
        let mut buffers = pool(2, 16);
        buffers.push(BufferHandle::new(HostBuffer::null()));
        assert!(matches!(
            FrameSlotRegistry::populate(buffers, 4, 16),
            Err(InitError::NullBuffer(2))
        ));
    }

    #[test]
    fn test_clear_empties_registry() {
        let mut registry = FrameSlotRegistry::populate(pool(2, 16), 2, 16).unwrap();
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.lookup(0).is_none());
    }
}
