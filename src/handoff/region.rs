use std::ptr::NonNull;

/// Destination bytes lent by the consumer for the length of one `fill` call.
///
/// Only ever stored inside the channel state, so every write happens under the
/// channel lock while the lending consumer is parked.
pub(super) struct Region {
    ptr: NonNull<u8>,
    len: usize,
}

// The lending thread is parked for as long as the region is registered.
unsafe impl Send for Region {}

impl Region {
    pub(super) fn new(dest: &mut [u8]) -> Self {
        let len = dest.len();
        Self {
            ptr: NonNull::from(dest).cast(),
            len,
        }
    }

    pub(super) fn len(&self) -> usize {
        self.len
    }

    /// Copy `bytes` into the region starting at `offset`.
    pub(super) fn write_at(&mut self, offset: usize, bytes: &[u8]) {
        assert!(
            offset <= self.len && bytes.len() <= self.len - offset,
            "write of {} bytes at offset {} overruns region of {} bytes",
            bytes.len(),
            offset,
            self.len
        );

        // Safety: bounds checked above, and the region points at a live
        // `&mut [u8]` whose owner cannot touch it until the region is dropped.
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.ptr.as_ptr().add(offset),
                bytes.len(),
            );
        }
    }
}
