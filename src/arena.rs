//! Size-class pool of byte buffers used for LOB chunk transfers

use parking_lot::Mutex;

/// Smallest class holds 1 KiB buffers.
const MIN_POWER : u32 = 10;
const NUM_CLASSES : usize = 16;
/// Buffers kept per class.
const CLASS_DEPTH : usize = 4;

/// Returns the exponent of the smallest power of two that is not less than `n`.
pub(crate) fn bounding_power(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

fn class_of(n: usize) -> Option<usize> {
    let idx = bounding_power(n).max(MIN_POWER) - MIN_POWER;
    if (idx as usize) < NUM_CLASSES { Some(idx as usize) } else { None }
}

pub(crate) struct BytesArena {
    classes: Vec<Mutex<Vec<Vec<u8>>>>,
}

impl BytesArena {
    pub(crate) fn new() -> Self {
        let classes = (0..NUM_CLASSES).map(|_| Mutex::new(Vec::new())).collect();
        Self { classes }
    }

    /// Returns a zero-length buffer with at least `n` bytes of capacity.
    pub(crate) fn get(&self, n: usize) -> Vec<u8> {
        match class_of(n) {
            Some(idx) => {
                let mut buf = self.classes[idx].lock().pop()
                    .unwrap_or_else(|| Vec::with_capacity(1 << (idx as u32 + MIN_POWER)));
                buf.clear();
                buf
            }
            None => Vec::with_capacity(n),
        }
    }

    /// Returns the buffer to its size class. Buffers of odd capacity and surplus buffers are dropped.
    pub(crate) fn put(&self, buf: Vec<u8>) {
        let cap = buf.capacity();
        if !cap.is_power_of_two() {
            return;
        }
        if let Some(idx) = class_of(cap) {
            let mut class = self.classes[idx].lock();
            if class.len() < CLASS_DEPTH {
                class.push(buf);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn powers() {
        assert_eq!(bounding_power(0), 0);
        assert_eq!(bounding_power(1), 0);
        assert_eq!(bounding_power(2), 1);
        assert_eq!(bounding_power(3), 2);
        assert_eq!(bounding_power(1024), 10);
        assert_eq!(bounding_power(1025), 11);
    }

    #[test]
    fn classes() {
        assert_eq!(class_of(1), Some(0));
        assert_eq!(class_of(1024), Some(0));
        assert_eq!(class_of(1025), Some(1));
        assert_eq!(class_of(16 << 20), Some(14));
        assert_eq!(class_of(32 << 20), Some(15));
        assert_eq!(class_of((32 << 20) + 1), None);
    }

    #[test]
    fn reuse() {
        let arena = BytesArena::new();
        let mut buf = arena.get(3000);
        assert!(buf.capacity() >= 4096);
        buf.extend_from_slice(b"data");
        let ptr = buf.as_ptr();
        arena.put(buf);
        let buf = arena.get(2049);
        assert_eq!(buf.as_ptr(), ptr);
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_buffers_are_not_kept() {
        let arena = BytesArena::new();
        let buf = arena.get(64 << 20);
        assert!(buf.capacity() >= 64 << 20);
        arena.put(buf);
        assert!(arena.classes.iter().all(|c| c.lock().is_empty()));
    }
}
