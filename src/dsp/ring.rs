//! Fixed-capacity FIFO buffers
//!
//! [`DoubleRingBuffer`] mirrors every write into a second half so the
//! readable region is always one contiguous slice, which is what the
//! resampler consumes.

/// FIFO whose readable data is always contiguous.
///
/// Capacity is rounded up to a power of two. Storage is allocated once, at
/// construction.
#[derive(Debug, Clone)]
pub struct DoubleRingBuffer<T> {
    data: Vec<T>,
    capacity: usize,
    start: usize,
    end: usize,
}

impl<T: Copy + Default> DoubleRingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two();
        Self {
            data: vec![T::default(); capacity * 2],
            capacity,
            start: 0,
            end: 0,
        }
    }

    #[inline]
    fn mask(&self, i: usize) -> usize {
        i & (self.capacity - 1)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.size() >= self.capacity
    }

    /// Appends `value`. Returns false and drops it when the buffer is full.
    #[inline]
    pub fn push(&mut self, value: T) -> bool {
        if self.is_full() {
            return false;
        }
        let i = self.mask(self.end);
        self.data[i] = value;
        self.data[i + self.capacity] = value;
        self.end += 1;
        true
    }

    /// Removes and returns the oldest element
    #[inline]
    pub fn shift(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let value = self.data[self.mask(self.start)];
        self.start += 1;
        self.rebase();
        Some(value)
    }

    /// All readable elements, oldest first
    #[inline]
    pub fn start_data(&self) -> &[T] {
        let i = self.mask(self.start);
        &self.data[i..i + self.size()]
    }

    /// Releases `n` elements from the front
    #[inline]
    pub fn start_incr(&mut self, n: usize) {
        self.start += n.min(self.size());
        self.rebase();
    }

    /// Appends a slice, truncating at capacity. Returns the count written.
    pub fn extend_from_slice(&mut self, values: &[T]) -> usize {
        let n = values.len().min(self.capacity - self.size());
        for &v in &values[..n] {
            let i = self.mask(self.end);
            self.data[i] = v;
            self.data[i + self.capacity] = v;
            self.end += 1;
        }
        n
    }

    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    // Keep the counters small; only their difference and masked values matter
    #[inline]
    fn rebase(&mut self) {
        if self.start >= self.capacity {
            self.start -= self.capacity;
            self.end -= self.capacity;
        }
    }
}

/// Small fixed-size FIFO, used for the delay's output staging
#[derive(Debug, Clone, Copy)]
pub struct RingBuffer<T, const N: usize> {
    data: [T; N],
    start: usize,
    len: usize,
}

impl<T: Copy + Default, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self {
            data: [T::default(); N],
            start: 0,
            len: 0,
        }
    }
}

impl<T: Copy + Default, const N: usize> RingBuffer<T, N> {
    pub const CAPACITY: usize = N;

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    #[inline]
    pub fn push(&mut self, value: T) -> bool {
        if self.is_full() {
            return false;
        }
        self.data[(self.start + self.len) % N] = value;
        self.len += 1;
        true
    }

    #[inline]
    pub fn shift(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let value = self.data[self.start];
        self.start = (self.start + 1) % N;
        self.len -= 1;
        Some(value)
    }

    pub fn clear(&mut self) {
        self.start = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_ring_contiguous_across_wrap() {
        let mut buf: DoubleRingBuffer<f32> = DoubleRingBuffer::new(8);
        for i in 0..6 {
            assert!(buf.push(i as f32));
        }
        buf.start_incr(5);
        for i in 6..12 {
            assert!(buf.push(i as f32));
        }
        // Readable region straddles the physical end but reads contiguously
        assert_eq!(buf.start_data(), &[5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_double_ring_stops_when_full() {
        let mut buf: DoubleRingBuffer<f32> = DoubleRingBuffer::new(4);
        for i in 0..4 {
            assert!(buf.push(i as f32));
        }
        assert!(buf.is_full());
        assert!(!buf.push(99.0));
        assert_eq!(buf.size(), 4);
        assert_eq!(buf.shift(), Some(0.0));
        assert!(buf.push(4.0));
        assert_eq!(buf.start_data(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_double_ring_rounds_capacity() {
        let buf: DoubleRingBuffer<f32> = DoubleRingBuffer::new(5);
        assert_eq!(buf.capacity(), 8);
    }

    #[test]
    fn test_extend_truncates() {
        let mut buf: DoubleRingBuffer<i32> = DoubleRingBuffer::new(4);
        assert_eq!(buf.extend_from_slice(&[1, 2, 3, 4, 5, 6]), 4);
        buf.start_incr(10);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_small_ring_fifo_order() {
        let mut ring: RingBuffer<f32, 4> = RingBuffer::default();
        for i in 0..5 {
            ring.push(i as f32);
        }
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.shift(), Some(0.0));
        ring.push(7.0);
        let drained: Vec<f32> = std::iter::from_fn(|| ring.shift()).collect();
        assert_eq!(drained, vec![1.0, 2.0, 3.0, 7.0]);
    }
}
