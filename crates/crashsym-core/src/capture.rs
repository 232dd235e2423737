//! Stack capture.
//!
//! The engine does not walk stacks itself; it symbolicates addresses someone
//! else collected. [`StackCapture`] is that someone. [`BacktraceCapture`]
//! walks the current thread with the `backtrace` crate.

use crate::types::Address;

/// Source of instruction pointers for the current call stack.
pub trait StackCapture
{
    /// Fill `frames` with return addresses, innermost first.
    ///
    /// Returns how many were written. Never allocates, so a caller can hand in
    /// a stack array from crash context.
    fn capture_into(&self, frames: &mut [Address]) -> usize;

    /// Convenience wrapper returning at most `max_frames` addresses.
    fn capture(&self, max_frames: usize) -> Vec<Address>
    {
        let mut frames = vec![Address::ZERO; max_frames];
        let count = self.capture_into(&mut frames);
        frames.truncate(count);
        frames
    }
}

/// [`StackCapture`] over [`backtrace::trace`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktraceCapture
{
    skip: usize,
}

impl BacktraceCapture
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Leave out the innermost `frames` frames, e.g. the capture machinery itself.
    #[must_use]
    pub fn skip(mut self, frames: usize) -> Self
    {
        self.skip = frames;
        self
    }
}

impl StackCapture for BacktraceCapture
{
    fn capture_into(&self, frames: &mut [Address]) -> usize
    {
        let mut skipped = 0usize;
        let mut count = 0usize;
        backtrace::trace(|frame| {
            if skipped < self.skip {
                skipped += 1;
                return true;
            }
            let Some(slot) = frames.get_mut(count) else {
                return false;
            };
            *slot = Address::from(frame.ip() as usize);
            count += 1;
            true
        });
        count
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    struct Fixed(&'static [u64]);

    impl StackCapture for Fixed
    {
        fn capture_into(&self, frames: &mut [Address]) -> usize
        {
            let count = self.0.len().min(frames.len());
            for (slot, value) in frames.iter_mut().zip(self.0) {
                *slot = Address::new(*value);
            }
            count
        }
    }

    #[test]
    fn test_capture_truncates_to_written()
    {
        let frames = Fixed(&[1, 2, 3]).capture(8);
        assert_eq!(frames, vec![Address::new(1), Address::new(2), Address::new(3)]);
        assert_eq!(Fixed(&[1, 2, 3]).capture(2).len(), 2);
    }

    #[test]
    fn test_backtrace_capture_respects_capacity()
    {
        let mut frames = [Address::ZERO; 4];
        let count = BacktraceCapture::new().capture_into(&mut frames);
        assert!(count > 0 && count <= 4);
        assert!(frames[..count].iter().all(|frame| *frame != Address::ZERO));
    }

    #[test]
    fn test_skip_drops_innermost_frames()
    {
        let all = BacktraceCapture::new().capture(64);
        let skipped = BacktraceCapture::new().skip(1).capture(64);
        assert!(skipped.len() < all.len() || all.len() == 64);
    }
}
