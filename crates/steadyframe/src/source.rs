//! Replayable frame sequences for two-pass processing.

use std::borrow::Cow;

use image::Pixel;

use crate::error::SourceError;
use crate::imaging::Frame;

/// A finite, indexable frame sequence that can be read more than once.
///
/// Batch stabilization walks the source twice: once to measure motion and
/// once to render. Implementations may decode lazily; returned frames can
/// be borrowed or owned.
pub trait FrameSource<P>
where
    P: Pixel<Subpixel = u8>,
{
    /// Number of frames.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frame `index` (`0..len()`).
    fn frame(&self, index: usize) -> Result<Cow<'_, Frame<P>>, SourceError>;
}

impl<P> FrameSource<P> for [Frame<P>]
where
    P: Pixel<Subpixel = u8>,
{
    fn len(&self) -> usize {
        <[Frame<P>]>::len(self)
    }

    fn frame(&self, index: usize) -> Result<Cow<'_, Frame<P>>, SourceError> {
        self.get(index)
            .map(Cow::Borrowed)
            .ok_or_else(|| format!("frame index {} out of range (len {})", index, <[Frame<P>]>::len(self)).into())
    }
}

impl<P> FrameSource<P> for Vec<Frame<P>>
where
    P: Pixel<Subpixel = u8>,
{
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn frame(&self, index: usize) -> Result<Cow<'_, Frame<P>>, SourceError> {
        self.as_slice().frame(index)
    }
}
