//! Display surface trait

use crate::frame::DisplayFrame;

/// A text surface covering the whole screen
///
/// Device initialization happens before the surface is handed to the
/// controller, so rendering cannot fail. Drivers that hit a bus error while
/// flushing log it and carry on.
pub trait DisplaySurface {
    /// Replace the screen contents
    ///
    /// `None` clears the screen. A frame erases everything shown before and
    /// draws its lines from the top. Rendering the same frame twice leaves
    /// the screen unchanged.
    async fn render(&mut self, frame: Option<&DisplayFrame>);
}
