pub mod sample;

pub use self::sample::Sample;

use std::any::Any;
use std::fmt;

/// How a format lays out its songs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongLayout {
    /// Each sub-song carries its own per-channel position lists.
    SubSongs(usize),
    /// One position list shared by every channel; hidden sub-songs are
    /// found by scanning for positions not reached from the start.
    Positions(usize),
}

// Immutable module data produced by a loader. Playback sessions only
// ever borrow it, so a scan may run in parallel with live playback.

pub trait ModuleData: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn title(&self) -> &str;
    fn channels(&self) -> usize;
    fn layout(&self) -> SongLayout;
    fn len(&self) -> usize;
    fn instruments(&self) -> Vec<String>;
    fn samples(&self) -> &[Sample];
}


pub struct Module {
    pub format     : &'static str,
    pub description: &'static str,
    pub player     : &'static str,
    pub data       : Box<dyn ModuleData>,
}

impl Module {
    pub fn title(&self) -> &str {
        self.data.title()
    }

    pub fn channels(&self) -> usize {
        self.data.channels()
    }

    pub fn songs(&self) -> usize {
        match self.data.layout() {
            SongLayout::SubSongs(num) => num,
            SongLayout::Positions(_)  => 1,
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({}): {:?}, {} channels", self.title(), self.format, self.data.layout(), self.channels())
    }
}
