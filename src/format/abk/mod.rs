pub mod load;

pub use self::load::*;

use std::any::Any;
use std::fmt;
use crate::module::{ModuleData, Sample, SongLayout};

/// One entry of a channel position list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionEntry {
    Track(usize),
    Invalid,  // pattern number past the pattern table
    Stop,     // -1, end of list, doesn't loop
    Loop,     // -2, restart at the default position
}

impl PositionEntry {
    pub fn from_raw(val: i16, pattern_tracks: &[[usize; 4]], chn: usize) -> Self {
        match val {
            -1 => PositionEntry::Stop,
            -2 => PositionEntry::Loop,
            v if v >= 0 => match pattern_tracks.get(v as usize) {
                Some(p) => PositionEntry::Track(p[chn]),
                None    => PositionEntry::Invalid,
            },
            _  => PositionEntry::Invalid,
        }
    }
}

impl fmt::Display for PositionEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            PositionEntry::Track(t) => write!(f, "{}", t),
            PositionEntry::Invalid  => write!(f, "-3"),
            PositionEntry::Stop     => write!(f, "-1"),
            PositionEntry::Loop     => write!(f, "-2"),
        }
    }
}

pub struct AbkSong {
    pub name     : String,
    pub positions: [Vec<PositionEntry>; 4],
}

pub struct AbkData {
    pub samples: Vec<Sample>,
    pub tracks : Vec<Vec<u16>>,
    pub songs  : Vec<AbkSong>,
}

impl AbkData {
    pub fn track_word(&self, track: usize, ofs: usize) -> Option<u16> {
        self.tracks.get(track).and_then(|t| t.get(ofs)).cloned()
    }
}

impl ModuleData for AbkData {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn title(&self) -> &str {
        match self.songs.first() {
            Some(s) => &s.name,
            None    => "",
        }
    }

    fn channels(&self) -> usize {
        4
    }

    fn layout(&self) -> SongLayout {
        SongLayout::SubSongs(self.songs.len())
    }

    fn len(&self) -> usize {
        self.songs.first().map(|s| s.positions[0].len()).unwrap_or(0)
    }

    fn instruments(&self) -> Vec<String> {
        self.samples.iter().map(|x| x.name.to_owned()).collect::<Vec<String>>()
    }

    fn samples(&self) -> &[Sample] {
        &self.samples
    }
}
