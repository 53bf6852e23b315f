pub mod load;

pub use self::load::*;

use std::any::Any;
use crate::module::{ModuleData, Sample, SongLayout};

pub const ORDER_SIZE: usize = 128;

// Sample modes, as stored in the file. The mode selects which channel
// type may play the sample.
pub const MODE_MIXED : u16 = 0;   // paired channels only
pub const MODE_SINGLE: u16 = 1;   // unpaired channels only
pub const MODE_BOTH  : u16 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Event {
    pub note  : u8,     // 1-based, 0 is no note
    pub sample: u8,
    pub effect: u8,
    pub arg   : u8,
}

#[derive(Debug, Clone, Default)]
pub struct Pattern {
    pub rows  : usize,
    pub events: Vec<Event>,   // rows * channels
}

impl Pattern {
    pub fn event(&self, row: usize, chn: usize, channels: usize) -> Event {
        self.events.get(row * channels + chn).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OktSample {
    pub name         : String,
    pub length       : u32,
    pub repeat_start : u32,
    pub repeat_length: u32,   // 0 = no loop
    pub volume       : u8,
    pub mode         : u16,
}

pub struct OktData {
    pub channel_flags: [bool; 4],
    pub instruments  : Vec<OktSample>,
    pub speed        : u16,
    pub song_length  : usize,
    pub order        : Vec<u8>,
    pub patterns     : Vec<Pattern>,
    pub samples      : Vec<Sample>,
}

impl OktData {
    /// Channel pair and stereo slot of each playing channel. A pair
    /// with its flag set is split in two mixed channels.
    pub fn channel_map(&self) -> Vec<(usize, usize)> {
        let mut map = Vec::with_capacity(self.channels());
        let mut slot = 0;
        for (pair, &mixed) in self.channel_flags.iter().enumerate() {
            map.push((pair, slot));
            if mixed {
                map.push((pair, slot + 1));
            }
            slot += 2;
        }
        map
    }

    pub fn pattern_at(&self, pos: usize) -> Option<&Pattern> {
        self.order.get(pos).and_then(|&p| self.patterns.get(p as usize))
    }
}

impl ModuleData for OktData {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn title(&self) -> &str {
        ""
    }

    fn channels(&self) -> usize {
        4 + self.channel_flags.iter().filter(|&&x| x).count()
    }

    fn layout(&self) -> SongLayout {
        SongLayout::Positions(self.song_length)
    }

    fn len(&self) -> usize {
        self.song_length
    }

    fn instruments(&self) -> Vec<String> {
        self.instruments.iter().map(|x| x.name.to_owned()).collect()
    }

    fn samples(&self) -> &[Sample] {
        &self.samples
    }
}
