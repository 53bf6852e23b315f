pub mod load;

pub use self::load::*;

use std::any::Any;
use crate::module::{ModuleData, Sample, SongLayout};

pub const NUM_TRACKS: usize = 128;
pub const POSITION_LIST_SIZE: usize = 256;

// Synchronization flags
pub const PULSE_XSHOT: u8 = 0x01;
pub const PULSE_SYNC : u8 = 0x02;
pub const BLEND_XSHOT: u8 = 0x04;
pub const BLEND_SYNC : u8 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentType {
    Sample,
    Pulse,
    Blend,
    Unused,
}

impl InstrumentType {
    pub fn from_u8(val: u8) -> Self {
        match val {
            0 => InstrumentType::Sample,
            1 => InstrumentType::Pulse,
            2 => InstrumentType::Blend,
            _ => InstrumentType::Unused,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FredInstrument {
    pub num             : usize,
    pub name            : String,
    pub index           : u32,
    pub repeat_len      : u16,
    pub length          : u16,     // in bytes
    pub period          : u16,     // 1024 plays the table as is
    pub vib_delay       : u8,
    pub vib_speed       : i8,
    pub vib_ampl        : i8,
    pub env_vol         : u8,
    pub attack_speed    : u8,
    pub attack_volume   : u8,
    pub decay_speed     : u8,
    pub decay_volume    : u8,
    pub sustain_delay   : u8,
    pub release_speed   : u8,
    pub release_volume  : u8,
    pub arpeggio        : [i8; 16],
    pub arp_speed       : u8,
    pub inst_type       : InstrumentType,
    pub pulse_rate_min  : i8,
    pub pulse_rate_plus : i8,
    pub pulse_speed     : u8,
    pub pulse_start     : u8,
    pub pulse_end       : u8,
    pub pulse_delay     : u8,
    pub sync            : u8,
    pub blend           : u8,
    pub blend_delay     : u8,
    pub pulse_shot      : u8,
    pub blend_shot      : u8,
    pub arp_count       : u8,
}

impl FredInstrument {
    pub fn has_loop(&self) -> bool {
        self.repeat_len != 0 && self.repeat_len != 0xffff
    }
}

pub struct FredData {
    pub title      : String,
    pub start_tempo: Vec<u8>,
    pub positions  : Vec<[Vec<i8>; 4]>,
    pub tracks     : Vec<Vec<u8>>,
    pub instruments: Vec<FredInstrument>,
    pub samples    : Vec<Sample>,    // one per instrument, empty if none
}

impl FredData {
    /// Number of positions before the first negative entry of a list.
    pub fn song_length(&self, song: usize, chn: usize) -> usize {
        match self.positions.get(song) {
            Some(p) => p[chn].iter().position(|&x| x < 0).unwrap_or(p[chn].len()),
            None    => 0,
        }
    }
}

impl ModuleData for FredData {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn channels(&self) -> usize {
        4
    }

    fn layout(&self) -> SongLayout {
        SongLayout::SubSongs(self.start_tempo.len())
    }

    fn len(&self) -> usize {
        self.song_length(0, 0)
    }

    fn instruments(&self) -> Vec<String> {
        self.instruments.iter().map(|x| x.name.to_owned()).collect()
    }

    fn samples(&self) -> &[Sample] {
        &self.samples
    }
}
