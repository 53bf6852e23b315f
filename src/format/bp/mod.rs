pub mod load;

pub use self::load::*;

use std::any::Any;
use crate::module::{ModuleData, Sample, SongLayout};

pub const NUM_INSTRUMENTS: usize = 15;
pub const ROWS: usize = 16;
pub const WAVE_SIZE: usize = 64;

/// SoundMon 1.1 writes the `V.2` mark, SoundMon 2.2 writes `V.3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    SoundMon11,
    SoundMon22,
}

// Row optional commands
pub const OPT_ARPEGGIO_ONCE   : u8 = 0x0;
pub const OPT_SET_VOLUME      : u8 = 0x1;
pub const OPT_SET_SPEED       : u8 = 0x2;
pub const OPT_FILTER          : u8 = 0x3;
pub const OPT_PORT_UP         : u8 = 0x4;
pub const OPT_PORT_DOWN       : u8 = 0x5;
pub const OPT_VIBRATO         : u8 = 0x6;   // repeat count in 1.1
pub const OPT_JUMP            : u8 = 0x7;
pub const OPT_AUTO_SLIDE      : u8 = 0x8;
pub const OPT_AUTO_ARPEGGIO   : u8 = 0x9;
pub const OPT_TRANSPOSE       : u8 = 0xa;
pub const OPT_CHANGE_FX       : u8 = 0xb;
pub const OPT_CHANGE_INVERSION: u8 = 0xc;
pub const OPT_RESET_ADSR      : u8 = 0xd;
pub const OPT_CHANGE_NOTE     : u8 = 0xe;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Row {
    pub note       : i8,
    pub instrument : u8,
    pub optional   : u8,
    pub data       : u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Step {
    pub track          : u16,   // 1-based, 0 is an empty track
    pub sound_transpose: i8,
    pub transpose      : i8,
}

#[derive(Debug, Clone, Default)]
pub struct SampleInstrument {
    pub name       : String,
    pub length     : u16,
    pub loop_start : u16,
    pub loop_length: u16,
    pub volume     : u16,
}

#[derive(Debug, Clone, Default)]
pub struct SynthInstrument {
    pub wave_table  : u8,
    pub wave_length : u16,
    pub adsr_control: u8,
    pub adsr_table  : u8,
    pub adsr_length : u16,
    pub adsr_speed  : u8,
    pub lfo_control : u8,
    pub lfo_table   : u8,
    pub lfo_depth   : u8,
    pub lfo_length  : u16,
    pub lfo_delay   : u8,
    pub lfo_speed   : u8,
    pub eg_control  : u8,
    pub eg_table    : u8,
    pub eg_length   : u16,
    pub eg_delay    : u8,
    pub eg_speed    : u8,
    pub fx_control  : u8,
    pub fx_speed    : u8,
    pub fx_delay    : u8,
    pub mod_control : u8,
    pub mod_table   : u8,
    pub mod_speed   : u8,
    pub mod_delay   : u8,
    pub volume      : u8,
    pub mod_length  : u16,
}

#[derive(Debug, Clone)]
pub enum BpInstrument {
    Sample(SampleInstrument),
    Synth(SynthInstrument),
}

impl BpInstrument {
    pub fn volume(&self) -> u32 {
        match self {
            BpInstrument::Sample(ins) => ins.volume as u32,
            BpInstrument::Synth(ins)  => ins.volume as u32,
        }
    }
}

pub struct BpData {
    pub title      : String,
    pub version    : Version,
    pub steps      : Vec<[Step; 4]>,
    pub tracks     : Vec<[Row; ROWS]>,
    pub instruments: Vec<BpInstrument>,
    pub waves      : Vec<i8>,     // wave_num tables of 64 bytes
    pub samples    : Vec<Sample>, // one per instrument, empty for synths
}

impl BpData {
    pub fn num_waves(&self) -> usize {
        self.waves.len() / WAVE_SIZE
    }

    /// Row of a track, an empty row if the track doesn't exist.
    pub fn row(&self, track: u16, row: usize) -> Row {
        if track == 0 {
            return Row::default()
        }
        self.tracks.get(track as usize - 1).and_then(|t| t.get(row)).cloned().unwrap_or_default()
    }
}

impl ModuleData for BpData {
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
        SongLayout::Positions(self.steps.len())
    }

    fn len(&self) -> usize {
        self.steps.len()
    }

    fn instruments(&self) -> Vec<String> {
        self.instruments.iter().map(|x| match x {
            BpInstrument::Sample(ins) => ins.name.to_owned(),
            BpInstrument::Synth(_)    => "".to_owned(),
        }).collect()
    }

    fn samples(&self) -> &[Sample] {
        &self.samples
    }
}
