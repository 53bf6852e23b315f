pub mod load;

pub use self::load::*;

use std::any::Any;
use crate::module::{ModuleData, Sample, SongLayout};

pub const EG_TABLE_SIZE  : usize = 128;
pub const ADSR_TABLE_SIZE: usize = 256;
pub const ARP_TABLE_SIZE : usize = 16;
pub const NUM_ARP_TABLES : usize = 16;
pub const WAVE_SIZE      : usize = 256;

// Track row effects
pub const FX_NONE                : u8 = 0x0;
pub const FX_SET_SLIDE_SPEED     : u8 = 0x1;
pub const FX_RESTART_ADSR        : u8 = 0x2;
pub const FX_RESTART_EGC         : u8 = 0x3;
pub const FX_SET_SLIDE_INCREMENT : u8 = 0x4;
pub const FX_SET_VIBRATO_DELAY   : u8 = 0x5;
pub const FX_SET_VIBRATO_POS     : u8 = 0x6;
pub const FX_SET_VOLUME          : u8 = 0x7;
pub const FX_SKIP_NOTE_TRANSPOSE : u8 = 0x8;
pub const FX_SKIP_SOUND_TRANSPOSE: u8 = 0x9;
pub const FX_SET_TRACK_LEN       : u8 = 0xa;
pub const FX_SKIP_PORTAMENTO     : u8 = 0xb;
pub const FX_SET_FILTER          : u8 = 0xe;
pub const FX_SET_SPEED           : u8 = 0xf;

pub const NOTE_OFF: u8 = 0x7f;

/// Envelope generator counter mode of a synth instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EgcMode {
    Off,
    Ones,     // run the table once
    Repeat,
}

impl Default for EgcMode {
    fn default() -> Self {
        EgcMode::Off
    }
}

impl From<u8> for EgcMode {
    fn from(x: u8) -> Self {
        match x {
            0 => EgcMode::Off,
            1 => EgcMode::Ones,
            _ => EgcMode::Repeat,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackLine {
    pub note      : u8,
    pub instrument: u8,
    pub arpeggio  : u8,
    pub effect    : u8,
    pub arg       : u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionEntry {
    pub start_row      : u16,
    pub sound_transpose: i8,
    pub note_transpose : i8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubSong {
    pub start_speed     : u8,
    pub rows_per_track  : u8,
    pub first_position  : u16,
    pub last_position   : u16,
    pub restart_position: u16,
}

#[derive(Debug, Clone, Default)]
pub struct Is10Instrument {
    pub waveform          : u8,     // wave table, or sample number & 0x3f
    pub synthesis         : bool,
    pub waveform_length   : u16,
    pub repeat_length     : u16,    // 0 loops all, 2 is a one-shot
    pub volume            : u8,
    pub portamento_speed  : i8,
    pub adsr_enabled      : bool,
    pub adsr_table        : u8,
    pub adsr_length       : u16,
    pub portamento_enabled: bool,
    pub vibrato_delay     : u8,
    pub vibrato_speed     : u8,
    pub vibrato_level     : u8,
    pub egc_offset        : u8,
    pub egc_mode          : EgcMode,
    pub egc_table         : u8,
    pub egc_length        : u16,
}

pub struct Is10Data {
    pub title      : String,
    pub sub_songs  : Vec<SubSong>,
    pub positions  : Vec<[PositionEntry; 4]>,
    pub rows       : Vec<TrackLine>,
    pub instruments: Vec<Is10Instrument>,
    pub waveforms  : Vec<Vec<i8>>,
    pub eg_tables  : Vec<u8>,
    pub adsr_tables: Vec<u8>,
    pub arpeggios  : Vec<u8>,
    pub samples    : Vec<Sample>,
}

impl Is10Data {
    /// Track row at a global row index, an empty row past the end.
    pub fn row(&self, index: usize) -> TrackLine {
        self.rows.get(index).cloned().unwrap_or_default()
    }

    pub fn position(&self, pos: usize) -> [PositionEntry; 4] {
        self.positions.get(pos).cloned().unwrap_or_default()
    }

    /// Instruments are numbered from 1.
    pub fn instrument(&self, num: u8) -> Option<&Is10Instrument> {
        num.checked_sub(1).and_then(|i| self.instruments.get(i as usize))
    }

    pub fn arpeggio(&self, table: u8, counter: usize) -> u8 {
        self.arpeggios.get(table as usize * ARP_TABLE_SIZE + counter).cloned().unwrap_or(0)
    }

    pub fn adsr(&self, table: u8, pos: u16) -> u8 {
        self.adsr_tables.get(table as usize * ADSR_TABLE_SIZE + pos as usize).cloned().unwrap_or(0)
    }

    pub fn eg(&self, table: u8, pos: u16) -> u8 {
        self.eg_tables.get(table as usize * EG_TABLE_SIZE + pos as usize).cloned().unwrap_or(0)
    }

    pub fn waveform(&self, num: u8) -> &[i8] {
        match self.waveforms.get(num as usize) {
            Some(w) => w,
            None    => &[],
        }
    }
}

impl ModuleData for Is10Data {
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
        SongLayout::SubSongs(self.sub_songs.len())
    }

    fn len(&self) -> usize {
        self.positions.len()
    }

    fn instruments(&self) -> Vec<String> {
        self.instruments.iter().map(|ins| {
            if ins.synthesis {
                "".to_owned()
            } else {
                self.samples.get((ins.waveform & 0x3f) as usize).map_or("".to_owned(), |s| s.name.to_owned())
            }
        }).collect()
    }

    fn samples(&self) -> &[Sample] {
        &self.samples
    }
}
