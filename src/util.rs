use byteorder::{ByteOrder, BigEndian};
use crate::{Error, PERIOD_BASE};

pub const NOTES: &[&str] = &[
    "C-", "C#", "D-", "D#", "E-", "F-", "F#", "G-", "G#", "A-", "A#", "B-"
];

// [Amiga] PAL color carrier frequency (PCCF) = 4.43361825 MHz
// [Amiga] CPU clock = 1.6 * PCCF = 7.0937892 MHz


#[macro_export]
macro_rules! try_option {
    ( $a: expr ) => {
        match $a {
            Some(v) => v,
            None    => return,
        }
    }
}

#[macro_export]
macro_rules! magic4 {
    ( $a:expr, $b:expr, $c:expr, $d:expr ) => {
        (($a as u32) << 24) | (($b as u32) << 16) | (($c as u32) << 8) | ($d as u32)
    }
}

pub trait BinaryRead {
    fn read_string(&self, ofs: usize, size: usize) -> Result<String, Error>;
    fn read32b(&self, ofs: usize) -> Result<u32, Error>;
    fn read32bi(&self, ofs: usize) -> Result<i32, Error>;
    fn read16b(&self, ofs: usize) -> Result<u16, Error>;
    fn read16bi(&self, ofs: usize) -> Result<i16, Error>;
    fn read8(&self, ofs: usize) -> Result<u8, Error>;
    fn read8i(&self, ofs: usize) -> Result<i8, Error>;
    fn slice(&self, start: usize, size: usize) -> Result<&[u8], Error>;
}

impl<'a> BinaryRead for &'a [u8] {
    fn read_string(&self, ofs: usize, size: usize) -> Result<String, Error> {
        check_buffer_size(self, ofs, size)?;
        let b = &self[ofs..ofs+size];
        let end = b.iter().position(|&x| x == 0).unwrap_or(size);
        Ok(String::from_utf8_lossy(&b[..end]).trim_end().to_string())
    }

    fn read32b(&self, ofs: usize) -> Result<u32, Error> {
        check_buffer_size(self, ofs, 4)?;
        Ok(BigEndian::read_u32(&self[ofs..ofs+4]))
    }

    fn read32bi(&self, ofs: usize) -> Result<i32, Error> {
        check_buffer_size(self, ofs, 4)?;
        Ok(BigEndian::read_i32(&self[ofs..ofs+4]))
    }

    fn read16b(&self, ofs: usize) -> Result<u16, Error> {
        check_buffer_size(self, ofs, 2)?;
        Ok(BigEndian::read_u16(&self[ofs..ofs+2]))
    }

    fn read16bi(&self, ofs: usize) -> Result<i16, Error> {
        check_buffer_size(self, ofs, 2)?;
        Ok(BigEndian::read_i16(&self[ofs..ofs+2]))
    }

    fn read8(&self, ofs: usize) -> Result<u8, Error> {
        check_buffer_size(self, ofs, 1)?;
        Ok(self[ofs])
    }

    fn read8i(&self, ofs: usize) -> Result<i8, Error> {
        check_buffer_size(self, ofs, 1)?;
        Ok(self[ofs] as i8)
    }

    fn slice(&self, start: usize, size: usize) -> Result<&[u8], Error> {
        check_buffer_size(self, start, size)?;
        Ok(&self[start..start + size])
    }
}

fn check_buffer_size(b: &[u8], ofs: usize, size: usize) -> Result<(), Error> {
    match ofs.checked_add(size) {
        Some(end) if end <= b.len() => Ok(()),
        _ => Err(Error::Load(format!("short read at offset {}", ofs))),
    }
}

/// Reinterprets raw bytes as signed 8-bit PCM.
pub fn to_pcm8(b: &[u8]) -> Vec<i8> {
    b.iter().map(|&x| x as i8).collect()
}

pub fn period_to_note(period: u32) -> usize {
    if period == 0 {
        return 0
    }

    let note = 12.0_f64 * (PERIOD_BASE / period as f64).log(2.0);
    if note < 0.0 { 0 } else { note.round() as usize + 1 }
}

/// Name of a note number as displayed by trackers (1 is C-0).
pub fn note_name(note: usize) -> String {
    if note == 0 {
        return "---".to_owned()
    }
    format!("{}{}", NOTES[(note - 1) % 12], (note - 1) / 12)
}
