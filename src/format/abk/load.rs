use std::collections::HashMap;
use crate::format::{ProbeInfo, Format, Loader};
use crate::format::abk::{AbkData, AbkSong, PositionEntry};
use crate::module::{Module, Sample};
use crate::player;
use crate::util::BinaryRead;
use crate::Error;

const HEADER_BASE: usize = 20;

/// AMOS Music Bank loader
pub struct AbkLoader;

impl Loader for AbkLoader {
    fn name(&self) -> &'static str {
        "AMOS Music Bank"
    }

    fn probe(&self, b: &[u8], player_id: &str) -> Result<ProbeInfo, Error> {
        if b.len() < 36 {
            return Err(Error::Format(format!("file too short ({})", b.len())));
        }

        if b.read32b(0)? != magic4!('A','m','B','k') {
            return Err(Error::Format("bad magic".to_owned()));
        }

        // Bank 3 is the music bank, but numbers from 5 up are free for
        // anything and some modules use them
        let bank_type = b.read16b(4)?;
        if bank_type != 3 && bank_type < 5 {
            return Err(Error::Format(format!("bad bank type {}", bank_type)));
        }

        if b.read32b(12)? != magic4!('M','u','s','i') || b.read32b(16)? != magic4!('c',' ',' ',' ') {
            return Err(Error::Format("not a music bank".to_owned()));
        }

        player::check_accepted(player_id, "abk")?;
        Ok(ProbeInfo{format: Format::Abk, title: first_song_name(b).unwrap_or_default()})
    }

    fn load(self: Box<Self>, b: &[u8], info: ProbeInfo) -> Result<Module, Error> {
        if info.format != Format::Abk {
            return Err(Error::Format("unsupported format".to_owned()));
        }

        let sample_info_ofs = b.read32b(20)? as usize + HEADER_BASE;
        let song_data_ofs   = b.read32b(24)? as usize + HEADER_BASE;
        let track_ofs       = b.read32b(28)? as usize + HEADER_BASE;

        let samples = load_samples(b, sample_info_ofs)?;
        let (tracks, pattern_tracks) = load_tracks(b, track_ofs)?;
        let songs = load_songs(b, song_data_ofs, &pattern_tracks)?;

        if songs.is_empty() {
            return Err(Error::Load("no songs in bank".to_owned()));
        }

        debug!("{} samples, {} tracks, {} patterns, {} songs",
               samples.len(), tracks.len(), pattern_tracks.len(), songs.len());

        let data = AbkData{
            samples,
            tracks,
            songs,
        };

        Ok(Module {
            format     : "abk",
            description: "AMOS Music Bank",
            player     : "abk",
            data       : Box::new(data),
        })
    }
}

fn first_song_name(b: &[u8]) -> Result<String, Error> {
    let ofs = b.read32b(24)? as usize + HEADER_BASE;
    let song = ofs + b.read32b(ofs + 2)? as usize;
    b.read_string(song + 12, 16)
}

fn load_samples(b: &[u8], ofs: usize) -> Result<Vec<Sample>, Error> {
    let num = b.read16b(ofs)? as usize;
    let base = ofs + 2;

    let mut samples = Vec::with_capacity(num);

    for i in 0..num {
        let o = base + i * 32;
        let start        = b.read32b(o)?;
        let loop_pos     = b.read32b(o + 4)?;
        let non_loop_len = b.read16b(o + 8)?.wrapping_mul(2);
        let mut loop_len = b.read16b(o + 10)?.wrapping_mul(2) as u32;
        let volume       = b.read16b(o + 12)?.min(64);
        let mut length   = b.read16b(o + 14)?.wrapping_mul(2);
        let name         = b.read_string(o + 16, 16)?;

        if length <= 4 {
            length = non_loop_len;
        }

        let mut smp = Sample::new();
        smp.num    = i;
        smp.name   = name;
        smp.volume = volume as u32;
        smp.size   = length as u32;

        let rel = loop_pos.wrapping_sub(start);
        if rel > length as u32 {
            loop_len = 0;
        }

        if loop_len > 4 {
            if rel + loop_len > length as u32 {
                loop_len = length as u32 - rel;
            }

            // The replayer adds the loop position to the sample start
            // without doubling it, and so do we. The playable part is
            // what comes before the loop plus the loop itself.
            smp.loop_start  = rel;
            smp.loop_length = loop_len;
            smp.size        = rel + loop_len;
        }

        smp.store(b.slice(base + start as usize, length as usize)?);
        samples.push(smp);
    }

    Ok(samples)
}

// Patterns hold one track per channel. Tracks shared by several patterns
// are stored once, numbered in order of first reference.
fn load_tracks(b: &[u8], ofs: usize) -> Result<(Vec<Vec<u16>>, Vec<[usize; 4]>), Error> {
    let num = b.read16b(ofs)? as usize;

    let mut taken: HashMap<u16, usize> = HashMap::new();
    let mut offsets: Vec<u16> = Vec::new();
    let mut pattern_tracks = Vec::with_capacity(num);

    for i in 0..num {
        let mut trk = [0; 4];
        for (j, t) in trk.iter_mut().enumerate() {
            let track_ofs = b.read16b(ofs + 2 + (i * 4 + j) * 2)?;
            *t = *taken.entry(track_ofs).or_insert_with(|| {
                offsets.push(track_ofs);
                offsets.len() - 1
            });
        }
        pattern_tracks.push(trk);
    }

    let mut tracks = Vec::with_capacity(offsets.len());

    for track_ofs in offsets {
        let mut o = ofs + track_ofs as usize;
        let mut track = Vec::new();
        loop {
            let val = b.read16b(o)?;
            o += 2;
            track.push(val);
            let code = val & 0xff00;
            if code == 0x8000 || code == 0x9100 {
                break
            }
        }
        tracks.push(track);
    }

    Ok((tracks, pattern_tracks))
}

fn load_songs(b: &[u8], ofs: usize, pattern_tracks: &[[usize; 4]]) -> Result<Vec<AbkSong>, Error> {
    let num = b.read16b(ofs)? as usize;

    let mut songs = Vec::with_capacity(num);

    for i in 0..num {
        let song_ofs = ofs + b.read32b(ofs + 2 + i * 4)? as usize;

        // default tempo and padding are not used by the replayer
        let name = b.read_string(song_ofs + 12, 16)?;

        let mut positions: [Vec<PositionEntry>; 4] = Default::default();
        for (chn, list) in positions.iter_mut().enumerate() {
            let mut o = song_ofs + b.read16b(song_ofs + chn * 2)? as usize;
            loop {
                let entry = PositionEntry::from_raw(b.read16bi(o)?, pattern_tracks, chn);
                o += 2;
                list.push(entry);
                if entry == PositionEntry::Stop || entry == PositionEntry::Loop {
                    break
                }
            }
        }

        songs.push(AbkSong{ name, positions });
    }

    Ok(songs)
}
