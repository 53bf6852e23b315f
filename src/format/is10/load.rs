use crate::format::{ProbeInfo, Format, Loader};
use crate::format::is10::*;
use crate::module::{Module, Sample};
use crate::player;
use crate::util::BinaryRead;
use crate::Error;

const MAGIC           : &[u8; 8] = b"ISM!V1.2";
const HEADER_SIZE     : usize = 204;
const SAMPLE_INFO_SIZE: usize = 28;
const INSTRUMENT_SIZE : usize = 28;
const SUB_SONG_SIZE   : usize = 14;
const EXTRA_ROWS      : usize = 64;

/// InStereo! 1.0 module loader
pub struct Is10Loader;

impl Loader for Is10Loader {
    fn name(&self) -> &'static str {
        "InStereo! 1.0"
    }

    fn probe(&self, b: &[u8], player_id: &str) -> Result<ProbeInfo, Error> {
        if b.len() < HEADER_SIZE {
            return Err(Error::Format(format!("file too short ({})", b.len())));
        }

        if b.slice(0, 8)? != MAGIC {
            return Err(Error::Format("bad magic".to_owned()));
        }

        player::check_accepted(player_id, "is10")?;
        Ok(ProbeInfo{format: Format::InStereo10, title: b.read_string(36, 28)?})
    }

    fn load(self: Box<Self>, b: &[u8], info: ProbeInfo) -> Result<Module, Error> {
        let num_positions   = b.read16b(8)? as usize;
        let num_rows        = b.read16b(10)? as usize;
        let num_samples     = b.read8(16)? as usize;
        let num_waveforms   = b.read8(17)? as usize;
        let num_instruments = b.read8(18)? as usize;
        let num_sub_songs   = b.read8(19)? as usize;
        let num_eg_tables   = b.read8(20)? as usize;
        let num_adsr_tables = b.read8(21)? as usize;

        if num_sub_songs == 0 {
            return Err(Error::Load("no sub-songs in module".to_owned()));
        }

        let mut ofs = HEADER_SIZE;

        let mut samples = Vec::with_capacity(num_samples);
        for i in 0..num_samples {
            let mut smp = Sample::new();
            smp.num = i;
            smp.name = b.read_string(ofs + 1, 23)?;
            smp.volume = 64;
            samples.push(smp);
            ofs += SAMPLE_INFO_SIZE;
        }

        let mut lengths = Vec::with_capacity(num_samples);
        for _ in 0..num_samples {
            lengths.push(b.read32b(ofs)? as usize);
            ofs += 4;
        }

        let eg_tables = b.slice(ofs, num_eg_tables * EG_TABLE_SIZE)?.to_vec();
        ofs += num_eg_tables * EG_TABLE_SIZE;

        let adsr_tables = b.slice(ofs, num_adsr_tables * ADSR_TABLE_SIZE)?.to_vec();
        ofs += num_adsr_tables * ADSR_TABLE_SIZE;

        let mut instruments = Vec::with_capacity(num_instruments);
        for _ in 0..num_instruments {
            instruments.push(load_instrument(b, ofs)?);
            ofs += INSTRUMENT_SIZE;
        }

        let arpeggios = b.slice(ofs, NUM_ARP_TABLES * ARP_TABLE_SIZE)?.to_vec();
        ofs += NUM_ARP_TABLES * ARP_TABLE_SIZE;

        let mut sub_songs = Vec::with_capacity(num_sub_songs);
        for _ in 0..num_sub_songs {
            sub_songs.push(SubSong {
                start_speed     : b.read8(ofs + 4)?,
                rows_per_track  : b.read8(ofs + 5)?,
                first_position  : b.read16b(ofs + 6)?,
                last_position   : b.read16b(ofs + 8)?,
                restart_position: b.read16b(ofs + 10)?,
            });
            ofs += SUB_SONG_SIZE;
        }
        // unused entry after the sub-song list
        ofs += SUB_SONG_SIZE;

        let mut waveforms: Vec<Vec<i8>> = Vec::with_capacity(num_waveforms);
        for _ in 0..num_waveforms {
            waveforms.push(b.slice(ofs, WAVE_SIZE)?.iter().map(|&x| x as i8).collect());
            ofs += WAVE_SIZE;
        }

        let mut positions = Vec::with_capacity(num_positions);
        for _ in 0..num_positions {
            let mut pos = [PositionEntry::default(); 4];
            for p in pos.iter_mut() {
                *p = PositionEntry {
                    start_row      : b.read16b(ofs)?,
                    sound_transpose: b.read8i(ofs + 2)?,
                    note_transpose : b.read8i(ofs + 3)?,
                };
                ofs += 4;
            }
            positions.push(pos);
        }

        let mut rows = Vec::with_capacity(num_rows + EXTRA_ROWS);
        for _ in 0..num_rows + EXTRA_ROWS {
            let x = b.read8(ofs + 2)?;
            rows.push(TrackLine {
                note      : b.read8(ofs)?,
                instrument: b.read8(ofs + 1)?,
                arpeggio  : x >> 4,
                effect    : x & 0x0f,
                arg       : b.read8(ofs + 3)?,
            });
            ofs += 4;
        }

        for (smp, &length) in samples.iter_mut().zip(lengths.iter()) {
            smp.size = length as u32;
            if length != 0 {
                smp.store(b.slice(ofs, length)?);
                ofs += length;
            }
        }

        debug!("{} positions, {} rows, {} instruments, {} samples, {} sub-songs",
            num_positions, num_rows, num_instruments, num_samples, num_sub_songs);

        let data = Is10Data {
            title: info.title,
            sub_songs,
            positions,
            rows,
            instruments,
            waveforms,
            eg_tables,
            adsr_tables,
            arpeggios,
            samples,
        };

        Ok(Module {
            format     : "is10",
            description: "InStereo! 1.0",
            player     : "is10",
            data       : Box::new(data),
        })
    }
}

fn load_instrument(b: &[u8], ofs: usize) -> Result<Is10Instrument, Error> {
    Ok(Is10Instrument {
        waveform          : b.read8(ofs)?,
        synthesis         : b.read8(ofs + 1)? != 0,
        waveform_length   : b.read16b(ofs + 2)?,
        repeat_length     : b.read16b(ofs + 4)?,
        volume            : b.read8(ofs + 6)?.min(64),
        portamento_speed  : b.read8i(ofs + 7)?,
        adsr_enabled      : b.read8(ofs + 8)? != 0,
        adsr_table        : b.read8(ofs + 9)?,
        adsr_length       : b.read16b(ofs + 10)?,
        portamento_enabled: b.read8(ofs + 14)? != 0,
        vibrato_delay     : b.read8(ofs + 20)?,
        vibrato_speed     : b.read8(ofs + 21)?,
        vibrato_level     : b.read8(ofs + 22)?,
        egc_offset        : b.read8(ofs + 23)?,
        egc_mode          : EgcMode::from(b.read8(ofs + 24)?),
        egc_table         : b.read8(ofs + 25)?,
        egc_length        : b.read16b(ofs + 26)?,
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::SongLayout;

    fn push16(v: &mut Vec<u8>, x: u16) { v.extend_from_slice(&x.to_be_bytes()) }

    // One sample, one wave table, a sample and a synth instrument, one
    // EG and one ADSR table, two positions of 4 rows each.
    fn build_module(num_sub_songs: u8) -> Vec<u8> {
        let mut b = MAGIC.to_vec();
        push16(&mut b, 2);                          // positions
        push16(&mut b, 8);                          // track rows
        b.resize(16, 0);
        b.extend_from_slice(&[1, 1, 2, num_sub_songs, 1, 1]);
        b.resize(36, 0);
        b.extend_from_slice(b"Stereo Tune");
        b.resize(HEADER_SIZE, 0);

        let mut info = vec![0; SAMPLE_INFO_SIZE];
        info[1..6].copy_from_slice(b"bass!");
        b.extend(info);
        b.extend_from_slice(&8u32.to_be_bytes());

        b.extend((0..EG_TABLE_SIZE).map(|x| x as u8));
        b.extend((0..ADSR_TABLE_SIZE).map(|x| x as u8));

        let mut ins = vec![0; INSTRUMENT_SIZE];
        ins[2..4].copy_from_slice(&4u16.to_be_bytes());
        ins[6] = 40;
        b.extend(ins);

        let mut ins = vec![0; INSTRUMENT_SIZE];
        ins[1] = 1;
        ins[2..4].copy_from_slice(&32u16.to_be_bytes());
        ins[6] = 99;
        ins[7] = 0xfe;
        ins[8] = 1;
        ins[10..12].copy_from_slice(&16u16.to_be_bytes());
        ins[14] = 1;
        ins[20] = 3;
        ins[21] = 4;
        ins[22] = 5;
        ins[23] = 6;
        ins[24] = 1;
        ins[26..28].copy_from_slice(&10u16.to_be_bytes());
        b.extend(ins);

        let mut arp = vec![0; NUM_ARP_TABLES * ARP_TABLE_SIZE];
        arp[ARP_TABLE_SIZE + 1] = 12;
        b.extend(arp);

        for _ in 0..num_sub_songs {
            let mut song = vec![0; SUB_SONG_SIZE];
            song[4] = 6;
            song[5] = 4;
            song[8..10].copy_from_slice(&1u16.to_be_bytes());
            b.extend(song);
        }
        b.extend(vec![0; SUB_SONG_SIZE]);

        b.extend((0..WAVE_SIZE).map(|x| x as u8));

        for &(row, st, nt) in &[(0u16, 0u8, 0u8), (0, 0, 0), (0, 0, 0), (0, 0, 0),
                                (4, 1, 0xff), (0, 0, 0), (0, 0, 0), (0, 0, 0)] {
            push16(&mut b, row);
            b.push(st);
            b.push(nt);
        }

        for r in 0..8 + EXTRA_ROWS {
            match r {
                0 => b.extend_from_slice(&[37, 1, 0x1f, 3]),
                4 => b.extend_from_slice(&[NOTE_OFF, 0, 0, 0]),
                _ => b.extend_from_slice(&[0, 0, 0, 0]),
            }
        }

        b.extend((0..8).map(|x| x as u8 * 4));
        b
    }

    #[test]
    fn test_detect() {
        let b = build_module(1);
        let info = Is10Loader.probe(&b, "").unwrap();
        assert_eq!(info.format, Format::InStereo10);
        assert_eq!(info.title, "Stereo Tune");

        let mut bad = b.clone();
        bad[7] = b'3';
        assert!(Is10Loader.probe(&bad, "").is_err());
        assert!(Is10Loader.probe(&b[..200], "").is_err());
        assert!(Is10Loader.probe(&b, "bp").is_err());
        assert!(Is10Loader.probe(&b, "is10").is_ok());
    }

    #[test]
    fn test_load() {
        let b = build_module(2);
        let info = Is10Loader.probe(&b, "").unwrap();
        let module = Box::new(Is10Loader).load(&b, info).unwrap();
        assert_eq!(module.description, "InStereo! 1.0");
        assert_eq!(module.data.layout(), SongLayout::SubSongs(2));
        assert_eq!(module.channels(), 4);

        let data = module.data.as_any().downcast_ref::<Is10Data>().unwrap();
        assert_eq!(data.sub_songs[1], SubSong{
            start_speed: 6, rows_per_track: 4, first_position: 0, last_position: 1, restart_position: 0,
        });
        assert_eq!(data.position(1)[0], PositionEntry{ start_row: 4, sound_transpose: 1, note_transpose: -1 });
        assert_eq!(data.position(5)[0], PositionEntry::default());
        assert_eq!(data.rows.len(), 8 + EXTRA_ROWS);
        assert_eq!(data.row(0), TrackLine{ note: 37, instrument: 1, arpeggio: 1, effect: 0xf, arg: 3 });
        assert_eq!(data.row(4).note, NOTE_OFF);
        assert_eq!(data.row(1000), TrackLine::default());

        assert_eq!(data.arpeggio(1, 1), 12);
        assert_eq!(data.eg(0, 20), 20);
        assert_eq!(data.adsr(0, 200), 200);
        assert_eq!(data.adsr(3, 0), 0);
        assert_eq!(data.waveform(0)[200], -56);
        assert!(data.waveform(1).is_empty());

        let ins = data.instrument(1).unwrap();
        assert!(!ins.synthesis);
        assert_eq!(ins.volume, 40);

        let ins = data.instrument(2).unwrap();
        assert!(ins.synthesis);
        assert_eq!(ins.waveform_length, 32);
        assert_eq!(ins.volume, 64);
        assert_eq!(ins.portamento_speed, -2);
        assert!(ins.adsr_enabled && ins.portamento_enabled);
        assert_eq!(ins.adsr_length, 16);
        assert_eq!((ins.vibrato_delay, ins.vibrato_speed, ins.vibrato_level), (3, 4, 5));
        assert_eq!(ins.egc_offset, 6);
        assert_eq!(ins.egc_mode, EgcMode::Ones);
        assert_eq!(ins.egc_length, 10);
        assert!(data.instrument(0).is_none());
        assert!(data.instrument(3).is_none());

        assert_eq!(module.data.instruments(), vec!["bass!".to_owned(), "".to_owned()]);
        let smp = &data.samples[0];
        assert_eq!(smp.size, 8);
        assert_eq!(smp.data[2], 8);
    }

    #[test]
    fn test_truncated_module() {
        let b = build_module(1);
        let info = Is10Loader.probe(&b, "").unwrap();
        assert!(Box::new(Is10Loader).load(&b[..b.len() - 4], info).is_err());
    }

    #[test]
    fn test_no_sub_songs() {
        let b = build_module(0);
        let info = Is10Loader.probe(&b, "").unwrap();
        match Box::new(Is10Loader).load(&b, info) {
            Err(Error::Load(_)) => {},
            _ => panic!("module without sub-songs loaded"),
        }
    }
}
