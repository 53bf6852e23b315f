use std::collections::HashMap;
use crate::format::{ProbeInfo, Format, Loader};
use crate::format::fred::*;
use crate::module::{Module, Sample};
use crate::player;
use crate::util::BinaryRead;
use crate::Error;

const END_MARK: u32 = 0x12345678;
const INSTRUMENT_SIZE: usize = 96;

/// Fred Editor module loader
pub struct FredLoader;

impl Loader for FredLoader {
    fn name(&self) -> &'static str {
        "Fred Editor"
    }

    fn probe(&self, b: &[u8], player_id: &str) -> Result<ProbeInfo, Error> {
        if b.len() < 20 {
            return Err(Error::Format(format!("file too short ({})", b.len())));
        }

        if b.slice(0, 12)? != &b"Fred Editor "[..] {
            return Err(Error::Format("bad magic".to_owned()));
        }

        if b.read16b(12)? != 0 {
            return Err(Error::Format("bad version".to_owned()));
        }

        let songs = b.read16b(14)?;
        if songs > 10 {
            return Err(Error::Format(format!("bad number of songs {}", songs)));
        }

        if b.read32b(b.len() - 4)? != END_MARK {
            return Err(Error::Format("no end mark".to_owned()));
        }

        player::check_accepted(player_id, "fred")?;
        Ok(ProbeInfo{format: Format::Fred, title: "".to_owned()})
    }

    fn load(self: Box<Self>, b: &[u8], info: ProbeInfo) -> Result<Module, Error> {
        if info.format != Format::Fred {
            return Err(Error::Format("unsupported format".to_owned()));
        }

        let num_songs = b.read16b(14)? as usize;
        if num_songs == 0 {
            return Err(Error::Load("no songs in module".to_owned()));
        }

        let start_tempo = b.slice(16, num_songs)?.to_vec();
        let mut ofs = 16 + num_songs;

        // position lists, 4 channels by 256 signed bytes for each song
        let mut positions = Vec::with_capacity(num_songs);
        for _ in 0..num_songs {
            let mut song: [Vec<i8>; 4] = Default::default();
            for list in song.iter_mut() {
                *list = b.slice(ofs, POSITION_LIST_SIZE)?.iter().map(|&x| x as i8).collect();
                ofs += POSITION_LIST_SIZE;
            }
            positions.push(song);
        }

        let mut tracks = Vec::with_capacity(NUM_TRACKS);
        for i in 0..NUM_TRACKS {
            let size = b.read32bi(ofs)?;
            if size < 0 {
                return Err(Error::Load(format!("bad size {} for track {}", size, i)));
            }
            tracks.push(b.slice(ofs + 4, size as usize)?.to_vec());
            ofs += 4 + size as usize;
        }

        let num_ins = b.read16b(ofs)? as usize;
        ofs += 2;

        let mut instruments = Vec::with_capacity(num_ins);
        let mut index_map: HashMap<u32, usize> = HashMap::new();
        for i in 0..num_ins {
            let ins = load_instrument(b, ofs, i)?;
            index_map.entry(ins.index).or_insert(i);
            instruments.push(ins);
            ofs += INSTRUMENT_SIZE;
        }

        let mut samples: Vec<Sample> = instruments.iter().map(|ins| {
            let mut smp = Sample::new();
            smp.num    = ins.num;
            smp.name   = ins.name.to_owned();
            smp.volume = ins.env_vol as u32;
            smp
        }).collect();

        let num_smp = b.read16b(ofs)? as usize;
        ofs += 2;

        for _ in 0..num_smp {
            let index = b.read16b(ofs)? as u32;
            let size = b.read16b(ofs + 2)? as usize;

            let i = match index_map.get(&index) {
                Some(&i) => i,
                None     => return Err(Error::Load(format!("no instrument for sample {}", index))),
            };

            let ins = &instruments[i];
            let smp = &mut samples[i];
            smp.store(b.slice(ofs + 4, size)?);
            smp.size = ins.length as u32;
            if ins.has_loop() {
                smp.loop_start  = ins.repeat_len as u32;
                smp.loop_length = (ins.length as u32).saturating_sub(ins.repeat_len as u32);
            }
            ofs += 4 + size;
        }

        debug!("{} songs, {} instruments, {} samples", num_songs, num_ins, num_smp);

        let data = FredData{
            title: info.title,
            start_tempo,
            positions,
            tracks,
            instruments,
            samples,
        };

        Ok(Module {
            format     : "fred",
            description: "Fred Editor",
            player     : "fred",
            data       : Box::new(data),
        })
    }
}

fn load_instrument(b: &[u8], ofs: usize, num: usize) -> Result<FredInstrument, Error> {
    let mut arpeggio = [0; 16];
    for (i, a) in arpeggio.iter_mut().enumerate() {
        *a = b.read8i(ofs + 54 + i)?;
    }

    Ok(FredInstrument {
        num,
        name           : b.read_string(ofs, 32)?,
        index          : b.read32b(ofs + 32)?,
        repeat_len     : b.read16b(ofs + 36)?,
        length         : b.read16b(ofs + 38)?.wrapping_mul(2),
        period         : b.read16b(ofs + 40)?,
        vib_delay      : b.read8(ofs + 42)?,
        vib_speed      : b.read8i(ofs + 44)?,
        vib_ampl       : b.read8i(ofs + 45)?,
        env_vol        : b.read8(ofs + 46)?,
        attack_speed   : b.read8(ofs + 47)?,
        attack_volume  : b.read8(ofs + 48)?,
        decay_speed    : b.read8(ofs + 49)?,
        decay_volume   : b.read8(ofs + 50)?,
        sustain_delay  : b.read8(ofs + 51)?,
        release_speed  : b.read8(ofs + 52)?,
        release_volume : b.read8(ofs + 53)?,
        arpeggio,
        arp_speed      : b.read8(ofs + 70)?,
        inst_type      : InstrumentType::from_u8(b.read8(ofs + 71)?),
        pulse_rate_min : b.read8i(ofs + 72)?,
        pulse_rate_plus: b.read8i(ofs + 73)?,
        pulse_speed    : b.read8(ofs + 74)?,
        pulse_start    : b.read8(ofs + 75)?,
        pulse_end      : b.read8(ofs + 76)?,
        pulse_delay    : b.read8(ofs + 77)?,
        sync           : b.read8(ofs + 78)?,
        blend          : b.read8(ofs + 79)?,
        blend_delay    : b.read8(ofs + 80)?,
        pulse_shot     : b.read8(ofs + 81)?,
        blend_shot     : b.read8(ofs + 82)?,
        arp_count      : b.read8(ofs + 83)?,
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::SongLayout;

    fn push16(v: &mut Vec<u8>, x: u16) { v.extend_from_slice(&x.to_be_bytes()) }
    fn push32(v: &mut Vec<u8>, x: u32) { v.extend_from_slice(&x.to_be_bytes()) }

    /// One 96-byte instrument header.
    fn instrument(name: &str, index: u32, inst_type: u8, length: u16, repeat: u16) -> Vec<u8> {
        let mut v = vec![0; INSTRUMENT_SIZE];
        v[..name.len()].copy_from_slice(name.as_bytes());
        v[32..36].copy_from_slice(&index.to_be_bytes());
        v[36..38].copy_from_slice(&repeat.to_be_bytes());
        v[38..40].copy_from_slice(&(length / 2).to_be_bytes());
        v[40..42].copy_from_slice(&1024u16.to_be_bytes());
        v[46] = 64;                // envelope volume
        v[47] = 255;               // attack speed
        v[48] = 255;               // attack volume
        v[49] = 0;
        v[50] = 255;               // decay volume
        v[51] = 255;               // sustain delay
        v[70] = 1;                 // arpeggio speed
        v[71] = inst_type;
        v[83] = 1;                 // arpeggio count
        v
    }

    /// A module with one song. `lists` holds the position bytes of each
    /// channel, `tracks` the leading tracks (the rest are empty).
    fn build_module(tempo: u8, lists: [&[i8]; 4], tracks: &[&[u8]], ins: &[Vec<u8>], smp: &[(u16, Vec<u8>)]) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(b"Fred Editor ");
        push16(&mut b, 0);
        push16(&mut b, 1);
        b.push(tempo);

        for list in lists.iter() {
            let mut pos = vec![0u8; POSITION_LIST_SIZE];
            for (i, &p) in list.iter().enumerate() {
                pos[i] = p as u8;
            }
            b.extend(pos);
        }

        for i in 0..NUM_TRACKS {
            let trk: &[u8] = tracks.get(i).cloned().unwrap_or(&[0x80]);
            push32(&mut b, trk.len() as u32);
            b.extend_from_slice(trk);
        }

        push16(&mut b, ins.len() as u16);
        for i in ins {
            b.extend_from_slice(i);
        }

        push16(&mut b, smp.len() as u16);
        for (index, data) in smp {
            push16(&mut b, *index);
            push16(&mut b, data.len() as u16);
            b.extend_from_slice(data);
        }

        push32(&mut b, END_MARK);
        b
    }

    fn simple_module() -> Vec<u8> {
        let ins = vec![instrument("lead", 7, 0, 16, 4), instrument("pulse", 8, 1, 32, 0)];
        let smp = vec![(7, (0..16).collect())];
        build_module(6, [&[0, -1], &[1, -1], &[1, -1], &[1, -1]], &[&[0x83, 0, 24, 0x80]], &ins, &smp)
    }

    #[test]
    fn test_probe() {
        let b = simple_module();
        assert_eq!(FredLoader.probe(&b, "").unwrap().format, Format::Fred);
        assert!(FredLoader.probe(&b, "abk").is_err());

        let mut bad = b.clone();
        let len = bad.len();
        bad[len - 1] = 0;
        assert!(FredLoader.probe(&bad, "").is_err());

        let mut bad = b.clone();
        bad[15] = 11;
        assert!(FredLoader.probe(&bad, "").is_err());
    }

    #[test]
    fn test_load() {
        let b = simple_module();
        let info = FredLoader.probe(&b, "").unwrap();
        let module = Box::new(FredLoader).load(&b, info).unwrap();
        assert_eq!(module.data.layout(), SongLayout::SubSongs(1));

        let data = module.data.as_any().downcast_ref::<FredData>().unwrap();
        assert_eq!(data.start_tempo, vec![6]);
        assert_eq!(&data.positions[0][0][..3], &[0, -1, 0]);
        assert_eq!(data.tracks[0], vec![0x83, 0, 24, 0x80]);
        assert_eq!(data.tracks[1], vec![0x80]);
        assert_eq!(data.song_length(0, 0), 1);

        let ins = &data.instruments[0];
        assert_eq!(ins.name, "lead");
        assert_eq!(ins.length, 16);
        assert_eq!(ins.period, 1024);
        assert_eq!(ins.inst_type, InstrumentType::Sample);
        assert_eq!(data.instruments[1].inst_type, InstrumentType::Pulse);

        // loop start and length as the replayer sets them
        let smp = &data.samples[0];
        assert_eq!(smp.data.len(), 16);
        assert_eq!(smp.loop_start, 4);
        assert_eq!(smp.loop_length, 12);
        assert!(!data.samples[1].has_data());
    }

    #[test]
    fn test_sample_without_instrument() {
        let ins = vec![instrument("lead", 7, 0, 16, 0)];
        let smp = vec![(9, vec![0; 16])];
        let b = build_module(6, [&[0, -1], &[0, -1], &[0, -1], &[0, -1]], &[], &ins, &smp);
        let info = FredLoader.probe(&b, "").unwrap();
        assert!(Box::new(FredLoader).load(&b, info).is_err());
    }
}
