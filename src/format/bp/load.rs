use crate::format::{ProbeInfo, Format, Loader};
use crate::format::bp::*;
use crate::module::{Module, Sample};
use crate::player;
use crate::util::BinaryRead;
use crate::Error;

const INSTRUMENT_OFS : usize = 32;
const INSTRUMENT_SIZE: usize = 32;

/// SoundMon (Brian Postma) module loader
pub struct BpLoader;

impl Loader for BpLoader {
    fn name(&self) -> &'static str {
        "SoundMon"
    }

    fn probe(&self, b: &[u8], player_id: &str) -> Result<ProbeInfo, Error> {
        if b.len() < 512 {
            return Err(Error::Format(format!("file too short ({})", b.len())));
        }

        let format = match b.read32b(26)? & 0xffffff00 {
            0x562e3200 => Format::SoundMon11,     // "V.2"
            0x562e3300 => Format::SoundMon22,     // "V.3"
            _ => return Err(Error::Format("bad magic".to_owned())),
        };

        player::check_accepted(player_id, "bp")?;
        Ok(ProbeInfo{format, title: b.read_string(0, 26)?})
    }

    fn load(self: Box<Self>, b: &[u8], info: ProbeInfo) -> Result<Module, Error> {
        let version = match info.format {
            Format::SoundMon11 => Version::SoundMon11,
            Format::SoundMon22 => Version::SoundMon22,
            _ => return Err(Error::Format("unsupported format".to_owned())),
        };

        let num_waves = b.read8(29)? as usize;
        let num_steps = b.read16b(30)? as usize;
        if num_steps == 0 {
            return Err(Error::Load("no steps in module".to_owned()));
        }

        let mut instruments = Vec::with_capacity(NUM_INSTRUMENTS);
        for i in 0..NUM_INSTRUMENTS {
            let ofs = INSTRUMENT_OFS + i * INSTRUMENT_SIZE;
            let ins = if b.read8(ofs)? == 0xff {
                BpInstrument::Synth(load_synth(b, ofs + 1, version)?)
            } else {
                BpInstrument::Sample(load_sample(b, ofs)?)
            };
            instruments.push(ins);
        }

        let mut ofs = INSTRUMENT_OFS + NUM_INSTRUMENTS * INSTRUMENT_SIZE;

        let mut steps = Vec::with_capacity(num_steps);
        let mut num_tracks = 0;
        for _ in 0..num_steps {
            let mut step = [Step::default(); 4];
            for s in step.iter_mut() {
                s.track = b.read16b(ofs)?;
                s.sound_transpose = b.read8i(ofs + 2)?;
                s.transpose = b.read8i(ofs + 3)?;
                num_tracks = num_tracks.max(s.track as usize);
                ofs += 4;
            }
            steps.push(step);
        }

        let mut tracks = Vec::with_capacity(num_tracks);
        for _ in 0..num_tracks {
            let mut track = [Row::default(); ROWS];
            for row in track.iter_mut() {
                let x = b.read8(ofs + 1)?;
                *row = Row {
                    note      : b.read8i(ofs)?,
                    instrument: x >> 4,
                    optional  : x & 0x0f,
                    data      : b.read8(ofs + 2)?,
                };
                ofs += 3;
            }
            tracks.push(track);
        }

        let waves: Vec<i8> = b.slice(ofs, num_waves * WAVE_SIZE)?.iter().map(|&x| x as i8).collect();
        ofs += num_waves * WAVE_SIZE;

        let mut samples = Vec::with_capacity(NUM_INSTRUMENTS);
        for (i, ins) in instruments.iter().enumerate() {
            let mut smp = Sample::new();
            smp.num = i;
            smp.volume = ins.volume();
            if let BpInstrument::Sample(ins) = ins {
                smp.name = ins.name.to_owned();
                smp.size = ins.length as u32;
                if ins.loop_length > 2 {
                    smp.loop_start  = ins.loop_start as u32;
                    smp.loop_length = ins.loop_length as u32;
                }
                if ins.length != 0 {
                    smp.store(b.slice(ofs, ins.length as usize)?);
                    ofs += ins.length as usize;
                }
            }
            samples.push(smp);
        }

        debug!("{:?}: {} steps, {} tracks, {} wave tables", version, num_steps, num_tracks, num_waves);

        let data = BpData{
            title: info.title,
            version,
            steps,
            tracks,
            instruments,
            waves,
            samples,
        };

        Ok(Module {
            format     : "bp",
            description: match version {
                Version::SoundMon11 => "SoundMon 1.1",
                Version::SoundMon22 => "SoundMon 2.2",
            },
            player     : "bp",
            data       : Box::new(data),
        })
    }
}

fn load_sample(b: &[u8], ofs: usize) -> Result<SampleInstrument, Error> {
    let mut ins = SampleInstrument {
        name       : b.read_string(ofs, 24)?,
        length     : b.read16b(ofs + 24)?.wrapping_mul(2),
        loop_start : b.read16b(ofs + 26)?,
        loop_length: b.read16b(ofs + 28)?.wrapping_mul(2),
        volume     : b.read16b(ofs + 30)?.min(64),
    };

    // some modules have loops running past the sample end
    if ins.loop_start as u32 + ins.loop_length as u32 > ins.length as u32 {
        ins.loop_length = ins.length.saturating_sub(ins.loop_start);
    }

    Ok(ins)
}

// Synth parameters start after the 0xff marker. The 1.1 layout has
// padding bytes and no FX or MOD parameters.
fn load_synth(b: &[u8], ofs: usize, version: Version) -> Result<SynthInstrument, Error> {
    let mut ins = SynthInstrument {
        wave_table  : b.read8(ofs)?,
        wave_length : b.read16b(ofs + 1)?.wrapping_mul(2),
        adsr_control: b.read8(ofs + 3)?,
        adsr_table  : b.read8(ofs + 4)?,
        adsr_length : b.read16b(ofs + 5)?,
        adsr_speed  : b.read8(ofs + 7)?,
        lfo_control : b.read8(ofs + 8)?,
        lfo_table   : b.read8(ofs + 9)?,
        lfo_depth   : b.read8(ofs + 10)?,
        lfo_length  : b.read16b(ofs + 11)?,
        ..Default::default()
    };

    match version {
        Version::SoundMon11 => {
            ins.lfo_delay  = b.read8(ofs + 14)?;
            ins.lfo_speed  = b.read8(ofs + 15)?;
            ins.eg_control = b.read8(ofs + 16)?;
            ins.eg_table   = b.read8(ofs + 17)?;
            ins.eg_length  = b.read16b(ofs + 19)?;
            ins.eg_delay   = b.read8(ofs + 22)?;
            ins.eg_speed   = b.read8(ofs + 23)?;
            ins.fx_speed   = 1;
            ins.mod_speed  = 1;
            ins.volume     = b.read8(ofs + 24)?;
        }
        Version::SoundMon22 => {
            ins.lfo_delay   = b.read8(ofs + 13)?;
            ins.lfo_speed   = b.read8(ofs + 14)?;
            ins.eg_control  = b.read8(ofs + 15)?;
            ins.eg_table    = b.read8(ofs + 16)?;
            ins.eg_length   = b.read16b(ofs + 17)?;
            ins.eg_delay    = b.read8(ofs + 19)?;
            ins.eg_speed    = b.read8(ofs + 20)?;
            ins.fx_control  = b.read8(ofs + 21)?;
            ins.fx_speed    = b.read8(ofs + 22)?;
            ins.fx_delay    = b.read8(ofs + 23)?;
            ins.mod_control = b.read8(ofs + 24)?;
            ins.mod_table   = b.read8(ofs + 25)?;
            ins.mod_speed   = b.read8(ofs + 26)?;
            ins.mod_delay   = b.read8(ofs + 27)?;
            ins.volume      = b.read8(ofs + 28)?;
            ins.mod_length  = b.read16b(ofs + 29)?;
        }
    }

    ins.volume = ins.volume.min(64);
    Ok(ins)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::SongLayout;

    fn push16(v: &mut Vec<u8>, x: u16) { v.extend_from_slice(&x.to_be_bytes()) }

    fn sample_header(name: &str, length: u16, loop_start: u16, loop_length: u16, volume: u16) -> Vec<u8> {
        let mut v = vec![0; 24];
        v[..name.len()].copy_from_slice(name.as_bytes());
        push16(&mut v, length / 2);
        push16(&mut v, loop_start);
        push16(&mut v, loop_length / 2);
        push16(&mut v, volume);
        v
    }

    // 2.2 layout: wave table 1, 32 bytes, ADSR on table 2, FX 2, volume 70
    fn synth_header() -> Vec<u8> {
        let mut v = vec![0; INSTRUMENT_SIZE];
        v[0] = 0xff;
        v[1] = 1;
        v[2..4].copy_from_slice(&16u16.to_be_bytes());
        v[4] = 1;
        v[5] = 2;
        v[6..8].copy_from_slice(&4u16.to_be_bytes());
        v[8] = 3;
        v[22] = 2;
        v[23] = 5;
        v[29] = 70;
        v[30..32].copy_from_slice(&8u16.to_be_bytes());
        v
    }

    fn build_module(mark: &[u8; 3]) -> Vec<u8> {
        let mut b = vec![0; 26];
        b[..4].copy_from_slice(b"Tune");
        b.extend_from_slice(mark);
        b.push(2);                  // wave tables
        push16(&mut b, 2);          // steps

        b.extend(sample_header("lead", 16, 4, 16, 80));
        b.extend(synth_header());
        for _ in 2..NUM_INSTRUMENTS {
            b.extend(sample_header("", 0, 0, 0, 0));
        }

        for &(track, st, tr) in &[(1u16, 0u8, 0u8), (0, 0, 0), (0, 0, 0), (0, 0, 0),
                                  (2, 1, 0xfe), (0, 0, 0), (0, 0, 0), (0, 0, 0)] {
            push16(&mut b, track);
            b.push(st);
            b.push(tr);
        }

        for t in 0..2 {
            for r in 0..ROWS {
                if r == 0 {
                    b.extend_from_slice(&[13 + t, 0x12, 0x20]);
                } else {
                    b.extend_from_slice(&[0, 0, 0]);
                }
            }
        }

        b.extend((0..2 * WAVE_SIZE).map(|x| x as u8));
        b.extend((0..16).map(|x| x as u8 * 8));
        b.resize(b.len().max(512), 0);
        b
    }

    #[test]
    fn test_probe() {
        let b = build_module(b"V.3");
        let info = BpLoader.probe(&b, "").unwrap();
        assert_eq!(info.format, Format::SoundMon22);
        assert_eq!(info.title, "Tune");
        assert_eq!(BpLoader.probe(&build_module(b"V.2"), "").unwrap().format, Format::SoundMon11);

        assert!(BpLoader.probe(&build_module(b"V.4"), "").is_err());
        assert!(BpLoader.probe(&b[..500], "").is_err());
        assert!(BpLoader.probe(&b, "fred").is_err());
    }

    #[test]
    fn test_load() {
        let b = build_module(b"V.3");
        let info = BpLoader.probe(&b, "").unwrap();
        let module = Box::new(BpLoader).load(&b, info).unwrap();
        assert_eq!(module.description, "SoundMon 2.2");
        assert_eq!(module.data.layout(), SongLayout::Positions(2));

        let data = module.data.as_any().downcast_ref::<BpData>().unwrap();
        assert_eq!(data.version, Version::SoundMon22);
        assert_eq!(data.num_waves(), 2);
        assert_eq!(data.waves[70], 70);
        assert_eq!(data.steps[1][0], Step{ track: 2, sound_transpose: 1, transpose: -2 });
        assert_eq!(data.tracks.len(), 2);
        assert_eq!(data.row(2, 0), Row{ note: 14, instrument: 1, optional: 2, data: 0x20 });
        assert_eq!(data.row(0, 0), Row::default());
        assert_eq!(data.row(9, 0), Row::default());

        match &data.instruments[0] {
            BpInstrument::Sample(ins) => {
                assert_eq!(ins.name, "lead");
                assert_eq!(ins.volume, 64);
                // loop clipped to the sample length
                assert_eq!((ins.loop_start, ins.loop_length), (4, 12));
            }
            _ => panic!("not a sample"),
        }

        match &data.instruments[1] {
            BpInstrument::Synth(ins) => {
                assert_eq!(ins.wave_table, 1);
                assert_eq!(ins.wave_length, 32);
                assert_eq!(ins.adsr_length, 4);
                assert_eq!(ins.fx_control, 2);
                assert_eq!(ins.fx_speed, 5);
                assert_eq!(ins.volume, 64);
                assert_eq!(ins.mod_length, 8);
            }
            _ => panic!("not a synth"),
        }

        let smp = &data.samples[0];
        assert_eq!(smp.data.len(), 16);
        assert_eq!(smp.data[2], 16);
        assert_eq!((smp.loop_start, smp.loop_length), (4, 12));
        assert!(!data.samples[1].has_data());
    }

    #[test]
    fn test_truncated_module() {
        let b = build_module(b"V.3");
        let info = BpLoader.probe(&b, "").unwrap();
        // steps, tracks and wave tables need 32 + 96 + 128 bytes after the
        // instruments
        assert!(Box::new(BpLoader).load(&b[..600], info).is_err());
    }
}
