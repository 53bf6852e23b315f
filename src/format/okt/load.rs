use crate::format::{ProbeInfo, Format, Loader};
use crate::format::okt::*;
use crate::module::{Module, Sample};
use crate::player;
use crate::util::BinaryRead;
use crate::Error;

const MIN_SIZE        : usize = 1368;
const SAMPLE_SIZE     : usize = 32;
const SHORT_SAMPLE_MAX: usize = 20;   // bytes a truncated last sample may miss

/// Oktalyzer module loader
pub struct OktLoader;

impl Loader for OktLoader {
    fn name(&self) -> &'static str {
        "Oktalyzer"
    }

    fn probe(&self, b: &[u8], player_id: &str) -> Result<ProbeInfo, Error> {
        if b.len() < MIN_SIZE {
            return Err(Error::Format(format!("file too short ({})", b.len())));
        }

        if b.slice(0, 8)? != b"OKTASONG" {
            return Err(Error::Format("bad magic".to_owned()));
        }

        player::check_accepted(player_id, "okt")?;
        Ok(ProbeInfo{format: Format::Okt, title: "".to_owned()})
    }

    fn load(self: Box<Self>, b: &[u8], _info: ProbeInfo) -> Result<Module, Error> {
        let mut channel_flags = None;
        let mut instruments: Vec<OktSample> = Vec::new();
        let mut samples: Vec<Sample> = Vec::new();
        let mut speed = 6;
        let mut num_patterns = None;
        let mut song_length = None;
        let mut order = None;
        let mut patterns: Vec<Pattern> = Vec::new();
        let mut read_samp = 0;

        let mut ofs = 8;
        while ofs + 8 <= b.len() {
            let id = b.read32b(ofs)?;
            let size = b.read32b(ofs + 4)? as usize;
            ofs += 8;

            match id {
                0x434d4f44 => {     // CMOD
                    check_size("CMOD", size, 8)?;
                    let mut flags = [false; 4];
                    for (i, f) in flags.iter_mut().enumerate() {
                        *f = b.read16b(ofs + i * 2)? != 0;
                    }
                    channel_flags = Some(flags);
                }
                0x53414d50 => {     // SAMP
                    instruments.clear();
                    for i in 0..size / SAMPLE_SIZE {
                        instruments.push(load_sample(b, ofs + i * SAMPLE_SIZE)?);
                    }
                    samples = instruments.iter().enumerate().map(|(i, ins)| {
                        let mut smp = Sample::new();
                        smp.num = i;
                        smp.name = ins.name.to_owned();
                        smp.size = ins.length;
                        smp.loop_start = ins.repeat_start;
                        smp.loop_length = ins.repeat_length;
                        smp.volume = ins.volume as u32;
                        smp
                    }).collect();
                }
                0x53504545 => {     // SPEE
                    check_size("SPEE", size, 2)?;
                    speed = b.read16b(ofs)?;
                }
                0x534c454e => {     // SLEN
                    check_size("SLEN", size, 2)?;
                    num_patterns = Some(b.read16b(ofs)? as usize);
                }
                0x504c454e => {     // PLEN
                    check_size("PLEN", size, 2)?;
                    song_length = Some(b.read16b(ofs)? as usize);
                }
                0x50415454 => {     // PATT
                    check_size("PATT", size, ORDER_SIZE)?;
                    order = Some(b.slice(ofs, ORDER_SIZE)?.to_vec());
                }
                0x50424f44 => {     // PBOD
                    if patterns.len() < num_patterns.unwrap_or(0) {
                        let flags = channel_flags.ok_or_else(|| Error::Load("pattern before channel modes".to_owned()))?;
                        let channels = 4 + flags.iter().filter(|&&x| x).count();
                        patterns.push(load_pattern(b, ofs, channels)?);
                    }
                }
                0x53424f44 => {     // SBOD
                    // bodies are stored in order for the samples that have a length
                    while read_samp < instruments.len() && instruments[read_samp].length == 0 {
                        read_samp += 1;
                    }
                    if read_samp < instruments.len() {
                        let used = instruments[read_samp..].iter().filter(|x| x.length != 0).count();
                        let avail = size.min(b.len() - ofs);
                        if avail < size && (used > 1 || avail + SHORT_SAMPLE_MAX < size) {
                            return Err(Error::Load(format!("short sample {} body", read_samp)));
                        }

                        let mut body = b.slice(ofs, avail)?.to_vec();
                        body.resize(size.max(instruments[read_samp].length as usize), 0);
                        samples[read_samp].store(&body);
                        read_samp += 1;
                    }
                }
                _ => {
                    let used = instruments.iter().filter(|x| x.length != 0).count();
                    let stored = samples.iter().filter(|x| x.has_data()).count();
                    if stored == 0 || stored < used {
                        return Err(Error::Load(format!("unknown chunk {:08x} at {}", id, ofs - 8)));
                    }
                    debug!("ignoring data after the last sample at {}", ofs - 8);
                    break
                }
            }

            ofs = ofs.saturating_add(size);
        }

        let channel_flags = channel_flags.ok_or_else(|| Error::Load("no channel modes".to_owned()))?;
        let song_length = song_length.ok_or_else(|| Error::Load("no song length".to_owned()))?;
        let order = order.ok_or_else(|| Error::Load("no pattern order".to_owned()))?;

        if song_length == 0 || song_length > ORDER_SIZE {
            return Err(Error::Load(format!("bad song length {}", song_length)));
        }

        for (pos, &p) in order[..song_length].iter().enumerate() {
            if p as usize >= patterns.len() {
                return Err(Error::Load(format!("position {} uses missing pattern {}", pos, p)));
            }
        }

        let data = OktData {
            channel_flags,
            instruments,
            speed,
            song_length,
            order,
            patterns,
            samples,
        };

        debug!("{} channels, {} positions, {} patterns, {} samples", data.channels(), song_length,
               data.patterns.len(), data.instruments.len());

        Ok(Module {
            format     : "okt",
            description: "Oktalyzer",
            player     : "okt",
            data       : Box::new(data),
        })
    }
}

fn check_size(name: &str, size: usize, expected: usize) -> Result<(), Error> {
    if size != expected {
        return Err(Error::Load(format!("invalid {} chunk size {}", name, size)));
    }
    Ok(())
}

fn load_sample(b: &[u8], ofs: usize) -> Result<OktSample, Error> {
    let mut ins = OktSample {
        name         : b.read_string(ofs, 20)?,
        length       : b.read32b(ofs + 20)?,
        repeat_start : b.read16b(ofs + 24)? as u32 * 2,
        repeat_length: b.read16b(ofs + 26)? as u32 * 2,
        volume       : b.read8(ofs + 29)?.min(64),
        mode         : b.read16b(ofs + 30)?,
    };

    if ins.repeat_length <= 2 || ins.repeat_start >= ins.length {
        ins.repeat_start = 0;
        ins.repeat_length = 0;
    } else if ins.repeat_start + ins.repeat_length > ins.length {
        ins.repeat_length = ins.length - ins.repeat_start;
    }

    Ok(ins)
}

fn load_pattern(b: &[u8], ofs: usize, channels: usize) -> Result<Pattern, Error> {
    let rows = b.read16b(ofs)? as usize;
    let raw = b.slice(ofs + 2, rows * channels * 4)?;

    let events = raw.chunks(4).map(|x| Event {
        note  : x[0],
        sample: x[1],
        effect: x[2],
        arg   : x[3],
    }).collect();

    Ok(Pattern{ rows, events })
}
