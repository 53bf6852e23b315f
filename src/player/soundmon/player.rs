use std::ops::Range;
use crate::format::bp::*;
use crate::module::{Module, ModuleData};
use crate::player::{Context, Options, PlayerData, FormatPlayer, State};

const START_SPEED    : u8 = 6;
const SCRATCH_SIZE   : usize = 32;
const INFO_SPEED_LINE: usize = 4;

/// SoundMon replayer
///
/// Synth instruments play straight from the wave tables, and the EG, FX
/// and MOD processors rewrite those tables while a note plays. The player
/// works on its own copy of the tables; a voice saves the bytes it is
/// about to change and puts them back when it retriggers.
#[derive(Clone)]
pub struct BpPlayer {
    version  : Version,
    step     : usize,
    pat_count: usize,
    vib_index: usize,
    arp_count: u8,
    count    : u8,
    delay    : u8,
    rep_count: u8,
    new_pos  : usize,
    pos_flag : bool,
    voices   : [Voice; 4],
    waves    : Vec<i8>,
}

impl BpPlayer {
    pub fn new(module: &Module, _options: &Options) -> Self {
        let (version, waves) = match module.data.as_any().downcast_ref::<BpData>() {
            Some(m) => (m.version, m.waves.clone()),
            None    => (Version::SoundMon22, Vec::new()),
        };

        BpPlayer {
            version,
            step     : 0,
            pat_count: 0,
            vib_index: 0,
            arp_count: 1,
            count    : 1,
            delay    : START_SPEED,
            rep_count: 0,
            new_pos  : 0,
            pos_flag : false,
            voices   : Default::default(),
            waves,
        }
    }

    fn do_effects(&mut self, ctx: &mut Context) {
        self.arp_count = self.arp_count.wrapping_sub(1) & 3;
        self.vib_index = (self.vib_index + 1) & 7;

        let arp_count = self.arp_count;
        let vib = VIB_TABLE[self.vib_index] as i32;

        for (chn, v) in self.voices.iter_mut().enumerate() {
            v.period = v.period.wrapping_add(v.auto_slide as i16 as u16);

            if v.vibrato != 0 {
                let period = v.period as i32 + vib / v.vibrato as i32;
                ctx.sink.set_period(chn, period as u16 as u32);
            } else {
                ctx.sink.set_period(chn, v.period as u32);
            }

            if v.arp_value != 0 || v.auto_arp != 0 {
                let mut note = v.note as i8 as i32;
                match arp_count {
                    0 => note += ((v.arp_value >> 4) + (v.auto_arp >> 4)) as i32,
                    1 => note += ((v.arp_value & 0x0f) + (v.auto_arp & 0x0f)) as i32,
                    _ => {},
                }

                v.restart = false;
                v.period = note_period(note);
                ctx.sink.set_period(chn, v.period as u32);
            }
        }
    }

    fn do_synths(&mut self, module: &BpData, ctx: &mut Context) {
        for chn in 0..4 {
            let waves = &mut self.waves;
            let v = &mut self.voices[chn];

            if !v.synth_mode {
                continue
            }

            let ins = match synth_instrument(module, v.instrument) {
                Some(ins) => ins,
                None      => continue,
            };

            v.adsr(chn, ins, waves, ctx);
            v.lfo(chn, ins, waves, ctx);

            if let Some(ofs) = v.synth_offset {
                let range = wave_range(ofs, ins.wave_length, waves.len());
                let before = waves[range.clone()].to_vec();

                v.eg(ofs, ins, waves);
                v.fx(ofs, ins, waves);
                v.modulate(ofs, ins, waves);

                if waves[range.clone()] != before[..] {
                    ctx.sink.update_waveform(chn, &waves[range]);
                }
            }
        }
    }

    fn next_row(&mut self, module: &BpData, data: &mut PlayerData, ctx: &mut Context) {
        let step = match module.steps.get(self.step) {
            Some(&s) => s,
            None     => return,
        };

        for chn in 0..4 {
            let row = module.row(step[chn].track, self.pat_count);
            let v = &mut self.voices[chn];

            if row.note != 0 {
                v.auto_slide = 0;
                v.auto_arp = 0;
                v.vibrato = 0;

                let mut note = row.note;
                if row.optional != OPT_TRANSPOSE || row.data & 0xf0 == 0 {
                    note = note.wrapping_add(step[chn].transpose);
                }

                v.note = note as u8;
                v.period = note_period(note as i32);
                v.restart = false;

                if row.optional < OPT_CHANGE_INVERSION {
                    v.restart = true;
                    v.use_default_volume = true;
                }

                let mut inst = if row.instrument == 0 { v.instrument } else { row.instrument };
                if inst != 0 && (row.optional != OPT_TRANSPOSE || row.data & 0x0f == 0) {
                    let transposed = inst.wrapping_add(step[chn].sound_transpose as u8);
                    if transposed >= 1 && transposed as usize <= NUM_INSTRUMENTS {
                        inst = transposed;
                    }
                }

                if row.optional < OPT_CHANGE_INVERSION && (!v.synth_mode || v.instrument != inst) {
                    v.instrument = inst;
                }
            }

            self.do_optional(chn, row.optional, row.data, data, ctx);
        }

        let len = module.steps.len();

        if self.pos_flag {
            let mut back = self.new_pos <= self.step;
            self.pos_flag = false;
            self.pat_count = 0;
            self.step = self.new_pos;
            if self.step >= len {
                debug!("jump to step {} past the end ({} steps)", self.step, len);
                self.step = 0;
                back = true;
            }
            if back {
                ctx.end_reached_all();
            }
            ctx.mark_visited(self.step);
        } else {
            self.pat_count += 1;
            if self.pat_count == ROWS {
                self.pat_count = 0;
                self.step += 1;
                if self.step >= len {
                    self.step = 0;
                    ctx.end_reached_all();
                }
                ctx.mark_visited(self.step);
            }
        }
    }

    fn do_optional(&mut self, chn: usize, optional: u8, val: u8, data: &mut PlayerData, ctx: &mut Context) {
        let version = self.version;
        let v = &mut self.voices[chn];

        match optional {
            OPT_ARPEGGIO_ONCE => {
                v.arp_value = val;
            }
            OPT_SET_VOLUME => {
                let vol = val.min(64);
                v.volume = vol;
                v.use_default_volume = false;
                if version == Version::SoundMon11 || !v.synth_mode {
                    ctx.sink.set_volume(chn, vol as u32 * 4);
                }
            }
            OPT_SET_SPEED => {
                self.count = val;
                self.delay = val;
                ctx.info_changed(INFO_SPEED_LINE, val.to_string());
            }
            OPT_FILTER => {
                data.filter = val != 0;
                ctx.sink.set_filter(data.filter);
            }
            OPT_PORT_UP => {
                v.period = v.period.wrapping_sub(val as u16);
                v.arp_value = 0;
            }
            OPT_PORT_DOWN => {
                v.period = v.period.wrapping_add(val as u16);
                v.arp_value = 0;
            }
            OPT_VIBRATO => match version {
                Version::SoundMon11 => if self.rep_count == 0 {
                    self.rep_count = val;
                },
                Version::SoundMon22 => v.vibrato = val as i8,
            },
            OPT_JUMP => match version {
                Version::SoundMon11 => if self.rep_count != 0 {
                    self.rep_count -= 1;
                    if self.rep_count != 0 {
                        self.new_pos = val as usize;
                        self.pos_flag = true;
                        if self.rep_count >= 15 {
                            ctx.end_reached_all();
                        }
                    }
                },
                Version::SoundMon22 => {
                    self.new_pos = val as usize;
                    self.pos_flag = true;
                }
            },
            OPT_AUTO_SLIDE => {
                v.auto_slide = val as i8;
            }
            OPT_AUTO_ARPEGGIO => {
                v.auto_arp = val;
                if version == Version::SoundMon22 {
                    v.reset_adsr();
                }
            }
            OPT_CHANGE_FX => {
                v.fx_control = val;
            }
            OPT_CHANGE_INVERSION => {
                v.auto_arp = val;
                v.fx_control ^= 1;
                v.reset_adsr();
            }
            OPT_RESET_ADSR => {
                v.auto_arp = val;
                v.reset_adsr();
            }
            OPT_CHANGE_NOTE => {
                v.auto_arp = val;
            }
            _ => {},    // transpose control is handled with the note
        }
    }

    fn play_it(&mut self, chn: usize, module: &BpData, ctx: &mut Context) {
        let waves = &self.waves;
        let v = &mut self.voices[chn];

        v.restart = false;
        ctx.sink.set_period(chn, v.period as u32);

        let num = match v.instrument.checked_sub(1) {
            Some(n) => n as usize,
            None    => return,
        };

        match module.instruments.get(num) {
            Some(BpInstrument::Synth(ins)) => {
                v.synth_mode = true;
                v.eg_ptr = 0;
                v.lfo_ptr = 0;
                v.adsr_ptr = 0;
                v.mod_ptr = 0;

                v.eg_count = ins.eg_delay.wrapping_add(1);
                v.lfo_count = ins.lfo_delay.wrapping_add(1);
                v.adsr_count = 1;
                v.mod_count = ins.mod_delay.wrapping_add(1);
                v.fx_count = ins.fx_delay.wrapping_add(1);

                v.fx_control = ins.fx_control;
                v.eg_control = ins.eg_control;
                v.lfo_control = ins.lfo_control;
                v.adsr_control = ins.adsr_control;
                v.mod_control = ins.mod_control;
                v.old_eg_value = 0;

                let ofs = ins.wave_table as usize * WAVE_SIZE;
                let range = wave_range(ofs, ins.wave_length, waves.len());
                let len = range.len() as u32;
                ctx.sink.trigger(chn, num, &waves[range], 0, len);
                ctx.sink.set_loop(chn, 0, len);

                if v.adsr_control != 0 {
                    let x = (wave(waves, ins.adsr_table as usize * WAVE_SIZE) as i32 + 128) / 4;
                    if v.use_default_volume {
                        v.volume = ins.volume;
                        v.use_default_volume = false;
                    }
                    ctx.sink.set_volume(chn, (x * v.volume as i32 / 16).min(256) as u32);
                } else {
                    let vol = if v.use_default_volume { ins.volume } else { v.volume };
                    ctx.sink.set_volume(chn, (vol as u32 * 4).min(256));
                }

                if v.eg_control != 0 || v.mod_control != 0 || v.fx_control != 0 {
                    v.synth_offset = Some(ofs);
                    for (i, s) in v.scratch.iter_mut().enumerate() {
                        *s = wave(waves, ofs + i);
                    }
                }
            }
            Some(BpInstrument::Sample(ins)) => {
                v.synth_mode = false;
                v.lfo_control = 0;

                let data = sample_data(module, num);
                if data.is_empty() {
                    ctx.sink.mute(chn);
                    return
                }

                ctx.sink.trigger(chn, num, data, 0, (ins.length as u32).min(data.len() as u32));
                if ins.loop_length > 2 {
                    ctx.sink.set_loop(chn, ins.loop_start as u32, ins.loop_length as u32);
                }

                let vol = if v.use_default_volume { ins.volume } else { v.volume as u16 };
                ctx.sink.set_volume(chn, (vol as u32 * 4).min(256));
            }
            None => {},
        }
    }
}

fn synth_instrument(module: &BpData, instrument: u8) -> Option<&SynthInstrument> {
    match instrument.checked_sub(1).and_then(|i| module.instruments.get(i as usize)) {
        Some(BpInstrument::Synth(ins)) => Some(ins),
        _ => None,
    }
}

fn sample_data(module: &BpData, num: usize) -> &[i8] {
    match module.samples.get(num) {
        Some(smp) => &smp.data,
        None      => &[],
    }
}

fn note_period(note: i32) -> u16 {
    let i = (note + 35).max(0).min(PERIODS.len() as i32 - 1);
    PERIODS[i as usize]
}

fn wave(waves: &[i8], i: usize) -> i8 {
    waves.get(i).cloned().unwrap_or(0)
}

fn set_wave(waves: &mut [i8], i: usize, val: i8) {
    if let Some(w) = waves.get_mut(i) {
        *w = val;
    }
}

fn wave_range(ofs: usize, len: u16, total: usize) -> Range<usize> {
    ofs.min(total)..(ofs + len as usize).min(total)
}


#[derive(Clone, Default)]
struct Voice {
    restart           : bool,
    use_default_volume: bool,
    synth_mode        : bool,
    synth_offset      : Option<usize>,
    scratch           : [i8; SCRATCH_SIZE],
    period            : u16,
    volume            : u8,
    instrument        : u8,
    note              : u8,
    arp_value         : u8,
    auto_arp          : u8,
    auto_slide        : i8,
    vibrato           : i8,
    adsr_control      : u8,
    adsr_count        : u8,
    adsr_ptr          : u16,
    lfo_control       : u8,
    lfo_count         : u8,
    lfo_ptr           : u16,
    eg_control        : u8,
    eg_count          : u8,
    eg_ptr            : u16,
    old_eg_value      : u8,
    fx_control        : u8,
    fx_count          : u8,
    mod_control       : u8,
    mod_count         : u8,
    mod_ptr           : u16,
}

impl Voice {
    fn reset_adsr(&mut self) {
        self.adsr_ptr = 0;
        if self.adsr_control == 0 {
            self.adsr_control = 1;
        }
    }

    fn adsr(&mut self, chn: usize, ins: &SynthInstrument, waves: &[i8], ctx: &mut Context) {
        if self.adsr_control == 0 {
            return
        }

        self.adsr_count = self.adsr_count.wrapping_sub(1);
        if self.adsr_count != 0 {
            return
        }
        self.adsr_count = ins.adsr_speed;

        let x = (wave(waves, ins.adsr_table as usize * WAVE_SIZE + self.adsr_ptr as usize) as i32 + 128) / 4;
        ctx.sink.set_volume(chn, (x * self.volume as i32 / 16).min(256) as u32);

        self.adsr_ptr = self.adsr_ptr.wrapping_add(1);
        if self.adsr_ptr == ins.adsr_length {
            self.adsr_ptr = 0;
            if self.adsr_control == 1 {
                self.adsr_control = 0;
            }
        }
    }

    fn lfo(&mut self, chn: usize, ins: &SynthInstrument, waves: &[i8], ctx: &mut Context) {
        if self.lfo_control == 0 {
            return
        }

        self.lfo_count = self.lfo_count.wrapping_sub(1);
        if self.lfo_count != 0 {
            return
        }
        self.lfo_count = ins.lfo_speed;

        let mut x = wave(waves, ins.lfo_table as usize * WAVE_SIZE + self.lfo_ptr as usize) as i32;
        if ins.lfo_depth != 0 {
            x /= ins.lfo_depth as i32;
        }
        ctx.sink.set_period(chn, (self.period as i32 + x) as u16 as u32);

        self.lfo_ptr = self.lfo_ptr.wrapping_add(1);
        if self.lfo_ptr == ins.lfo_length {
            self.lfo_ptr = 0;
            if self.lfo_control == 1 {
                self.lfo_control = 0;
            }
        }
    }

    // Inverts or restores the leading part of the waveform, the split
    // point follows the EG table.
    fn eg(&mut self, ofs: usize, ins: &SynthInstrument, waves: &mut [i8]) {
        if self.eg_control == 0 {
            return
        }

        self.eg_count = self.eg_count.wrapping_sub(1);
        if self.eg_count != 0 {
            return
        }
        self.eg_count = ins.eg_speed;

        let old = self.old_eg_value as usize;
        let x = wave(waves, ins.eg_table as usize * WAVE_SIZE + self.eg_ptr as usize) as i32;
        self.old_eg_value = ((x + 128) / 8) as u8;
        let new = self.old_eg_value as usize;

        if new < old {
            for i in new..old {
                set_wave(waves, ofs + i, self.scratch[i]);
            }
        } else {
            for i in old..new {
                set_wave(waves, ofs + i, self.scratch[i].wrapping_neg());
            }
        }

        self.eg_ptr = self.eg_ptr.wrapping_add(1);
        if self.eg_ptr == ins.eg_length {
            self.eg_ptr = 0;
            if self.eg_control == 1 {
                self.eg_control = 0;
            }
        }
    }

    fn fx(&mut self, ofs: usize, ins: &SynthInstrument, waves: &mut [i8]) {
        let delta = ins.fx_speed as i8;
        let mut source = [0i8; SCRATCH_SIZE];

        match self.fx_control {
            1 => {
                // averaging waits for the control value to drop to zero
                // instead of the counter, so it never runs
                self.fx_count = self.fx_count.wrapping_sub(1);
                return
            }
            2 => {
                for (i, s) in source.iter_mut().enumerate() {
                    *s = self.scratch[SCRATCH_SIZE - 1 - i];
                }
            }
            3 | 5 => {
                source = self.scratch;
            }
            4 => {
                for (i, s) in source.iter_mut().enumerate() {
                    *s = wave(waves, ofs + WAVE_SIZE + i);
                }
            }
            6 => {
                self.fx_count = self.fx_count.wrapping_sub(1);
                if self.fx_count == 0 {
                    self.fx_control = 0;
                    self.fx_count = 1;
                    for i in 0..SCRATCH_SIZE {
                        let x = wave(waves, ofs + WAVE_SIZE + i);
                        set_wave(waves, ofs + i, x);
                    }
                }
                return
            }
            _ => return,
        }

        // move each byte one step of `delta` towards the source
        for (i, &s) in source.iter().enumerate() {
            if let Some(d) = waves.get_mut(ofs + i) {
                if s < *d {
                    *d = d.wrapping_sub(delta);
                } else if s > *d {
                    *d = d.wrapping_add(delta);
                }
            }
        }
    }

    fn modulate(&mut self, ofs: usize, ins: &SynthInstrument, waves: &mut [i8]) {
        if self.mod_control == 0 {
            return
        }

        self.mod_count = self.mod_count.wrapping_sub(1);
        if self.mod_count != 0 {
            return
        }
        self.mod_count = ins.mod_speed;

        let x = wave(waves, ins.mod_table as usize * WAVE_SIZE + self.mod_ptr as usize);
        set_wave(waves, ofs + SCRATCH_SIZE, x);

        self.mod_ptr = self.mod_ptr.wrapping_add(1);
        if self.mod_ptr == ins.mod_length {
            self.mod_ptr = 0;
            if self.mod_control == 1 {
                self.mod_control = 0;
            }
        }
    }
}

lazy_static! {
    static ref PERIODS: Box<[u16; 84]> = Box::new([
        6848, 6464, 6080, 5760, 5440, 5120, 4832, 4576, 4320, 4064, 3840, 3616,
        3424, 3232, 3040, 2880, 2720, 2560, 2416, 2288, 2160, 2032, 1920, 1808,
        1712, 1616, 1520, 1440, 1360, 1280, 1208, 1144, 1080, 1016,  960,  904,
         856,  808,  760,  720,  680,  640,  604,  572,  540,  508,  480,  452,
         428,  404,  380,  360,  340,  320,  302,  286,  270,  254,  240,  226,
         214,  202,  190,  180,  170,  160,  151,  143,  135,  127,  120,  113,
         107,  101,   95,   90,   85,   80,   76,   72,   68,   64,   60,   57
    ]);

    static ref VIB_TABLE: Box<[i16; 8]> = Box::new([
        0, 64, 128, 64, 0, -64, -128, -64
    ]);
}


impl FormatPlayer for BpPlayer {
    fn start(&mut self, data: &mut PlayerData, mdata: &dyn ModuleData, ctx: &mut Context) {

        let module = try_option!(mdata.as_any().downcast_ref::<BpData>());

        self.version   = module.version;
        self.waves     = module.waves.clone();
        self.voices    = Default::default();
        self.arp_count = 1;
        self.count     = 1;
        self.delay     = START_SPEED;
        self.rep_count = 0;
        self.vib_index = 0;
        self.step      = if data.pos < module.steps.len() { data.pos } else { 0 };
        self.pat_count = 0;
        self.new_pos   = 0;
        self.pos_flag  = false;

        ctx.mark_visited(self.step);

        data.pos   = self.step;
        data.row   = 0;
        data.speed = self.delay as usize;
        data.tempo = 125;

        for chn in 0..4 {
            ctx.sink.set_panning(chn, if chn == 0 || chn == 3 { 0 } else { 256 });
        }

        ctx.info_changed(INFO_SPEED_LINE, self.delay.to_string());
    }

    fn play(&mut self, data: &mut PlayerData, mdata: &dyn ModuleData, ctx: &mut Context) {

        let module = try_option!(mdata.as_any().downcast_ref::<BpData>());

        self.do_effects(ctx);
        self.do_synths(module, ctx);

        self.count = self.count.wrapping_sub(1);
        if self.count == 0 {
            self.count = self.delay;
            self.next_row(module, data, ctx);

            for chn in 0..4 {
                if !self.voices[chn].restart {
                    continue
                }

                let waves = &mut self.waves;
                let v = &mut self.voices[chn];
                if let Some(ofs) = v.synth_offset.take() {
                    for (i, &s) in v.scratch.iter().enumerate() {
                        set_wave(waves, ofs + i, s);
                    }
                }

                self.play_it(chn, module, ctx);
            }
        }

        data.pos   = self.step;
        data.row   = self.pat_count;
        data.speed = self.delay as usize;
    }

    fn info(&self, mdata: &dyn ModuleData) -> Vec<(&'static str, String)> {
        let module = match mdata.as_any().downcast_ref::<BpData>() {
            Some(m) => m,
            None    => return Vec::new(),
        };

        vec![
            ("Song length",      module.steps.len().to_string()),
            ("Used tracks",      module.tracks.len().to_string()),
            ("Used samples",     NUM_INSTRUMENTS.to_string()),
            ("Used wave tables", module.num_waves().to_string()),
            ("Current speed",    self.delay.to_string()),
        ]
    }

    fn save_state(&self) -> State {
        State::new(self)
    }

    fn restore_state(&mut self, state: &State) {
        if let Some(saved) = state.get::<Self>() {
            *self = saved.clone();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Sample;
    use crate::player::{scan, EventLog, NullNotifier, Player, SinkEvent, Tracker};
    use crate::player::soundmon::SoundMon;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg32;

    fn row(note: i8, instrument: u8, optional: u8, data: u8) -> Row {
        Row { note, instrument, optional, data }
    }

    fn track(rows: &[(usize, Row)]) -> [Row; ROWS] {
        let mut t = [Row::default(); ROWS];
        for &(i, r) in rows {
            t[i] = r;
        }
        t
    }

    fn sample(volume: u16) -> BpInstrument {
        BpInstrument::Sample(SampleInstrument {
            name: "smp".to_owned(),
            length: 32,
            volume,
            ..Default::default()
        })
    }

    fn synth() -> SynthInstrument {
        SynthInstrument {
            wave_length: 32,
            fx_speed   : 1,
            mod_speed  : 1,
            volume     : 64,
            ..Default::default()
        }
    }

    // Wave 0 is a flat 10, wave 1 starts with `table`.
    fn waves(table: &[i8]) -> Vec<i8> {
        let mut w = vec![10; WAVE_SIZE];
        w.extend(table);
        w.resize(2 * WAVE_SIZE, 0);
        w
    }

    // Channel 0 plays the listed tracks, the others stay on empty tracks.
    fn build_module(version: Version, steps: &[u16], tracks: Vec<[Row; ROWS]>,
                    mut instruments: Vec<BpInstrument>, waves: Vec<i8>) -> Module {
        instruments.resize(NUM_INSTRUMENTS, BpInstrument::Sample(SampleInstrument::default()));

        let samples = instruments.iter().enumerate().map(|(i, ins)| {
            let mut smp = Sample::new();
            smp.num = i;
            if let BpInstrument::Sample(s) = ins {
                smp.data = vec![16; s.length as usize];
                smp.size = s.length as u32;
            }
            smp
        }).collect();

        let data = BpData {
            title: "".to_owned(),
            version,
            steps: steps.iter().map(|&t| {
                let mut s = [Step::default(); 4];
                s[0].track = t;
                s
            }).collect(),
            tracks,
            instruments,
            waves,
            samples,
        };

        Module {
            format     : "bp",
            description: "SoundMon",
            player     : "bp",
            data       : Box::new(data),
        }
    }

    fn note_module(version: Version, ins: BpInstrument, waves: Vec<i8>) -> Module {
        build_module(version, &[1], vec![track(&[(0, row(13, 1, 0, 0)), (4, row(13, 0, 0, 0))])],
                     vec![ins], waves)
    }

    struct Run {
        player : BpPlayer,
        data   : PlayerData,
        tracker: Tracker,
        log    : EventLog,
    }

    impl Run {
        fn new(module: &Module) -> Self {
            let mut run = Run {
                player : BpPlayer::new(module, &Options::default()),
                data   : PlayerData::new(),
                tracker: Tracker::new(4, true),
                log    : EventLog::new(),
            };
            {
                let mut notifier = NullNotifier;
                let mut ctx = Context::new(&mut run.log, &mut notifier, &mut run.tracker);
                run.player.start(&mut run.data, &*module.data, &mut ctx);
            }
            run.log.take();
            run
        }

        fn tick(&mut self, module: &Module) -> Vec<SinkEvent> {
            let mut notifier = NullNotifier;
            {
                let mut ctx = Context::new(&mut self.log, &mut notifier, &mut self.tracker);
                self.player.play(&mut self.data, &*module.data, &mut ctx);
            }
            self.log.take().into_iter().filter(|e| e.channel() == Some(0)).collect()
        }

        // effective period of each tick
        fn periods(&mut self, module: &Module, ticks: usize) -> Vec<u32> {
            (0..ticks).filter_map(|_| {
                self.tick(module).iter().rev().filter_map(|e| match e {
                    SinkEvent::Period { period, .. } => Some(*period),
                    _ => None,
                }).next()
            }).collect()
        }
    }

    fn volumes(ev: &[SinkEvent]) -> Vec<u32> {
        ev.iter().filter_map(|e| match e {
            SinkEvent::Volume { volume, .. } => Some(*volume),
            _ => None,
        }).collect()
    }

    fn waveforms(ev: &[SinkEvent]) -> Vec<Vec<i8>> {
        ev.iter().filter_map(|e| match e {
            SinkEvent::Waveform { data, .. } => Some(data.clone()),
            _ => None,
        }).collect()
    }

    #[test]
    fn test_sample_note() {
        let m = note_module(Version::SoundMon22, sample(40), vec![]);
        let mut run = Run::new(&m);

        let ev = run.tick(&m);
        assert_eq!(ev, vec![
            SinkEvent::Period { chn: 0, period: 0 },
            SinkEvent::Period { chn: 0, period: 428 },
            SinkEvent::Trigger { chn: 0, sample: 0, offset: 0, length: 32, data: vec![16; 32] },
            SinkEvent::Volume { chn: 0, volume: 160 },
        ]);

        assert_eq!(run.tick(&m), vec![SinkEvent::Period { chn: 0, period: 428 }]);
    }

    #[test]
    fn test_song_duration() {
        let m = build_module(Version::SoundMon22, &[1, 1], vec![track(&[(0, row(13, 1, 0, 0))])],
                             vec![sample(64)], vec![]);
        let durations = scan::scan(&SoundMon, &m, &Options::default());
        assert_eq!(durations.len(), 1);

        // the end shows on the last row, before its ticks are played
        let d = &durations[0];
        assert_eq!(d.ticks, 186);
        assert!(d.looped);
        assert_eq!(d.position_ticks(1), Some(90));
    }

    #[test]
    fn test_hidden_song() {
        let m = build_module(Version::SoundMon22, &[1, 2, 2], vec![
            track(&[(0, row(13, 1, 0, 0)), (15, row(0, 0, OPT_JUMP, 0))]),
            track(&[(0, row(25, 1, 0, 0))]),
        ], vec![sample(64)], vec![]);

        let durations = scan::scan(&SoundMon, &m, &Options::default());
        assert_eq!(durations.len(), 2);
        assert_eq!(durations[0].ticks, 90);
        assert!(durations[0].looped);
        assert_eq!(durations[1].start_position, 1);
        assert_eq!(durations[1].ticks, 186);

        let mut player = Player::find(&m, "", "").unwrap();
        player.start();
        assert_eq!(player.songs(), 2);
        player.set_song(1).unwrap();
        assert_eq!(player.position(), 1);
        assert!(player.set_song(2).is_err());
    }

    #[test]
    fn test_arpeggio() {
        let m = build_module(Version::SoundMon22, &[1], vec![track(&[(0, row(13, 1, OPT_ARPEGGIO_ONCE, 0x37))])],
                             vec![sample(64)], vec![]);
        let mut run = Run::new(&m);
        run.tick(&m);

        assert_eq!(run.periods(&m, 5), vec![428, 428, 286, 360, 428]);
    }

    #[test]
    fn test_auto_slide() {
        let m = build_module(Version::SoundMon22, &[1], vec![track(&[(0, row(13, 1, OPT_AUTO_SLIDE, 0xfe))])],
                             vec![sample(64)], vec![]);
        let mut run = Run::new(&m);
        assert_eq!(run.periods(&m, 5), vec![428, 426, 424, 422, 420]);
    }

    #[test]
    fn test_adsr_envelope() {
        let ins = SynthInstrument {
            adsr_control: 1,
            adsr_table  : 1,
            adsr_length : 4,
            adsr_speed  : 1,
            ..synth()
        };
        let m = note_module(Version::SoundMon22, BpInstrument::Synth(ins), waves(&[127, 63, -1, -128]));
        let mut run = Run::new(&m);

        let ev = run.tick(&m);
        assert!(ev.contains(&SinkEvent::Trigger { chn: 0, sample: 0, offset: 0, length: 32, data: vec![10; 32] }));
        assert!(ev.contains(&SinkEvent::Loop { chn: 0, start: 0, length: 32 }));
        assert_eq!(volumes(&ev), vec![252]);

        let mut list = Vec::new();
        for _ in 0..5 {
            list.extend(volumes(&run.tick(&m)));
        }
        // played once, then it stays
        assert_eq!(list, vec![252, 188, 124, 0]);
    }

    #[test]
    fn test_set_volume_versions() {
        for (version, expected) in vec![(Version::SoundMon11, vec![128u32]), (Version::SoundMon22, vec![])] {
            let m = build_module(version, &[1], vec![track(&[
                (0, row(13, 1, 0, 0)),
                (1, row(0, 0, OPT_SET_VOLUME, 32)),
            ])], vec![BpInstrument::Synth(synth())], waves(&[]));
            let mut run = Run::new(&m);

            assert_eq!(volumes(&run.tick(&m)), vec![256]);
            for _ in 0..5 {
                run.tick(&m);
            }
            assert_eq!(volumes(&run.tick(&m)), expected);
        }
    }

    #[test]
    fn test_eg_rewrites_session_copy() {
        let ins = SynthInstrument {
            eg_control: 2,
            eg_table  : 1,
            eg_length : 1,
            eg_speed  : 1,
            ..synth()
        };
        let m = note_module(Version::SoundMon22, BpInstrument::Synth(ins), waves(&[-96]));
        let mut run = Run::new(&m);
        run.tick(&m);

        let wf = waveforms(&run.tick(&m));
        assert_eq!(wf.len(), 1);
        assert_eq!(wf[0].len(), 32);
        assert_eq!(&wf[0][..5], &[-10, -10, -10, -10, 10]);
        assert_eq!(run.player.waves[0], -10);

        let data = m.data.as_any().downcast_ref::<BpData>().unwrap();
        assert_eq!(data.waves[0], 10);

        // split point doesn't move
        assert!(waveforms(&run.tick(&m)).is_empty());
    }

    #[test]
    fn test_retrigger_restores_wavetable() {
        let ins = SynthInstrument {
            eg_control: 2,
            eg_table  : 1,
            eg_length : 1,
            eg_speed  : 1,
            ..synth()
        };
        let m = note_module(Version::SoundMon22, BpInstrument::Synth(ins), waves(&[-96]));
        let mut run = Run::new(&m);

        for _ in 0..24 {
            run.tick(&m);
        }
        assert_eq!(run.player.waves[0], -10);

        // row 4 retriggers the same instrument
        let ev = run.tick(&m);
        match ev.iter().find(|e| match e { SinkEvent::Trigger { .. } => true, _ => false }) {
            Some(SinkEvent::Trigger { data, .. }) => assert_eq!(data, &vec![10; 32]),
            _ => panic!("no retrigger"),
        }

        let wf = waveforms(&run.tick(&m));
        assert_eq!(wf.len(), 1);
        assert_eq!(wf[0][0], -10);
    }

    #[test]
    fn test_averaging_never_runs() {
        let ins = SynthInstrument {
            fx_control: 1,
            ..synth()
        };
        let m = note_module(Version::SoundMon22, BpInstrument::Synth(ins), waves(&[1, 2, 3]));
        let mut run = Run::new(&m);

        for _ in 0..10 {
            assert!(waveforms(&run.tick(&m)).is_empty());
        }
        assert_eq!(run.player.voices[0].synth_offset, Some(0));
        assert_ne!(run.player.voices[0].fx_count, 1);
        assert!(run.player.waves[..WAVE_SIZE].iter().all(|&x| x == 10));
    }

    #[test]
    fn test_transform_towards_next_wave() {
        let ins = SynthInstrument {
            fx_control: 4,
            fx_speed  : 4,
            ..synth()
        };
        let m = note_module(Version::SoundMon22, BpInstrument::Synth(ins), waves(&[20, 10, 0]));
        let mut run = Run::new(&m);
        run.tick(&m);

        let wf = waveforms(&run.tick(&m));
        assert_eq!(wf.len(), 1);
        assert_eq!(&wf[0][..3], &[14, 10, 6]);
    }

    #[test]
    fn test_repeat_count() {
        let tracks = || vec![
            track(&[(0, row(13, 1, OPT_VIBRATO, 3)), (15, row(0, 0, OPT_JUMP, 0))]),
            track(&[(0, row(25, 1, 0, 0))]),
        ];

        // three passes over step 0 in 1.1
        let m = build_module(Version::SoundMon11, &[1, 2], tracks(), vec![sample(64)], vec![]);
        let mut player = Player::find(&m, "", "").unwrap();
        player.start();
        for _ in 0..282 {
            player.play_frame();
        }
        assert_eq!(player.position(), 0);
        assert_eq!(player.loop_count(), 2);
        player.play_frame();
        assert_eq!(player.position(), 1);

        // 2.2 reads the same commands as vibrato and a plain jump
        let m = build_module(Version::SoundMon22, &[1, 2], tracks(), vec![sample(64)], vec![]);
        let mut player = Player::find(&m, "", "").unwrap();
        player.start();
        for _ in 0..283 {
            player.play_frame();
        }
        assert_eq!(player.position(), 0);
    }

    #[test]
    fn test_snapshot_restore() {
        let ins = SynthInstrument {
            eg_control  : 2,
            eg_table    : 1,
            eg_length   : 3,
            eg_speed    : 1,
            adsr_control: 2,
            adsr_table  : 1,
            adsr_length : 3,
            adsr_speed  : 2,
            ..synth()
        };
        let m = build_module(Version::SoundMon22, &[1, 2], vec![
            track(&[(0, row(13, 1, 0, 0)), (5, row(20, 0, OPT_AUTO_ARPEGGIO, 0x47))]),
            track(&[(0, row(15, 2, OPT_SET_SPEED, 3)), (8, row(13, 1, 0, 0))]),
        ], vec![BpInstrument::Synth(ins), sample(50)], waves(&[-96, 0, 64]));

        let mut player = Player::find(&m, "", "").unwrap();
        player.start();
        for _ in 0..9 {
            player.play_frame();
        }

        let state = player.save_state();
        let data = player.data.clone();

        let mut first = EventLog::new();
        for _ in 0..120 {
            player.play_frame_into(&mut first);
        }

        player.restore_state(&state);
        player.data = data;

        let mut second = EventLog::new();
        for _ in 0..120 {
            player.play_frame_into(&mut second);
        }

        assert!(!first.is_empty());
        assert_eq!(first.events, second.events);
    }

    #[test]
    fn test_module_info() {
        let m = build_module(Version::SoundMon22, &[1], vec![track(&[(0, row(13, 1, OPT_SET_SPEED, 4))])],
                             vec![sample(64)], waves(&[]));
        let mut run = Run::new(&m);

        let info = run.player.info(&*m.data);
        let values: Vec<&str> = info.iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(values, vec!["1", "1", "15", "2", "6"]);

        run.tick(&m);
        assert_eq!(run.player.info(&*m.data)[4].1, "4");
    }

    #[test]
    fn test_random_tracks_terminate() {
        let mut rng = Pcg32::seed_from_u64(0xb9);

        for n in 0..8 {
            let version = if n & 1 == 0 { Version::SoundMon11 } else { Version::SoundMon22 };

            let tracks: Vec<[Row; ROWS]> = (0..4).map(|_| {
                let mut t = [Row::default(); ROWS];
                for r in t.iter_mut() {
                    *r = row(rng.gen(), rng.gen_range(0..16), rng.gen_range(0..16), rng.gen());
                }
                t
            }).collect();

            let steps: Vec<u16> = (0..rng.gen_range(1..6)).map(|_| rng.gen_range(0..6)).collect();

            let instruments: Vec<BpInstrument> = (0..NUM_INSTRUMENTS).map(|_| {
                if rng.gen() {
                    sample(rng.gen_range(0..80))
                } else {
                    BpInstrument::Synth(SynthInstrument {
                        wave_table  : rng.gen_range(0..6),
                        wave_length : rng.gen_range(0..300),
                        adsr_control: rng.gen_range(0..3),
                        adsr_table  : rng.gen(),
                        adsr_length : rng.gen_range(0..100),
                        adsr_speed  : rng.gen(),
                        lfo_control : rng.gen_range(0..3),
                        lfo_table   : rng.gen(),
                        lfo_depth   : rng.gen(),
                        lfo_length  : rng.gen_range(0..100),
                        eg_control  : rng.gen_range(0..3),
                        eg_table    : rng.gen_range(0..6),
                        eg_length   : rng.gen_range(0..100),
                        fx_control  : rng.gen_range(0..8),
                        fx_speed    : rng.gen(),
                        mod_control : rng.gen_range(0..3),
                        mod_table   : rng.gen(),
                        mod_length  : rng.gen_range(0..100),
                        ..synth()
                    })
                }
            }).collect();

            let waves: Vec<i8> = (0..rng.gen_range(0..4) * WAVE_SIZE).map(|_| rng.gen()).collect();

            let m = build_module(version, &steps, tracks, instruments, waves);
            for d in scan::scan(&SoundMon, &m, &Options::default()) {
                assert!(d.ticks <= scan::MAX_SCAN_TICKS);
            }
        }
    }
}
