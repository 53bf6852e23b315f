use crate::format::fred::*;
use crate::module::{Module, ModuleData};
use crate::player::{Context, Options, PlayerData, FormatPlayer, State};

const TRACK_END  : u8 = 0x80;
const TRACK_PORT : u8 = 0x81;
const TRACK_TEMPO: u8 = 0x82;
const TRACK_INST : u8 = 0x83;
const TRACK_PAUSE: u8 = 0x84;
const TRACK_MAX  : u8 = 0xa0;

const SYNTH_SIZE: usize = 64;

// track switches a channel may do in one tick before we give up on it
const MAX_LINE_RETRIES: usize = 256;

const INFO_SPEED_LINE: usize = 2;

const VIB_DIRECTION   : u8 = 0x01;
const PERIOD_DIRECTION: u8 = 0x02;

/// Fred Editor replayer
///
/// Each channel walks its own position list and reports its own end, so
/// the song ends when the longest channel wraps. Visited positions are
/// only tracked for channel 0.
#[derive(Clone)]
pub struct FredPlayer {
    song    : usize,
    tempo   : u8,
    channels: [ChannelData; 4],
}

enum Line {
    Effects,  // run the sound modifiers
    Next,     // go to the next channel
    Again,    // new track, read the same channel again
}

impl FredPlayer {
    pub fn new(_module: &Module, _options: &Options) -> Self {
        FredPlayer {
            song    : 0,
            tempo   : 6,
            channels: [ChannelData::new(), ChannelData::new(), ChannelData::new(), ChannelData::new()],
        }
    }

    fn track_byte(module: &FredData, track: usize, pos: usize) -> u8 {
        module.tracks.get(track).and_then(|t| t.get(pos)).cloned().unwrap_or(TRACK_END)
    }

    fn position_entry(module: &FredData, song: usize, chn: usize, pos: usize) -> i8 {
        module.positions.get(song).and_then(|p| p[chn].get(pos)).cloned().unwrap_or(-1)
    }

    fn new_line(&mut self, chn: usize, module: &FredData, ctx: &mut Context) -> Line {
        let song = self.song;
        let tempo = &mut self.tempo;
        let ch = &mut self.channels[chn];

        let mut inst_change = false;
        let mut pos = ch.track_pos;

        loop {
            let cmd = Self::track_byte(module, ch.track, pos);
            pos += 1;

            if cmd < 0x80 {
                ch.track_pos = pos;
                ch.play_note(chn, cmd, *tempo, inst_change, module, ctx);
                return Line::Effects
            }

            match cmd {
                TRACK_INST => {
                    let num = Self::track_byte(module, ch.track, pos) as usize;
                    pos += 1;

                    ch.inst = match module.instruments.get(num) {
                        Some(ins) if ins.inst_type != InstrumentType::Unused => {
                            inst_change = true;
                            Some(num)
                        }
                        _ => None,
                    };
                }
                TRACK_TEMPO => {
                    *tempo = Self::track_byte(module, ch.track, pos);
                    pos += 1;
                    ctx.info_changed(INFO_SPEED_LINE, tempo.to_string());
                }
                TRACK_PORT => {
                    let ins_period = match ch.inst.and_then(|i| module.instruments.get(i)) {
                        Some(ins) => ins.period,
                        None      => 428,
                    };

                    let tempo = *tempo as u16;
                    ch.port_speed = (Self::track_byte(module, ch.track, pos) as u16).wrapping_mul(tempo);
                    ch.port_target_note = Self::track_byte(module, ch.track, pos + 1);
                    ch.port_limit = note_period(ch.port_target_note, ins_period);
                    ch.port_start_period = 0;
                    ch.port_delay = (Self::track_byte(module, ch.track, pos + 2) as u16).wrapping_mul(tempo);
                    ch.port_running = true;
                    pos += 3;
                }
                TRACK_PAUSE => {
                    ch.track_duration = *tempo as u16;
                    ch.track_pos = pos;
                    ctx.sink.mute(chn);
                    return Line::Next
                }
                TRACK_END => {
                    if next_position(ch, tempo, song, chn, module, ctx) {
                        return Line::Again
                    }
                    return Line::Next
                }
                _ => {  // note delay
                    ch.track_duration = (-(cmd as i8 as i32) * *tempo as i32) as u16;
                    ch.track_pos = pos;
                    return Line::Effects
                }
            }
        }
    }

    fn format_speed(&self) -> String {
        self.tempo.to_string()
    }
}

// Moves a channel to its next position. Returns false if the channel
// had to be halted.
fn next_position(ch: &mut ChannelData, tempo: &mut u8, song: usize, chn: usize, module: &FredData, ctx: &mut Context) -> bool {
    ch.position += 1;

    for _ in 0..=POSITION_LIST_SIZE {
        let entry = FredPlayer::position_entry(module, song, chn, ch.position);

        if entry == -1 {
            // the song ends, start it over
            ch.position = 0;
            *tempo = module.start_tempo.get(song).cloned().unwrap_or(6);
            ctx.info_changed(INFO_SPEED_LINE, tempo.to_string());
            ctx.end_reached(chn);
            continue
        }

        if entry < 0 {
            let old = ch.position;
            ch.position = (entry & 0x7f) as usize;
            if ch.position < old {
                ctx.end_reached(chn);
            }
            continue
        }

        ch.track = entry as usize;
        ch.track_pos = 0;
        ch.track_duration = 1;

        if chn == 0 {
            ctx.mark_visited(ch.position);
        }
        return true
    }

    warn!("channel {}: position list jumps in circles, channel halted", chn);
    ch.halt(chn, ctx);
    false
}

fn sample_data(module: &FredData, num: usize) -> &[i8] {
    match module.samples.get(num) {
        Some(smp) => &smp.data,
        None      => &[],
    }
}

fn note_period(note: u8, ins_period: u16) -> u16 {
    match PERIOD_TABLE.get(note as usize) {
        Some(&p) => (p * ins_period as u32 / 1024) as u16,
        None     => 0,
    }
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EnvelopeState {
    Attack,
    Decay,
    Sustain,
    Release,
    Done,
}

impl Default for EnvelopeState {
    fn default() -> Self {
        EnvelopeState::Attack
    }
}

#[derive(Clone, Default)]
struct ChannelData {
    position         : usize,
    track            : usize,
    track_pos        : usize,
    track_duration   : u16,
    track_note       : u8,
    track_period     : u16,
    track_volume     : i16,
    inst             : Option<usize>,
    vib_flags        : u8,
    vib_delay        : u8,
    vib_speed        : i8,
    vib_ampl         : i8,
    vib_value        : i8,
    port_running     : bool,
    port_delay       : u16,
    port_limit       : u16,
    port_target_note : u8,
    port_start_period: u16,
    period_diff      : i16,
    port_counter     : u16,
    port_speed       : u16,
    env_state        : EnvelopeState,
    sustain_delay    : u8,
    arp_position     : usize,
    arp_speed        : u8,
    pulse_way        : bool,
    pulse_position   : u8,
    pulse_delay      : u8,
    pulse_speed      : u8,
    pulse_shot       : u8,
    blend_way        : bool,
    blend_position   : u32,
    blend_delay      : u8,
    blend_shot       : u8,
    synth            : Vec<i8>,
    halted           : bool,
}

impl ChannelData {
    fn new() -> Self {
        ChannelData {
            track_duration: 1,
            synth         : vec![0; SYNTH_SIZE],
            ..Default::default()
        }
    }

    fn halt(&mut self, chn: usize, ctx: &mut Context) {
        self.halted = true;
        self.inst = None;
        ctx.sink.mute(chn);
        ctx.stop_reached(chn);
    }

    fn synth_len(ins: &FredInstrument) -> usize {
        (ins.length as usize).min(SYNTH_SIZE)
    }

    fn play_note(&mut self, chn: usize, note: u8, tempo: u8, inst_change: bool, module: &FredData, ctx: &mut Context) {
        let num = match self.inst {
            Some(num) if num < module.instruments.len() => num,
            _ => {
                // no valid instrument, stop all effects
                self.port_running = false;
                self.vib_flags = 0;
                self.track_volume = 0;
                ctx.sink.mute(chn);
                return
            }
        };
        let ins = &module.instruments[num];

        self.track_note = note;
        self.arp_position = 0;
        self.arp_speed = ins.arp_speed;
        self.vib_delay = ins.vib_delay;
        self.vib_speed = ins.vib_speed;
        self.vib_ampl = ins.vib_ampl;
        self.vib_flags = VIB_DIRECTION | PERIOD_DIRECTION;
        self.vib_value = 0;

        if ins.inst_type == InstrumentType::Pulse && (inst_change || ins.sync & PULSE_SYNC != 0) {
            self.create_pulse(ins);
        } else if ins.inst_type == InstrumentType::Blend && (inst_change || ins.sync & BLEND_SYNC != 0) {
            self.create_blend(ins, sample_data(module, num));
        }

        self.track_duration = tempo as u16;

        if ins.inst_type == InstrumentType::Sample {
            let data = sample_data(module, num);
            if !data.is_empty() {
                let len = (ins.length as u32).min(data.len() as u32);
                ctx.sink.trigger(chn, num, data, 0, len);
                if ins.has_loop() {
                    // start and length as the Fred Editor replayer sets them
                    ctx.sink.set_loop(chn, ins.repeat_len as u32, (ins.length as u32).wrapping_sub(ins.repeat_len as u32));
                }
            }
        } else {
            let len = Self::synth_len(ins);
            ctx.sink.trigger(chn, num, &self.synth[..len], 0, len as u32);
            ctx.sink.set_loop(chn, 0, len as u32);
        }

        ctx.sink.set_volume(chn, 0);
        self.track_volume = 0;
        self.env_state = EnvelopeState::Attack;
        self.sustain_delay = ins.sustain_delay;

        self.track_period = note_period(self.track_note, ins.period);
        ctx.sink.set_period(chn, self.track_period as u32);

        if self.port_running && self.port_start_period == 0 {
            self.period_diff = (self.port_limit as i16).wrapping_sub(self.track_period as i16);
            self.port_counter = 1;
            self.port_start_period = self.track_period;
        }
    }

    fn create_pulse(&mut self, ins: &FredInstrument) {
        self.pulse_shot = ins.pulse_shot;
        self.pulse_delay = ins.pulse_delay;
        self.pulse_speed = ins.pulse_speed;
        self.pulse_way = false;
        self.pulse_position = ins.pulse_start;

        let start = ins.pulse_start as usize;
        for i in 0..Self::synth_len(ins) {
            self.synth[i] = if i < start { ins.pulse_rate_min } else { ins.pulse_rate_plus };
        }
    }

    fn create_blend(&mut self, ins: &FredInstrument, data: &[i8]) {
        self.blend_way = false;
        self.blend_position = 1;
        self.blend_shot = ins.blend_shot;
        self.blend_delay = ins.blend_delay;

        for i in 0..32 {
            self.synth[i] = data.get(i).cloned().unwrap_or(0);
        }
    }

    fn modify_sound(&mut self, chn: usize, module: &FredData, ctx: &mut Context) {
        let num = try_option!(self.inst);
        let ins = try_option!(module.instruments.get(num));

        // arpeggio
        let arp = ins.arpeggio.get(self.arp_position).cloned().unwrap_or(0);
        let new_note = self.track_note.wrapping_add(arp as u8);

        self.arp_speed = self.arp_speed.wrapping_sub(1);
        if self.arp_speed == 0 {
            self.arp_speed = ins.arp_speed;
            self.arp_position += 1;
            if self.arp_position >= ins.arp_count as usize {
                self.arp_position = 0;
            }
        }

        self.track_period = note_period(new_note, ins.period);

        // portamento
        if self.port_running {
            if self.port_delay != 0 {
                self.port_delay -= 1;
            } else if self.port_speed == 0 {
                self.track_note = self.port_target_note;
                self.port_running = false;
            } else {
                let delta = self.port_counter as i32 * self.period_diff as i32 / self.port_speed as i32;
                self.track_period = (self.track_period as i32 + delta) as u16;

                self.port_counter += 1;
                if self.port_counter > self.port_speed {
                    self.track_note = self.port_target_note;
                    self.port_running = false;
                }
            }
        }

        // vibrato
        let mut period = self.track_period;

        if self.vib_delay != 0 {
            self.vib_delay -= 1;
        } else if self.vib_flags != 0 {
            if self.vib_flags & VIB_DIRECTION != 0 {
                self.vib_value = self.vib_value.wrapping_add(self.vib_speed);
                if self.vib_value == self.vib_ampl {
                    self.vib_flags &= !VIB_DIRECTION;
                }
            } else {
                self.vib_value = self.vib_value.wrapping_sub(self.vib_speed);
                if self.vib_value == 0 {
                    self.vib_flags |= VIB_DIRECTION;
                }
            }

            if self.vib_value == 0 {
                self.vib_flags ^= PERIOD_DIRECTION;
            }

            let value = self.vib_value as i16 as u16;
            period = if self.vib_flags & PERIOD_DIRECTION != 0 {
                period.wrapping_add(value)
            } else {
                period.wrapping_sub(value)
            };
        }

        ctx.sink.set_period(chn, period as u32);

        self.envelope(ins);
        ctx.sink.set_volume(chn, (ins.env_vol as u32 * self.track_volume as u32 / 256).min(64));

        match ins.inst_type {
            InstrumentType::Pulse => if self.pulse(ins) {
                ctx.sink.update_waveform(chn, &self.synth[..Self::synth_len(ins)]);
            },
            InstrumentType::Blend => if self.blend(ins, sample_data(module, num)) {
                ctx.sink.update_waveform(chn, &self.synth[..Self::synth_len(ins)]);
            },
            _ => {},
        }
    }

    fn envelope(&mut self, ins: &FredInstrument) {
        match self.env_state {
            EnvelopeState::Attack => {
                self.track_volume += ins.attack_speed as i16;
                if self.track_volume >= ins.attack_volume as i16 {
                    self.track_volume = ins.attack_volume as i16;
                    self.env_state = EnvelopeState::Decay;
                }
            }
            EnvelopeState::Decay => {
                self.track_volume -= ins.decay_speed as i16;
                if self.track_volume <= ins.decay_volume as i16 {
                    self.track_volume = ins.decay_volume as i16;
                    self.env_state = EnvelopeState::Sustain;
                }
            }
            EnvelopeState::Sustain => {
                if self.sustain_delay == 0 {
                    self.env_state = EnvelopeState::Release;
                } else {
                    self.sustain_delay -= 1;
                }
            }
            EnvelopeState::Release => {
                self.track_volume -= ins.release_speed as i16;
                if self.track_volume <= ins.release_volume as i16 {
                    self.track_volume = ins.release_volume as i16;
                    self.env_state = EnvelopeState::Done;
                }
            }
            EnvelopeState::Done => {},
        }
    }

    // Returns true if the waveform changed.
    fn pulse(&mut self, ins: &FredInstrument) -> bool {
        if self.pulse_delay != 0 {
            self.pulse_delay -= 1;
            return false
        }

        if self.pulse_speed != 0 {
            self.pulse_speed -= 1;
            return false
        }

        if ins.sync & PULSE_XSHOT != 0 && self.pulse_shot == 0 {
            return false
        }

        self.pulse_speed = ins.pulse_speed;

        // at most one change of direction
        for _ in 0..2 {
            let pos = self.pulse_position as usize;
            if self.pulse_way {
                if self.pulse_position >= ins.pulse_start {
                    if let Some(s) = self.synth.get_mut(pos) {
                        *s = ins.pulse_rate_plus;
                    }
                    self.pulse_position = self.pulse_position.wrapping_sub(1);
                    return true
                }
                self.pulse_way = false;
                self.pulse_shot = self.pulse_shot.wrapping_sub(1);
                self.pulse_position = self.pulse_position.wrapping_add(1);
            } else {
                if self.pulse_position <= ins.pulse_end {
                    if let Some(s) = self.synth.get_mut(pos) {
                        *s = ins.pulse_rate_min;
                    }
                    self.pulse_position = self.pulse_position.wrapping_add(1);
                    return true
                }
                self.pulse_way = true;
                self.pulse_shot = self.pulse_shot.wrapping_sub(1);
                self.pulse_position = self.pulse_position.wrapping_sub(1);
            }
        }

        false
    }

    // Returns true if the waveform changed.
    fn blend(&mut self, ins: &FredInstrument, data: &[i8]) -> bool {
        if self.blend_delay != 0 {
            self.blend_delay -= 1;
            return false
        }

        let shift = (ins.blend as u32).min(31);
        let mut moved = false;

        for _ in 0..3 {
            if ins.sync & BLEND_XSHOT != 0 && self.blend_shot == 0 {
                return false
            }

            if self.blend_way {
                if self.blend_position == 1 {
                    self.blend_way = false;
                    self.blend_shot = self.blend_shot.wrapping_sub(1);
                    continue
                }
                self.blend_position -= 1;
                moved = true;
                break
            }

            if self.blend_position == 1 << shift {
                self.blend_way = true;
                self.blend_shot = self.blend_shot.wrapping_sub(1);
                continue
            }

            self.blend_position += 1;
            moved = true;
            break
        }

        if !moved {
            return false
        }

        let smp = |i: usize| data.get(i).cloned().unwrap_or(0) as i64;
        for i in 0..32 {
            self.synth[i] = (((self.blend_position as i64 * smp(i + 32)) >> shift) + smp(i)) as i8;
        }

        true
    }
}

lazy_static! {
    static ref PERIOD_TABLE: Box<[u32; 72]> = Box::new([
        8192, 7728, 7296, 6888, 6504, 6136, 5792, 5464, 5160, 4872, 4600, 4336,
        4096, 3864, 3648, 3444, 3252, 3068, 2896, 2732, 2580, 2436, 2300, 2168,
        2048, 1932, 1824, 1722, 1626, 1534, 1448, 1366, 1290, 1218, 1150, 1084,
        1024,  966,  912,  861,  813,  767,  724,  683,  645,  609,  575,  542,
         512,  483,  456,  430,  406,  383,  362,  341,  322,  304,  287,  271,
         256,  241,  228,  215,  203,  191,  181,  170,  161,  152,  143,  135
    ]);
}


impl FormatPlayer for FredPlayer {
    fn start(&mut self, data: &mut PlayerData, mdata: &dyn ModuleData, ctx: &mut Context) {

        let module = try_option!(mdata.as_any().downcast_ref::<FredData>());

        self.song = data.song.min(module.start_tempo.len().saturating_sub(1));
        self.tempo = module.start_tempo.get(self.song).cloned().unwrap_or(6);

        for chn in 0..4 {
            let mut ch = ChannelData::new();
            let entry = Self::position_entry(module, self.song, chn, 0);
            ch.track = if entry < 0 { 0 } else { entry as usize };
            self.channels[chn] = ch;
        }

        ctx.mark_visited(0);

        data.song  = self.song;
        data.pos   = 0;
        data.speed = self.tempo as usize;
        data.tempo = 125;

        // fixed Amiga panning
        for chn in 0..4 {
            ctx.sink.set_panning(chn, if chn == 0 || chn == 3 { 0 } else { 256 });
        }

        ctx.info_changed(INFO_SPEED_LINE, self.format_speed());
    }

    fn play(&mut self, data: &mut PlayerData, mdata: &dyn ModuleData, ctx: &mut Context) {

        let module = try_option!(mdata.as_any().downcast_ref::<FredData>());

        let mut chn = 0;
        let mut retries = 0;

        while chn < 4 {
            if self.channels[chn].halted {
                chn += 1;
                continue
            }

            let duration = {
                let ch = &mut self.channels[chn];
                ch.track_duration = ch.track_duration.wrapping_sub(1);
                ch.track_duration
            };

            if duration == 0 {
                match self.new_line(chn, module, ctx) {
                    Line::Effects => {},
                    Line::Next => {
                        chn += 1;
                        retries = 0;
                        continue
                    }
                    Line::Again => {
                        retries += 1;
                        if retries > MAX_LINE_RETRIES {
                            warn!("channel {}: no playable line found, channel halted", chn);
                            self.channels[chn].halt(chn, ctx);
                            chn += 1;
                            retries = 0;
                        }
                        continue
                    }
                }
            } else if duration == 1 {
                // mute before the next line unless it's a delay
                let ch = &self.channels[chn];
                if Self::track_byte(module, ch.track, ch.track_pos) < TRACK_MAX {
                    ctx.sink.mute(chn);
                }
            }

            self.channels[chn].modify_sound(chn, module, ctx);
            chn += 1;
            retries = 0;
        }

        data.pos   = self.channels[0].position;
        data.speed = self.tempo as usize;
    }

    fn info(&self, mdata: &dyn ModuleData) -> Vec<(&'static str, String)> {
        let module = match mdata.as_any().downcast_ref::<FredData>() {
            Some(m) => m,
            None    => return Vec::new(),
        };

        vec![
            ("Song length",      module.song_length(self.song, 0).to_string()),
            ("Used instruments", module.instruments.len().to_string()),
            ("Current speed",    self.format_speed()),
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
    use crate::player::fred::Fred;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg32;

    const REST: usize = 127;

    fn instrument(num: usize, inst_type: InstrumentType) -> FredInstrument {
        FredInstrument {
            num,
            name           : format!("ins{}", num),
            index          : num as u32,
            repeat_len     : 0,
            length         : 32,
            period         : 428,
            vib_delay      : 0,
            vib_speed      : 0,
            vib_ampl       : 0,
            env_vol        : 64,
            attack_speed   : 255,
            attack_volume  : 255,
            decay_speed    : 0,
            decay_volume   : 255,
            sustain_delay  : 255,
            release_speed  : 0,
            release_volume : 0,
            arpeggio       : [0; 16],
            arp_speed      : 1,
            inst_type,
            pulse_rate_min : 0,
            pulse_rate_plus: 0,
            pulse_speed    : 0,
            pulse_start    : 0,
            pulse_end      : 0,
            pulse_delay    : 0,
            sync           : 0,
            blend          : 0,
            blend_delay    : 0,
            pulse_shot     : 0,
            blend_shot     : 0,
            arp_count      : 1,
        }
    }

    // Channels 1 to 3 pause for one line and loop.
    fn build_module(tracks: Vec<Vec<u8>>, ch0: &[i8], instruments: Vec<FredInstrument>) -> Module {
        let mut all = vec![vec![TRACK_END]; NUM_TRACKS];
        for (i, t) in tracks.into_iter().enumerate() {
            all[i] = t;
        }
        all[REST] = vec![TRACK_PAUSE, TRACK_END];

        let samples = instruments.iter().map(|ins| {
            let mut smp = Sample::new();
            smp.num = ins.num;
            if ins.inst_type == InstrumentType::Sample {
                smp.data = vec![32; ins.length as usize];
                smp.size = ins.length as u32;
            }
            smp
        }).collect();

        let rest = vec![REST as i8, -1];
        let data = FredData {
            title      : "".to_owned(),
            start_tempo: vec![6],
            positions  : vec![[ch0.to_vec(), rest.clone(), rest.clone(), rest]],
            tracks     : all,
            instruments,
            samples,
        };

        Module {
            format     : "fred",
            description: "Fred Editor",
            player     : "fred",
            data       : Box::new(data),
        }
    }

    struct Run {
        player : FredPlayer,
        data   : PlayerData,
        tracker: Tracker,
        log    : EventLog,
    }

    impl Run {
        fn new(module: &Module) -> Self {
            let mut run = Run {
                player : FredPlayer::new(module, &Options::default()),
                data   : PlayerData::new(),
                tracker: Tracker::new(4, false),
                log    : EventLog::coalescing(),
            };
            {
                let mut notifier = NullNotifier;
                let mut ctx = Context::new(&mut run.log, &mut notifier, &mut run.tracker);
                run.player.start(&mut run.data, &*module.data, &mut ctx);
            }
            run.log.take();
            run
        }

        fn tick(&mut self, module: &Module) -> (Vec<SinkEvent>, bool) {
            let mut notifier = NullNotifier;
            {
                let mut ctx = Context::new(&mut self.log, &mut notifier, &mut self.tracker);
                self.player.play(&mut self.data, &*module.data, &mut ctx);
            }
            let events = self.log.take().into_iter().filter(|e| e.channel() == Some(0)).collect();
            (events, self.tracker.take_end())
        }

        fn periods(&mut self, module: &Module, ticks: usize) -> Vec<u32> {
            let mut list = Vec::new();
            for _ in 0..ticks {
                for e in self.tick(module).0 {
                    if let SinkEvent::Period { period, .. } = e {
                        list.push(period);
                    }
                }
            }
            list
        }
    }

    fn looped_sample() -> FredInstrument {
        FredInstrument { repeat_len: 8, ..instrument(0, InstrumentType::Sample) }
    }

    #[test]
    fn test_note_and_mute() {
        let m = build_module(vec![vec![0x83, 0, 36, 0xfe, 0x80]], &[0, -1], vec![looped_sample()]);
        let mut run = Run::new(&m);

        let (ev, _) = run.tick(&m);
        assert_eq!(ev.len(), 5);
        match ev[0] {
            SinkEvent::Trigger { sample: 0, offset: 0, length: 32, .. } => (),
            ref e => panic!("unexpected event {}", e),
        }
        // loop start is the repeat length, loop length what's left
        assert_eq!(ev[1], SinkEvent::Loop { chn: 0, start: 8, length: 24 });
        assert_eq!(ev[2], SinkEvent::Volume { chn: 0, volume: 0 });
        assert_eq!(ev[3], SinkEvent::Period { chn: 0, period: 428 });
        assert_eq!(ev[4], SinkEvent::Volume { chn: 0, volume: 63 });

        for tick in 1..17 {
            let (ev, end) = run.tick(&m);
            assert!(ev.is_empty(), "tick {}: {:?}", tick, ev);
            assert!(!end);
        }

        // the line after the delay is not a delay
        let (ev, _) = run.tick(&m);
        assert_eq!(ev[0], SinkEvent::Mute { chn: 0 });

        let (ev, end) = run.tick(&m);
        assert!(end);
        assert!(ev.iter().any(|e| match e { SinkEvent::Trigger { .. } => true, _ => false }));
    }

    #[test]
    fn test_envelope_volume_clamped() {
        let ins = FredInstrument { env_vol: 255, ..looped_sample() };
        let m = build_module(vec![vec![0x83, 0, 36, 0xfe, 0x80]], &[0, -1], vec![ins]);
        let mut run = Run::new(&m);

        let mut list = Vec::new();
        for _ in 0..20 {
            for e in run.tick(&m).0 {
                if let SinkEvent::Volume { volume, .. } = e {
                    list.push(volume);
                }
            }
        }
        assert!(list.contains(&64));
        assert!(list.iter().all(|&v| v <= 64), "{:?}", list);
    }

    #[test]
    fn test_song_duration() {
        let m = build_module(vec![vec![0x83, 0, 36, 0xfe, 0x80]], &[0, -1], vec![looped_sample()]);
        let durations = scan::scan(&Fred, &m, &Options::default());
        assert_eq!(durations.len(), 1);
        assert_eq!(durations[0].ticks, 18);
        assert!(durations[0].looped);
    }

    #[test]
    fn test_jump_back_loop_duration() {
        let m = build_module(vec![
            vec![0x83, 0, 36, 0xfe, 0x80],
            vec![36, 0xff, 0x80],
        ], &[0, 1, -128], vec![looped_sample()]);

        let durations = scan::scan(&Fred, &m, &Options::default());
        let d = &durations[0];
        assert_eq!(d.ticks, 30);
        assert!(d.looped);
        assert_eq!(d.position_ticks(0), Some(0));
        assert_eq!(d.position_ticks(1), Some(18));

        let mut player = Player::find(&m, "", "").unwrap();
        player.start();
        player.set_position(1).unwrap();
        player.play_frame();
        assert_eq!(player.position(), 1);
    }

    #[test]
    fn test_arpeggio() {
        let mut ins = instrument(0, InstrumentType::Sample);
        ins.arpeggio[1] = 12;
        ins.arp_count = 2;
        let m = build_module(vec![vec![0x83, 0, 36, 0xf0, 0x80]], &[0, -1], vec![ins]);
        let mut run = Run::new(&m);
        run.tick(&m);

        assert_eq!(run.periods(&m, 4), vec![214, 428, 214, 428]);
    }

    #[test]
    fn test_portamento() {
        let m = build_module(vec![vec![0x83, 0, 0x81, 1, 48, 0, 36, 0xf0, 0x80]], &[0, -1],
                             vec![instrument(0, InstrumentType::Sample)]);
        let mut run = Run::new(&m);

        assert_eq!(run.periods(&m, 10), vec![428, 393, 357, 321, 286, 250, 214]);
        assert!(!run.player.channels[0].port_running);
        assert_eq!(run.player.channels[0].track_note, 48);
    }

    #[test]
    fn test_invalid_instrument_mutes() {
        let m = build_module(vec![vec![0x83, 9, 36, 0xf0, 0x80]], &[0, -1],
                             vec![instrument(0, InstrumentType::Sample)]);
        let mut run = Run::new(&m);

        let (ev, _) = run.tick(&m);
        assert_eq!(ev, vec![SinkEvent::Mute { chn: 0 }]);
        let (ev, _) = run.tick(&m);
        assert!(ev.is_empty());
    }

    #[test]
    fn test_pulse_waveform() {
        let ins = FredInstrument {
            pulse_start    : 8,
            pulse_end      : 16,
            pulse_rate_min : -64,
            pulse_rate_plus: 64,
            ..instrument(0, InstrumentType::Pulse)
        };
        let m = build_module(vec![vec![0x83, 0, 36, 0xf0, 0x80]], &[0, -1], vec![ins]);
        let mut run = Run::new(&m);

        let (ev, _) = run.tick(&m);
        let mut waveforms = Vec::new();
        for e in &ev {
            match e {
                SinkEvent::Trigger { data, length, .. } => {
                    assert_eq!(*length, 32);
                    assert_eq!((data[7], data[8]), (-64, 64));
                }
                SinkEvent::Waveform { data, .. } => waveforms.push(data.clone()),
                _ => {},
            }
        }
        assert!(ev.contains(&SinkEvent::Loop { chn: 0, start: 0, length: 32 }));
        assert_eq!(waveforms.len(), 1);
        assert_eq!((waveforms[0][8], waveforms[0][9]), (-64, 64));

        let (ev, _) = run.tick(&m);
        match ev.iter().find(|e| match e { SinkEvent::Waveform { .. } => true, _ => false }) {
            Some(SinkEvent::Waveform { data, .. }) => assert_eq!(data[9], -64),
            _ => panic!("no waveform update"),
        }
    }

    #[test]
    fn test_empty_tracks_halt() {
        let m = build_module(vec![], &[0, -1], vec![instrument(0, InstrumentType::Sample)]);
        let mut run = Run::new(&m);
        run.tick(&m);
        assert!(run.player.channels[0].halted);
        assert!(!run.player.channels[1].halted);
    }

    #[test]
    fn test_snapshot_restore() {
        let m = build_module(vec![
            vec![0x83, 0, 36, 0xfe, 0x80],
            vec![0x82, 3, 38, 0xff, 0x80],
        ], &[0, 1, -1], vec![looped_sample()]);

        let mut player = Player::find(&m, "", "").unwrap();
        player.start();
        for _ in 0..5 {
            player.play_frame();
        }

        let state = player.save_state();
        let data = player.data.clone();

        let mut first = EventLog::new();
        for _ in 0..40 {
            player.play_frame_into(&mut first);
        }

        player.restore_state(&state);
        player.data = data;

        let mut second = EventLog::new();
        for _ in 0..40 {
            player.play_frame_into(&mut second);
        }

        assert!(!first.is_empty());
        assert_eq!(first.events, second.events);
    }

    #[test]
    fn test_module_info() {
        let m = build_module(vec![vec![0x83, 0, 0x82, 4, 36, 0xfe, 0x80]], &[0, -1], vec![looped_sample()]);
        let mut run = Run::new(&m);
        run.tick(&m);

        let info = run.player.info(&*m.data);
        let values: Vec<&str> = info.iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(values, vec!["1", "1", "4"]);
    }

    #[test]
    fn test_random_tracks_terminate() {
        let mut rng = Pcg32::seed_from_u64(0xf4ed);

        for _ in 0..8 {
            let tracks: Vec<Vec<u8>> = (0..4).map(|_| {
                let len = rng.gen_range(1..32);
                (0..len).map(|_| rng.gen::<u8>()).collect()
            }).collect();

            let list: Vec<i8> = (0..rng.gen_range(1..6))
                .map(|_| if rng.gen_range(0..6) == 0 { rng.gen::<i8>() } else { rng.gen_range(0..4) })
                .chain(std::iter::once(-1))
                .collect();

            let mut ins = vec![
                instrument(0, InstrumentType::Sample),
                instrument(1, InstrumentType::Pulse),
                instrument(2, InstrumentType::Blend),
            ];
            for x in ins.iter_mut() {
                x.arp_count = rng.gen_range(0..20);
                x.pulse_start = rng.gen();
                x.pulse_end = rng.gen();
                x.blend = rng.gen_range(0..40);
                x.vib_speed = rng.gen();
                x.vib_ampl = rng.gen();
                x.length = rng.gen_range(0..200);
            }

            let m = build_module(tracks, &list, ins);
            for d in scan::scan(&Fred, &m, &Options::default()) {
                assert!(d.ticks <= scan::MAX_SCAN_TICKS);
            }
        }
    }
}
