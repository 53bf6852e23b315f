use crate::format::abk::{AbkData, PositionEntry};
use crate::module::{Module, ModuleData};
use crate::player::{Context, Options, PlayerData, FormatPlayer, State};

const TEMPO_BASE     : u16 = 100;
const START_TEMPO    : u16 = 17;
const MAX_STEP_WORDS : usize = 0x10000;

const INFO_POSITION_LINE: usize = 3;
const INFO_TRACK_LINE   : usize = 4;
const INFO_SPEED_LINE   : usize = 5;

/// AMOS Music Bank replayer
///
/// Sequencer of the AMOS Basic music extension. Each of the four voices
/// walks its own position list and reads 16-bit command words from the
/// tracks; a step is taken whenever an accumulator fed with the current
/// tempo crosses the tempo base (100 on PAL machines, 120 on NTSC).
/// Continuous effects run on the ticks between steps.
#[derive(Clone)]
pub struct AmosPlayer {
    tempo_base: u16,
    song      : usize,
    mu_cpt    : u16,
    mu_tempo  : u16,
    voice     : [ChannelData; 4],
}

impl AmosPlayer {
    pub fn new(_module: &Module, options: &Options) -> Self {
        let tempo_base = match options.option_int("tempo_base") {
            Some(val) if val > 0 && val <= 0xffff => val as u16,
            _ => TEMPO_BASE,
        };

        AmosPlayer {
            tempo_base,
            song    : 0,
            mu_cpt  : tempo_base,
            mu_tempo: START_TEMPO,
            voice   : [ChannelData::new(); 4],
        }
    }

    fn word(module: &AbkData, adr: Option<usize>, ofs: usize) -> u16 {
        match adr {
            Some(trk) => module.track_word(trk, ofs).unwrap_or(0x8000),
            None      => EMPTY_TRACK.get(ofs).cloned().unwrap_or(0x8000),
        }
    }

    fn position_list<'a>(&self, module: &'a AbkData, chn: usize) -> &'a [PositionEntry] {
        match module.songs.get(self.song) {
            Some(song) => &song.positions[chn],
            None       => &[],
        }
    }

    fn mu_play(&mut self, module: &AbkData, ctx: &mut Context) {
        // a counter which gives progressive results from zero to the tempo base
        self.mu_cpt = self.mu_cpt.wrapping_add(self.mu_tempo);

        if self.mu_cpt >= self.tempo_base {
            self.mu_cpt -= self.tempo_base;

            // one step of music
            for chn in 0..4 {
                if self.voice[chn].voi_cpt != 0 {
                    self.voice[chn].voi_cpt -= 1;
                    if self.voice[chn].voi_cpt == 0 {
                        self.mu_step(chn, module, ctx);
                    }
                }
            }
        } else {
            self.do_effects(ctx);
        }
    }

    fn mu_step(&mut self, chn: usize, module: &AbkData, ctx: &mut Context) {
        let mut adr = self.voice[chn].voi_adr_index;

        for _ in 0..MAX_STEP_WORDS {
            let val = Self::word(module, self.voice[chn].voi_adr, adr);
            adr += 1;
            let arg = val & 0xff;

            if val & 0x8000 != 0 {
                match val & 0x7f00 {
                    0x0000 => {  // fin pattern
                        if !self.fin_pattern(chn, &mut adr, module, ctx) {
                            self.voice[chn].voi_adr_index = adr;
                            return
                        }
                    }
                    0x0100 | 0x0200 => {},  // old slide up / down
                    0x0300 => {             // set volume
                        let v = &mut self.voice[chn];
                        let vol = if arg >= 64 { 63 } else { arg };
                        v.voi_dvol = vol;
                        v.voi_vol  = vol;
                    }
                    0x0400 => self.voice[chn].voi_effect = Effect::None,
                    0x0500 => {             // repeat
                        let v = &mut self.voice[chn];
                        if arg == 0 {
                            v.voi_deb = Some(adr);
                        } else if v.voi_rep == 0 {
                            v.voi_rep = arg;
                        } else {
                            v.voi_rep -= 1;
                            if v.voi_rep != 0 {
                                if let Some(deb) = v.voi_deb {
                                    adr = deb;
                                }
                            }
                        }
                    }
                    0x0600 => ctx.sink.set_filter(true),   // led on
                    0x0700 => ctx.sink.set_filter(false),  // led off
                    0x0800 => {             // set tempo
                        self.mu_tempo = arg;
                        ctx.info_changed(INFO_SPEED_LINE, self.mu_tempo.to_string());
                    }
                    0x0900 => {             // set instrument
                        if let Some(smp) = module.samples.get(arg as usize) {
                            let v = &mut self.voice[chn];
                            let vol = if smp.volume >= 64 { 63 } else { smp.volume as u16 };
                            v.voi_inst = Some(arg as usize);
                            v.voi_dvol = vol;
                            v.voi_vol  = vol;
                        }
                    }
                    0x0a00 => {
                        let v = &mut self.voice[chn];
                        v.voi_value  = arg as i16;
                        v.voi_effect = Effect::Arpeggio;
                    }
                    0x0b00 => {
                        let v = &mut self.voice[chn];
                        v.voi_ptone  = true;
                        v.voi_value  = arg as i16;
                        v.voi_effect = Effect::Portamento;
                    }
                    0x0c00 => {
                        let v = &mut self.voice[chn];
                        v.voi_value  = arg as i16;
                        v.voi_effect = Effect::Vibrato;
                    }
                    0x0d00 => {             // volume slide
                        let v = &mut self.voice[chn];
                        let mut value = (arg >> 4) as i16;
                        if value == 0 {
                            value = -((arg & 0x0f) as i16);
                        }
                        v.voi_value  = value;
                        v.voi_effect = Effect::VolumeSlide;
                    }
                    0x0e00 => {             // slide up
                        let v = &mut self.voice[chn];
                        v.voi_value  = -(arg as i16);
                        v.voi_effect = Effect::Slide;
                    }
                    0x0f00 => {             // slide down
                        let v = &mut self.voice[chn];
                        v.voi_value  = arg as i16;
                        v.voi_effect = Effect::Slide;
                    }
                    0x1000 => {             // delay
                        let v = &mut self.voice[chn];
                        v.voi_cpt = arg;
                        v.voi_adr_index = adr;
                        return
                    }
                    0x1100 => {             // position jump
                        self.position_jump(chn, arg, &mut adr, module, ctx);
                        self.voice[chn].voi_adr_index = adr;
                        return
                    }
                    _ => {},
                }
            } else {
                let inst = self.voice[chn].voi_inst.and_then(|i| module.samples.get(i).map(|s| (i, s)));

                if val & 0x4000 != 0 {
                    // note compatible with the first version
                    self.voice[chn].voi_cpt = arg;

                    let note = Self::word(module, self.voice[chn].voi_adr, adr);
                    adr += 1;
                    if note != 0 {
                        let note = note & 0x0fff;
                        self.voice[chn].voi_note = note;
                        ctx.sink.set_period(chn, note as u32);

                        if let Some((num, smp)) = inst {
                            ctx.sink.trigger(chn, num, &smp.data, 0, smp.size);
                            if smp.has_loop() {
                                ctx.sink.set_loop(chn, smp.loop_start, smp.loop_length);
                            }
                        }
                    }

                    self.voice[chn].voi_adr_index = adr;
                    return
                }

                // normal note
                let note = val & 0x0fff;

                if let Some((num, smp)) = inst {
                    ctx.sink.trigger(chn, num, &smp.data, 0, smp.size);
                    if smp.has_loop() {
                        ctx.sink.set_loop(chn, smp.loop_start, smp.loop_length);
                    }
                }

                // extra volume write, melodian.abk needs it
                ctx.sink.set_volume(chn, self.voice[chn].voi_vol as u32);

                let v = &mut self.voice[chn];
                if v.voi_ptone {
                    v.voi_ptone  = false;
                    v.voi_ptoto  = note;
                    v.voi_effect = Effect::Portamento;
                } else {
                    v.voi_note = note;
                    ctx.sink.set_period(chn, note as u32);
                }
            }
        }

        // track data that never reaches a delay or a note
        warn!("channel {}: runaway step at track offset {}, voice halted", chn, adr);
        let v = &mut self.voice[chn];
        v.voi_cpt = 0;
        v.voi_adr_index = adr;
        ctx.stop_reached(chn);
    }

    // Returns false if the voice must stop reading its track.
    fn fin_pattern(&mut self, chn: usize, adr: &mut usize, module: &AbkData, ctx: &mut Context) -> bool {
        {
            let v = &mut self.voice[chn];
            v.voi_cpt    = 0;
            v.voi_rep    = 0;
            v.voi_deb    = None;
            v.voi_effect = Effect::None;
        }

        let list = self.position_list(module, chn);
        let mut voi_pat = self.voice[chn].voi_pat_index;

        // a list made only of loop markers must not spin forever
        for _ in 0..2 {
            loop {
                let entry = list.get(voi_pat).cloned().unwrap_or(PositionEntry::Stop);
                voi_pat += 1;

                match entry {
                    PositionEntry::Invalid => {
                        // the voice goes quiet without reporting an end, as the AMOS replayer does
                        debug!("channel {}: invalid pattern at position {}", chn, voi_pat - 1);
                        self.voice[chn].voi_pat_index = voi_pat;
                        self.show_positions(module, ctx);
                        return false
                    }
                    PositionEntry::Stop => {
                        ctx.stop_reached(chn);
                        return false
                    }
                    PositionEntry::Loop => {
                        ctx.end_reached(chn);
                        voi_pat = self.voice[chn].voi_pat_d_index;
                        break
                    }
                    PositionEntry::Track(trk) => {
                        let v = &mut self.voice[chn];
                        v.voi_pat_index = voi_pat;
                        v.voi_adr = Some(trk);
                        *adr = 0;

                        if chn == 0 {
                            ctx.mark_visited(voi_pat - 1);
                        }

                        self.show_positions(module, ctx);
                        return true
                    }
                }
            }
        }

        warn!("channel {}: position list has no tracks", chn);
        false
    }

    fn position_jump(&mut self, chn: usize, arg: u16, adr: &mut usize, module: &AbkData, ctx: &mut Context) {
        let new_pos = self.voice[chn].voi_pat_d_index + arg as usize;
        if new_pos < self.voice[chn].voi_pat_index {
            ctx.end_reached(chn);
        }

        self.voice[chn].voi_pat_index = new_pos;
        let playing = self.fin_pattern(chn, adr, module, ctx);

        self.voice[chn].voi_cpt = if playing { 1 } else { 0 };
    }

    fn do_effects(&mut self, ctx: &mut Context) {
        for chn in 0..4 {
            match self.voice[chn].voi_effect {
                Effect::None        => ctx.sink.set_period(chn, self.voice[chn].voi_note as u32),
                Effect::Arpeggio    => self.arpeggio(chn, ctx),
                Effect::Portamento  => self.portamento(chn, ctx),
                Effect::Vibrato     => self.vibrato(chn, ctx),
                Effect::VolumeSlide => self.volume_slide(chn),
                Effect::Slide       => self.slide(chn, ctx),
            }
            ctx.sink.set_volume(chn, self.voice[chn].voi_vol as u32);
        }
    }

    fn arpeggio(&mut self, chn: usize, ctx: &mut Context) {
        let v = &mut self.voice[chn];
        let val1 = (v.voi_value & 0xff) as u8;
        let mut val2 = ((v.voi_value as u16) >> 8) as u8;

        if val2 >= 3 {
            val2 = 2;
        }
        val2 = val2.wrapping_sub(1);
        v.voi_value = (((val2 as u16) << 8) | val1 as u16) as i16;

        let period = if val2 == 0 {
            v.voi_note
        } else if (val2 as i8) < 0 {
            find_arpeggio_period(v.voi_note, (val1 >> 4) as usize)
        } else {
            find_arpeggio_period(v.voi_note, (val1 & 0x0f) as usize)
        };

        ctx.sink.set_period(chn, period as u32);
    }

    fn portamento(&mut self, chn: usize, ctx: &mut Context) {
        let v = &mut self.voice[chn];
        let mut period = v.voi_note;
        let value = v.voi_value as u16;

        if period == v.voi_ptoto {
            v.voi_effect = Effect::None;
        } else if period < v.voi_ptoto {
            period = period.wrapping_add(value);
            if period >= v.voi_ptoto {
                period = v.voi_ptoto;
                v.voi_effect = Effect::None;
            }
        } else {
            period = period.wrapping_sub(value);
            if period <= v.voi_ptoto {
                period = v.voi_ptoto;
                v.voi_effect = Effect::None;
            }
        }

        v.voi_note = period;
        ctx.sink.set_period(chn, period as u32);
    }

    fn vibrato(&mut self, chn: usize, ctx: &mut Context) {
        let v = &mut self.voice[chn];
        let idx = ((v.voi_vib as i32 / 4) & 0x1f) as usize;
        let speed = ((v.voi_value & 0x0f) as u16 * SINUS[idx] as u16) / 64;

        let period = if v.voi_vib < 0 {
            v.voi_note.wrapping_sub(speed)
        } else {
            v.voi_note.wrapping_add(speed)
        };

        // the base note is left alone
        ctx.sink.set_period(chn, period as u32);

        v.voi_vib = v.voi_vib.wrapping_add(((v.voi_value / 4) & 0x3c) as i8);
    }

    fn volume_slide(&mut self, chn: usize) {
        let v = &mut self.voice[chn];
        let mut vol = v.voi_dvol as i16 + v.voi_value;

        if vol < 0 {
            vol = 0;
        } else if vol >= 64 {
            vol = 63;
        }

        v.voi_dvol = vol as u16;
        v.voi_vol  = vol as u16;
    }

    fn slide(&mut self, chn: usize, ctx: &mut Context) {
        let v = &mut self.voice[chn];

        if v.voi_value == 0 {
            v.voi_effect = Effect::None;
            return
        }

        let mut period = v.voi_note.wrapping_add(v.voi_value as u16);
        if period < 113 {
            period = 113;
            v.voi_effect = Effect::None;
        } else if period >= 856 {
            period = 856;
            v.voi_effect = Effect::None;
        }

        v.voi_note = period;
        ctx.sink.set_period(chn, period as u32);
    }

    fn show_positions(&self, module: &AbkData, ctx: &mut Context) {
        ctx.info_changed(INFO_POSITION_LINE, self.format_positions());
        ctx.info_changed(INFO_TRACK_LINE, self.format_tracks(module));
    }

    fn format_positions(&self) -> String {
        self.voice.iter()
            .map(|v| v.voi_pat_index.saturating_sub(1).to_string())
            .collect::<Vec<String>>()
            .join(", ")
    }

    fn format_tracks(&self, module: &AbkData) -> String {
        (0..4)
            .map(|chn| {
                let idx = self.voice[chn].voi_pat_index.saturating_sub(1);
                match self.position_list(module, chn).get(idx) {
                    Some(entry) => entry.to_string(),
                    None        => "-".to_owned(),
                }
            })
            .collect::<Vec<String>>()
            .join(", ")
    }

    fn format_lengths(&self, module: &AbkData) -> String {
        (0..4)
            .map(|chn| self.position_list(module, chn).len().saturating_sub(1).to_string())
            .collect::<Vec<String>>()
            .join(", ")
    }
}

fn find_arpeggio_period(note: u16, arp: usize) -> u16 {
    for i in 0..36 {
        if note >= PERIODS[i] {
            // sanity check
            return PERIODS.get(i + arp).cloned().unwrap_or(0)
        }
    }
    0
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Effect {
    None,
    Arpeggio,
    Portamento,
    Vibrato,
    VolumeSlide,
    Slide,
}

impl Default for Effect {
    fn default() -> Self {
        Effect::None
    }
}

#[derive(Clone,Copy,Default)]
struct ChannelData {
    voi_inst       : Option<usize>,
    voi_note       : u16,
    voi_ptoto      : u16,
    voi_ptone      : bool,
    voi_rep        : u16,
    voi_deb        : Option<usize>,
    voi_dvol       : u16,
    voi_vol        : u16,
    voi_value      : i16,
    voi_vib        : i8,
    voi_cpt        : u16,
    voi_adr        : Option<usize>,   // None is the empty track
    voi_adr_index  : usize,
    voi_pat_index  : usize,
    voi_pat_d_index: usize,
    voi_effect     : Effect,
}

impl ChannelData {
    fn new() -> Self {
        ChannelData {
            voi_cpt: 1,
            ..Default::default()
        }
    }
}

static EMPTY_TRACK: [u16; 1] = [ 0x8000 ];

lazy_static! {
    static ref SINUS: Box<[u8; 32]> = Box::new([
        0x00, 0x18, 0x31, 0x4a, 0x61, 0x78, 0x8d, 0xa1, 0xb4, 0xc5, 0xd4, 0xe0, 0xeb, 0xf4, 0xfa, 0xfd,
        0xff, 0xfd, 0xfa, 0xf4, 0xeb, 0xe0, 0xd4, 0xc5, 0xb4, 0xa1, 0x8d, 0x78, 0x61, 0x4a, 0x31, 0x18
    ]);

    static ref PERIODS: Box<[u16; 38]> = Box::new([
        856, 808, 762, 720, 678, 640, 604, 570, 538, 508, 480, 453,
        428, 404, 381, 360, 339, 320, 302, 285, 269, 254, 240, 226,
        214, 202, 190, 180, 170, 160, 151, 143, 135, 127, 120, 113,
        000, 000
    ]);
}


impl FormatPlayer for AmosPlayer {
    fn start(&mut self, data: &mut PlayerData, mdata: &dyn ModuleData, ctx: &mut Context) {

        let module = try_option!(mdata.as_any().downcast_ref::<AbkData>());

        self.song = data.song.min(module.songs.len().saturating_sub(1));
        self.mu_cpt = self.tempo_base;
        self.mu_tempo = START_TEMPO;
        self.voice = [ChannelData::new(); 4];

        data.song  = self.song;
        data.pos   = 0;
        data.speed = self.mu_tempo as usize;
        data.tempo = self.tempo_base as usize;

        // fixed Amiga panning
        for chn in 0..4 {
            ctx.sink.set_panning(chn, if chn == 0 || chn == 3 { 0 } else { 256 });
        }

        ctx.info_changed(INFO_SPEED_LINE, self.mu_tempo.to_string());
    }

    fn play(&mut self, data: &mut PlayerData, mdata: &dyn ModuleData, ctx: &mut Context) {

        let module = try_option!(mdata.as_any().downcast_ref::<AbkData>());

        self.mu_play(module, ctx);

        data.pos   = self.voice[0].voi_pat_index.saturating_sub(1);
        data.frame = self.mu_cpt as usize;
        data.speed = self.mu_tempo as usize;
    }

    fn info(&self, mdata: &dyn ModuleData) -> Vec<(&'static str, String)> {
        let module = match mdata.as_any().downcast_ref::<AbkData>() {
            Some(m) => m,
            None    => return Vec::new(),
        };

        vec![
            ("Song length",       self.format_lengths(module)),
            ("Used tracks",       module.tracks.len().to_string()),
            ("Used samples",      module.samples.len().to_string()),
            ("Playing positions", self.format_positions()),
            ("Playing tracks",    self.format_tracks(module)),
            ("Current speed",     self.mu_tempo.to_string()),
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
