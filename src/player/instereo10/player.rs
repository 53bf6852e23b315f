use crate::format::is10::*;
use crate::module::{Module, ModuleData};
use crate::player::{Context, Options, PlayerData, FormatPlayer, State};

const INFO_POSITION_LINE: usize = 5;
const INFO_TRACKS_LINE  : usize = 6;
const INFO_SPEED_LINE   : usize = 7;

/// InStereo! 1.0 replayer
///
/// All four voices share one position list and one row counter. A row
/// is read when the speed counter reaches the current speed, and the
/// arpeggio, portamento, vibrato, slide, ADSR and EGC effects run on
/// every tick after that. EGC instruments rebuild their waveform on
/// each tick from the wave table and the envelope table.
#[derive(Clone)]
pub struct Is10Player {
    song          : usize,
    sub_song      : SubSong,
    speed_counter : u8,
    speed         : u8,
    song_pos      : usize,
    row_pos       : usize,
    rows_per_track: usize,
    voices        : [Voice; 4],
}

impl Is10Player {
    pub fn new(_module: &Module, _options: &Options) -> Self {
        Is10Player {
            song          : 0,
            sub_song      : SubSong::default(),
            speed_counter : 0,
            speed         : 0,
            song_pos      : 0,
            row_pos       : 0,
            rows_per_track: 0,
            voices        : Default::default(),
        }
    }

    fn next_row(&mut self, module: &Is10Data, data: &mut PlayerData, ctx: &mut Context) {
        self.speed_counter = 0;

        if self.row_pos >= self.rows_per_track {
            self.row_pos = 0;

            if self.song_pos > self.sub_song.last_position as usize {
                self.song_pos = self.sub_song.restart_position as usize;
            }

            if ctx.mark_visited(self.song_pos) {
                ctx.end_reached_all();
            }
            self.song_pos += 1;

            let pos = module.position(self.song_pos - 1);
            for (v, p) in self.voices.iter_mut().zip(pos.iter()) {
                v.start_row = p.start_row;
                v.sound_transpose = p.sound_transpose;
                v.note_transpose = p.note_transpose;
            }

            ctx.info_changed(INFO_POSITION_LINE, self.format_position());
            ctx.info_changed(INFO_TRACKS_LINE, self.format_tracks());
        }

        for v in self.voices.iter_mut() {
            v.line = module.row(v.start_row as usize + self.row_pos);
        }

        for chn in 0..4 {
            self.play_row(chn, module, data, ctx);
        }

        self.row_pos += 1;
    }

    fn play_row(&mut self, chn: usize, module: &Is10Data, data: &mut PlayerData, ctx: &mut Context) {
        let line = self.voices[chn].line;

        match line.effect {
            FX_SET_TRACK_LEN => if line.arg <= 64 {
                self.rows_per_track = line.arg as usize;
            },
            FX_SET_FILTER => {
                data.filter = line.arg == 0;
                ctx.sink.set_filter(data.filter);
            }
            FX_SET_SPEED => if line.arg > 0 && line.arg <= 16 {
                self.speed = line.arg;
                ctx.info_changed(INFO_SPEED_LINE, self.speed.to_string());
            },
            _ => {},
        }

        let v = &mut self.voices[chn];
        v.set_effect(line.effect, line.arg);
        v.play_note(chn, module, ctx);
    }

    fn format_position(&self) -> String {
        self.song_pos.saturating_sub(1).to_string()
    }

    fn format_tracks(&self) -> String {
        self.voices.iter().map(|v| v.start_row.to_string()).collect::<Vec<_>>().join(", ")
    }
}

fn note_period(note: u8) -> u16 {
    PERIODS.get(note as usize).cloned().unwrap_or(0)
}


#[derive(Clone, Default)]
struct Voice {
    start_row           : u16,
    sound_transpose     : i8,
    note_transpose      : i8,
    line                : TrackLine,
    transposed_note     : u8,
    prev_transposed_note: u8,
    instrument          : u8,   // after sound transpose
    slide_speed         : i8,
    slide_increment     : i16,
    portamento_enabled  : bool,
    portamento_speed    : i8,
    portamento_counter  : i8,
    vibrato_delay       : u8,
    vibrato_pos         : u8,
    adsr_enabled        : bool,
    adsr_pos            : u16,
    egc_mode            : EgcMode,
    egc_pos             : u16,
    synth               : Vec<i8>,
    synth_playing       : bool,
}

impl Voice {
    // The set volume command is stored by the replayer and never read
    // back, so it has no effect here.
    fn set_effect(&mut self, effect: u8, arg: u8) {
        self.slide_speed = 0;

        match effect {
            FX_SET_SLIDE_SPEED => {
                self.slide_speed = arg as i8;
            }
            FX_RESTART_ADSR => {
                self.adsr_pos = arg as u16;
                self.adsr_enabled = true;
            }
            FX_RESTART_EGC => {
                self.egc_pos = arg as u16;
                self.egc_mode = EgcMode::Ones;
            }
            FX_SET_SLIDE_INCREMENT => {
                self.slide_increment = arg as i8 as i16;
            }
            FX_SET_VIBRATO_DELAY => {
                self.vibrato_delay = arg;
                self.vibrato_pos = 0;
            }
            FX_SET_VIBRATO_POS => {
                self.vibrato_pos = arg;
            }
            _ => {},
        }
    }

    fn play_note(&mut self, chn: usize, module: &Is10Data, ctx: &mut Context) {
        let line = self.line;
        if line.note == 0 {
            return
        }

        if line.note == NOTE_OFF {
            ctx.sink.mute(chn);
            return
        }

        let mut note = line.note;
        if line.effect != FX_SKIP_NOTE_TRANSPOSE {
            note = note.wrapping_add(self.note_transpose as u8);
        }
        self.prev_transposed_note = self.transposed_note;
        self.transposed_note = note;

        ctx.sink.set_period(chn, note_period(note) as u32);

        if line.instrument == 0 {
            return
        }

        let mut num = line.instrument;
        if line.effect != FX_SKIP_SOUND_TRANSPOSE {
            num = num.wrapping_add(self.sound_transpose as u8);
        }
        self.instrument = num;

        let ins = match module.instrument(num) {
            Some(ins) => ins,
            None      => return,
        };

        self.adsr_enabled = ins.adsr_enabled;
        self.adsr_pos = 0;
        self.vibrato_delay = ins.vibrato_delay;
        self.vibrato_pos = 0;
        self.egc_mode = EgcMode::Off;
        self.egc_pos = 0;
        self.slide_increment = 0;

        if line.effect == FX_SKIP_PORTAMENTO {
            self.portamento_enabled = false;
            self.portamento_speed = 0;
        } else {
            self.portamento_enabled = ins.portamento_enabled;
            self.portamento_speed = ins.portamento_speed;
        }
        self.portamento_counter = self.portamento_speed;

        if ins.synthesis {
            self.egc_mode = ins.egc_mode;
            if self.egc_mode == EgcMode::Off {
                let wave = module.waveform(ins.waveform);
                let len = (ins.waveform_length as usize).min(WAVE_SIZE).min(wave.len());
                self.synth = wave[..len].to_vec();
                for s in self.synth.iter_mut().take(ins.egc_offset as usize) {
                    *s = s.wrapping_neg();
                }

                ctx.sink.trigger(chn, num as usize - 1, &self.synth, 0, len as u32);
                ctx.sink.set_loop(chn, 0, len as u32);
                self.synth_playing = true;
            } else {
                // the first EGC pass starts the note
                self.synth_playing = false;
            }
            ctx.sink.set_volume(chn, ins.volume as u32);
        } else {
            self.synth_playing = false;

            let smp_num = (ins.waveform & 0x3f) as usize;
            let smp = match module.samples.get(smp_num) {
                Some(smp) => smp,
                None      => {
                    ctx.sink.mute(chn);
                    return
                }
            };

            let mut play_len = ins.waveform_length as u32;
            let mut loop_start = 0;
            let mut loop_length = 0;
            if ins.repeat_length == 0 {
                loop_length = ins.waveform_length as u32;
            } else if ins.repeat_length != 2 {
                play_len += ins.repeat_length as u32;
                loop_start = ins.waveform_length as u32;
                loop_length = ins.repeat_length as u32;
            }

            ctx.sink.trigger(chn, smp_num, &smp.data, 0, play_len.min(smp.data.len() as u32));
            if loop_length != 0 {
                ctx.sink.set_loop(chn, loop_start, loop_length);
            }
            ctx.sink.set_volume(chn, ins.volume as u32);
        }
    }

    fn do_effects(&mut self, chn: usize, module: &Is10Data, counter: u8, ctx: &mut Context) {
        let arp = module.arpeggio(self.line.arpeggio, counter as usize);
        let mut period = note_period(self.transposed_note.wrapping_add(arp));
        let prev = note_period(self.prev_transposed_note.wrapping_add(arp));

        if self.portamento_enabled && self.portamento_counter != 0 && period != prev {
            self.portamento_counter = self.portamento_counter.wrapping_sub(1);

            // slide from the previous note towards the current one
            let mut x = (prev as i32 - period as i32) * self.portamento_counter as i32;
            if self.portamento_speed != 0 {
                x /= self.portamento_speed as i32;
            }
            period = (x + period as i32) as u16;
        }

        if self.vibrato(&mut period, module) {
            period = period.wrapping_add(self.slide_increment as u16);
            ctx.sink.set_period(chn, period as u32);
            self.slide_increment = self.slide_increment.wrapping_sub(self.slide_speed as i16);

            self.adsr(chn, module, ctx);
        }

        self.egc(chn, module, ctx);
    }

    // False when there's nothing playing to modulate.
    fn vibrato(&mut self, period: &mut u16, module: &Is10Data) -> bool {
        if self.vibrato_delay != 0 {
            self.vibrato_delay -= 1;
            return true
        }

        let ins = match module.instrument(self.instrument) {
            Some(ins) => ins,
            None      => return false,
        };

        let vib = VIB_TABLE[self.vibrato_pos as usize] as i32;
        let level = ins.vibrato_level as i32;

        if vib < 0 {
            if level != 0 {
                *period = period.wrapping_sub((-vib * 4 / level) as u16);
            }
        } else if level != 0 {
            *period = period.wrapping_add((vib * 4 / level) as u16);
        } else {
            // the replayer zeroes the period when there's no vibrato level
            *period = 0;
        }

        self.vibrato_pos = self.vibrato_pos.wrapping_add(ins.vibrato_speed);
        true
    }

    fn adsr(&mut self, chn: usize, module: &Is10Data, ctx: &mut Context) {
        if !self.adsr_enabled {
            return
        }

        let ins = try_option!(module.instrument(self.instrument));

        // the last step is still played
        if self.adsr_pos >= ins.adsr_length {
            self.adsr_enabled = false;
        }

        let x = module.adsr(ins.adsr_table, self.adsr_pos) as u32 + 1;
        ctx.sink.set_volume(chn, (ins.volume as u32 * x / 128).min(64));

        self.adsr_pos = self.adsr_pos.wrapping_add(1);
    }

    // Negates the start of the waveform, the split point follows the
    // envelope table.
    fn egc(&mut self, chn: usize, module: &Is10Data, ctx: &mut Context) {
        if self.egc_mode == EgcMode::Off {
            return
        }

        let num = self.instrument;
        let ins = try_option!(module.instrument(num));

        let wave = module.waveform(ins.waveform);
        let len = (ins.waveform_length as usize).min(WAVE_SIZE).min(wave.len());
        let mut buf = wave[..len].to_vec();

        let split = module.eg(ins.egc_table, self.egc_pos).wrapping_add(ins.egc_offset);
        for s in buf.iter_mut().take(split as usize) {
            *s = s.wrapping_neg();
        }

        if !self.synth_playing {
            ctx.sink.trigger(chn, num as usize - 1, &buf, 0, len as u32);
            ctx.sink.set_loop(chn, 0, len as u32);
            self.synth_playing = true;
        } else if buf != self.synth {
            ctx.sink.update_waveform(chn, &buf);
        }
        self.synth = buf;

        self.egc_pos = self.egc_pos.wrapping_add(1);
        if self.egc_pos >= ins.egc_length {
            match self.egc_mode {
                EgcMode::Ones => self.egc_mode = EgcMode::Off,
                _             => self.egc_pos = 0,
            }
        }
    }
}

lazy_static! {
    static ref PERIODS: Box<[u16; 109]> = Box::new([
            0,
        13696, 12928, 12192, 11520, 10848, 10240,  9664,  9120,  8608,  8128,  7680,  7248,
         6848,  6464,  6096,  5760,  5424,  5120,  4832,  4560,  4304,  4064,  3840,  3624,
         3424,  3232,  3048,  2880,  2712,  2560,  2416,  2280,  2152,  2032,  1920,  1812,
         1712,  1616,  1524,  1440,  1356,  1280,  1208,  1140,  1076,  1016,   960,   906,
          856,   808,   762,   720,   678,   640,   604,   570,   538,   508,   480,   453,
          428,   404,   381,   360,   339,   320,   302,   285,   269,   254,   240,   226,
          214,   202,   190,   180,   170,   160,   151,   143,   135,   127,   120,   113,
          107,   101,    95,    90,    85,    80,    75,    71,    67,    63,    60,    56,
           53,    50,    47,    45,    42,    40,    37,    35,    33,    31,    30,    28
    ]);

    // triangle: up from 0, down through zero, back up to -2
    static ref VIB_TABLE: Box<[i8; 256]> = {
        let mut t = Box::new([0i8; 256]);
        let mut x: i8 = 0;
        for i in 0..64 {
            t[i] = x;
            x = x.wrapping_add(2);
        }
        x = x.wrapping_add(1);
        for i in 64..192 {
            x = x.wrapping_sub(2);
            t[i] = x;
        }
        x = x.wrapping_sub(1);
        for i in 192..256 {
            t[i] = x;
            x = x.wrapping_add(2);
        }
        t
    };
}


impl FormatPlayer for Is10Player {
    fn start(&mut self, data: &mut PlayerData, mdata: &dyn ModuleData, ctx: &mut Context) {

        let module = try_option!(mdata.as_any().downcast_ref::<Is10Data>());

        self.song = data.song.min(module.sub_songs.len().saturating_sub(1));
        self.sub_song = try_option!(module.sub_songs.get(self.song)).clone();

        self.speed_counter  = self.sub_song.start_speed;
        self.speed          = self.sub_song.start_speed;
        self.song_pos       = self.sub_song.first_position as usize;
        self.row_pos        = self.sub_song.rows_per_track as usize;
        self.rows_per_track = self.sub_song.rows_per_track as usize;
        self.voices         = Default::default();

        data.song  = self.song;
        data.pos   = self.song_pos;
        data.row   = 0;
        data.speed = self.speed as usize;
        data.tempo = 125;

        for chn in 0..4 {
            ctx.sink.set_panning(chn, if chn == 0 || chn == 3 { 0 } else { 256 });
        }

        ctx.info_changed(INFO_SPEED_LINE, self.speed.to_string());
    }

    fn play(&mut self, data: &mut PlayerData, mdata: &dyn ModuleData, ctx: &mut Context) {

        let module = try_option!(mdata.as_any().downcast_ref::<Is10Data>());

        self.speed_counter = self.speed_counter.wrapping_add(1);
        if self.speed_counter >= self.speed {
            self.next_row(module, data, ctx);
        }

        let counter = self.speed_counter;
        for (chn, v) in self.voices.iter_mut().enumerate() {
            v.do_effects(chn, module, counter, ctx);
        }

        data.pos   = self.song_pos.saturating_sub(1);
        data.row   = self.row_pos.saturating_sub(1);
        data.speed = self.speed as usize;
    }

    fn info(&self, mdata: &dyn ModuleData) -> Vec<(&'static str, String)> {
        let module = match mdata.as_any().downcast_ref::<Is10Data>() {
            Some(m) => m,
            None    => return Vec::new(),
        };

        vec![
            ("Number of positions", module.positions.len().to_string()),
            ("Used track rows",     module.rows.len().to_string()),
            ("Used instruments",    module.instruments.len().to_string()),
            ("Used samples",        module.samples.len().to_string()),
            ("Used wave tables",    module.waveforms.len().to_string()),
            ("Playing position",    self.format_position()),
            ("Playing tracks",      self.format_tracks()),
            ("Current speed",       self.speed.to_string()),
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
