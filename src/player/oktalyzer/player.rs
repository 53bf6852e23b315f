use crate::format::okt::*;
use crate::module::{Module, ModuleData};
use crate::player::{Context, Options, PlayerData, FormatPlayer, State};
use crate::{MIN_PERIOD, MAX_PERIOD};

const INFO_SPEED_LINE: usize = 3;
const NUM_NOTES      : usize = 36;
const PAN_RIGHT      : [bool; 8] = [false, false, true, true, true, true, false, false];

// Effects
const FX_PORTA_DOWN    : u8 = 1;
const FX_PORTA_UP      : u8 = 2;
const FX_ARPEGGIO      : u8 = 10;
const FX_ARPEGGIO2     : u8 = 11;
const FX_ARPEGGIO3     : u8 = 12;
const FX_NOTE_DOWN     : u8 = 13;
const FX_FILTER        : u8 = 15;
const FX_NOTE_UP_LINE  : u8 = 17;
const FX_NOTE_DOWN_LINE: u8 = 21;
const FX_VOLUME_RETRIG : u8 = 24;
const FX_POSITION_JUMP : u8 = 25;
const FX_RELEASE       : u8 = 27;
const FX_SET_SPEED     : u8 = 28;
const FX_NOTE_UP       : u8 = 30;
const FX_VOLUME        : u8 = 31;

#[derive(Debug, Clone, Default)]
struct Channel {
    note          : u8,
    period        : i16,
    release_start : u32,
    release_length: u32,
}

/// Oktalyzer replayer
///
/// Up to eight channels in four pairs. A pair with its channel mode set
/// plays two mixed channels, and both read the same volume register.
/// The first row is read once the speed counter first reaches the song
/// speed, so a song starts with `speed - 1` silent ticks.
#[derive(Clone)]
pub struct OktPlayer {
    separation   : u32,
    speed        : u16,
    speed_counter: u16,
    song_pos     : usize,
    new_song_pos : Option<usize>,
    patt_pos     : Option<usize>,
    filter       : bool,
    channels     : Vec<Channel>,
    line         : Vec<Event>,
    pairs        : Vec<usize>,
    mixed        : [bool; 4],
    volume       : [i8; 8],   // 4..8 keep the previous tick's values
}

impl OktPlayer {
    pub fn new(module: &Module, options: &Options) -> Self {
        let pan = options.option_int("pan").unwrap_or(100).max(0).min(100) as u32;
        let chn = module.channels();

        OktPlayer {
            separation   : pan * 128 / 100,
            speed        : 6,
            speed_counter: 0,
            song_pos     : 0,
            new_song_pos : None,
            patt_pos     : None,
            filter       : false,
            channels     : vec![Channel::default(); chn],
            line         : vec![Event::default(); chn],
            pairs        : Vec::new(),
            mixed        : [false; 4],
            volume       : [64; 8],
        }
    }

    fn next_line(&mut self, module: &OktData, ctx: &mut Context) {
        let rows = module.pattern_at(self.song_pos).map_or(0, |p| p.rows);
        let row = self.patt_pos.map_or(0, |x| x + 1);

        if row >= rows || self.new_song_pos.is_some() {
            self.patt_pos = Some(0);

            match self.new_song_pos.take() {
                Some(pos) => {
                    if pos <= self.song_pos {
                        ctx.end_reached_all();
                    }
                    self.song_pos = pos;
                }
                None => self.song_pos += 1,
            }

            if self.song_pos >= module.song_length {
                self.song_pos = 0;
                if self.speed != module.speed {
                    self.speed = module.speed;
                    ctx.info_changed(INFO_SPEED_LINE, self.speed.to_string());
                }
                ctx.end_reached_all();
            }

            ctx.mark_visited(self.song_pos);
        } else {
            self.patt_pos = Some(row);
        }

        let row = self.patt_pos.unwrap_or(0);
        let num = self.line.len();
        let patt = module.pattern_at(self.song_pos);
        for (chn, event) in self.line.iter_mut().enumerate() {
            *event = patt.map(|p| p.event(row, chn, num)).unwrap_or_default();
        }
    }

    fn play_channel(&mut self, chn: usize, module: &OktData, ctx: &mut Context) {
        let event = self.line[chn];
        if event.note == 0 {
            return
        }

        let num = event.sample as usize;
        let ins = try_option!(module.instruments.get(num));
        let smp = try_option!(module.samples.get(num));
        let length = ins.length.min(smp.data.len() as u32);
        if length == 0 {
            return
        }

        let pair = self.pairs[chn];
        let ch = &mut self.channels[chn];

        if self.mixed[pair] {
            if ins.mode == MODE_SINGLE {
                return
            }

            // no loops in mixed channels
            ctx.sink.trigger(chn, num, &smp.data, 0, length);
            ch.release_start = 0;
            ch.release_length = 0;
        } else {
            if ins.mode == MODE_MIXED {
                return
            }

            self.volume[pair] = ins.volume as i8;

            if ins.repeat_length == 0 {
                ctx.sink.trigger(chn, num, &smp.data, 0, length);
                ch.release_start = 0;
                ch.release_length = 0;
            } else {
                let end = ins.repeat_start + ins.repeat_length;
                ctx.sink.trigger(chn, num, &smp.data, 0, end.min(length));
                ctx.sink.set_loop(chn, ins.repeat_start, ins.repeat_length);
                ch.release_start = end;
                ch.release_length = length.saturating_sub(end);
            }
        }

        let note = (event.note as usize - 1).min(NUM_NOTES - 1);
        ch.note = note as u8;
        ch.period = PERIODS[note];
        ctx.sink.set_period(chn, ch.period as u32);
    }

    fn play_note(&mut self, chn: usize, note: i32, ctx: &mut Context) {
        let note = note.max(0).min(NUM_NOTES as i32 - 1) as usize;
        self.channels[chn].period = PERIODS[note];
        ctx.sink.set_period(chn, PERIODS[note] as u32);
    }

    fn channel_effect(&mut self, chn: usize, module: &OktData, ctx: &mut Context) {
        let event = self.line[chn];
        let counter = self.speed_counter as usize;
        let pair = self.pairs[chn];
        let note = self.channels[chn].note as i8 as i32;
        let hi = (event.arg >> 4) as i32;
        let lo = (event.arg & 0x0f) as i32;

        match event.effect {
            FX_PORTA_DOWN => {
                let ch = &mut self.channels[chn];
                ch.period = (ch.period - event.arg as i16).max(MIN_PERIOD as i16);
                ctx.sink.set_period(chn, ch.period as u32);
            }
            FX_PORTA_UP => {
                let ch = &mut self.channels[chn];
                ch.period = (ch.period + event.arg as i16).min(MAX_PERIOD as i16);
                ctx.sink.set_period(chn, ch.period as u32);
            }
            FX_ARPEGGIO => {
                let note = match ARP10[counter & 15] {
                    0 => note - hi,
                    2 => note + lo,
                    _ => note,
                };
                self.play_note(chn, note, ctx);
            }
            FX_ARPEGGIO2 => {
                let note = match counter & 3 {
                    1 => note + lo,
                    3 => note - hi,
                    _ => note,
                };
                self.play_note(chn, note, ctx);
            }
            FX_ARPEGGIO3 => {
                match ARP12[counter & 15] {
                    0 => {},
                    1 => self.play_note(chn, note - hi, ctx),
                    2 => self.play_note(chn, note + lo, ctx),
                    _ => self.play_note(chn, note, ctx),
                }
            }
            FX_NOTE_UP | FX_NOTE_UP_LINE => {
                if event.effect == FX_NOTE_UP || counter == 0 {
                    let ch = &mut self.channels[chn];
                    ch.note = ch.note.wrapping_add(event.arg);
                    let note = ch.note as i8 as i32;
                    self.play_note(chn, note, ctx);
                }
            }
            FX_NOTE_DOWN | FX_NOTE_DOWN_LINE => {
                if event.effect == FX_NOTE_DOWN || counter == 0 {
                    let ch = &mut self.channels[chn];
                    ch.note = ch.note.wrapping_sub(event.arg);
                    let note = ch.note as i8 as i32;
                    self.play_note(chn, note, ctx);
                }
            }
            FX_FILTER => {
                if counter == 0 {
                    self.filter = event.arg != 0;
                }
            }
            FX_POSITION_JUMP => {
                if counter == 0 {
                    // decimal digits
                    let pos = (hi * 10 + lo) as usize;
                    if pos < module.song_length {
                        self.new_song_pos = Some(pos);
                    }
                }
            }
            FX_RELEASE => {
                let ch = &self.channels[chn];
                if ch.release_start != 0 && ch.release_length != 0 {
                    ctx.sink.play_release(chn, ch.release_start, ch.release_length);
                }
            }
            FX_SET_SPEED => {
                if counter == 0 && lo != 0 {
                    self.speed = lo as u16;
                    ctx.info_changed(INFO_SPEED_LINE, self.speed.to_string());
                }
            }
            FX_VOLUME_RETRIG | FX_VOLUME => {
                if event.effect == FX_VOLUME_RETRIG {
                    self.volume[pair] = self.volume[pair + 4];
                }
                self.volume_control(pair, event.arg, counter);
            }
            _ => {},
        }
    }

    fn volume_control(&mut self, pair: usize, arg: u8, counter: usize) {
        let vol = &mut self.volume[pair];
        match arg {
            0..=64    => *vol = arg as i8,
            65..=79   => *vol = (*vol - (arg - 64) as i8).max(0),
            80..=95   => *vol = (*vol + (arg - 80) as i8).min(64),
            96..=111  => if counter == 0 { *vol = (*vol - (arg - 96) as i8).max(0) },
            112..=127 => if counter == 0 { *vol = (*vol + (arg - 112) as i8).min(64) },
            _ => {},
        }
    }

    fn set_volumes(&mut self, ctx: &mut Context) {
        for i in 0..4 {
            self.volume[i + 4] = self.volume[i];
        }
        for (chn, &pair) in self.pairs.iter().enumerate() {
            ctx.sink.set_volume(chn, self.volume[pair].max(0) as u32 * 4);
        }
    }
}

lazy_static! {
    static ref PERIODS: Box<[i16; NUM_NOTES]> = Box::new([
         856,  808,  762,  720,  678,  640,  604,  570,  538,  508,  480,  453,
         428,  404,  381,  360,  339,  320,  302,  285,  269,  254,  240,  226,
         214,  202,  190,  180,  170,  160,  151,  143,  135,  127,  120,  113
    ]);

    static ref ARP10: Box<[u8; 16]> = Box::new([
        0, 1, 2, 0, 1, 2, 0, 1, 2, 0, 1, 2, 0, 1, 2, 0
    ]);

    static ref ARP12: Box<[u8; 16]> = Box::new([
        0, 1, 2, 3, 1, 2, 3, 1, 2, 3, 1, 2, 3, 1, 2, 3
    ]);
}


impl FormatPlayer for OktPlayer {
    fn start(&mut self, data: &mut PlayerData, mdata: &dyn ModuleData, ctx: &mut Context) {

        let module = try_option!(mdata.as_any().downcast_ref::<OktData>());

        let map = module.channel_map();
        self.channels = vec![Channel::default(); map.len()];
        self.line = vec![Event::default(); map.len()];
        self.pairs = map.iter().map(|&(pair, _)| pair).collect();
        self.mixed = module.channel_flags;
        self.volume = [64; 8];
        self.speed = module.speed;
        self.speed_counter = 0;
        self.song_pos = if data.pos < module.song_length { data.pos } else { 0 };
        self.new_song_pos = None;
        self.patt_pos = None;
        self.filter = false;

        ctx.mark_visited(self.song_pos);

        for (chn, &(_, slot)) in map.iter().enumerate() {
            let pan = if PAN_RIGHT[slot] { 128 + self.separation } else { 128 - self.separation };
            ctx.sink.set_panning(chn, pan);
        }

        data.pos   = self.song_pos;
        data.row   = 0;
        data.speed = self.speed as usize;
        data.tempo = 125;

        ctx.info_changed(INFO_SPEED_LINE, self.speed.to_string());
    }

    fn play(&mut self, data: &mut PlayerData, mdata: &dyn ModuleData, ctx: &mut Context) {

        let module = try_option!(mdata.as_any().downcast_ref::<OktData>());

        self.speed_counter = self.speed_counter.wrapping_add(1);
        if self.speed_counter >= self.speed {
            self.speed_counter = 0;
            self.next_line(module, ctx);
            for chn in 0..self.line.len() {
                self.play_channel(chn, module, ctx);
            }
        }

        for chn in 0..self.line.len() {
            self.channel_effect(chn, module, ctx);
        }
        self.set_volumes(ctx);

        if self.filter != data.filter {
            data.filter = self.filter;
            ctx.sink.set_filter(self.filter);
        }

        data.pos   = self.song_pos;
        data.row   = self.patt_pos.unwrap_or(0);
        data.speed = self.speed as usize;
    }

    fn info(&self, mdata: &dyn ModuleData) -> Vec<(&'static str, String)> {
        let module = match mdata.as_any().downcast_ref::<OktData>() {
            Some(m) => m,
            None    => return Vec::new(),
        };

        vec![
            ("Song length",   module.song_length.to_string()),
            ("Used patterns", module.patterns.len().to_string()),
            ("Used samples",  module.instruments.len().to_string()),
            ("Current speed", self.speed.to_string()),
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
