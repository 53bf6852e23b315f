pub mod sink;
pub mod scan;
mod virt;
mod amos;
mod fred;
mod soundmon;
mod oktalyzer;
mod instereo10;

pub use crate::player::virt::{Virtual, Voice};
pub use crate::player::sink::{OutputSink, NullSink, EventLog, SinkEvent};
pub use crate::player::scan::{DurationInfo, PositionInfo, Tracker};

use std::any::Any;
use std::collections::HashMap;
use crate::module::{Module, ModuleData, SongLayout};
use crate::Error;

// For the player list

#[derive(Debug, Clone)]
pub struct PlayerInfo {
    pub id         : &'static str,
    pub name       : &'static str,
    pub description: &'static str,
    pub author     : &'static str,
    pub accepts    : &'static [&'static str],
    pub volume_max : u32,
}

pub trait PlayerListEntry {
    fn info(&self) -> PlayerInfo;
    fn player(&self, module: &Module, options: &Options) -> Box<dyn FormatPlayer>;
}

pub fn list() -> Vec<Box<dyn PlayerListEntry>> {
    vec![
        Box::new(amos::Amos),
        Box::new(fred::Fred),
        Box::new(soundmon::SoundMon),
        Box::new(oktalyzer::Oktalyzer),
        Box::new(instereo10::InStereo10),
    ]
}

pub fn list_by_id(player_id: &str) -> Result<Box<dyn PlayerListEntry>, Error> {
    for p in list() {
        if player_id == p.info().id {
            return Ok(p)
        }
    }
    Err(Error::Player(format!("player {:?} not found", player_id)))
}

/// Fails if a player was requested and it doesn't accept the format.
pub fn check_accepted(player_id: &str, fmt: &str) -> Result<(), Error> {
    if player_id.is_empty() {
        return Ok(())
    }

    let accepted = list_by_id(player_id)?.info().accepts.contains(&fmt);
    if accepted {
        Ok(())
    } else {
        Err(Error::Format(format!("player {:?} does not accept format {:?}", player_id, fmt)))
    }
}


// Trait for format-specific players

pub trait FormatPlayer: Send {
    fn start(&mut self, data: &mut PlayerData, mdata: &dyn ModuleData, ctx: &mut Context);
    fn play(&mut self, data: &mut PlayerData, mdata: &dyn ModuleData, ctx: &mut Context);
    fn info(&self, mdata: &dyn ModuleData) -> Vec<(&'static str, String)>;
    fn save_state(&self) -> State;
    fn restore_state(&mut self, state: &State);
}

/// Opaque deep copy of a format player's playing state.
pub struct State(Box<dyn Any + Send>);

impl State {
    pub fn new<T: Any + Send + Clone>(value: &T) -> Self {
        State(Box::new(value.clone()))
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}


/// Observer of song end and display updates.
pub trait Notifier {
    fn end_reached(&mut self, _chn: usize) {}
    fn module_info_changed(&mut self, _line: usize, _value: &str) {}
}

pub struct NullNotifier;

impl Notifier for NullNotifier {}


/// What an engine gets to talk to on each tick.
pub struct Context<'a> {
    pub sink: &'a mut dyn OutputSink,
    notifier: &'a mut dyn Notifier,
    tracker : &'a mut Tracker,
}

impl<'a> Context<'a> {
    pub fn new(sink: &'a mut dyn OutputSink, notifier: &'a mut dyn Notifier, tracker: &'a mut Tracker) -> Self {
        Context { sink, notifier, tracker }
    }

    /// The channel looped or jumped back to material already played.
    pub fn end_reached(&mut self, chn: usize) {
        self.notifier.end_reached(chn);
        self.tracker.channel_end(chn, true);
    }

    /// The channel hit a terminator that doesn't loop.
    pub fn stop_reached(&mut self, chn: usize) {
        self.notifier.end_reached(chn);
        self.tracker.channel_end(chn, false);
    }

    /// Shared position lists end all channels at once.
    pub fn end_reached_all(&mut self) {
        for chn in 0..self.tracker.channels() {
            self.end_reached(chn);
        }
    }

    /// Returns true if the position had already been visited.
    pub fn mark_visited(&mut self, pos: usize) -> bool {
        self.tracker.mark_visited(pos)
    }

    pub fn visited(&self, pos: usize) -> bool {
        self.tracker.visited(pos)
    }

    pub fn info_changed(&mut self, line: usize, value: String) {
        self.notifier.module_info_changed(line, &value);
    }
}


#[derive(Debug, Clone, Default)]
pub struct PlayerData {
    pub pos   : usize,
    pub row   : usize,
    pub frame : usize,
    pub song  : usize,
    pub speed : usize,
    pub tempo : usize,
    pub filter: bool,
}

impl PlayerData {
    pub fn new() -> Self {
        Default::default()
    }
}


/// Player options given as `key=value` pairs separated by commas.
#[derive(Debug, Clone, Default)]
pub struct Options {
    opts: HashMap<String, String>,
}

impl Options {
    pub fn new(s: &str) -> Self {
        let mut opts = HashMap::new();
        for item in s.split(',').map(str::trim).filter(|x| !x.is_empty()) {
            let mut kv = item.splitn(2, '=');
            let key = kv.next().unwrap_or("").trim();
            let val = kv.next().unwrap_or("1").trim();
            if !key.is_empty() {
                opts.insert(key.to_owned(), val.to_owned());
            }
        }
        Options { opts }
    }

    pub fn option_int(&self, key: &str) -> Option<isize> {
        self.opts.get(key).and_then(|v| v.parse::<isize>().ok())
    }

    pub fn option_bool(&self, key: &str) -> bool {
        match self.opts.get(key).map(String::as_str) {
            Some("0") | Some("no") | Some("false") | None => false,
            Some(_) => true,
        }
    }
}


pub struct Player<'a> {
    pub data     : PlayerData,
    module       : &'a Module,
    entry        : Box<dyn PlayerListEntry>,
    info         : PlayerInfo,
    options      : Options,
    format_player: Box<dyn FormatPlayer>,
    tracker      : Tracker,
    notifier     : Box<dyn Notifier>,
    virt         : Virtual,
    durations    : Vec<DurationInfo>,
    ticks        : u64,
    loop_count   : usize,
    end          : bool,
}

impl<'a> Player<'a> {
    pub fn find(module: &'a Module, player_id: &str, options: &str) -> Result<Self, Error> {
        let id = if player_id.is_empty() { module.player } else { player_id };
        let entry = list_by_id(id)?;
        let info = entry.info();

        if !info.accepts.contains(&module.format) {
            return Err(Error::Player(format!("player {:?} does not accept format {:?}", id, module.format)))
        }

        let options = Options::new(options);
        let format_player = entry.player(module, &options);
        let chn = module.channels();
        debug!("player {} for {} ({} channels)", info.id, module.format, chn);

        Ok(Player {
            data      : PlayerData::new(),
            module,
            virt      : Virtual::new(chn, info.volume_max),
            tracker   : Tracker::new(chn, shared_list(module)),
            notifier  : Box::new(NullNotifier),
            durations : Vec::new(),
            ticks     : 0,
            loop_count: 0,
            end       : false,
            entry,
            info,
            options,
            format_player,
        })
    }

    pub fn info(&self) -> &PlayerInfo {
        &self.info
    }

    pub fn set_notifier(&mut self, notifier: Box<dyn Notifier>) -> &mut Self {
        self.notifier = notifier;
        self
    }

    pub fn start(&mut self) -> &mut Self {
        let mut ctx = Context::new(&mut self.virt, &mut *self.notifier, &mut self.tracker);
        self.format_player.start(&mut self.data, &*self.module.data, &mut ctx);
        self
    }

    /// Runs one tick into the internal virtual channels.
    pub fn play_frame(&mut self) -> &mut Self {
        self.virt.frame_done();
        let mut ctx = Context::new(&mut self.virt, &mut *self.notifier, &mut self.tracker);
        self.format_player.play(&mut self.data, &*self.module.data, &mut ctx);
        self.frame_done()
    }

    /// Runs one tick into a caller provided sink.
    pub fn play_frame_into(&mut self, sink: &mut dyn OutputSink) -> &mut Self {
        let mut ctx = Context::new(sink, &mut *self.notifier, &mut self.tracker);
        self.format_player.play(&mut self.data, &*self.module.data, &mut ctx);
        self.frame_done()
    }

    fn frame_done(&mut self) -> &mut Self {
        self.ticks += 1;
        if self.tracker.take_end() {
            self.end = true;
            self.loop_count += 1;
            debug!("end reached at tick {}", self.ticks);
        }
        self
    }

    pub fn virt(&self) -> &Virtual {
        &self.virt
    }

    pub fn end(&self) -> bool {
        self.end
    }

    pub fn loop_count(&self) -> usize {
        self.loop_count
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn module_info(&self) -> Vec<(&'static str, String)> {
        self.format_player.info(&*self.module.data)
    }

    pub fn save_state(&self) -> State {
        self.format_player.save_state()
    }

    pub fn restore_state(&mut self, state: &State) -> &mut Self {
        self.format_player.restore_state(state);
        self
    }

    /// Computes (once) and returns the sub-song durations.
    pub fn scan(&mut self) -> &[DurationInfo] {
        if self.durations.is_empty() {
            self.durations = scan::scan(&*self.entry, self.module, &self.options);
        }
        &self.durations
    }

    pub fn songs(&mut self) -> usize {
        match self.module.data.layout() {
            SongLayout::SubSongs(num) => num,
            SongLayout::Positions(_)  => self.scan().len(),
        }
    }

    pub fn position(&self) -> usize {
        self.data.pos
    }

    pub fn song(&self) -> usize {
        self.data.song
    }

    /// Restarts playback at the start of a sub-song.
    pub fn set_song(&mut self, song: usize) -> Result<&mut Self, Error> {
        let songs = self.songs();
        if song >= songs {
            return Err(Error::Player(format!("song {} out of range ({} songs)", song, songs)))
        }

        let pos = match self.module.data.layout() {
            SongLayout::SubSongs(_)  => 0,
            SongLayout::Positions(_) => self.durations[song].start_position,
        };

        self.restart(song, pos);
        Ok(self)
    }

    /// Seeks by restoring the snapshot taken when the scan entered `pos`.
    pub fn set_position(&mut self, pos: usize) -> Result<&mut Self, Error> {
        self.scan();
        let song = self.data.song;

        let found = self.durations.iter()
            .filter(|d| d.song == song)
            .flat_map(|d| d.positions.iter())
            .find(|p| p.position == pos);

        match found {
            Some(p) => {
                self.format_player.restore_state(&p.state);
                self.data = p.data.clone();
                self.ticks = p.tick;
                self.end = false;
                self.tracker.resume_from(&p.tracker);
                Ok(self)
            }
            None => Err(Error::Player(format!("position {} not reached in song {}", pos, song))),
        }
    }

    fn restart(&mut self, song: usize, pos: usize) {
        self.format_player = self.entry.player(self.module, &self.options);
        self.data = PlayerData { song, pos, ..PlayerData::new() };
        self.tracker.reset();
        self.virt.reset();
        self.ticks = 0;
        self.loop_count = 0;
        self.end = false;
        self.start();
    }
}

fn shared_list(module: &Module) -> bool {
    match module.data.layout() {
        SongLayout::SubSongs(_)  => false,
        SongLayout::Positions(_) => true,
    }
}
