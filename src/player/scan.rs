use crate::module::{Module, SongLayout};
use crate::player::{Context, NullNotifier, NullSink, Options, PlayerData, PlayerListEntry, State};

/// Upper bound for a single scan: one hour of ticks at 50 Hz.
pub const MAX_SCAN_TICKS: u64 = 60 * 60 * crate::TICK_RATE as u64;

/// End and loop bookkeeping shared by live playback and scans.
#[derive(Debug, Clone)]
pub struct Tracker {
    done       : Vec<bool>,
    stopped    : Vec<bool>,
    visited    : Vec<bool>,
    new_visits : Vec<usize>,
    shared_list: bool,
    scanning   : bool,
    end        : bool,
    looped     : bool,
}

impl Tracker {
    pub fn new(chn: usize, shared_list: bool) -> Self {
        Tracker {
            done      : vec![false; chn],
            stopped   : vec![false; chn],
            visited   : Vec::new(),
            new_visits: Vec::new(),
            shared_list,
            scanning  : false,
            end       : false,
            looped    : false,
        }
    }

    pub fn scanning(chn: usize, shared_list: bool) -> Self {
        Tracker {
            scanning: true,
            ..Tracker::new(chn, shared_list)
        }
    }

    pub fn reset(&mut self) {
        self.done.iter_mut().for_each(|x| *x = false);
        self.stopped.iter_mut().for_each(|x| *x = false);
        self.visited.clear();
        self.new_visits.clear();
        self.end = false;
        self.looped = false;
    }

    pub fn channels(&self) -> usize {
        self.done.len()
    }

    pub(crate) fn channel_end(&mut self, chn: usize, looped: bool) {
        if let Some(d) = self.done.get_mut(chn) {
            *d = true;
        }
        if looped {
            self.looped = true;
        } else if let Some(s) = self.stopped.get_mut(chn) {
            *s = true;
        }

        // the song ends once every channel has reported; stopped channels
        // stay silent and count as done in the next round
        if self.done.iter().all(|&x| x) {
            self.end = true;
            self.done.copy_from_slice(&self.stopped);
        }
    }

    pub(crate) fn mark_visited(&mut self, pos: usize) -> bool {
        if pos >= self.visited.len() {
            self.visited.resize(pos + 1, false);
        }

        if self.visited[pos] {
            // re-entering a position of a shared list means we looped
            if self.scanning && self.shared_list {
                self.end = true;
                self.looped = true;
            }
            return true
        }

        self.visited[pos] = true;
        self.new_visits.push(pos);
        false
    }

    pub fn visited(&self, pos: usize) -> bool {
        self.visited.get(pos).cloned().unwrap_or(false)
    }

    pub fn visited_positions(&self) -> &[bool] {
        &self.visited
    }

    pub fn end(&self) -> bool {
        self.end
    }

    pub fn looped(&self) -> bool {
        self.looped
    }

    pub(crate) fn take_end(&mut self) -> bool {
        let end = self.end;
        self.end = false;
        end
    }

    /// Continue from a scan snapshot: channel flags and visits are taken
    /// over, the end is cleared.
    pub(crate) fn resume_from(&mut self, other: &Tracker) {
        self.done = other.done.clone();
        self.stopped = other.stopped.clone();
        self.visited = other.visited.clone();
        self.new_visits.clear();
        self.end = false;
        self.looped = false;
    }

    fn take_new_visits(&mut self) -> Vec<usize> {
        self.new_visits.drain(..).collect()
    }
}


/// Snapshot of the playing state taken right before the tick in which
/// a position was entered for the first time.
pub struct PositionInfo {
    pub position: usize,
    pub tick    : u64,
    pub state   : State,
    pub data    : PlayerData,
    pub tracker : Tracker,
}

pub struct DurationInfo {
    pub song          : usize,
    pub start_position: usize,
    pub ticks         : u64,
    pub looped        : bool,
    pub truncated     : bool,
    pub positions     : Vec<PositionInfo>,
}

impl DurationInfo {
    pub fn millis(&self) -> u64 {
        self.ticks * crate::TICK_MILLIS as u64
    }

    pub fn position_ticks(&self, pos: usize) -> Option<u64> {
        self.positions.iter().find(|p| p.position == pos).map(|p| p.tick)
    }
}


/// Dry-runs every sub-song of a module.
pub fn scan(entry: &dyn PlayerListEntry, module: &Module, options: &Options) -> Vec<DurationInfo> {
    let mut list = Vec::new();

    match module.data.layout() {
        SongLayout::SubSongs(num) => {
            for song in 0..num {
                let (info, _) = scan_song(entry, module, options, song, 0);
                list.push(info);
            }
        }
        SongLayout::Positions(len) => {
            let mut covered = vec![false; len];
            while let Some(pos) = covered.iter().position(|&x| !x) {
                let (info, visited) = scan_song(entry, module, options, list.len(), pos);
                covered[pos] = true;
                for (i, &v) in visited.iter().enumerate() {
                    if v && i < len {
                        covered[i] = true;
                    }
                }
                list.push(info);
            }
        }
    }

    for d in &list {
        info!("song {}: start {}, {} ticks ({} ms){}", d.song, d.start_position, d.ticks, d.millis(),
              if d.looped { ", loops" } else { "" });
    }

    list
}

fn scan_song(entry: &dyn PlayerListEntry, module: &Module, options: &Options,
             song: usize, pos: usize) -> (DurationInfo, Vec<bool>) {

    let shared = match module.data.layout() {
        SongLayout::SubSongs(_)  => false,
        SongLayout::Positions(_) => true,
    };

    let mut player = entry.player(module, options);
    let mut data = PlayerData { song, pos, ..PlayerData::new() };
    let mut tracker = Tracker::scanning(module.channels(), shared);
    let mut sink = NullSink;
    let mut notifier = NullNotifier;
    let mut positions = Vec::new();

    {
        let mut ctx = Context::new(&mut sink, &mut notifier, &mut tracker);
        player.start(&mut data, &*module.data, &mut ctx);
    }

    for p in tracker.take_new_visits() {
        positions.push(PositionInfo {
            position: p,
            tick    : 0,
            state   : player.save_state(),
            data    : data.clone(),
            tracker : tracker.clone(),
        });
    }

    let mut ticks = 0;
    let mut truncated = false;

    loop {
        if ticks >= MAX_SCAN_TICKS {
            warn!("song {} still playing after {} ticks, giving up", song, ticks);
            truncated = true;
            break
        }

        let before = player.save_state();
        let before_data = data.clone();
        let before_tracker = tracker.clone();

        {
            let mut ctx = Context::new(&mut sink, &mut notifier, &mut tracker);
            player.play(&mut data, &*module.data, &mut ctx);
        }

        if tracker.end() {
            break
        }

        let mut before = Some(before);
        for p in tracker.take_new_visits() {
            let state = before.take().unwrap_or_else(|| player.save_state());
            positions.push(PositionInfo {
                position: p,
                tick    : ticks,
                state,
                data    : before_data.clone(),
                tracker : before_tracker.clone(),
            });
        }

        ticks += 1;
    }

    debug!("scan song {} from {}: {} ticks, {} positions", song, pos, ticks, positions.len());

    let info = DurationInfo {
        song,
        start_position: pos,
        ticks,
        looped: tracker.looped() && !truncated,
        truncated,
        positions,
    };

    (info, tracker.visited_positions().to_vec())
}
