use std::fmt;

/// Receiver of the per-channel commands emitted by a format engine.
///
/// Every call is made synchronously from inside a tick. Volumes use
/// the scale declared by the player (`PlayerInfo::volume_max`).
pub trait OutputSink {
    fn trigger(&mut self, chn: usize, sample: usize, data: &[i8], offset: u32, length: u32);
    fn set_loop(&mut self, chn: usize, start: u32, length: u32);
    fn play_release(&mut self, chn: usize, start: u32, length: u32);
    fn update_waveform(&mut self, chn: usize, data: &[i8]);
    fn set_period(&mut self, chn: usize, period: u32);
    fn set_volume(&mut self, chn: usize, volume: u32);
    fn set_panning(&mut self, chn: usize, pan: u32);
    fn mute(&mut self, chn: usize);
    fn set_filter(&mut self, on: bool);
}

/// Sink that discards everything, used for dry runs.
pub struct NullSink;

impl OutputSink for NullSink {
    fn trigger(&mut self, _: usize, _: usize, _: &[i8], _: u32, _: u32) {}
    fn set_loop(&mut self, _: usize, _: u32, _: u32) {}
    fn play_release(&mut self, _: usize, _: u32, _: u32) {}
    fn update_waveform(&mut self, _: usize, _: &[i8]) {}
    fn set_period(&mut self, _: usize, _: u32) {}
    fn set_volume(&mut self, _: usize, _: u32) {}
    fn set_panning(&mut self, _: usize, _: u32) {}
    fn mute(&mut self, _: usize) {}
    fn set_filter(&mut self, _: bool) {}
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Trigger { chn: usize, sample: usize, offset: u32, length: u32, data: Vec<i8> },
    Loop { chn: usize, start: u32, length: u32 },
    Release { chn: usize, start: u32, length: u32 },
    Waveform { chn: usize, data: Vec<i8> },
    Period { chn: usize, period: u32 },
    Volume { chn: usize, volume: u32 },
    Pan { chn: usize, pan: u32 },
    Mute { chn: usize },
    Filter { on: bool },
}

impl SinkEvent {
    pub fn channel(&self) -> Option<usize> {
        match *self {
            SinkEvent::Trigger { chn, .. }  |
            SinkEvent::Loop { chn, .. }     |
            SinkEvent::Release { chn, .. }  |
            SinkEvent::Waveform { chn, .. } |
            SinkEvent::Period { chn, .. }   |
            SinkEvent::Volume { chn, .. }   |
            SinkEvent::Pan { chn, .. }      |
            SinkEvent::Mute { chn }         => Some(chn),
            SinkEvent::Filter { .. }        => None,
        }
    }
}

impl fmt::Display for SinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SinkEvent::Trigger { chn, sample, offset, length, .. } =>
                write!(f, "{}: trigger {:02x} @{} len {}", chn, sample, offset, length),
            SinkEvent::Loop { chn, start, length }    => write!(f, "{}: loop {} len {}", chn, start, length),
            SinkEvent::Release { chn, start, length } => write!(f, "{}: release {} len {}", chn, start, length),
            SinkEvent::Waveform { chn, data }         => write!(f, "{}: waveform ({} bytes)", chn, data.len()),
            SinkEvent::Period { chn, period }         => write!(f, "{}: period {}", chn, period),
            SinkEvent::Volume { chn, volume }         => write!(f, "{}: volume {}", chn, volume),
            SinkEvent::Pan { chn, pan }               => write!(f, "{}: pan {}", chn, pan),
            SinkEvent::Mute { chn }                   => write!(f, "{}: mute", chn),
            SinkEvent::Filter { on }                  => write!(f, "filter {}", if *on { "on" } else { "off" }),
        }
    }
}


/// Sink that records every call.
///
/// With coalescing enabled a period or volume write equal to the last
/// value written to the same channel is dropped, so the log only shows
/// register changes.
#[derive(Default)]
pub struct EventLog {
    pub events : Vec<SinkEvent>,
    coalesce   : bool,
    last_period: Vec<Option<u32>>,
    last_volume: Vec<Option<u32>>,
}

impl EventLog {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn coalescing() -> Self {
        EventLog {
            coalesce: true,
            ..Default::default()
        }
    }

    /// Drain the events recorded so far.
    pub fn take(&mut self) -> Vec<SinkEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn changed(last: &mut Vec<Option<u32>>, chn: usize, val: u32) -> bool {
        if chn >= last.len() {
            last.resize(chn + 1, None);
        }
        if last[chn] == Some(val) {
            return false
        }
        last[chn] = Some(val);
        true
    }

    fn forget(&mut self, chn: usize) {
        if let Some(v) = self.last_period.get_mut(chn) { *v = None }
        if let Some(v) = self.last_volume.get_mut(chn) { *v = None }
    }
}

impl OutputSink for EventLog {
    fn trigger(&mut self, chn: usize, sample: usize, data: &[i8], offset: u32, length: u32) {
        self.events.push(SinkEvent::Trigger { chn, sample, offset, length, data: data.to_vec() });
    }

    fn set_loop(&mut self, chn: usize, start: u32, length: u32) {
        self.events.push(SinkEvent::Loop { chn, start, length });
    }

    fn play_release(&mut self, chn: usize, start: u32, length: u32) {
        self.events.push(SinkEvent::Release { chn, start, length });
    }

    fn update_waveform(&mut self, chn: usize, data: &[i8]) {
        self.events.push(SinkEvent::Waveform { chn, data: data.to_vec() });
    }

    fn set_period(&mut self, chn: usize, period: u32) {
        if !self.coalesce || Self::changed(&mut self.last_period, chn, period) {
            self.events.push(SinkEvent::Period { chn, period });
        }
    }

    fn set_volume(&mut self, chn: usize, volume: u32) {
        if !self.coalesce || Self::changed(&mut self.last_volume, chn, volume) {
            self.events.push(SinkEvent::Volume { chn, volume });
        }
    }

    fn set_panning(&mut self, chn: usize, pan: u32) {
        self.events.push(SinkEvent::Pan { chn, pan });
    }

    fn mute(&mut self, chn: usize) {
        self.forget(chn);
        self.events.push(SinkEvent::Mute { chn });
    }

    fn set_filter(&mut self, on: bool) {
        self.events.push(SinkEvent::Filter { on });
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_records_calls() {
        let mut log = EventLog::new();
        log.trigger(1, 3, &[1, 2, 3], 0, 3);
        log.set_period(1, 428);
        log.set_period(1, 428);
        assert_eq!(log.len(), 3);
        assert_eq!(log.events[0].channel(), Some(1));
        assert_eq!(log.take().len(), 3);
        assert!(log.is_empty());
    }

    #[test]
    fn test_event_log_coalescing() {
        let mut log = EventLog::coalescing();
        log.set_period(0, 428);
        log.set_period(0, 428);
        log.set_volume(0, 64);
        log.set_volume(1, 64);
        log.set_volume(0, 64);
        assert_eq!(log.events, vec![
            SinkEvent::Period { chn: 0, period: 428 },
            SinkEvent::Volume { chn: 0, volume: 64 },
            SinkEvent::Volume { chn: 1, volume: 64 },
        ]);

        // a mute drops what the channel registers held
        log.mute(0);
        log.set_volume(0, 64);
        assert_eq!(log.events.len(), 5);
    }

    #[test]
    fn test_event_display() {
        let ev = SinkEvent::Period { chn: 2, period: 214 };
        assert_eq!(ev.to_string(), "2: period 214");
    }
}
