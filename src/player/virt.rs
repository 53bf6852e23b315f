use crate::player::sink::OutputSink;

/// Register state of one Paula-style voice.
#[derive(Debug, Clone, Default)]
pub struct Voice {
    pub sample     : Option<usize>,
    pub data       : Vec<i8>,
    pub offset     : u32,
    pub length     : u32,
    pub loop_start : u32,
    pub loop_length: u32,
    pub release    : Option<(u32, u32)>,
    pub period     : u32,
    pub volume     : u32,
    pub pan        : u32,
    pub active     : bool,
    pub retrig     : bool,  // set by trigger, cleared by frame_done()
}

/// Virtual channel register bank.
///
/// Keeps the last value written to each voice register so a mixer (or
/// a display) can read the channel state after every tick.
pub struct Virtual {
    voice     : Vec<Voice>,
    filter    : bool,
    volume_max: u32,
}

impl Virtual {
    pub fn new(chn: usize, volume_max: u32) -> Self {
        let mut voice = vec![Voice::default(); chn];
        voice.iter_mut().for_each(|v| v.pan = 128);
        Virtual {
            voice,
            filter: false,
            volume_max: volume_max.max(1),
        }
    }

    pub fn channels(&self) -> usize {
        self.voice.len()
    }

    pub fn voice(&self, chn: usize) -> Option<&Voice> {
        self.voice.get(chn)
    }

    pub fn filter(&self) -> bool {
        self.filter
    }

    /// Voice volume scaled to 0..=255.
    pub fn volume(&self, chn: usize) -> u32 {
        match self.voice.get(chn) {
            Some(v) if v.active => (v.volume.min(self.volume_max) * 255) / self.volume_max,
            _                   => 0,
        }
    }

    pub fn frame_done(&mut self) {
        self.voice.iter_mut().for_each(|v| v.retrig = false);
    }

    pub fn reset(&mut self) {
        for v in self.voice.iter_mut() {
            let pan = v.pan;
            *v = Voice::default();
            v.pan = pan;
        }
        self.filter = false;
    }

    fn voice_mut(&mut self, chn: usize) -> Option<&mut Voice> {
        self.voice.get_mut(chn)
    }
}

impl OutputSink for Virtual {
    fn trigger(&mut self, chn: usize, sample: usize, data: &[i8], offset: u32, length: u32) {
        let v = try_option!(self.voice_mut(chn));
        v.sample = Some(sample);
        v.data.clear();
        v.data.extend_from_slice(data);
        v.offset      = offset;
        v.length      = length;
        v.loop_start  = 0;
        v.loop_length = 0;
        v.release     = None;
        v.active      = true;
        v.retrig      = true;
    }

    fn set_loop(&mut self, chn: usize, start: u32, length: u32) {
        let v = try_option!(self.voice_mut(chn));
        v.loop_start  = start;
        v.loop_length = length;
    }

    fn play_release(&mut self, chn: usize, start: u32, length: u32) {
        let v = try_option!(self.voice_mut(chn));
        v.release = Some((start, length));
    }

    fn update_waveform(&mut self, chn: usize, data: &[i8]) {
        let v = try_option!(self.voice_mut(chn));
        let n = data.len().min(v.data.len());
        v.data[..n].copy_from_slice(&data[..n]);
    }

    fn set_period(&mut self, chn: usize, period: u32) {
        let v = try_option!(self.voice_mut(chn));
        v.period = period;
    }

    fn set_volume(&mut self, chn: usize, volume: u32) {
        let v = try_option!(self.voice_mut(chn));
        v.volume = volume;
    }

    fn set_panning(&mut self, chn: usize, pan: u32) {
        let v = try_option!(self.voice_mut(chn));
        v.pan = pan;
    }

    fn mute(&mut self, chn: usize) {
        let v = try_option!(self.voice_mut(chn));
        v.active = false;
    }

    fn set_filter(&mut self, on: bool) {
        self.filter = on;
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registers() {
        let mut virt = Virtual::new(4, 64);
        virt.trigger(1, 2, &[0, 10, 20, 30], 0, 4);
        virt.set_loop(1, 2, 2);
        virt.set_period(1, 428);
        virt.set_volume(1, 32);

        let v = virt.voice(1).unwrap();
        assert_eq!(v.sample, Some(2));
        assert_eq!((v.loop_start, v.loop_length), (2, 2));
        assert_eq!(v.period, 428);
        assert!(v.retrig);
        assert_eq!(virt.volume(1), 127);

        virt.frame_done();
        assert!(!virt.voice(1).unwrap().retrig);

        virt.mute(1);
        assert_eq!(virt.volume(1), 0);
    }

    #[test]
    fn test_out_of_range_channel() {
        let mut virt = Virtual::new(4, 256);
        virt.set_period(9, 428);
        virt.trigger(4, 0, &[], 0, 0);
        assert!(virt.voice(9).is_none());
        assert_eq!(virt.volume(9), 0);
    }

    #[test]
    fn test_waveform_update_keeps_length() {
        let mut virt = Virtual::new(1, 256);
        virt.trigger(0, 0, &[0; 4], 0, 4);
        virt.update_waveform(0, &[1, 2, 3, 4, 5, 6]);
        assert_eq!(virt.voice(0).unwrap().data, vec![1, 2, 3, 4]);
    }
}
