use crate::util;

/// A PCM sample as stored in the module, signed 8-bit.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    pub num        : usize,
    pub name       : String,
    pub size       : u32,
    pub loop_start : u32,
    pub loop_length: u32,   // 0 = no loop
    pub volume     : u32,
    pub data       : Vec<i8>,
}

impl Sample {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn has_loop(&self) -> bool {
        self.loop_length != 0
    }

    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn store(&mut self, b: &[u8]) {
        self.data = util::to_pcm8(b);
    }
}
