mod player;

use crate::module::Module;
use crate::player::{Options, PlayerListEntry, PlayerInfo, FormatPlayer};

pub struct SoundMon;

impl PlayerListEntry for SoundMon {
   fn info(&self) -> PlayerInfo {
       PlayerInfo {
          id         : "bp",
          name       : "SoundMon replayer",
          description: "Replayer for Brian Postma's SoundMon 1.1 and 2.2",
          author     : "Claudio Matsuoka",
          accepts    : &[ "bp" ],
          volume_max : 256,
       }
   }

   fn player(&self, module: &Module, options: &Options) -> Box<dyn FormatPlayer> {
       Box::new(self::player::BpPlayer::new(module, options))
   }
}
