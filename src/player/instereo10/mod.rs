mod player;

use crate::module::Module;
use crate::player::{Options, PlayerListEntry, PlayerInfo, FormatPlayer};

pub struct InStereo10;

impl PlayerListEntry for InStereo10 {
   fn info(&self) -> PlayerInfo {
       PlayerInfo {
          id         : "is10",
          name       : "InStereo! 1.0 replayer",
          description: "Replayer for InStereo! 1.0 synth and sample modules",
          author     : "Claudio Matsuoka",
          accepts    : &[ "is10" ],
          volume_max : 64,
       }
   }

   fn player(&self, module: &Module, options: &Options) -> Box<dyn FormatPlayer> {
       Box::new(self::player::Is10Player::new(module, options))
   }
}
