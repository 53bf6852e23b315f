mod player;

use crate::module::Module;
use crate::player::{Options, PlayerListEntry, PlayerInfo, FormatPlayer};

pub struct Amos;

impl PlayerListEntry for Amos {
   fn info(&self) -> PlayerInfo {
       PlayerInfo {
          id         : "abk",
          name       : "AMOS Music Bank replayer",
          description: "Based on the music extension of AMOS Basic by François Lionet",
          author     : "Claudio Matsuoka",
          accepts    : &[ "abk" ],
          volume_max : 64,
       }
   }

   fn player(&self, module: &Module, options: &Options) -> Box<dyn FormatPlayer> {
       Box::new(self::player::AmosPlayer::new(module, options))
   }
}
