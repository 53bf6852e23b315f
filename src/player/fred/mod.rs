mod player;

use crate::module::Module;
use crate::player::{Options, PlayerListEntry, PlayerInfo, FormatPlayer};

pub struct Fred;

impl PlayerListEntry for Fred {
   fn info(&self) -> PlayerInfo {
       PlayerInfo {
          id         : "fred",
          name       : "Fred Editor replayer",
          description: "Sample and synth replayer for Frederic Hahn's Fred Editor",
          author     : "Claudio Matsuoka",
          accepts    : &[ "fred" ],
          volume_max : 64,
       }
   }

   fn player(&self, module: &Module, options: &Options) -> Box<dyn FormatPlayer> {
       Box::new(self::player::FredPlayer::new(module, options))
   }
}
