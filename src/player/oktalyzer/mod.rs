mod player;

use crate::module::Module;
use crate::player::{Options, PlayerListEntry, PlayerInfo, FormatPlayer};

pub struct Oktalyzer;

impl PlayerListEntry for Oktalyzer {
   fn info(&self) -> PlayerInfo {
       PlayerInfo {
          id         : "okt",
          name       : "Oktalyzer replayer",
          description: "Replayer for Armin Sander's 8-channel Oktalyzer",
          author     : "Claudio Matsuoka",
          accepts    : &[ "okt" ],
          volume_max : 256,
       }
   }

   fn player(&self, module: &Module, options: &Options) -> Box<dyn FormatPlayer> {
       Box::new(self::player::OktPlayer::new(module, options))
   }
}
