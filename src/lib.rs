#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

#[macro_use]
pub mod util;

pub mod format;
pub mod module;
pub mod player;

pub use crate::player::{Player, PlayerData, Options};
pub use crate::util::BinaryRead;

use std::io;
use thiserror::Error as ThisError;

pub const PERIOD_BASE  : f64 = 13696.0;  // C0 period
pub const MIN_PERIOD   : u32 = 113;      // B-3
pub const MAX_PERIOD   : u32 = 856;      // C-1
pub const TICK_MILLIS  : u32 = 20;       // 50 Hz vertical blank
pub const TICK_RATE    : u32 = 50;

pub struct Oxseq {
    pub module   : module::Module,
    pub player_id: String,
}

impl Oxseq {
    pub fn new(b: &[u8], player_id: &str) -> Result<Self, Error> {
        let module = format::load(b, player_id)?;
        let id = if player_id.is_empty() { module.player } else { player_id };

        // make sure the player exists before handing the module back
        player::list_by_id(id)?;

        Ok(Oxseq {
            player_id: id.to_owned(),
            module,
        })
    }

    pub fn module(&self) -> &module::Module {
        &self.module
    }

    pub fn player_info(&self) -> Result<player::PlayerInfo, Error> {
        Ok(player::list_by_id(&self.player_id)?.info())
    }

    pub fn player(&self, options: &str) -> Result<player::Player<'_>, Error> {
        player::Player::find(&self.module, &self.player_id, options)
    }
}


#[derive(Debug, ThisError)]
pub enum Error {
    #[error("{0}")]
    Format(String),
    #[error("{0}")]
    Load(String),
    #[error("{0}")]
    Player(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_module() {
        assert!(Oxseq::new(b"not a module", "").is_err());
    }

    #[test]
    fn test_error_display() {
        let e = Error::Load("short read at offset 12".to_owned());
        assert_eq!(e.to_string(), "short read at offset 12");
    }
}
