use crate::module::Module;
use crate::Error;

pub mod abk;
pub mod fred;
pub mod bp;
pub mod okt;
pub mod is10;

// Supported formats

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Format {
    Abk,
    Fred,
    SoundMon11,
    SoundMon22,
    Okt,
    InStereo10,
}

pub struct ProbeInfo {
    pub format: Format,
    pub title : String,
}

// Trait for module loader

pub trait Loader {
    fn name(&self) -> &'static str;
    fn probe(&self, b: &[u8], player_id: &str) -> Result<ProbeInfo, Error>;
    fn load(self: Box<Self>, b: &[u8], info: ProbeInfo) -> Result<Module, Error>;
}


pub fn list() -> Vec<Box<dyn Loader>> {
    vec![
        Box::new(abk::AbkLoader),
        Box::new(fred::FredLoader),
        Box::new(bp::BpLoader),
        Box::new(okt::OktLoader),
        Box::new(is10::Is10Loader),
    ]
}

pub fn load(b: &[u8], player_id: &str) -> Result<Module, Error> {

    for f in list() {
        debug!("probing format: {}", f.name());

        let info = match f.probe(b, player_id) {
            Ok(val) => val,
            Err(e)  => {
                trace!("{}: {}", f.name(), e);
                continue
            }
        };

        debug!("probe ok, load format {:?} ({:?})", info.format, info.title);
        return f.load(b, info)
    }

    Err(Error::Format("unsupported module format".to_owned()))
}


#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(b: &mut Vec<u8>, name: &[u8; 4], body: &[u8]) {
        b.extend_from_slice(name);
        b.extend_from_slice(&(body.len() as u32).to_be_bytes());
        b.extend_from_slice(body);
    }

    fn okt_module() -> Vec<u8> {
        let mut b = b"OKTASONG".to_vec();
        chunk(&mut b, b"CMOD", &[0; 8]);
        chunk(&mut b, b"SAMP", &[0; 36 * 32]);
        chunk(&mut b, b"SPEE", &[0, 6]);
        chunk(&mut b, b"SLEN", &[0, 1]);
        chunk(&mut b, b"PLEN", &[0, 1]);
        chunk(&mut b, b"PATT", &[0; 128]);
        let mut body = vec![0, 64];
        body.resize(2 + 64 * 4 * 4, 0);
        chunk(&mut b, b"PBOD", &body);
        b
    }

    #[test]
    fn test_load_probes_formats() {
        let module = load(&okt_module(), "").unwrap();
        assert_eq!(module.format, "okt");
        assert_eq!(module.player, "okt");
        assert_eq!(module.channels(), 4);
    }

    #[test]
    fn test_load_rejects_unknown_data() {
        match load(&[0; 2048], "") {
            Err(Error::Format(_)) => {},
            _ => panic!("garbage loaded"),
        }
    }

    #[test]
    fn test_load_with_player() {
        assert!(load(&okt_module(), "okt").is_ok());
        assert!(load(&okt_module(), "fred").is_err());
    }
}
