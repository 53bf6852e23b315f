extern crate getopts;
extern crate log;
extern crate oxseq;

use std::env;
use std::error::Error;
use std::fs;
use getopts::{Matches, Options};
use log::{LevelFilter, Log, Metadata, Record};
use oxseq::player::{self, EventLog, Notifier, SinkEvent};
use oxseq::{Oxseq, module, util};

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{:5} {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

struct PrintNotifier;

impl Notifier for PrintNotifier {
    fn end_reached(&mut self, chn: usize) {
        println!("-- end reached on channel {}", chn);
    }

    fn module_info_changed(&mut self, line: usize, value: &str) {
        println!("-- info line {}: {}", line, value);
    }
}

fn main() {

    let args: Vec<String> = env::args().collect();
    let mut opts = Options::new();

    opts.optflag("h", "help", "display usage information and exit");
    opts.optflag("i", "info", "show module information");
    opts.optflag("d", "duration", "scan and show the sub-song durations");
    opts.optopt("t", "ticks", "dump the output of N ticks", "N");
    opts.optopt("s", "song", "play the given sub-song", "N");
    opts.optopt("p", "player", "use the given player", "ID");
    opts.optopt("o", "options", "player options (key=value,...)", "OPTS");
    opts.optflagmulti("v", "verbose", "increase log verbosity");
    opts.optflag("l", "list", "list the available players");

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(e) => {
            println!("{}", e);
            return;
        }
    };

    let level = match matches.opt_count("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }

    if matches.opt_present("l") {
        list_players();
        return;
    }

    if matches.opt_present("h") || matches.free.is_empty() {
        let brief = format!("Usage: {} [options] filename", args[0]);
        print!("{}", opts.usage(&brief));
        return;
    }

    match run(&matches.free[0], &matches) {
        Ok(_)  => {},
        Err(e) => println!("Error: {}", e),
    }
}

fn list_players() {
    println!("ID    Player                      Formats");
    for p in player::list() {
        let info = p.info();
        println!("{:5} {:27} {}", info.id, info.name, info.accepts.join(", "));
    }
}

fn run(name: &str, matches: &Matches) -> Result<(), Box<dyn Error>> {
    let b = fs::read(name)?;

    let player_id = matches.opt_str("p").unwrap_or_default();
    let oxseq = Oxseq::new(&b, &player_id)?;
    let info = oxseq.player_info()?;

    println!("Title  : {}", oxseq.module().title());
    println!("Format : {}", oxseq.module().description);
    println!("Player : {} ({})", info.name, info.id);

    if matches.opt_present("i") {
        show_info(oxseq.module());
    }

    let options = matches.opt_str("o").unwrap_or_default();
    let mut player = oxseq.player(&options)?;
    player.start();

    if matches.opt_present("i") {
        for (label, value) in player.module_info() {
            println!("{:16}: {}", label, value);
        }
    }

    if matches.opt_present("d") {
        for d in player.scan() {
            let secs = d.millis() / 1000;
            println!("Song {:2}: start {:3}, {:3}:{:02}.{:03}{}{}", d.song, d.start_position,
                     secs / 60, secs % 60, d.millis() % 1000,
                     if d.looped { " (loops)" } else { "" },
                     if d.truncated { " (truncated)" } else { "" });
        }
    }

    if let Some(song) = matches.opt_str("s") {
        player.set_song(song.parse()?)?;
    }

    if let Some(ticks) = matches.opt_str("t") {
        let ticks: usize = ticks.parse()?;
        player.set_notifier(Box::new(PrintNotifier));

        let mut log = EventLog::coalescing();
        for tick in 0..ticks {
            player.play_frame_into(&mut log);
            println!("tick {:5} pos {:3} row {:3}", tick, player.position(), player.data.row);
            for ev in log.take() {
                match &ev {
                    SinkEvent::Period { period, .. } => {
                        println!("    {} ({})", ev, util::note_name(util::period_to_note(*period)));
                    }
                    _ => println!("    {}", ev),
                }
            }
            if player.end() {
                println!("-- song end after {} ticks", player.ticks());
                break;
            }
        }
    }

    Ok(())
}

fn show_info(module: &module::Module) {
    println!("Channels: {}", module.channels());
    println!("Songs   : {}", module.songs());

    println!("Instruments:");
    for (i, name) in module.data.instruments().iter().enumerate() {
        println!("{:3}: {}", i, name);
    }

    println!("Samples:");
    for smp in module.data.samples() {
        println!("{:3}: {:30} {:6} {:6} {:6} {}",
            smp.num, smp.name, smp.size, smp.loop_start, smp.loop_length,
            if smp.has_loop() { 'L' } else { ' ' });
    }
}
