use std::error::Error;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use tempera_core::config::Config;
use tempera_core::dispatcher::Dispatcher;
use tempera_core::emitter::EmitterPool;
use tempera_core::global::GlobalControls;
use tempera_core::midi::sink::{available_output_ports, MidiPortSink};
use tempera_core::midi::GlobalParam;
use tempera_core::sequencer::{BankedSequencer, LinearSequencer, Sequencer, SequencerOptions, Timing};
use tempera_types::{BankId, EmitterId, GrainParams};

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tempera")
        .join("tempera.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = File::create(&log_path).unwrap_or_else(|_| {
        File::create("/tmp/tempera.log").expect("Cannot create log file")
    });

    let mut loggers: Vec<Box<dyn SharedLogger>> =
        vec![WriteLogger::new(log_level, Config::default(), log_file)];
    if verbose {
        loggers.push(TermLogger::new(
            log_level,
            Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ));
    }
    CombinedLogger::init(loggers).expect("Failed to initialize logger");

    log::info!("tempera-demo starting (log level: {:?})", log_level);
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let config = match arg_value(&args, "--config") {
        Some(path) => Config::load_with_override(&PathBuf::from(path)),
        None => Config::load(),
    };
    let mut midi = config.midi();

    if args.iter().any(|a| a == "--list-ports") {
        for name in available_output_ports(&midi.client_name) {
            println!("{}", name);
        }
        return Ok(());
    }

    if let Some(port) = arg_value(&args, "--port") {
        midi.port = port.to_string();
    }
    if args.iter().any(|a| a == "--virtual") {
        midi.virtual_port = true;
    }
    let banked = args.iter().any(|a| a == "--banked");
    let loops: u32 = arg_value(&args, "--loops").map(str::parse::<u32>).transpose()?.unwrap_or(2);
    let timing = match arg_value(&args, "--bpm") {
        Some(bpm) => Timing::tempo(bpm.parse()?, 4.0),
        None => Timing::StepDuration(config.playback().step_duration),
    };
    let options = SequencerOptions::from_config(&config);

    let sink = Box::new(MidiPortSink::from_settings(&midi));
    Dispatcher::with_session(sink, |dispatcher| -> Result<(), Box<dyn Error>> {
        let pool = Arc::new(EmitterPool::new(Arc::clone(dispatcher), config.playback())?);
        let globals = GlobalControls::from_settings(Arc::clone(dispatcher), &midi)?;
        voice(&pool, &globals)?;

        if banked {
            let seq = BankedSequencer::new(pool, timing, options)?;
            seq.set_column_pattern(BankId::new(1), [(1, EmitterId::new(1)), (5, EmitterId::new(1))].into())?;
            seq.set_column_pattern(BankId::new(2), [(3, EmitterId::new(2))].into())?;
            seq.set_column_mute_pattern(BankId::new(2), vec![false, true])?;
            seq.set_column_pattern(BankId::new(3), [(2, EmitterId::new(3)), (6, EmitterId::new(4))].into())?;
            seq.set_column_length(BankId::new(3), 6)?;
            play(&seq, loops)
        } else {
            let seq = LinearSequencer::new(pool, timing, options)?;
            seq.dispatch_json(
                r#"{"action": "set_pattern", "pattern": {"0": 1, "4": 2, "9": 3, "14": 4}}"#,
            )?;
            play(&seq, loops)
        }
    })??;

    log::info!("tempera-demo finished");
    Ok(())
}

/// Give the emitters a starting sound.
fn voice(pool: &EmitterPool, globals: &GlobalControls) -> Result<(), Box<dyn Error>> {
    for (handle, volume) in pool.handles().iter().zip([110, 100, 90, 80]) {
        let _ = handle.volume(volume)?;
        let _ = handle.grain(&GrainParams {
            density: Some(64),
            length_cell: Some(48),
            ..Default::default()
        })?;
    }
    let _ = globals.set(GlobalParam::ReverbMix, 40)?;
    let _ = globals.set(GlobalParam::ReverbSize, 90)?;
    pool.handle(EmitterId::new(1))?.set_active()?.wait()?;
    Ok(())
}

fn play<S: Sequencer>(seq: &S, loops: u32) -> Result<(), Box<dyn Error>> {
    let result = seq.run(loops);
    seq.cleanup()?;
    Ok(result?)
}
