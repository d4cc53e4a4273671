//! Command line front end for the Aulos library.

mod args;

use std::process::ExitCode;

use clap::ArgMatches;
use log::LevelFilter;

use aulos_lib::{
    create_decoder, last_error, messages, open_song_file, settings_table, ConfigContext,
    MidiDevice, SampleFormat,
};

fn main() -> ExitCode {
    let matches = args::build_cli().get_matches();

    let level = match matches.get_count("verbose") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    messages::init_default(level);

    let result = match matches.subcommand() {
        Some(("identify", sub)) => identify(sub),
        Some(("decode", sub)) => decode(sub),
        Some(("settings", _)) => settings(),
        _ => unreachable!("subcommand is required"),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {}", message);
            ExitCode::FAILURE
        }
    }
}

fn identify(matches: &ArgMatches) -> Result<(), String> {
    let path = matches.get_one::<String>("FILE").expect("required arg");
    let device_id: i32 = matches
        .get_one::<String>("device")
        .expect("defaulted arg")
        .parse()
        .map_err(|_| "device must be an integer id".to_string())?;
    let device = MidiDevice::from_id(device_id)
        .ok_or_else(|| format!("unknown device id {}", device_id))?;

    let config = ConfigContext::new();
    let song = open_song_file(path, device, &config).map_err(|_| last_error())?;

    let stats: serde_json::Value =
        serde_json::from_str(&song.stats()).unwrap_or(serde_json::Value::Null);
    let report = serde_json::json!({
        "file": path,
        "is_midi": song.is_midi(),
        "device": song.device_type().id(),
        "stream_info": song.stream_info(),
        "stats": stats,
    });
    println!("{}", serde_json::to_string_pretty(&report).expect("serialize"));
    Ok(())
}

fn decode(matches: &ArgMatches) -> Result<(), String> {
    let input = matches.get_one::<String>("FILE").expect("required arg");
    let output = matches.get_one::<String>("OUTPUT").expect("required arg");

    let data = std::fs::read(input).map_err(|err| format!("cannot read {}: {}", input, err))?;
    let mut decoder =
        create_decoder(data).ok_or_else(|| format!("no codec accepted {}", input))?;
    let info = decoder.info();
    let decoded = decoder.read_all();

    let spec = hound::WavSpec {
        channels: info.channel_layout.channel_count() as u16,
        sample_rate: info.sample_rate,
        bits_per_sample: match info.sample_format {
            SampleFormat::UInt8 => 8,
            SampleFormat::Int16 => 16,
            SampleFormat::Float32 => 32,
        },
        sample_format: match info.sample_format {
            SampleFormat::Float32 => hound::SampleFormat::Float,
            _ => hound::SampleFormat::Int,
        },
    };
    let mut writer =
        hound::WavWriter::create(output, spec).map_err(|err| err.to_string())?;
    match info.sample_format {
        SampleFormat::Float32 => {
            for chunk in decoded.chunks_exact(4) {
                let sample = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                writer.write_sample(sample).map_err(|err| err.to_string())?;
            }
        }
        SampleFormat::Int16 => {
            for chunk in decoded.chunks_exact(2) {
                let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
                writer.write_sample(sample).map_err(|err| err.to_string())?;
            }
        }
        SampleFormat::UInt8 => {
            for byte in &decoded {
                let sample = (*byte as i16 - 128) as i8;
                writer.write_sample(sample).map_err(|err| err.to_string())?;
            }
        }
    }
    writer.finalize().map_err(|err| err.to_string())?;

    log::info!(
        "decoded {} bytes of PCM ({} Hz) into {}",
        decoded.len(),
        info.sample_rate,
        output
    );
    Ok(())
}

fn settings() -> Result<(), String> {
    for entry in settings_table() {
        if entry.name.is_empty() {
            break; // sentinel
        }
        println!(
            "{:40} id {:4}  {:5}  default {}",
            entry.name,
            entry.identifier,
            format!("{:?}", entry.kind),
            entry.default
        );
    }
    Ok(())
}
