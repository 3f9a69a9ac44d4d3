//! modplay CLI — plays MOD/S3M modules or renders them to WAV.
//!
//! Usage:
//!   mp-cli song.mod [-hz 44100] [-boost 1] [-start 0]
//!          [-reverb light|medium|hall|none] [-wav out.wav]

use std::io::Write;
use std::{env, fs, process};

use mp_master::{Controller, ReverbPreset};

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    let Some(path) = args.first().filter(|a| !a.starts_with('-')).cloned() else {
        eprintln!(
            "Usage: mp-cli <file.mod|file.s3m> [-hz n] [-boost 1-4] [-start order] \
             [-reverb light|medium|hall|none] [-wav out.wav]"
        );
        process::exit(1);
    };

    let sample_rate: u32 = flag_value(&args, "-hz")
        .map(|v| parse_or_die(&v, "-hz"))
        .unwrap_or(44100);
    let boost: i32 = flag_value(&args, "-boost")
        .map(|v| parse_or_die(&v, "-boost"))
        .unwrap_or(1);
    let start_order: i32 = flag_value(&args, "-start")
        .map(|v| parse_or_die(&v, "-start"))
        .unwrap_or(0);
    let reverb = match flag_value(&args, "-reverb") {
        Some(name) => ReverbPreset::from_name(&name).unwrap_or_else(|| {
            eprintln!("Unknown reverb preset '{}'", name);
            process::exit(1);
        }),
        None => ReverbPreset::None,
    };
    let wav_path = flag_value(&args, "-wav");

    let data = fs::read(&path).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {}", path, e);
        process::exit(1);
    });

    let mut controller = Controller::new();
    controller.load(&data).unwrap_or_else(|e| {
        eprintln!("Failed to load {}: {}", path, e);
        process::exit(1);
    });
    controller.set_volume_boost(boost).unwrap_or_else(|e| {
        eprintln!("{}", e);
        process::exit(1);
    });
    controller.set_start_order(start_order);
    controller.set_reverb(reverb);

    let song = controller.song().expect("song was just loaded");
    println!("Title:    {}", song.title);
    println!("Channels: {}", song.channels);
    println!("Patterns: {}", song.patterns.len());
    println!("Orders:   {}", song.orders.len());
    println!("Tempo:    {} BPM, Speed: {}", song.tempo, song.speed);
    let with_data = song.samples.iter().filter(|s| !s.is_empty()).count();
    println!("Samples:  {} (with data)", with_data);
    println!();
    print!("{}", mp_ir::analyze(song));
    println!();

    match wav_path {
        Some(out) => render_to_wav(&controller, &out, sample_rate),
        None => play_audio(&mut controller),
    }
}

/// Find the value following a `-flag` argument.
fn flag_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn parse_or_die<T: std::str::FromStr>(value: &str, flag: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        eprintln!("Invalid value '{}' for {}", value, flag);
        process::exit(1);
    })
}

fn play_audio(controller: &mut Controller) {
    controller.play();
    println!("Playing...");
    println!();

    while controller.is_playing() {
        if let Some(position) = controller.position() {
            print!(
                "\rOrd: {:02X} | Pat: {:02X} | Row: {:02X}",
                position.order, position.pattern, position.row
            );
            let _ = std::io::stdout().flush();
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }

    println!("\rDone.          ");
}

fn render_to_wav(controller: &Controller, path: &str, sample_rate: u32) {
    let max_seconds: u32 = 600;
    println!("Rendering to {} at {} Hz...", path, sample_rate);

    let wav = controller.render_to_wav(sample_rate, max_seconds);
    println!("Rendered {} bytes", wav.len());

    fs::write(path, &wav).unwrap_or_else(|e| {
        eprintln!("Failed to write {}: {}", path, e);
        process::exit(1);
    });

    println!("Done.");
}
