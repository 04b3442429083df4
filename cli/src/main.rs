//! FX-Decon CLI
//!
//! Command-line interface for the FX-decon library.
//! Provides an interactive shell for loading, filtering and saving trace gathers.

use std::process;

use clap::{Arg, Command};
use fxdecon_lib::{
    config::presets,
    gather_io::{read_gather_file, write_gather_file},
    synthetic::SyntheticGather,
    FxDeconParams, GatherProcessor, OutputMode,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

#[cfg(feature = "image")]
use fxdecon_lib::section::{save_section, ColorMap, SectionImageOptions};

/// Application state
struct AppState {
    processor: GatherProcessor,
    current_file: Option<String>,
}

impl AppState {
    fn new(params: FxDeconParams) -> Self {
        Self {
            processor: GatherProcessor::with_params(params),
            current_file: None,
        }
    }
}

/// Print the help message showing available commands
fn print_help() {
    println!("Available commands:");
    println!("  load <filename>                    - Load a gather from a WAV file (one channel per trace)");
    println!("  save <filename>                    - Save the last result as a 32-bit float WAV file");
    println!("  synth [traces] [samples] [dt_ms] [noise] [seed] - Generate a synthetic gather");
    println!("  config                             - Show current parameters");
    println!("  set <parameter> <value>            - Set a parameter");
    println!("  preset <name|id>                   - Load a parameter preset");
    println!("  presets                            - List available presets");
    println!("  threads <n>                        - Number of worker threads");
    println!("  apply                              - Filter the gather, keeping the coherent signal");
    println!("  noise                              - Filter the gather, keeping the rejected noise");
    println!("  dump                               - Show engine parameters for the loaded gather");
    println!("  section <filename> [input|result] [colormap] [width] [height] [clip%] - Save a section image");
    println!("  status                             - Show processor status");
    println!("  help                               - Show this help message");
    println!("  quit                               - Exit the program");
    println!();
    println!("Parameters:");
    println!("  fmin, fmax <Hz>                    - Frequency band to filter");
    println!("  window <ms>                        - Time window length (0 = whole trace)");
    println!("  taper <ms>                         - Cross-fade between time windows");
    println!("  design <traces>                    - Traces per design window");
    println!("  filter <traces>                    - Prediction filter half-length");
    println!("  ensemble <traces>                  - Traces per ensemble (0 = whole gather)");
    println!("  out_of_band <pass_through|zero>    - Handling of bins outside the band");
    println!("  output <filtered|noise>            - Signal returned by apply");
    println!();
    println!("Examples:");
    println!("  synth 48 500 4 0.5");
    println!("  set fmax 80");
    println!("  preset aggressive");
    println!("  apply");
    println!("  section result.png result seismic 800 600 98");
    println!("  save filtered.wav");
}

fn print_presets() {
    println!("Available presets:");
    for preset in presets::list_presets() {
        println!("  {} {:<14} - {}", preset.id, preset.name, preset.description);
    }
}

fn print_status(state: &AppState) {
    println!("Processor Status:");
    match state.processor.gather() {
        Some(gather) => println!(
            "  Gather: {} traces x {} samples, {} ms interval ({:.1} ms)",
            gather.num_traces(),
            gather.num_samples(),
            gather.sample_interval_ms,
            gather.duration_ms()
        ),
        None => println!("  Gather: none"),
    }
    println!(
        "  Result: {}",
        if state.processor.result().is_some() {
            "Yes"
        } else {
            "No"
        }
    );
    println!("  Threads: {}", state.processor.threads());
    if let Some(filename) = &state.current_file {
        println!("  Current file: {}", filename);
    }
}

fn run_filter(state: &mut AppState, mode: OutputMode) {
    if state.processor.gather().is_none() {
        println!("No gather loaded. Use 'load' or 'synth' first.");
        return;
    }

    let mut params = *state.processor.params();
    params.output_mode = mode;
    state.processor.set_params(params);

    println!("Running FX-decon ({})...", mode.name());
    match state.processor.process() {
        Ok(()) => {
            if let Some(result) = state.processor.result() {
                println!(
                    "Done: {} traces, peak amplitude {:.4}",
                    result.num_traces(),
                    result.max_abs()
                );
            }
        }
        Err(e) => println!("Error during processing: {}", e),
    }
}

#[cfg(feature = "image")]
fn save_section_command(parts: &[&str], state: &AppState) {
    if parts.len() < 2 {
        println!("Usage: section <filename> [input|result] [colormap] [width] [height] [clip%]");
        println!("  colormap: gray, seismic (default: gray)");
        println!("  width, height: image size in pixels (default: 800 x 600)");
        println!("  clip%: amplitude percentile shown at full color (default: 98)");
        return;
    }

    let filename = parts[1];
    let which = parts.get(2).copied().unwrap_or("result");
    let gather = match which {
        "input" => state.processor.gather(),
        "result" => state.processor.result().or(state.processor.gather()),
        _ => {
            println!("Unknown source: {}. Use input or result.", which);
            return;
        }
    };
    let Some(gather) = gather else {
        println!("Nothing to display. Load a gather first.");
        return;
    };

    let defaults = SectionImageOptions::default();
    let colormap = match parts.get(3) {
        Some(name) => ColorMap::parse(&name.to_lowercase()).unwrap_or_else(|| {
            println!("Unknown colormap: {}. Using gray.", name);
            ColorMap::Grayscale
        }),
        None => defaults.colormap,
    };
    let options = SectionImageOptions {
        width: parts
            .get(4)
            .and_then(|w| w.parse().ok())
            .unwrap_or(defaults.width),
        height: parts
            .get(5)
            .and_then(|h| h.parse().ok())
            .unwrap_or(defaults.height),
        colormap,
        clip_percentile: parts
            .get(6)
            .and_then(|c| c.parse().ok())
            .unwrap_or(defaults.clip_percentile),
    };

    match save_section(gather, filename, &options) {
        Ok(()) => println!(
            "Section saved to {} ({}x{})",
            filename, options.width, options.height
        ),
        Err(e) => println!("Error saving section: {}", e),
    }
}

/// Process a user command; returns false when the shell should exit
fn process_command(command: &str, state: &mut AppState) -> bool {
    let parts: Vec<&str> = command.split_whitespace().collect();

    if parts.is_empty() {
        return true;
    }
    log::debug!("Command: {}", command);

    match parts[0] {
        "load" => {
            if parts.len() != 2 {
                println!("Usage: load <filename>");
                return true;
            }

            let filename = parts[1];
            println!("Loading file: {}", filename);

            match read_gather_file(filename).and_then(|g| state.processor.load_gather(g)) {
                Ok(()) => {
                    state.current_file = Some(filename.to_string());
                    println!("File loaded successfully!");
                    print_status(state);
                }
                Err(e) => println!("Error loading file: {}", e),
            }
        }

        "save" => {
            if parts.len() != 2 {
                println!("Usage: save <filename>");
                return true;
            }

            let Some(result) = state.processor.result() else {
                println!("No result available. Run 'apply' or 'noise' first.");
                return true;
            };

            let filename = parts[1];
            println!("Saving to file: {}", filename);
            match write_gather_file(filename, result) {
                Ok(()) => println!("File saved successfully!"),
                Err(e) => println!("Error saving file: {}", e),
            }
        }

        "synth" => {
            let num_traces = parts.get(1).and_then(|v| v.parse().ok()).unwrap_or(48);
            let num_samples = parts.get(2).and_then(|v| v.parse().ok()).unwrap_or(500);
            let dt_ms = parts.get(3).and_then(|v| v.parse().ok()).unwrap_or(4.0);
            let noise = parts.get(4).and_then(|v| v.parse().ok()).unwrap_or(0.5);
            let seed = parts.get(5).and_then(|v| v.parse().ok()).unwrap_or(1);

            let gather = SyntheticGather::demo(num_traces, num_samples, dt_ms)
                .noise(noise, seed)
                .build();
            match state.processor.load_gather(gather) {
                Ok(()) => {
                    state.current_file = None;
                    println!(
                        "Synthetic gather: {} traces x {} samples, {} ms, noise {}",
                        num_traces, num_samples, dt_ms, noise
                    );
                }
                Err(e) => println!("Error creating synthetic gather: {}", e),
            }
        }

        "config" => {
            println!("Current FX-decon Configuration:");
            println!("{}", state.processor.params());
        }

        "set" => {
            if parts.len() < 3 {
                println!("Usage: set <parameter> <value>");
                println!("Parameters: fmin, fmax, window, taper, design, filter, ensemble, out_of_band, output");
                return true;
            }

            match state.processor.set_param(parts[1], parts[2]) {
                Ok(()) => println!("{} set to {}", parts[1], parts[2]),
                Err(e) => println!("Error setting parameter: {}", e),
            }
        }

        "preset" => {
            if parts.len() != 2 {
                println!("Usage: preset <name|id>");
                print_presets();
                return true;
            }

            match presets::get_preset(parts[1]) {
                Some(params) => {
                    state.processor.set_params(params);
                    println!("Loaded preset: {}", parts[1]);
                    println!("{}", state.processor.params());
                }
                None => println!("Unknown preset: {}", parts[1]),
            }
        }

        "presets" => print_presets(),

        "threads" => match parts.get(1).and_then(|v| v.parse::<usize>().ok()) {
            Some(n) => {
                state.processor.set_threads(n);
                println!("Using {} thread(s)", state.processor.threads());
            }
            None => println!("Usage: threads <n>"),
        },

        "apply" => run_filter(state, OutputMode::Filtered),

        "noise" => run_filter(state, OutputMode::Noise),

        "dump" => match state.processor.describe_engine() {
            Ok(text) => print!("{}", text),
            Err(e) => println!("Error: {}", e),
        },

        "section" => {
            #[cfg(feature = "image")]
            save_section_command(&parts, state);

            #[cfg(not(feature = "image"))]
            println!("Section images are not available (built without the image feature)");
        }

        "status" => print_status(state),

        "help" => print_help(),

        "quit" | "exit" => return false,

        _ => {
            println!("Unknown command: {}", parts[0]);
            println!("Type 'help' for available commands");
        }
    }

    true
}

fn main() {
    // Parse command line arguments
    let matches = Command::new("FX-Decon")
        .version(fxdecon_lib::VERSION)
        .about("FX-domain adaptive deconvolution for seismic trace gathers")
        .arg(
            Arg::new("file")
                .help("Gather (WAV) to load on startup")
                .value_name("FILE")
                .index(1),
        )
        .arg(
            Arg::new("preset")
                .long("preset")
                .short('p')
                .help("Start from a named preset")
                .value_name("NAME"),
        )
        .arg(
            Arg::new("fmin")
                .long("fmin")
                .help("Lowest filtered frequency [Hz]")
                .value_name("HZ"),
        )
        .arg(
            Arg::new("fmax")
                .long("fmax")
                .help("Highest filtered frequency [Hz]")
                .value_name("HZ"),
        )
        .arg(
            Arg::new("design")
                .long("design")
                .short('d')
                .help("Traces per design window")
                .value_name("TRACES"),
        )
        .arg(
            Arg::new("filter")
                .long("filter")
                .short('f')
                .help("Prediction filter half-length [traces]")
                .value_name("TRACES"),
        )
        .arg(
            Arg::new("window")
                .long("window")
                .short('w')
                .help("Time window length [ms]")
                .value_name("MS"),
        )
        .arg(
            Arg::new("taper")
                .long("taper")
                .short('t')
                .help("Taper length between time windows [ms]")
                .value_name("MS"),
        )
        .get_matches();

    println!("FX-Decon v{}", fxdecon_lib::VERSION);
    println!("Type 'help' for available commands\n");

    // Progress is reported at info level unless RUST_LOG says otherwise
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init()
        .ok();
    fxdecon_lib::init();

    // Apply command line configuration
    let mut params = FxDeconParams::default();
    if let Some(name) = matches.get_one::<String>("preset") {
        match presets::get_preset(name) {
            Some(preset) => {
                params = preset;
                println!("Using preset {}", name);
            }
            None => eprintln!("Unknown preset: {}", name),
        }
    }

    for name in ["fmin", "fmax", "design", "filter", "window", "taper"] {
        if let Some(value) = matches.get_one::<String>(name) {
            match params.set(name, value) {
                Ok(()) => println!("Set {} to {}", name, value),
                Err(e) => eprintln!("{}", e),
            }
        }
    }

    let mut state = AppState::new(params);

    // Load file from command line if provided
    if let Some(filename) = matches.get_one::<String>("file") {
        process_command(&format!("load {}", filename), &mut state);
    }

    // Setup readline
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Failed to create readline: {}", e);
            process::exit(1);
        }
    };

    // Main command loop
    loop {
        let readline = rl.readline("fxdecon> ");
        match readline {
            Ok(line) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    rl.add_history_entry(trimmed).ok();
                    if !process_command(trimmed, &mut state) {
                        break;
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    println!("Goodbye!");
}
