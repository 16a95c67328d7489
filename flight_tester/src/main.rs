// THEORY:
// The flight tester flies the whole `line_pilot` loop on a desk. Frames come
// either from a directory of recorded stills or from a synthetic scene; the
// vehicle is the simulator from `line_pilot::sim`. Every cycle can be written
// out as an annotated frame plus its binary mask, so a run can be inspected
// frame by frame afterwards.
//
// Operator input is a script of `<cycle> <key>` lines using the same key
// bindings as the live console. Without a script the tester takes off, engages
// autonomous flight once airborne, and lands when the cycle limit is reached.

use anyhow::{Context, Result, bail};
use clap::Parser;
use image::Rgb;
use line_pilot::core_modules::annotate::annotate;
use line_pilot::core_modules::utils::image_helper::image_helper;
use line_pilot::interfaces::frame_channel;
use line_pilot::sim::{SimConfig, SimulatedVehicle, SyntheticScene};
use line_pilot::{
    Autopilot, DetectionStrategy, FlightLoop, FlightMode, Frame, LoopConfig, PilotConfig,
    PilotEvent,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;

#[derive(Parser, Debug)]
#[command(author, version, about = "Fly the line_pilot loop against a simulated vehicle", long_about = None)]
struct Args {
    #[arg(
        long,
        help = "Directory of recorded frames to replay",
        long_help = "Directory of PNG, JPEG or BMP stills replayed in file-name order. \
                     The sequence loops when it runs out. Without this option a synthetic \
                     scene with a swaying line is rendered instead."
    )]
    frames: Option<PathBuf>,

    #[arg(long, help = "Pilot configuration JSON (defaults are used when omitted)")]
    config: Option<PathBuf>,

    #[arg(long, help = "Line color profile to follow, overriding the config default")]
    color: Option<String>,

    #[arg(long, help = "Detection strategy: contour or hough")]
    strategy: Option<DetectionStrategy>,

    #[arg(
        long,
        help = "Directory for annotated frames and masks",
        long_help = "When set, every saved cycle writes frame_NNNNN.png (annotated camera \
                     view) and mask_NNNNN.png (the color mask) into this directory."
    )]
    output: Option<PathBuf>,

    #[arg(long, default_value_t = 1, help = "Save one cycle in every N")]
    save_every: u64,

    #[arg(long, default_value_t = 300, help = "Number of cycles to fly before landing")]
    cycles: u64,

    #[arg(long, help = "Cycle rate in Hz, overriding the config")]
    rate: Option<u32>,

    #[arg(long, default_value_t = 120.0, help = "Synthetic line sway in pixels")]
    sway: f64,

    #[arg(long, default_value_t = 100.0, help = "Simulated starting battery percentage")]
    battery: f64,

    #[arg(long, default_value_t = 0.1, help = "Simulated battery drain per second of flight")]
    drain: f64,

    #[arg(
        long,
        help = "Operator script of '<cycle> <key>' lines",
        long_help = "Each non-empty line holds a cycle number and a key name, e.g. '1 t' or \
                     '40 space'. Lines starting with '#' are ignored. Key names follow the \
                     console bindings (t takeoff, l land, space toggle autonomous, 1-5 colors, \
                     h hough, o contour, esc emergency). Movement keys (up, down, left, right, \
                     pageup, pagedown, q, e) are held until released with a leading '-', \
                     e.g. '40 left' then '55 -left'."
    )]
    script: Option<PathBuf>,
}

/// Where frames come from.
enum FrameFeed {
    Recorded(Vec<Arc<Frame>>),
    Synthetic(SyntheticScene),
}

impl FrameFeed {
    fn frame(&self, step: u64) -> Arc<Frame> {
        match self {
            FrameFeed::Recorded(frames) => {
                Arc::clone(&frames[(step % frames.len() as u64) as usize])
            }
            FrameFeed::Synthetic(scene) => Arc::new(scene.render(step)),
        }
    }
}

fn load_frames(dir: &Path) -> Result<Vec<Arc<Frame>>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading frame directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    matches!(
                        ext.to_ascii_lowercase().as_str(),
                        "png" | "jpg" | "jpeg" | "bmp"
                    )
                })
        })
        .collect();
    paths.sort();

    let mut frames = Vec::with_capacity(paths.len());
    for path in &paths {
        let image = image::open(path)
            .with_context(|| format!("decoding {}", path.display()))?
            .to_rgb8();
        frames.push(Arc::new(Frame::new(image)));
    }
    if frames.is_empty() {
        bail!("no frames found in {}", dir.display());
    }
    log::info!("loaded {} frames from {}", frames.len(), dir.display());
    Ok(frames)
}

/// Paint that falls inside the built-in profile of the same name.
fn paint_for(color: &str) -> Rgb<u8> {
    match color {
        "red" => Rgb([220, 20, 20]),
        "green" => Rgb([20, 200, 40]),
        "yellow" => Rgb([230, 200, 20]),
        "blue" => Rgb([20, 60, 220]),
        "white" => Rgb([240, 240, 240]),
        other => {
            log::warn!("no synthetic paint for color '{other}', painting white");
            Rgb([240, 240, 240])
        }
    }
}

fn parse_script(text: &str) -> Result<BTreeMap<u64, Vec<PilotEvent>>> {
    let mut script: BTreeMap<u64, Vec<PilotEvent>> = BTreeMap::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (cycle, key) = line
            .split_once(char::is_whitespace)
            .with_context(|| format!("script line {}: expected '<cycle> <key>'", number + 1))?;
        let cycle: u64 = cycle
            .parse()
            .with_context(|| format!("script line {}: bad cycle '{cycle}'", number + 1))?;
        let key = key.trim();
        // A leading '-' lets go of a held movement key.
        let event = match key.strip_prefix('-') {
            Some(released) => PilotEvent::from_key_release(released),
            None => PilotEvent::from_key(key),
        };
        let Some(event) = event else {
            bail!("script line {}: unbound key '{key}'", number + 1);
        };
        script.entry(cycle).or_default().push(event);
    }
    Ok(script)
}

fn save_cycle(dir: &Path, cycle: u64, frame: &Frame, report: &line_pilot::CycleReport) -> Result<()> {
    let annotated = annotate(frame, report.analysis.as_ref(), report.mode);
    image_helper::save_rgb(&dir.join(format!("frame_{cycle:05}.png")), &annotated)?;
    if let Some(analysis) = &report.analysis {
        image_helper::save_mask(&dir.join(format!("mask_{cycle:05}.png")), &analysis.mask)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    // --- 1. Configuration ---
    let mut config = match &args.config {
        Some(path) => PilotConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PilotConfig::default(),
    };
    if let Some(color) = &args.color {
        config.default_color = color.clone();
    }
    if let Some(strategy) = args.strategy {
        config.default_strategy = strategy;
    }
    if let Some(rate) = args.rate {
        config.target_rate_hz = rate;
    }
    config.validate().context("invalid pilot configuration")?;
    let config = Arc::new(config);

    let script = match &args.script {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading script {}", path.display()))?;
            Some(parse_script(&text)?)
        }
        None => None,
    };

    if let Some(dir) = &args.output {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
    }

    // --- 2. Frames ---
    let feed = match &args.frames {
        Some(dir) => FrameFeed::Recorded(load_frames(dir)?),
        None => {
            let mut scene = SyntheticScene::centred(paint_for(&config.default_color));
            scene.sway = args.sway;
            FrameFeed::Synthetic(scene)
        }
    };

    // --- 3. Vehicle & Loop ---
    let vehicle = SimulatedVehicle::new(SimConfig {
        battery_percent: args.battery,
        drain_per_second: args.drain,
        step: config.cycle_period(),
        ..SimConfig::default()
    });
    let autopilot = Autopilot::new(Arc::clone(&config), vehicle.clone(), vehicle.clone())
        .context("building autopilot")?;

    let (frame_sender, frame_source) = frame_channel();
    let timing = LoopConfig::from_config(&config).with_max_cycles(args.cycles);
    let (flight_loop, handle) = FlightLoop::new(autopilot, frame_source, timing);

    let period = config.cycle_period();
    let producer = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut step = 0u64;
        loop {
            ticker.tick().await;
            if frame_sender.send(Some(feed.frame(step))).is_err() {
                break;
            }
            step += 1;
        }
    });

    // Cycle numbers start at 1; anything scheduled at or before it goes now.
    match &script {
        Some(script) => {
            for event in script.range(..=1).flat_map(|(_, events)| events.iter().cloned()) {
                handle.send(event);
            }
        }
        None => {
            handle.send(PilotEvent::Takeoff);
        }
    }

    // --- 4. Fly ---
    let operator = handle.clone();
    let mut engaged = false;
    let (stats, _autopilot) = flight_loop
        .run(|report, frame| {
            for transition in &report.transitions {
                log::info!(
                    "cycle {}: {} -> {} ({})",
                    report.cycle,
                    transition.from,
                    transition.to,
                    transition.reason
                );
            }
            for rejection in &report.rejections {
                log::warn!("cycle {}: rejected: {rejection}", report.cycle);
            }
            match &script {
                Some(script) => {
                    if let Some(events) = script.get(&(report.cycle + 1)) {
                        for event in events {
                            operator.send(event.clone());
                        }
                    }
                }
                None => {
                    if !engaged && report.mode == FlightMode::Manual {
                        engaged = operator.send(PilotEvent::EngageAutonomous);
                    }
                }
            }

            if let (Some(dir), Some(frame)) = (&args.output, frame) {
                if args.save_every > 0 && report.cycle % args.save_every == 0 {
                    if let Err(error) = save_cycle(dir, report.cycle, frame, report) {
                        log::warn!("cycle {}: could not save output: {error:#}", report.cycle);
                    }
                }
            }
        })
        .await;

    producer.abort();
    drop(handle);

    // --- 5. Report ---
    println!("cycles:           {}", stats.cycles);
    println!("frames processed: {}", stats.frames_processed);
    println!("frames missed:    {}", stats.frames_missed);
    println!("lines detected:   {}", stats.lines_detected);
    println!("commands sent:    {}", stats.commands_sent);
    println!("emergencies:      {}", stats.emergencies);
    println!("overruns:         {}", stats.overruns);
    println!("battery left:     {:.1}%", vehicle.battery_percent());
    if let Some(command) = vehicle.last_command() {
        println!("last command:     {command}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use line_pilot::core_modules::flight_mode::{Axis, Direction};

    #[test]
    fn script_groups_events_by_cycle() {
        let script = parse_script("# warm up\n1 t\n\n40 space\n40 h\n").expect("valid script");
        assert_eq!(script.get(&1), Some(&vec![PilotEvent::Takeoff]));
        assert_eq!(
            script.get(&40),
            Some(&vec![
                PilotEvent::ToggleAutonomous,
                PilotEvent::SelectStrategy(DetectionStrategy::Hough)
            ])
        );
    }

    #[test]
    fn script_releases_held_movement_keys() {
        let script = parse_script("40 left\n55 -left\n").expect("valid script");
        assert_eq!(
            script.get(&40),
            Some(&vec![PilotEvent::Move(Axis::Lateral, Direction::Negative)])
        );
        assert_eq!(script.get(&55), Some(&vec![PilotEvent::Release(Axis::Lateral)]));
    }

    #[test]
    fn script_rejects_unbound_keys() {
        assert!(parse_script("3 z").is_err());
        assert!(parse_script("3 -t").is_err());
        assert!(parse_script("soon t").is_err());
        assert!(parse_script("7").is_err());
    }

    #[test]
    fn builtin_paints_match_their_profiles() {
        let config = PilotConfig::default();
        for profile in &config.color_profiles {
            let paint = paint_for(&profile.name);
            let frame = Frame::new(image::RgbImage::from_pixel(1, 1, paint));
            let hsv = frame.pixel(0, 0).to_hsv();
            assert!(profile.matches(hsv), "{} paint misses its profile", profile.name);
        }
    }
}
