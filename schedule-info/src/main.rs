//! Schedule script inspector.
//!
//! Reads a display style (or a bare schedule script array) and prints the
//! timelines it contains and, optionally, the animation state at a time.
//!
//! Usage: cargo run -p schedule-info -- <style.json> [--time <t>] [--verbose|-v]

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tileview::scene::schedule::{ModelTimeline, ModelTimelineProps, Script, Timeline};
use tileview::scene::{DisplayStyleProps, ModelId};
use tileview::DisplayStyleState;

#[derive(Parser)]
#[command(name = "schedule-info")]
#[command(about = "Summarize the schedule script of a display style")]
#[command(version)]
struct Cli {
    /// Display style JSON, or a JSON array of model timelines
    input: PathBuf,

    /// Evaluate branches and overrides at this time (seconds)
    #[arg(short, long)]
    time: Option<f64>,

    /// Print every element timeline
    #[arg(short, long)]
    verbose: bool,

    /// Re-emit the normalized script as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let text = fs::read_to_string(&cli.input).with_context(|| format!("reading {}", cli.input.display()))?;
    let style = load_style(&text)?;
    let Some(script) = style.schedule_script() else {
        bail!("{} has no schedule script", cli.input.display());
    };

    let name = cli.input.file_name().unwrap_or_default().to_string_lossy();
    println!("Style: {}", name);
    if let Some(id) = style.id() {
        println!("  Id: {}", id);
    }
    print_summary(script);

    for model in script.model_timelines() {
        print_model(model, cli.verbose);
    }

    if let Some(time) = cli.time {
        print_state(&style, script, time);
    }

    if cli.json {
        let timelines = &style.props().settings().schedule_script;
        println!();
        println!("{}", serde_json::to_string_pretty(timelines)?);
    }
    Ok(())
}

fn load_style(text: &str) -> Result<DisplayStyleState> {
    let value: serde_json::Value = serde_json::from_str(text).context("parsing JSON")?;
    if value.is_array() {
        let timelines: Vec<ModelTimelineProps> = serde_json::from_value(value).context("parsing schedule script")?;
        log::debug!("Read {} model timelines", timelines.len());
        let mut style = DisplayStyleState::new(DisplayStyleProps::default());
        style.set_schedule_script(Some(timelines));
        return Ok(style);
    }
    Ok(DisplayStyleState::from_json(text)?)
}

fn print_summary(script: &Script) {
    println!("  Models: {}", script.model_timelines().len());
    match script.duration() {
        Some((start, end)) => println!("  Duration: {:.3} .. {:.3} ({:.3}s)", start, end, end - start),
        None => println!("  Duration: none"),
    }
    println!(
        "  Animates: models={} elements={} overrides={}",
        script.contains_model_animation(),
        script.contains_element_animation(),
        script.contains_feature_overrides()
    );
}

fn channels(timeline: &Timeline) -> String {
    format!(
        "visibility={} color={} transform={} cuttingPlane={}",
        timeline.visibility_entries().len(),
        timeline.color_entries().len(),
        timeline.transform_entries().len(),
        timeline.cutting_plane_entries().len()
    )
}

fn print_model(model: &ModelTimeline, verbose: bool) {
    println!();
    println!("Model {}:", model.model_id);
    if let Some(url) = &model.reality_model_url {
        println!("  Reality model: {}", url);
    }
    println!("  Channels: {}", channels(&model.timeline));
    println!("  Element timelines: {}", model.element_timelines().len());

    if verbose {
        for element in model.element_timelines() {
            println!(
                "    batch {:>4}: {} elements, {}",
                element.batch_id,
                element.element_ids.len(),
                channels(&element.timeline)
            );
        }
    }
}

fn print_state(style: &DisplayStyleState, script: &Script, time: f64) {
    println!();
    println!("At t={}:", time);

    let branches = style.animation_branches(Some(time)).unwrap_or_default();
    println!("  Branches: {}", branches.len());
    let mut keys: Vec<_> = branches.iter().collect();
    keys.sort_by(|a, b| a.0.cmp(b.0));
    for (key, state) in keys {
        let mut flags = Vec::new();
        if state.omit {
            flags.push("omit");
        }
        if state.transform.is_some() {
            flags.push("transform");
        }
        if state.clip.is_some() {
            flags.push("clip");
        }
        println!("    {:<24} {}", key, flags.join(" "));
    }

    let Some(overrides) = style.symbology_overrides(Some(time)) else {
        println!("  Overrides: none");
        return;
    };
    for model in script.model_timelines() {
        print_appearance(model.model_id, overrides.model_appearance(model.model_id));
    }
}

fn print_appearance(model_id: ModelId, appearance: Option<&tileview::scene::FeatureAppearance>) {
    match appearance {
        Some(appearance) => println!(
            "  Model {} appearance: rgb={:?} transparency={:?}",
            model_id, appearance.rgb, appearance.transparency
        ),
        None => println!("  Model {} appearance: unchanged", model_id),
    }
}
