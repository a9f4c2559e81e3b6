use anyhow::{Context, Result, anyhow, bail};
use bake_core::{
    BakePlan, BakeSession, EngineConfig, EnvironmentReading, EnvironmentStatus, FixedSource,
    ReplaySource, Severity, StepSeed, StepStatus, StepType, TimelineEvent, TimelineState,
    TracingObserver,
};
use chrono::{DateTime, Duration, Local, NaiveTime, Utc};
use clap::Parser;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "bake-cli",
    about = "Adjust a bake timeline to the temperature and humidity of your kitchen.",
    version
)]
struct Args {
    /// Bake plan JSON (name + ordered steps); defaults to a country loaf
    #[arg(long)]
    plan: Option<PathBuf>,

    /// Ambient temperature in °C
    #[arg(long, requires = "humidity")]
    temp: Option<f64>,

    /// Relative humidity in %
    #[arg(long, requires = "temp", value_parser = parse_humidity)]
    humidity: Option<f64>,

    /// Recorded sensor samples JSON (`[{"temperature_c": .., "humidity_pct": ..}, ..]`),
    /// replayed one per poll interval starting at --now
    #[arg(long, conflicts_with = "temp")]
    readings: Option<PathBuf>,

    /// Bake start time HH:MM (optional); defaults to now
    #[arg(long)]
    start: Option<String>,

    /// Current time HH:MM used for step completion and readiness checks; defaults to now
    #[arg(long)]
    now: Option<String>,

    /// Mark steps as done, in order (repeat or comma-separate)
    #[arg(long, value_delimiter = ',')]
    done: Vec<String>,

    /// Skip steps (repeat or comma-separate)
    #[arg(long, value_delimiter = ',')]
    skip: Vec<String>,

    /// Manual duration override, e.g. `pre-shape=35` (repeatable)
    #[arg(long = "override", value_parser = parse_override)]
    overrides: Vec<(String, u32)>,

    /// Only propose adjustments instead of applying them
    #[arg(long)]
    no_auto: bool,

    /// Minutes between automatic recalculations
    #[arg(long)]
    throttle_minutes: Option<u32>,

    /// Load an engine profile JSON before applying CLI overrides
    #[arg(long)]
    config: Option<PathBuf>,

    /// Save the effective engine profile to JSON
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Write the resulting timeline state as JSON
    #[arg(long)]
    save_state: Option<PathBuf>,

    /// Print the resulting state as JSON instead of tables
    #[arg(long)]
    json: bool,

    /// Debug logging (RUST_LOG wins when set)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct Sample {
    temperature_c: f64,
    humidity_pct: f64,
}

/// Stamp recorded samples `interval` apart, the first one at `from`.
fn replay_readings(
    samples: &[Sample],
    from: DateTime<Utc>,
    interval: Duration,
) -> Vec<EnvironmentReading> {
    let mut at = from;
    samples
        .iter()
        .map(|s| {
            let r = EnvironmentReading {
                temperature_c: s.temperature_c,
                humidity_pct: s.humidity_pct,
                observed_at: at,
            };
            at = at.checked_add_signed(interval).unwrap_or(at);
            r
        })
        .collect()
}

fn load_samples(path: &PathBuf) -> Result<Vec<Sample>> {
    let txt = fs::read_to_string(path)
        .with_context(|| format!("failed to read readings {}", path.display()))?;
    let samples: Vec<Sample> = serde_json::from_str(&txt)
        .with_context(|| format!("invalid readings JSON {}", path.display()))?;
    if let Some(bad) = samples.iter().find(|s| !(0.0..=100.0).contains(&s.humidity_pct)) {
        bail!(
            "readings {}: humidity {} is outside 0-100",
            path.display(),
            bad.humidity_pct
        );
    }
    Ok(samples)
}

fn parse_override(s: &str) -> Result<(String, u32), String> {
    let (id, minutes) = s
        .split_once('=')
        .ok_or_else(|| format!("expected STEP=MINUTES, got `{s}`"))?;
    let minutes: u32 = minutes
        .trim()
        .parse()
        .map_err(|_| format!("invalid minutes in `{s}`"))?;
    Ok((id.trim().to_string(), minutes))
}

fn parse_humidity(s: &str) -> Result<f64, String> {
    let h: f64 = s.parse().map_err(|_| format!("invalid humidity `{s}`"))?;
    if !(0.0..=100.0).contains(&h) {
        return Err("humidity must be between 0 and 100".to_string());
    }
    Ok(h)
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Today's local `HH:MM`, or now.
fn local_time(hhmm: Option<&str>) -> Result<DateTime<Utc>> {
    let Some(hhmm) = hhmm else {
        return Ok(Utc::now());
    };
    let t = NaiveTime::parse_from_str(hhmm, "%H:%M")
        .with_context(|| format!("invalid time `{hhmm}`, expected HH:MM"))?;
    let dt = Local::now()
        .date_naive()
        .and_time(t)
        .and_local_timezone(Local)
        .earliest()
        .ok_or_else(|| anyhow!("`{hhmm}` does not exist in the local timezone today"))?;
    Ok(dt.with_timezone(&Utc))
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut cfg = match &args.config {
        Some(path) => {
            let txt = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            EngineConfig::from_json_str(&txt)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    // CLI wins over the profile.
    if args.no_auto {
        cfg.auto_adjust = false;
    }
    if let Some(m) = args.throttle_minutes {
        cfg.throttle_minutes = m;
    }

    if let Some(path) = &args.save_config {
        fs::write(path, cfg.to_json_pretty()?)
            .with_context(|| format!("failed to save config {}", path.display()))?;
        println!("Config saved to {}", path.display());
    }
    Ok(cfg)
}

fn load_plan(path: Option<&PathBuf>) -> Result<BakePlan> {
    let Some(path) = path else {
        return Ok(country_loaf());
    };
    let txt = fs::read_to_string(path)
        .with_context(|| format!("failed to read plan {}", path.display()))?;
    let plan: BakePlan = serde_json::from_str(&txt)
        .with_context(|| format!("invalid plan JSON {}", path.display()))?;
    if plan.steps.is_empty() {
        bail!("plan {} has no steps", path.display());
    }
    Ok(plan)
}

fn country_loaf() -> BakePlan {
    BakePlan {
        name: "Country loaf".to_string(),
        steps: vec![
            StepSeed::new("autolyse", "Autolyse", StepType::Autolyse, 45),
            StepSeed::new("bulk-ferment", "Bulk ferment", StepType::BulkFerment, 240),
            StepSeed::new("pre-shape", "Pre-shape & bench rest", StepType::PreShape, 30),
            StepSeed::new("shape", "Final shape", StepType::Other, 15),
            StepSeed::new("final-proof", "Final proof", StepType::FinalProof, 120),
            StepSeed::new("bake", "Bake", StepType::Bake, 45),
        ],
    }
}

fn fmt_minutes(m: u32) -> String {
    match (m / 60, m % 60) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m:02}m"),
    }
}

fn fmt_clock(t: DateTime<Utc>, day0: DateTime<Utc>) -> String {
    let local = t.with_timezone(&Local);
    let days = (local.date_naive() - day0.with_timezone(&Local).date_naive()).num_days();
    if days > 0 {
        format!("{} (+{days}d)", local.format("%H:%M"))
    } else {
        local.format("%H:%M").to_string()
    }
}

fn print_state(plan: &BakePlan, state: &TimelineState) {
    let Some(first) = state.steps.first() else {
        return;
    };
    let day0 = first.start_time;

    println!("\n=== {} ===", plan.name);
    match &state.factors.reading {
        Some(r) => println!(
            "Environment: {:.1}°C, {:.0}% RH → ×{:.2} ({})",
            r.temperature_c,
            r.humidity_pct,
            state.factors.combined_factor,
            state.factors.status.as_str()
        ),
        None => println!(
            "Environment: no sensor reading ({})",
            EnvironmentStatus::Unknown.as_str()
        ),
    }
    println!(
        "Automatic adjustment: {}",
        if state.config.auto_adjust { "on" } else { "off (proposals only)" }
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            ["Step", "Type", "Status", "Recipe", "Adjusted", "Start", "End", "Note"]
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );

    for s in &state.steps {
        let status = match s.status {
            StepStatus::Active => Cell::new("active").fg(Color::Green),
            other => Cell::new(other.as_str()),
        };
        let note = s
            .adjustment
            .as_ref()
            .map(|a| format!("{} [{}]", a.reason, a.confidence.as_str()))
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(&s.name),
            Cell::new(s.step_type.as_str()),
            status,
            Cell::new(fmt_minutes(s.original_duration_minutes)),
            Cell::new(fmt_minutes(s.adjusted_duration_minutes)),
            Cell::new(fmt_clock(s.start_time, day0)),
            Cell::new(fmt_clock(s.end_time, day0)),
            Cell::new(note),
        ]);
    }
    println!("{table}");

    if let Some(end) = state.finish_time() {
        println!("Out of the oven at ~{}", fmt_clock(end, day0));
    }

    if state.recommendations.is_empty() {
        return;
    }
    let mut recs = Table::new();
    recs.load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            ["Severity", "Id", "Recommendation", "Details"]
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );
    for r in &state.recommendations {
        let sev = match r.severity {
            Severity::Info => Cell::new("info"),
            Severity::Warning => Cell::new("warning").fg(Color::Yellow),
            Severity::Critical => Cell::new("critical").fg(Color::Red),
        };
        let details = match &r.action_label {
            Some(action) => format!("{} → {action}", r.description),
            None => r.description.clone(),
        };
        recs.add_row(vec![sev, Cell::new(&r.id), Cell::new(&r.title), Cell::new(details)]);
    }
    println!("\n=== Recommendations ===");
    println!("{recs}");
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let cfg = load_config(&args)?;
    let plan = load_plan(args.plan.as_ref())?;
    let start = local_time(args.start.as_deref())?;
    let now = local_time(args.now.as_deref())?;
    debug!(plan = %plan.name, steps = plan.steps.len(), %start, %now, "loaded");

    let interval = cfg.poll_interval();
    let state = TimelineState::begin(plan.steps.clone(), start, cfg);
    let mut session = BakeSession::new(state, TracingObserver);

    // `clock` ends at the last poll; later events happen then.
    let mut clock = now;
    match &args.readings {
        Some(path) => {
            let readings = replay_readings(&load_samples(path)?, now, interval);
            let mut source = ReplaySource::new(readings.clone());
            for r in &readings {
                session.poll(&mut source, r.observed_at)?;
                clock = r.observed_at;
            }
            debug!(polls = readings.len(), until = %clock, "replayed readings");
            // Throttling may have held back the last sample.
            if !readings.is_empty() {
                session.dispatch(TimelineEvent::Recalculate { at: clock })?;
            }
        }
        None => {
            let reading = match (args.temp, args.humidity) {
                (Some(temperature_c), Some(humidity_pct)) => Some(EnvironmentReading {
                    temperature_c,
                    humidity_pct,
                    observed_at: now,
                }),
                _ => None,
            };
            session.poll(&mut FixedSource(reading), now)?;
        }
    }

    for id in &args.done {
        session
            .dispatch(TimelineEvent::MarkDone {
                step_id: id.clone(),
                at: clock,
            })
            .with_context(|| format!("--done {id}"))?;
    }
    for id in &args.skip {
        session
            .dispatch(TimelineEvent::Skip {
                step_id: id.clone(),
                at: clock,
            })
            .with_context(|| format!("--skip {id}"))?;
    }
    for (id, minutes) in &args.overrides {
        session
            .dispatch(TimelineEvent::OverrideDuration {
                step_id: id.clone(),
                minutes: *minutes,
            })
            .with_context(|| format!("--override {id}={minutes}"))?;
    }
    session.dispatch(TimelineEvent::Tick { at: clock })?;

    let state = session.into_state();
    if let Some(path) = &args.save_state {
        fs::write(path, serde_json::to_string_pretty(&state)?)
            .with_context(|| format!("failed to save state {}", path.display()))?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        print_state(&plan, &state);
    }
    Ok(())
}
