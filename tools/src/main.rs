//! assessment-runner: headless runner for the value assessment engine.
//!
//! Usage:
//!   assessment-runner --profile data/profiles/sample_profile.json
//!   assessment-runner --profile p.json --breakdown
//!   assessment-runner --profile p.json --json
//!   assessment-runner --profile p.json --ipc-mode
//!
//! In IPC mode every stdin line is one JSON command and every response is
//! one JSON line on stdout.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::env;
use std::io::{self, BufRead, Write};
use uplift_core::{
    breakdown::{explain, Breakdown, LineItem, LineKind},
    chat::parse_reply,
    config::EngineConfig,
    engine::{Assessment, UpliftEngine},
    format::{format_currency, format_percent},
    patch::{load_profile, FieldAdjustment, ProfilePatch},
    profile::{InputProfile, ValueDriver},
};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    GetBreakdown,
    /// Nested patch or the assistant's flat key form.
    ApplyPatch {
        patch: serde_json::Value,
    },
    /// Raw assistant reply text, fenced or not.
    AssistantReply {
        reply: String,
    },
    SetDriver {
        driver: ValueDriver,
        enabled: bool,
    },
    SetMargin {
        enabled: bool,
    },
    Reset,
    Quit,
}

#[derive(serde::Serialize)]
struct UiState {
    generated_at: DateTime<Utc>,
    has_region_data: bool,
    profile: InputProfile,
    assessment: Assessment,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    adjustments: Vec<FieldAdjustment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    breakdown: Option<Breakdown>,
}

struct Session {
    engine: UpliftEngine,
    /// What `reset` returns to.
    initial: InputProfile,
    profile: InputProfile,
}

impl Session {
    fn state(&self) -> UiState {
        UiState {
            generated_at: Utc::now(),
            has_region_data: self.profile.has_region_data(),
            profile: self.profile.clone(),
            assessment: self.engine.compute(&self.profile),
            adjustments: Vec::new(),
            message: None,
            breakdown: None,
        }
    }

    fn apply(&mut self, patch: &ProfilePatch) -> Result<Vec<FieldAdjustment>> {
        let merged = patch.apply(&self.profile, self.engine.config())?;
        self.profile = merged.profile;
        Ok(merged.adjustments)
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = has_flag(&args, "--ipc-mode");
    let as_json = has_flag(&args, "--json");
    let with_breakdown = has_flag(&args, "--breakdown");
    let profile_path = flag_value(&args, "--profile");
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");

    let config = EngineConfig::load(data_dir)?;
    let profile = match profile_path {
        Some(path) => {
            let loaded = load_profile(path, &config)?;
            log::info!(
                "Loaded profile {path}: {} fields, {} adjusted",
                loaded.updated_fields.len(),
                loaded.adjustments.len()
            );
            loaded.profile
        }
        None => InputProfile::new(&config),
    };
    let mut session = Session {
        engine: UpliftEngine::new(config),
        initial: profile.clone(),
        profile,
    };

    if ipc_mode {
        return run_ipc_loop(&mut session);
    }

    if !as_json {
        println!("Fraud value assessment: assessment-runner");
        println!("  profile:   {}", profile_path.unwrap_or("(none)"));
        println!("  data_dir:  {data_dir}");
        println!("  funnel:    {}", session.engine.config().funnel.version);
        println!();
    }

    let mut state = session.state();
    if as_json {
        if with_breakdown {
            state.breakdown = Some(explain(&state.assessment));
        }
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    print_summary(&session.profile, &state.assessment);
    if with_breakdown {
        print_breakdown(&explain(&state.assessment));
    }
    Ok(())
}

fn run_ipc_loop(session: &mut Session) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                write_error(&mut stdout, &e.to_string())?;
                continue;
            }
        };

        let response = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::GetState => Ok(session.state()),
            IpcCommand::GetBreakdown => {
                let mut state = session.state();
                state.breakdown = Some(explain(&state.assessment));
                Ok(state)
            }
            IpcCommand::ApplyPatch { patch } => ProfilePatch::from_assistant_json(&patch)
                .map_err(anyhow::Error::from)
                .and_then(|p| session.apply(&p))
                .map(|adjustments| UiState {
                    adjustments,
                    ..session.state()
                }),
            IpcCommand::AssistantReply { reply } => handle_assistant_reply(session, &reply),
            IpcCommand::SetDriver { driver, enabled } => {
                session.profile.driver_toggles.set(driver, enabled);
                log::info!("{} {}", driver.label(), if enabled { "enabled" } else { "disabled" });
                Ok(session.state())
            }
            IpcCommand::SetMargin { enabled } => {
                session.profile.margin_enabled = enabled;
                Ok(session.state())
            }
            IpcCommand::Reset => {
                session.profile = session.initial.clone();
                log::info!("Profile reset");
                Ok(session.state())
            }
        };

        match response {
            Ok(state) => writeln!(stdout, "{}", serde_json::to_string(&state)?)?,
            Err(e) => {
                log::warn!("Command rejected: {e}");
                write_error(&mut stdout, &e.to_string())?;
                continue;
            }
        }
        stdout.flush()?;
    }
    Ok(())
}

/// Parse a raw assistant reply and merge its update. On any failure the
/// profile is left as it was.
fn handle_assistant_reply(session: &mut Session, raw: &str) -> Result<UiState> {
    let reply = parse_reply(raw)?;
    let patch = ProfilePatch::from_assistant_json(&reply.updated_data)?;
    let adjustments = session.apply(&patch)?;
    Ok(UiState {
        adjustments,
        message: Some(reply.message),
        ..session.state()
    })
}

fn write_error(stdout: &mut io::Stdout, message: &str) -> Result<()> {
    let err_json = serde_json::json!({ "error": message });
    writeln!(stdout, "{}", err_json)?;
    stdout.flush()?;
    Ok(())
}

fn print_summary(profile: &InputProfile, assessment: &Assessment) {
    let aggregate = &assessment.aggregate;

    println!("=== ASSESSMENT SUMMARY ===");
    if let Some(name) = &profile.customer_name {
        println!("  customer:        {name}");
    }
    if let Some(industry) = &profile.industry {
        println!("  industry:        {industry}");
    }
    println!("  attempted GMV:   {}", format_currency(aggregate.attempted_gmv));

    println!();
    println!("=== REGIONS ===");
    if assessment.regions.is_empty() {
        println!("  (No region has GMV attempts yet)");
    }
    for r in &assessment.regions {
        println!(
            "  {} | GMV: {} | Complete: {} -> {} | Uplift: {}",
            r.region,
            format_currency(r.input.annual_gmv_attempts),
            format_percent(r.current.complete_rate() * 100.0),
            format_percent(r.future.complete_rate() * 100.0),
            format_currency(r.gmv_uplift()),
        );
    }

    println!();
    println!("=== VALUE ===");
    for driver in ValueDriver::ALL {
        let excluded = if aggregate.toggles.is_enabled(driver) {
            ""
        } else {
            "  (excluded)"
        };
        println!(
            "  {:<20} {:>16}{excluded}",
            driver.label(),
            format_currency(aggregate.driver_value(driver))
        );
    }
    println!("  {:<20} {:>16}", "total annual value", format_currency(aggregate.total_value));
    println!(
        "  {:<20} {:>16}",
        "monthly cost",
        format_currency(aggregate.monthly_run_rate)
    );
    if let Some(margin) = aggregate.average_margin_percent.filter(|_| aggregate.margin_applied) {
        println!("  (monthly figure at {} average gross margin)", format_percent(margin));
    }
}

fn print_breakdown(breakdown: &Breakdown) {
    for (title, lines) in breakdown.sections() {
        println!();
        println!("=== {} ===", title.to_uppercase());
        if lines.is_empty() {
            println!("  (Nothing to show)");
        }
        for line in lines {
            print_line(line);
        }
    }
}

fn print_line(line: &LineItem) {
    let rendered = line.rendered();
    match rendered.kind {
        LineKind::Header => println!("\n  {}", rendered.label),
        LineKind::Subheader => println!("    {}", rendered.label),
        LineKind::Value | LineKind::Result => {
            let marker = if rendered.kind == LineKind::Result { "=" } else { " " };
            println!(
                "   {marker} {:<44} {:>16} {:>14} {:>16}{}",
                rendered.label,
                rendered.current.unwrap_or_default(),
                rendered.impact.unwrap_or_default(),
                rendered.future.unwrap_or_default(),
                rendered.note.map(|n| format!("  ({n})")).unwrap_or_default(),
            );
        }
    }
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
