//! Link-quality runs over the simulated radio medium

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use mote_radio_sim::scenarios::{self, ScenarioReport};
use mote_radio_sim::{ScenarioConfig, SimulationPresets};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    println!("{}", "Mote Radio Simulation".bright_blue().bold());
    println!("{}", "=====================".bright_blue());

    let runs = match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading scenario {path}"))?;
            let config = ScenarioConfig::from_toml(&text)
                .with_context(|| format!("parsing scenario {path}"))?;
            vec![(path, config)]
        }
        None => vec![
            ("Good Conditions".to_string(), SimulationPresets::good_conditions()),
            ("Average Conditions".to_string(), SimulationPresets::average_conditions()),
            ("Poor Conditions".to_string(), SimulationPresets::poor_conditions()),
            ("Extreme Conditions".to_string(), SimulationPresets::extreme_conditions()),
        ],
    };

    for (name, config) in runs {
        println!("{}", format!("\n>>> Testing: {name}").bright_green().bold());
        println!("Variant: {:?} at {} bps", config.radio.variant, config.radio.bitrate_bps);
        println!("Channel: {:?}", config.radio.channel);
        println!("Link: {} dBm, {:?} delivery", config.link_signal_dbm, config.medium.mode);

        let progress = ProgressBar::new(config.frames as u64);
        progress.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} frames")
                .context("progress template")?,
        );
        let bar = progress.clone();
        let report = tokio::task::spawn_blocking(move || {
            scenarios::run_scenario(&config, |_| bar.inc(1))
        })
        .await
        .context("scenario task panicked")??;
        progress.finish_and_clear();

        print_report(&report);
        println!("{}", "-".repeat(50));
    }

    println!("\n{}", "All simulations complete!".bright_green().bold());
    Ok(())
}

fn print_report(report: &ScenarioReport) {
    let ratio = report.delivery_ratio() * 100.0;
    let summary = format!(
        "{}/{} frames intact ({ratio:.1}%)",
        report.frames_intact, report.frames_sent
    );
    if ratio >= 90.0 {
        println!("{}", summary.bright_green());
    } else if ratio >= 50.0 {
        println!("{}", summary.bright_yellow());
    } else {
        println!("{}", summary.bright_red());
    }
    println!("  corrupted: {}", report.frames_corrupted);
    println!("  lost: {}", report.frames_lost);
    println!("  bytes corrupted: {}", report.bytes_corrupted);
    println!(
        "  {} events over {} us of simulated time",
        report.events_processed, report.sim_time
    );
    if let Some((sent, got)) = &report.sample_corruption {
        println!("  sent:     {}", hex::encode(sent));
        println!("  received: {}", hex::encode(got));
    }
}
