use std::process::ExitCode;

use anyhow::Result;
use dep_builder::report;

use super::layout::{load_config, GlobalArgs};

pub(crate) fn status(global: &GlobalArgs) -> Result<ExitCode> {
    let config = load_config(global)?;
    let Some(run) = report::load(&config.output_dir)? else {
        println!(
            "no run report in '{}'",
            config.output_dir.display()
        );
        return Ok(ExitCode::SUCCESS);
    };

    println!(
        "last run: {} to {} (track {}, dep-builder {})",
        run.started_at_utc, run.finished_at_utc, run.track, run.tool_version
    );
    print!("{}", run.summary);
    if run.summary.has_failures() {
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}
