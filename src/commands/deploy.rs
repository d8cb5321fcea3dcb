// ABOUTME: Deploy command implementation.
// ABOUTME: Synchronises the source, then drives the remote pipeline and prints the report.

use super::{close_remote, open_remote, print_plan};
use dockhand::config::RunConfig;
use dockhand::deploy::{self, HttpProbe, Rsync};
use dockhand::error::Result;
use dockhand::interrupt::Interrupt;
use dockhand::output::Output;
use dockhand::source::{SourceSynchronizer, SyncAction};

pub async fn deploy(config: &RunConfig, output: &Output, interrupt: &Interrupt) -> Result<()> {
    output.progress(&format!(
        "Deploying {} ({}) to {}{}",
        config.source.repo,
        config.source.branch,
        config.target.host,
        if config.dry_run { " [dry run]" } else { "" }
    ));

    output.progress("  → Synchronising source...");
    let synced = SourceSynchronizer::new(&config.source, interrupt)
        .dry_run(config.dry_run)
        .synchronize()
        .await?;
    match &synced.action {
        SyncAction::Cloned => output.progress(&format!("    cloned into {}", synced.path.display())),
        SyncAction::Updated => output.progress(&format!("    updated {}", synced.path.display())),
        SyncAction::Planned(steps) => {
            for step in steps {
                output.progress(&format!("    would run: {step}"));
            }
        }
    }

    let remote = open_remote(config, interrupt, output).await?;
    let mirror = Rsync::new(interrupt.clone()).dry_run(config.dry_run);
    let result = deploy::deploy(
        config,
        &remote,
        &mirror,
        &synced.path,
        HttpProbe::new(config.timeouts.http),
        output,
    )
    .await;
    print_plan(&remote, output);
    close_remote(&remote, output).await;

    let (report, diag) = result?;
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    output.progress(&format!(
        "  ✓ http://{}/ → 127.0.0.1:{}{}",
        report.host,
        report.upstream_port,
        report
            .mode
            .as_deref()
            .map(|m| format!(" ({m})"))
            .unwrap_or_default()
    ));
    output.report("deploy", &report);
    if config.dry_run {
        output.success("Dry run complete, nothing was changed");
    } else {
        output.success("Deployment complete!");
    }
    Ok(())
}
