// ABOUTME: Cleanup command implementation.
// ABOUTME: Verifies the host is reachable, then tears the deployment down.

use super::{close_remote, open_remote, print_plan};
use dockhand::config::RunConfig;
use dockhand::deploy;
use dockhand::error::Result;
use dockhand::interrupt::Interrupt;
use dockhand::output::Output;
use dockhand::source::SourceSynchronizer;

pub async fn cleanup(config: &RunConfig, output: &Output, interrupt: &Interrupt) -> Result<()> {
    output.progress(&format!(
        "Cleaning up {} on {}{}",
        config.source.repo,
        config.target.host,
        if config.dry_run { " [dry run]" } else { "" }
    ));

    // The source is synchronised in both modes so a bad token fails early.
    SourceSynchronizer::new(&config.source, interrupt)
        .dry_run(config.dry_run)
        .synchronize()
        .await?;

    let remote = open_remote(config, interrupt, output).await?;
    let result = deploy::cleanup(config, &remote, output).await;
    print_plan(&remote, output);
    close_remote(&remote, output).await;

    let (report, diag) = result?;
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    if report.container_removed {
        output.progress("    removed container");
    }
    for image in &report.images_removed {
        output.progress(&format!("    removed image {image}"));
    }
    if report.directory_removed {
        output.progress(&format!("    removed {}", config.target.remote_dir));
    }
    if report.default_site_restored {
        output.progress("    re-enabled the default nginx site");
    }
    output.report("cleanup", &report);
    output.success("Cleanup complete!");
    Ok(())
}
