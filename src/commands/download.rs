//! Download a package and every dependency the local repositories lack.

use crate::api::RemoteClient;
use crate::error::Result;
use crate::output;
use crate::resolver::{Resolution, Resolver};
use colored::Colorize;
use std::path::Path;

/// Resolve `name` and report what was written.
///
/// Returns the error for `name` itself; failed dependencies are printed and
/// left in the returned [`Resolution`].
pub async fn download<C: RemoteClient>(resolver: &Resolver<C>, name: &str) -> Result<Resolution> {
    let config = resolver.config();

    let spinner = output::spinner(format!("Resolving {}...", name));
    let resolution = resolver.resolve(name).await;
    spinner.finish_and_clear();
    let resolution = resolution?;

    for (pkg, extracted) in &resolution.fetched {
        let dir = extracted.root.as_deref().unwrap_or(Path::new(pkg));
        let path = config.output_dir.join(dir);
        if config.quiet {
            println!("{}", path.display());
        } else {
            println!(
                "{} {} {}",
                "✓".green(),
                pkg.bold(),
                path.display().to_string().dimmed()
            );
        }
    }

    if !config.quiet {
        for pkg in &resolution.skipped {
            println!("{} {} exists, skipping", "⚠".yellow(), pkg.bold());
        }
    }

    for failure in &resolution.failed {
        eprintln!("{} {}: {}", "✗".red(), failure.name.bold(), failure.error);
    }

    if !config.quiet {
        let mut summary = format!(
            "{} fetched, {} skipped",
            resolution.fetched.len().to_string().bold(),
            resolution.skipped.len()
        );
        if !resolution.is_complete() {
            summary.push_str(&format!(", {} failed", resolution.failed.len().to_string().red()));
        }
        println!("{}", summary);
    }

    Ok(resolution)
}
