//! Query commands for searching and retrieving AUR package information.
//!
//! Both commands go straight to the RPC interface and never touch the local
//! package databases.

use crate::api::{AurClient, PackageInfo};
use crate::error::Result;
use crate::output;
use colored::Colorize;

/// Search the AUR and print matches, closest names first.
pub async fn search(client: &AurClient, query: &str, quiet: bool) -> Result<()> {
    let spinner = output::spinner(format!("Searching for '{}'...", query));
    let results = client.search(query).await;
    spinner.finish_and_clear();

    let results = rank(results?, query);
    if results.is_empty() {
        if output::is_tty() && !quiet {
            println!("{} No packages found matching '{}'", "✗".red(), query);
        }
        return Ok(());
    }

    output::print_search_results(&results, quiet);
    Ok(())
}

/// Order by Jaro-Winkler similarity to the query, then votes, then name.
fn rank(mut results: Vec<PackageInfo>, query: &str) -> Vec<PackageInfo> {
    let query = query.to_lowercase();
    let score = |pkg: &PackageInfo| strsim::jaro_winkler(&pkg.name.to_lowercase(), &query);

    results.sort_by(|a, b| {
        score(b)
            .total_cmp(&score(a))
            .then_with(|| b.num_votes.cmp(&a.num_votes))
            .then_with(|| a.name.cmp(&b.name))
    });
    results
}

/// Show the RPC record for one package.
pub async fn info(client: &AurClient, name: &str) -> Result<()> {
    let spinner = output::spinner(format!("Fetching info for {}...", name));
    let pkg = client.info(name).await;
    spinner.finish_and_clear();

    output::print_info(&pkg?);
    Ok(())
}
