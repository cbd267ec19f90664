use crate::api::RemoteClient;
use crate::error::Result;
use crate::output;
use crate::resolver::Resolver;
use colored::Colorize;

/// List the declared dependencies of `name` and where each would come from.
pub async fn deps<C: RemoteClient>(resolver: &Resolver<C>, name: &str) -> Result<()> {
    let quiet = resolver.config().quiet;

    let spinner = output::spinner(format!("Fetching dependencies for {}...", name));
    let plan = resolver.plan(name).await;
    spinner.finish_and_clear();
    let plan = plan?;

    if plan.is_empty() {
        if !quiet {
            println!("{} No dependencies", "✓".green());
        }
        return Ok(());
    }

    for dep in &plan {
        if quiet {
            println!("{}", dep.name);
        } else {
            println!("{}", output::format_dependency(&dep.name, &dep.class));
        }
    }

    if !quiet {
        let external = plan.iter().filter(|d| d.class.is_external()).count();
        println!(
            "\n{} dependencies, {} from the AUR",
            plan.len().to_string().bold(),
            external.to_string().bold()
        );
    }
    Ok(())
}
