//! Recursive dependency resolution and parallel fetching.
//!
//! For a requested package the resolver:
//!
//! 1. marks the name visited (a repeat visit is a no-op, which also breaks
//!    dependency cycles),
//! 2. fetches its PKGBUILD and extracts `depends` + `makedepends`,
//! 3. classifies every dependency and spawns a task for each one no local
//!    repository provides,
//! 4. downloads and unpacks its own snapshot while those tasks run,
//! 5. waits for every spawned task before reporting completion.
//!
//! The result is a fork-join tree: a parent never finishes before its whole
//! subtree has been attempted. A failing dependency is recorded and logged
//! without cancelling its siblings; only a failure of the requested package
//! itself is returned as an error.
//!
//! The visited set is the only state shared between tasks and is updated
//! under a mutex. Network and disk work holds a semaphore permit so at most
//! `Config::jobs` fetches or extractions run at once. Permits are released
//! before a task waits on its children, so a deep tree cannot starve itself.

use crate::api::RemoteClient;
use crate::config::Config;
use crate::database::{Classification, Classifier};
use crate::error::{AurError, Result, Stage};
use crate::extract::{self, Extracted};
use crate::recipe;
use anyhow::anyhow;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::task::JoinSet;

/// A package whose resolution failed.
#[derive(Debug)]
pub struct Failure {
    pub name: String,
    pub error: AurError,
}

/// Everything one resolution run did.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Packages downloaded and extracted, with what was written.
    pub fetched: Vec<(String, Extracted)>,
    /// Packages whose extraction target already existed.
    pub skipped: Vec<String>,
    /// Packages that failed; the run carried on without them.
    pub failed: Vec<Failure>,
}

impl Resolution {
    pub fn fetched_names(&self) -> impl Iterator<Item = &str> {
        self.fetched.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn merge(&mut self, other: Resolution) {
        self.fetched.extend(other.fetched);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }
}

/// A declared dependency and where it would come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDependency {
    pub name: String,
    pub class: Classification,
}

enum Outcome {
    Fetched(Extracted),
    Skipped,
}

/// Dependency resolver and fetch orchestrator.
pub struct Resolver<C: RemoteClient> {
    client: Arc<C>,
    classifier: Arc<Classifier>,
    config: Arc<Config>,
}

impl<C: RemoteClient> Clone for Resolver<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            classifier: Arc::clone(&self.classifier),
            config: Arc::clone(&self.config),
        }
    }
}

impl<C: RemoteClient> Resolver<C> {
    pub fn new(client: Arc<C>, classifier: Arc<Classifier>, config: Arc<Config>) -> Self {
        Self {
            client,
            classifier,
            config,
        }
    }

    /// Fetch `root` and every dependency not available locally.
    ///
    /// Each call starts with an empty visited set. Failures of dependencies
    /// are reported in [`Resolution::failed`]; a failure of `root` itself is
    /// returned as the error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use aurpull::api::AurClient;
    /// use aurpull::config::Config;
    /// use aurpull::database::Classifier;
    /// use aurpull::resolver::Resolver;
    /// use std::sync::Arc;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let config = Arc::new(Config::from_env());
    ///     let classifier = Classifier::load(&config.local_db, &config.sync_db)?;
    ///     let client = AurClient::new(&config)?;
    ///     let resolver = Resolver::new(Arc::new(client), Arc::new(classifier), config);
    ///
    ///     let resolution = resolver.resolve("yay").await?;
    ///     for name in resolution.fetched_names() {
    ///         println!("./{}", name);
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub async fn resolve(&self, root: &str) -> Result<Resolution> {
        let run = Arc::new(Run {
            client: Arc::clone(&self.client),
            classifier: Arc::clone(&self.classifier),
            config: Arc::clone(&self.config),
            visited: Mutex::new(HashSet::new()),
            permits: Semaphore::new(self.config.jobs.max(1)),
        });

        let mut resolution = resolve_package(run, root.to_string()).await;

        if let Some(pos) = resolution.failed.iter().position(|f| f.name == root) {
            return Err(resolution.failed.remove(pos).error);
        }
        Ok(resolution)
    }

    /// Classify the direct dependencies of `name` without fetching anything
    /// but its recipe.
    pub async fn plan(&self, name: &str) -> Result<Vec<PlannedDependency>> {
        let pkgbuild = self
            .client
            .fetch_recipe(name)
            .await
            .map_err(|e| e.during(name, Stage::FetchRecipe))?;

        Ok(recipe::dependencies(&pkgbuild)
            .into_iter()
            .map(|dep| {
                let class = self.classifier.classify(&dep);
                PlannedDependency { name: dep, class }
            })
            .collect())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

/// State shared by every task of one resolution run.
struct Run<C> {
    client: Arc<C>,
    classifier: Arc<Classifier>,
    config: Arc<Config>,
    visited: Mutex<HashSet<String>>,
    permits: Semaphore,
}

impl<C> Run<C> {
    /// Atomically test-and-set `name` in the visited set. Returns `true` the
    /// first time a name is seen.
    fn mark_visited(&self, name: &str) -> bool {
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string())
    }

    async fn permit(&self) -> Result<SemaphorePermit<'_>> {
        self.permits
            .acquire()
            .await
            .map_err(|_| AurError::Other(anyhow!("fetch semaphore closed")))
    }
}

fn resolve_package<C: RemoteClient>(run: Arc<Run<C>>, name: String) -> BoxFuture<'static, Resolution> {
    async move {
        let mut resolution = Resolution::default();

        if !run.mark_visited(&name) {
            tracing::debug!("{} already visited", name);
            return resolution;
        }

        let pkgbuild = {
            let _permit = match run.permit().await {
                Ok(permit) => permit,
                Err(e) => return failed(resolution, &name, e.during(&name, Stage::FetchRecipe)),
            };
            tracing::info!("fetching recipe for {}", name);
            match run.client.fetch_recipe(&name).await {
                Ok(text) => text,
                Err(e) => return failed(resolution, &name, e.during(&name, Stage::FetchRecipe)),
            }
        };

        let mut children = JoinSet::new();
        let mut child_names = HashMap::new();
        for dep in recipe::dependencies(&pkgbuild) {
            let class = run.classifier.classify(&dep);
            tracing::debug!("{} depends on {} [{}]", name, dep, class);
            if class.is_external() {
                let handle = children.spawn(resolve_package(Arc::clone(&run), dep.clone()));
                child_names.insert(handle.id(), dep);
            }
        }

        match fetch_and_extract(&run, &name).await {
            Ok(Outcome::Fetched(extracted)) => resolution.fetched.push((name.clone(), extracted)),
            Ok(Outcome::Skipped) => resolution.skipped.push(name.clone()),
            Err(e) => {
                tracing::warn!("{}", e);
                resolution.failed.push(Failure {
                    name: name.clone(),
                    error: e,
                });
            }
        }

        while let Some(joined) = children.join_next().await {
            match joined {
                Ok(child) => resolution.merge(child),
                Err(e) => {
                    let child = child_names
                        .remove(&e.id())
                        .unwrap_or_else(|| "<unknown>".to_string());
                    tracing::warn!("resolution task for {} failed: {}", child, e);
                    resolution.failed.push(Failure {
                        name: child,
                        error: AurError::Other(anyhow!("resolution task failed: {}", e)),
                    });
                }
            }
        }

        resolution
    }
    .boxed()
}

fn failed(mut resolution: Resolution, name: &str, error: AurError) -> Resolution {
    tracing::warn!("{}", error);
    resolution.failed.push(Failure {
        name: name.to_string(),
        error,
    });
    resolution
}

async fn fetch_and_extract<C: RemoteClient>(run: &Run<C>, name: &str) -> Result<Outcome> {
    let target = run.config.package_dir(name);
    if target.exists() && !run.config.force {
        tracing::info!("{} exists, skipping", target.display());
        return Ok(Outcome::Skipped);
    }

    let _permit = run
        .permit()
        .await
        .map_err(|e| e.during(name, Stage::FetchArchive))?;

    tracing::info!("downloading {}", name);
    let bytes = run
        .client
        .fetch_archive(name)
        .await
        .map_err(|e| e.during(name, Stage::FetchArchive))?;

    let dest = run.config.output_dir.clone();
    let extracted = tokio::task::spawn_blocking(move || -> Result<Extracted> {
        let stream = extract::decompressed(Cursor::new(bytes))?;
        extract::extract(&dest, stream)
    })
    .await
    .map_err(|e| AurError::Other(anyhow!("extraction task panicked: {}", e)))
    .and_then(|result| result)
    .map_err(|e| e.during(name, Stage::Extract))?;

    tracing::info!("extracted {} ({} files)", name, extracted.files);
    Ok(Outcome::Fetched(extracted))
}
