// Resolver runs against an in-memory repository serving real tar.gz snapshots

mod test_helpers;

use aurpull::api::{RemoteClient, RpcMethod, RpcResponse};
use aurpull::config::Config;
use aurpull::database::{Classifier, InstalledSet, PackageIndex, PackageRecord};
use aurpull::error::{AurError, Result, Stage};
use aurpull::resolver::Resolver;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use test_helpers::ArchiveBuilder;

/// Repository that serves a PKGBUILD and a snapshot per package and counts
/// every request.
#[derive(Default)]
struct MemoryRepo {
    recipes: HashMap<String, String>,
    broken_archives: Vec<String>,
    recipe_requests: Mutex<Vec<String>>,
    archive_requests: Mutex<Vec<String>>,
}

impl MemoryRepo {
    fn package(mut self, name: &str, recipe: &str) -> Self {
        self.recipes.insert(name.to_string(), recipe.to_string());
        self
    }

    fn broken_archive(mut self, name: &str) -> Self {
        self.broken_archives.push(name.to_string());
        self
    }

    fn archive_count(&self, name: &str) -> usize {
        self.archive_requests
            .lock()
            .unwrap()
            .iter()
            .filter(|n| *n == name)
            .count()
    }

    fn recipe_requests(&self) -> Vec<String> {
        let mut requests = self.recipe_requests.lock().unwrap().clone();
        requests.sort();
        requests
    }
}

impl RemoteClient for MemoryRepo {
    async fn fetch_recipe(&self, name: &str) -> Result<String> {
        self.recipe_requests.lock().unwrap().push(name.to_string());
        tokio::task::yield_now().await;
        self.recipes
            .get(name)
            .cloned()
            .ok_or_else(|| AurError::PackageNotFound(name.to_string()))
    }

    async fn fetch_archive(&self, name: &str) -> Result<Vec<u8>> {
        self.archive_requests.lock().unwrap().push(name.to_string());
        tokio::task::yield_now().await;
        if self.broken_archives.iter().any(|n| n == name) {
            return Ok(b"\x1f\x8bgarbage".to_vec());
        }
        let recipe = self
            .recipes
            .get(name)
            .ok_or_else(|| AurError::PackageNotFound(name.to_string()))?;
        Ok(ArchiveBuilder::new()
            .dir(name)
            .file(&format!("{}/PKGBUILD", name), recipe.as_bytes())
            .into_tar_gz())
    }

    async fn query(&self, _method: RpcMethod, _arg: &str) -> Result<RpcResponse> {
        Ok(RpcResponse::default())
    }
}

fn resolver(repo: MemoryRepo, classifier: Classifier, config: Config) -> Resolver<MemoryRepo> {
    Resolver::new(Arc::new(repo), Arc::new(classifier), Arc::new(config))
}

fn config(out: &Path) -> Config {
    Config {
        output_dir: out.to_path_buf(),
        ..Config::default()
    }
}

fn sorted<'a>(names: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut names: Vec<_> = names.collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_only_external_dependencies_are_resolved() {
    let out = tempfile::tempdir().unwrap();
    let index = PackageIndex::new();
    index.insert(PackageRecord::new("core").with_field("NAME", "dep2"));
    let classifier = index.freeze(InstalledSet::from_iter(["dep1"]));

    let repo = MemoryRepo::default()
        .package("root", "depends=('dep1' 'dep2>=2.0')\nmakedepends=('dep3')")
        .package("dep3", "pkgname=dep3");
    let resolver = resolver(repo, classifier, config(out.path()));

    let resolution = resolver.resolve("root").await.unwrap();

    assert!(resolution.is_complete());
    assert_eq!(sorted(resolution.fetched_names()), vec!["dep3", "root"]);
    assert_eq!(resolver_repo(&resolver).recipe_requests(), vec!["dep3", "root"]);
    assert!(out.path().join("root/PKGBUILD").is_file());
    assert_eq!(
        std::fs::read_to_string(out.path().join("dep3/PKGBUILD")).unwrap(),
        "pkgname=dep3"
    );
    assert!(!out.path().join("dep1").exists());
    assert!(!out.path().join("dep2").exists());
}

#[tokio::test]
async fn test_provided_dependency_is_not_fetched() {
    let out = tempfile::tempdir().unwrap();
    let index = PackageIndex::new();
    index.insert(
        PackageRecord::new("extra")
            .with_field("NAME", "jre-openjdk")
            .with_field("PROVIDES", "java-runtime=21 java-environment=21"),
    );
    let classifier = index.freeze(InstalledSet::default());

    let repo = MemoryRepo::default().package("app", "depends=('java-runtime>=17')");
    let resolver = resolver(repo, classifier, config(out.path()));

    let resolution = resolver.resolve("app").await.unwrap();
    assert_eq!(sorted(resolution.fetched_names()), vec!["app"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_diamond_fetches_shared_dependency_once() {
    for _ in 0..50 {
        let out = tempfile::tempdir().unwrap();
        let repo = MemoryRepo::default()
            .package("a", "depends=('b' 'c')")
            .package("b", "depends=('d')")
            .package("c", "depends=('d')")
            .package("d", "");
        let resolver = resolver(repo, Classifier::default(), config(out.path()));

        let resolution = resolver.resolve("a").await.unwrap();

        assert_eq!(sorted(resolution.fetched_names()), vec!["a", "b", "c", "d"]);
        let repo = resolver_repo(&resolver);
        assert_eq!(repo.archive_count("d"), 1);
        assert_eq!(repo.recipe_requests(), vec!["a", "b", "c", "d"]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_job_deep_chain_completes() {
    let out = tempfile::tempdir().unwrap();
    let repo = MemoryRepo::default()
        .package("a", "depends=('b')")
        .package("b", "depends=('c')")
        .package("c", "makedepends=('d' 'e')")
        .package("d", "")
        .package("e", "depends=('a')");
    let config = Config {
        jobs: 1,
        ..config(out.path())
    };
    let resolver = resolver(repo, Classifier::default(), config);

    let resolution = tokio::time::timeout(std::time::Duration::from_secs(10), resolver.resolve("a"))
        .await
        .expect("resolution deadlocked")
        .unwrap();
    assert_eq!(resolution.fetched.len(), 5);
}

#[tokio::test]
async fn test_broken_dependency_archive_is_isolated() {
    let out = tempfile::tempdir().unwrap();
    let repo = MemoryRepo::default()
        .package("root", "depends=('bad' 'good')")
        .package("bad", "")
        .package("good", "")
        .broken_archive("bad");
    let resolver = resolver(repo, Classifier::default(), config(out.path()));

    let resolution = resolver.resolve("root").await.unwrap();

    assert_eq!(sorted(resolution.fetched_names()), vec!["good", "root"]);
    assert_eq!(resolution.failed.len(), 1);
    assert_eq!(resolution.failed[0].name, "bad");
    assert!(matches!(
        resolution.failed[0].error,
        AurError::Package {
            stage: Stage::Extract,
            ..
        }
    ));
}

#[tokio::test]
async fn test_root_archive_failure_is_fatal() {
    let out = tempfile::tempdir().unwrap();
    let repo = MemoryRepo::default()
        .package("root", "depends=('dep')")
        .package("dep", "")
        .broken_archive("root");
    let resolver = resolver(repo, Classifier::default(), config(out.path()));

    let err = resolver.resolve("root").await.unwrap_err();
    assert!(err.to_string().starts_with("root: extracting archive failed"));
    // Dependencies were still attempted before the error surfaced
    assert!(out.path().join("dep/PKGBUILD").exists());
}

#[tokio::test]
async fn test_force_overwrites_existing_target() {
    let out = tempfile::tempdir().unwrap();
    std::fs::create_dir(out.path().join("root")).unwrap();
    std::fs::write(out.path().join("root/PKGBUILD"), "stale").unwrap();

    let repo = MemoryRepo::default().package("root", "fresh");
    let config = Config {
        force: true,
        ..config(out.path())
    };
    let resolver = resolver(repo, Classifier::default(), config);

    let resolution = resolver.resolve("root").await.unwrap();
    assert!(resolution.skipped.is_empty());
    assert_eq!(
        std::fs::read_to_string(out.path().join("root/PKGBUILD")).unwrap(),
        "fresh"
    );
}

#[tokio::test]
async fn test_skipped_package_still_resolves_dependencies() {
    let out = tempfile::tempdir().unwrap();
    std::fs::create_dir(out.path().join("root")).unwrap();

    let repo = MemoryRepo::default()
        .package("root", "depends=('dep')")
        .package("dep", "");
    let resolver = resolver(repo, Classifier::default(), config(out.path()));

    let resolution = resolver.resolve("root").await.unwrap();
    assert_eq!(resolution.skipped, vec!["root"]);
    assert_eq!(sorted(resolution.fetched_names()), vec!["dep"]);
}

#[tokio::test]
async fn test_each_resolve_starts_fresh() {
    let out = tempfile::tempdir().unwrap();
    let repo = MemoryRepo::default().package("root", "");
    let config = Config {
        force: true,
        ..config(out.path())
    };
    let resolver = resolver(repo, Classifier::default(), config);

    resolver.resolve("root").await.unwrap();
    resolver.resolve("root").await.unwrap();
    assert_eq!(resolver_repo(&resolver).archive_count("root"), 2);
}

fn resolver_repo(resolver: &Resolver<MemoryRepo>) -> &MemoryRepo {
    resolver.client()
}
