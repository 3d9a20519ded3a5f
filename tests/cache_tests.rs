use rustle_playbook::cache::{
    CacheError, GalaxyInstaller, SourceCache, SourceError, LOCK_FILE,
};
use rustle_playbook::orchestrator::parse_role_definition;
use rustle_playbook::types::RoleDefinition;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn definition(role: &str, body: &str) -> RoleDefinition {
    let content = format!("playbook_path: .\nplaybook_file: site.yml\n{body}");
    parse_role_definition(role, &content, "role.yml").unwrap()
}

fn local_scripts(dir: &Path) -> std::path::PathBuf {
    let scripts = dir.join("roles/ntp");
    fs::create_dir_all(scripts.join("files/tasks")).unwrap();
    fs::write(scripts.join("files/site.yml"), "- hosts: all\n").unwrap();
    fs::write(scripts.join("files/tasks/main.yml"), "---\n").unwrap();
    scripts
}

fn read_tree(root: &Path) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = walkdir::WalkDir::new(root)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(root).unwrap().display().to_string();
            (relative, fs::read_to_string(e.path()).unwrap())
        })
        .collect();
    entries.sort();
    entries
}

#[tokio::test]
async fn test_local_source_copy_is_idempotent() {
    let work = TempDir::new().unwrap();
    let scripts = local_scripts(work.path());
    let cache = SourceCache::new(work.path().join("cache"));
    let definition = definition("ntp", "playbook_src_paths:\n  local: files\n");

    let role_dir = cache.ensure("ntp", &definition, &scripts).await.unwrap();
    assert_eq!(role_dir, work.path().join("cache/ntp"));
    assert!(work.path().join("cache").join(LOCK_FILE).exists());
    let first = read_tree(&role_dir.join("local"));

    cache.ensure("ntp", &definition, &scripts).await.unwrap();
    let second = read_tree(&role_dir.join("local"));

    assert_eq!(first, second);
    assert_eq!(
        first,
        vec![
            ("site.yml".to_string(), "- hosts: all\n".to_string()),
            ("tasks/main.yml".to_string(), "---\n".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_local_edits_propagate_on_refresh() {
    let work = TempDir::new().unwrap();
    let scripts = local_scripts(work.path());
    let cache = SourceCache::new(work.path().join("cache"));
    let definition = definition("ntp", "playbook_src_paths:\n  local: files\n");

    let role_dir = cache.ensure("ntp", &definition, &scripts).await.unwrap();
    fs::write(scripts.join("files/site.yml"), "- hosts: ntp\n").unwrap();
    cache.refresh("ntp", &definition, &scripts).await.unwrap();

    assert_eq!(
        fs::read_to_string(role_dir.join("local/site.yml")).unwrap(),
        "- hosts: ntp\n"
    );
}

#[tokio::test]
async fn test_missing_local_source_fails() {
    let work = TempDir::new().unwrap();
    let scripts = local_scripts(work.path());
    let cache = SourceCache::new(work.path().join("cache"));
    let definition = definition("ntp", "playbook_src_paths:\n  local: nowhere\n");

    let err = cache.ensure("ntp", &definition, &scripts).await.unwrap_err();
    assert!(matches!(err, CacheError::Source(SourceError::Copy { .. })));
}

#[cfg(unix)]
#[tokio::test]
async fn test_existing_remote_sources_are_left_alone() {
    let work = TempDir::new().unwrap();
    let scripts = local_scripts(work.path());
    // An installer that always fails: reaching it would fail the run
    let cache = SourceCache::new(work.path().join("cache")).with_galaxy(GalaxyInstaller {
        program: "false".to_string(),
        use_sudo: false,
    });
    let definition = definition(
        "ntp",
        "playbook_src_paths:\n  ntp: galaxy:geerlingguy.ntp\n  kargo: https://127.0.0.1:1/kargo.git\n",
    );

    for name in ["ntp", "kargo"] {
        let dir = work.path().join("cache/ntp").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("marker"), name).unwrap();
    }

    cache.ensure("ntp", &definition, &scripts).await.unwrap();

    assert_eq!(
        fs::read_to_string(work.path().join("cache/ntp/kargo/marker")).unwrap(),
        "kargo"
    );
    assert_eq!(
        fs::read_to_string(work.path().join("cache/ntp/ntp/marker")).unwrap(),
        "ntp"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_galaxy_install_creates_placeholder() {
    let work = TempDir::new().unwrap();
    let scripts = local_scripts(work.path());
    let definition = definition("ntp", "playbook_src_paths:\n  ntp: galaxy:geerlingguy.ntp\n");

    let installed = SourceCache::new(work.path().join("cache")).with_galaxy(GalaxyInstaller {
        program: "true".to_string(),
        use_sudo: false,
    });
    let role_dir = installed.ensure("ntp", &definition, &scripts).await.unwrap();
    assert!(role_dir.join("ntp").is_dir());
    assert_eq!(fs::read_dir(role_dir.join("ntp")).unwrap().count(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_failed_galaxy_install_is_fatal() {
    let work = TempDir::new().unwrap();
    let scripts = local_scripts(work.path());
    let definition = definition("ntp", "playbook_src_paths:\n  ntp: galaxy:geerlingguy.ntp\n");

    let cache = SourceCache::new(work.path().join("cache")).with_galaxy(GalaxyInstaller {
        program: "false".to_string(),
        use_sudo: false,
    });
    let err = cache.ensure("ntp", &definition, &scripts).await.unwrap_err();

    match err {
        CacheError::Source(SourceError::Install { spec, role, .. }) => {
            assert_eq!(spec, "galaxy:geerlingguy.ntp");
            assert_eq!(role, "ntp");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!work.path().join("cache/ntp/ntp").exists());
}

#[tokio::test]
async fn test_failed_clone_leaves_no_directory() {
    let work = TempDir::new().unwrap();
    let scripts = local_scripts(work.path());
    let cache = SourceCache::new(work.path().join("cache"));
    let definition = definition(
        "ntp",
        "playbook_src_paths:\n  kargo: http://127.0.0.1:1/kargo.git\n",
    );

    let err = cache.ensure("ntp", &definition, &scripts).await.unwrap_err();
    assert!(matches!(err, CacheError::Source(SourceError::Clone { .. })));
    assert!(!work.path().join("cache/ntp/kargo").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_setup_actions_run_in_order_in_role_dir() {
    let work = TempDir::new().unwrap();
    let scripts = local_scripts(work.path());
    let cache = SourceCache::new(work.path().join("cache"));
    let definition = definition(
        "ntp",
        "playbook_src_paths:\n  local: files\nplaybook_src_setup:\n  - echo one >> order.txt\n  - test -f local/site.yml && echo two >> order.txt\n",
    );

    let role_dir = cache.ensure("ntp", &definition, &scripts).await.unwrap();
    assert_eq!(
        fs::read_to_string(role_dir.join("order.txt")).unwrap(),
        "one\ntwo\n"
    );

    // refresh does not rerun them
    cache.refresh("ntp", &definition, &scripts).await.unwrap();
    assert_eq!(
        fs::read_to_string(role_dir.join("order.txt")).unwrap(),
        "one\ntwo\n"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_failing_setup_action_is_fatal() {
    let work = TempDir::new().unwrap();
    let scripts = local_scripts(work.path());
    let cache = SourceCache::new(work.path().join("cache"));
    let definition = definition(
        "ntp",
        "playbook_src_paths:\n  local: files\nplaybook_src_setup:\n  - echo broken >&2; exit 4\n  - touch never\n",
    );

    let err = cache.ensure("ntp", &definition, &scripts).await.unwrap_err();
    match err {
        CacheError::SetupAction(e) => {
            assert_eq!(e.role, "ntp");
            assert_eq!(e.status, "4");
            assert!(e.output.contains("broken"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!work.path().join("cache/ntp/never").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_concurrent_population_is_serialized() {
    let work = TempDir::new().unwrap();
    let scripts = local_scripts(work.path());
    let root = work.path().join("cache");
    let action = "playbook_src_paths:\n  local: files\nplaybook_src_setup:\n  - if [ -e ../busy ]; then echo overlap >> ../overlaps; fi; touch ../busy; sleep 0.3; rm ../busy\n";
    let first = definition("ntp", action);
    let second = definition("chrony", action);

    let cache_a = SourceCache::new(&root);
    let cache_b = SourceCache::new(&root);
    let (a, b) = tokio::join!(
        cache_a.ensure("ntp", &first, &scripts),
        cache_b.ensure("chrony", &second, &scripts),
    );
    a.unwrap();
    b.unwrap();

    assert!(!root.join("overlaps").exists());
    assert!(root.join("ntp/local/site.yml").exists());
    assert!(root.join("chrony/local/site.yml").exists());
}
