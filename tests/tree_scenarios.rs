//! End-to-end behavior of trees, search and views over real directories.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use treesize::{
    search, CancelToken, Node, PopulationMode, SearchOptions, TreeContext, TreeOptions, View,
    ViewCoordinator,
};

const WAIT: Duration = Duration::from_secs(20);

fn options(population: PopulationMode) -> TreeOptions {
    TreeOptions {
        population,
        threads: 4,
        ..TreeOptions::default()
    }
}

fn tree(root: &Path, population: PopulationMode) -> Arc<Node> {
    let ctx = TreeContext::new(options(population), CancelToken::new()).unwrap();
    Node::from_path(root, ctx).unwrap()
}

/// app.log (5 bytes) and applog/x.log (3 bytes)
fn log_fixture() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("app.log"), b"12345").unwrap();
    fs::create_dir(dir.path().join("applog")).unwrap();
    fs::write(dir.path().join("applog").join("x.log"), b"abc").unwrap();
    dir
}

fn names(nodes: &[Arc<Node>]) -> Vec<String> {
    nodes.iter().map(|node| node.name().to_string()).collect()
}

#[test]
fn test_aggregate_matches_disk_usage() {
    let dir = tempfile::tempdir().unwrap();
    let mut expected = 0u64;
    for d in 0..3 {
        let sub = dir.path().join(format!("d{}", d));
        fs::create_dir_all(sub.join("nested")).unwrap();
        for f in 0..4u64 {
            let len = (d as u64 + 1) * 100 + f;
            fs::write(sub.join(format!("f{}", f)), vec![1u8; len as usize]).unwrap();
            fs::write(sub.join("nested").join(format!("g{}", f)), vec![2u8; f as usize]).unwrap();
            expected += len + f;
        }
    }

    let root = tree(dir.path(), PopulationMode::Eager);
    assert!(root.wait_final(WAIT));
    assert_eq!(root.size(), Some(expected));

    let children = root.children().unwrap();
    assert!(children.wait_sorted(WAIT));
    assert_eq!(names(&children.snapshot()), ["d2", "d1", "d0"]);
    for child in children.snapshot() {
        assert!(child.is_size_final());
        assert!(Arc::ptr_eq(&child.parent().unwrap(), &root));
    }
}

#[test]
fn test_search_finds_files_biggest_first() {
    let dir = log_fixture();
    let root = tree(dir.path(), PopulationMode::Eager);
    assert!(root.wait_final(WAIT));

    let outcome = search(&root, "log", &SearchOptions::default(), &CancelToken::new());
    let results = outcome.into_results().unwrap();
    assert_eq!(names(&results), ["app.log", "x.log"]);
}

#[test]
fn test_search_can_include_directories() {
    let dir = log_fixture();
    let root = tree(dir.path(), PopulationMode::Eager);
    assert!(root.wait_final(WAIT));

    let options = SearchOptions {
        include_directories: true,
        ..SearchOptions::default()
    };
    let results = search(&root, "app", &options, &CancelToken::new())
        .into_results()
        .unwrap();
    assert_eq!(names(&results), ["app.log", "applog"]);
}

#[test]
fn test_cancelled_search_reports_cancelled() {
    let dir = log_fixture();
    let root = tree(dir.path(), PopulationMode::Eager);

    let cancel = CancelToken::new();
    cancel.cancel();
    let outcome = search(&root, "log", &SearchOptions::default(), &cancel);
    assert!(outcome.is_cancelled());
}

#[test]
fn test_search_cancelled_mid_traversal_keeps_committed_tree() {
    const WIDTH: usize = 60;
    let dir = tempfile::tempdir().unwrap();
    for d in 0..WIDTH {
        let sub = dir.path().join(format!("d{:02}", d));
        fs::create_dir_all(sub.join("inner")).unwrap();
        fs::write(sub.join("data.log"), vec![0u8; d + 1]).unwrap();
        fs::write(sub.join("inner").join("deep.log"), b"x").unwrap();
    }

    let root = tree(dir.path(), PopulationMode::Lazy);
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    // Fires from the pool while the root is still being read.
    root.children()
        .unwrap()
        .list()
        .subscribe(move |_| trigger.cancel());

    let outcome = search(&root, "log", &SearchOptions::default(), &cancel);
    assert!(outcome.is_cancelled());

    // The root read that was underway completes in full; nothing below it was touched.
    assert!(root.wait_populated(WAIT));
    let children = root.children().unwrap().snapshot();
    assert_eq!(children.len(), WIDTH);
    for child in &children {
        assert!(!child.is_populated(), "{} was populated", child.name());
        assert!(child.children().unwrap().is_empty());
    }
}

#[test]
fn test_lazy_search_populates_unexplored_directories() {
    let dir = log_fixture();
    let root = tree(dir.path(), PopulationMode::Lazy);
    assert!(!root.is_populated());

    let results = search(&root, "x.", &SearchOptions::default(), &CancelToken::new())
        .into_results()
        .unwrap();
    assert_eq!(names(&results), ["x.log"]);
    assert!(root.is_populated());
}

#[test]
fn test_serial_lazy_search_matches_parallel() {
    let dir = log_fixture();
    let serial = TreeOptions {
        parallel_search: false,
        ..options(PopulationMode::Lazy)
    };
    let ctx = TreeContext::new(serial, CancelToken::new()).unwrap();
    let root = Node::from_path(dir.path(), ctx).unwrap();

    let mut results = search(&root, "log", &SearchOptions::default(), &CancelToken::new())
        .into_results()
        .unwrap();
    results.sort_by(|a, b| a.name().cmp(b.name()));
    assert_eq!(names(&results), ["app.log", "x.log"]);
}

#[test]
fn test_view_search_publishes_results() {
    let dir = log_fixture();
    let views = ViewCoordinator::new(options(PopulationMode::Eager), SearchOptions::default()).unwrap();
    let (_, events) = views.subscribe_channel();

    let ticket = views.refresh(dir.path(), Some(" log ")).unwrap();

    let first = events.recv_timeout(WAIT).unwrap();
    assert_eq!(first.generation, ticket.generation);
    assert!(matches!(first.view, View::Searching { ref term, .. } if term == "log"));

    let second = events.recv_timeout(WAIT).unwrap();
    let View::Results { term, results, .. } = second.view else {
        panic!("expected search results");
    };
    assert_eq!(term, "log");
    let mut found = names(&results.snapshot());
    found.sort();
    assert_eq!(found, ["app.log", "x.log"]);
}

#[test]
fn test_superseded_search_never_publishes() {
    let dir = log_fixture();
    let views = ViewCoordinator::new(options(PopulationMode::Eager), SearchOptions::default()).unwrap();

    views.refresh(dir.path(), Some("log")).unwrap();
    let latest = views.refresh(dir.path(), None).unwrap();

    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(views.generation(), latest.generation);
    assert!(matches!(views.current(), Some(View::Tree(_))));
}

#[test]
fn test_inaccessible_entries_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("visible"), vec![0u8; 7]).unwrap();
    let locked = dir.path().join("locked");
    fs::create_dir(&locked).unwrap();
    fs::write(locked.join("hidden"), vec![0u8; 1000]).unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    }

    let root = tree(dir.path(), PopulationMode::Eager);
    let settled = root.wait_final(WAIT);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    }

    assert!(settled);
    // Running as root ignores the permission bits, so the locked file may count.
    let size = root.size().unwrap();
    assert!(size == 7 || size == 1007, "unexpected size {}", size);
}
