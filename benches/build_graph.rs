//! This bench builds and resolves the graph of two large, interlinked
//! certification documents.

#![allow(missing_docs)]

use std::{fmt::Write, fs, path::Path};

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use reqtrace::{Config, GraphBuilder, TaggerRegistry};
use tempfile::TempDir;

const CONFIG: &str = r#"
_version = "1"

[[repos]]
name = "bench"

[[repos.documents]]
path = "SYS.md"
prefix = "BENCH"
level = "SYS"
attributes = { Verification = { value = "(Test|Inspection)" } }

[[repos.documents]]
path = "SWL.md"
prefix = "BENCH"
level = "SWL"

[[repos.documents.parents]]
prefix = "BENCH"
level = "SYS"
"#;

/// Writes `count` system requirements, each refined by two software
/// requirements.
fn preseed_repo(root: &Path, count: usize) {
    let mut sys = String::from("# System requirements\n\n");
    let mut swl = String::from("# Software requirements\n\n");

    for i in 1..=count {
        writeln!(
            sys,
            "## REQ-BENCH-SYS-{i} System {i}\nThe system shall do thing {i}.\n\n### Attributes:\n- Verification: Test\n"
        )
        .unwrap();
        for j in [2 * i - 1, 2 * i] {
            writeln!(
                swl,
                "## REQ-BENCH-SWL-{j} Software {j}\nThe software shall do part {j}, see REQ-BENCH-SYS-{i}.\n\n### Attributes:\n- Parents: REQ-BENCH-SYS-{i}\n"
            )
            .unwrap();
        }
    }

    fs::write(root.join("SYS.md"), sys).unwrap();
    fs::write(root.join("SWL.md"), swl).unwrap();
}

fn build_graph(c: &mut Criterion) {
    let registry = TaggerRegistry::new();

    c.bench_function("build graph", |b| {
        b.iter_batched(
            || {
                let tmp_dir = TempDir::new().unwrap();
                preseed_repo(tmp_dir.path(), 500);
                let config = Config::from_toml(CONFIG, tmp_dir.path()).unwrap();
                (tmp_dir, config)
            },
            |(_tmp_dir, config)| {
                let graph = GraphBuilder::new(config, &registry).build().unwrap();
                assert!(graph.issues().is_empty());
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, build_graph);
criterion_main!(benches);
