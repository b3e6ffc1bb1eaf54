// End-to-end tests for `vgrid fuse`.
// Run with: cargo test -p visigrid-cli --test fuse_cli_tests -- --nocapture

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const A_CSV: &str = "\
id,name,city,updated
1,Jon,Oslo,2023-01-01
2,Mary,Bergen,2022-05-05
";

const B_CSV: &str = "\
id,name,city,updated
x,John,Oslo,2022-01-01
y,Mary,Stavanger,2024-01-01
";

const LINKS_CSV: &str = "\
id_a,id_b
1,x
2,y
";

const PEOPLE_TOML: &str = r#"
name = "people"

[sources.a]
file = "a.csv"

[sources.b]
file = "b.csv"

[links]
file = "links.csv"

[[resolve]]
strategy = "longest"
values_a = "name"
values_b = "name"

[[resolve]]
name = "city"
strategy = "metadata_max"
values_a = "city"
values_b = "city"
meta_a = "updated"
meta_b = "updated"
"#;

const EXPECTED_CSV: &str = "id_a,id_b,name,city\n1,x,John,Oslo\n2,y,Mary,Stavanger\n";

fn vgrid() -> Command {
    Command::new(env!("CARGO_BIN_EXE_vgrid"))
}

/// Temp dir with the three CSV inputs and `config` written as people.fuse.toml.
fn workspace(config: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.csv"), A_CSV).unwrap();
    std::fs::write(dir.path().join("b.csv"), B_CSV).unwrap();
    std::fs::write(dir.path().join("links.csv"), LINKS_CSV).unwrap();
    let config_path = dir.path().join("people.fuse.toml");
    std::fs::write(&config_path, config).unwrap();
    (dir, config_path)
}

fn run(args: &[&str], config: &Path) -> Output {
    vgrid().args(args).arg(config).output().unwrap()
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[test]
fn run_csv_to_stdout() {
    let (_dir, config) = workspace(PEOPLE_TOML);
    let out = run(&["fuse", "run", "--csv"], &config);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), EXPECTED_CSV);
    assert!(stderr(&out).contains("fuse 'people': 2 row(s), 2 column(s), 0 broadcast(s)"));
}

#[test]
fn run_json_report() {
    let (_dir, config) = workspace(PEOPLE_TOML);
    let out = run(&["fuse", "run", "--json"], &config);
    assert!(out.status.success(), "stderr: {}", stderr(&out));

    let report: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(report["meta"]["config_name"], "people");
    assert_eq!(report["meta"]["rows"], 2);
    assert_eq!(report["table"]["pairs"][1]["a"], "2");
    assert_eq!(report["table"]["pairs"][1]["b"], "y");
    assert_eq!(report["table"]["columns"][0]["name"], "name");
    assert_eq!(report["table"]["columns"][0]["values"][0], "John");
    assert_eq!(report["table"]["columns"][1]["values"][1], "Stavanger");
}

#[test]
fn run_writes_output_files() {
    let config_toml = format!("{PEOPLE_TOML}\n[output]\ncsv = \"fused.csv\"\n");
    let (dir, config) = workspace(&config_toml);
    let report_path = dir.path().join("report.json");

    let out = vgrid()
        .args(["fuse", "run"])
        .arg(&config)
        .arg("--output")
        .arg(&report_path)
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).is_empty());

    let csv = std::fs::read_to_string(dir.path().join("fused.csv")).unwrap();
    assert_eq!(csv, EXPECTED_CSV);
    let json = std::fs::read_to_string(&report_path).unwrap();
    assert!(json.contains("\"config_name\": \"people\""));
}

#[test]
fn broadcast_warning_respects_quiet() {
    let config_toml = r#"
name = "latest"
[sources.a]
file = "a.csv"
[sources.b]
file = "b.csv"
[links]
file = "links.csv"
[[resolve]]
name = "latest"
strategy = "metadata_max"
values_a = ["name", "city"]
values_b = ["name", "city"]
meta_a = "updated"
meta_b = "updated"
"#;
    let (_dir, config) = workspace(config_toml);

    let out = run(&["fuse", "run", "--csv"], &config);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stderr(&out).contains("warn: job 'latest': generalizing metadata on side a"));
    assert_eq!(stdout(&out), "id_a,id_b,latest\n1,x,Jon\n2,y,Mary\n");

    let quiet = run(&["--quiet", "fuse", "run", "--csv"], &config);
    assert!(quiet.status.success());
    assert!(!stderr(&quiet).contains("warn:"));
}

#[test]
fn verbose_logs_progress() {
    let (_dir, config) = workspace(PEOPLE_TOML);
    let out = run(&["-v", "fuse", "run"], &config);
    assert!(out.status.success());
    assert!(stderr(&out).contains("info: loaded 2 + 2 record(s), 2 pair(s)"));
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

#[test]
fn validate_lists_rules() {
    let (_dir, config) = workspace(PEOPLE_TOML);
    let out = run(&["fuse", "validate"], &config);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stderr(&out).contains("valid: fuse 'people' with 2 resolve rule(s): name, city"));
}

#[test]
fn validate_rejects_unknown_strategy() {
    let (_dir, config) = workspace(&PEOPLE_TOML.replace("\"longest\"", "\"loudest\""));
    let out = run(&["fuse", "validate"], &config);
    assert_eq!(out.status.code(), Some(60));
    assert!(stderr(&out).contains("loudest"));
}

#[test]
fn validate_rejects_opposite_broadcasts() {
    let config_toml = PEOPLE_TOML.replace(
        "values_a = \"city\"\nvalues_b = \"city\"\nmeta_a = \"updated\"\nmeta_b = \"updated\"",
        "values_a = [\"city\", \"name\"]\nvalues_b = \"city\"\nmeta_a = \"updated\"\nmeta_b = [\"updated\", \"id\"]",
    );
    assert_ne!(config_toml, PEOPLE_TOML);
    let (_dir, config) = workspace(&config_toml);
    let out = run(&["fuse", "validate"], &config);
    assert_eq!(out.status.code(), Some(60));
    assert!(stderr(&out).contains("opposite directions"), "stderr: {}", stderr(&out));
}

#[test]
fn validate_numbers_repeated_default_names() {
    let config_toml = format!(
        "{PEOPLE_TOML}\n[[resolve]]\nstrategy = \"vote\"\nvalues_a = \"name\"\nvalues_b = \"name\"\n"
    );
    let (_dir, config) = workspace(&config_toml);
    let out = run(&["fuse", "validate"], &config);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stderr(&out).contains("3 resolve rule(s): name, city, name_2"));
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn one_sided_metadata_is_config_error() {
    let (_dir, config) = workspace(&PEOPLE_TOML.replace("meta_b = \"updated\"\n", ""));
    let out = run(&["fuse", "run"], &config);
    assert_eq!(out.status.code(), Some(60));
}

#[test]
fn missing_column_is_runtime_error_with_hint() {
    let (_dir, config) = workspace(&PEOPLE_TOML.replace("values_b = \"city\"", "values_b = \"town\""));
    let out = run(&["fuse", "run"], &config);
    assert_eq!(out.status.code(), Some(61));
    let err = stderr(&out);
    assert!(err.contains("missing column 'town'"), "stderr: {err}");
    assert!(err.contains("hint:"));
}

#[test]
fn failed_job_logs_no_broadcast() {
    let config_toml = r#"
name = "latest"
[sources.a]
file = "a.csv"
[sources.b]
file = "b.csv"
[links]
file = "links.csv"
[[resolve]]
name = "latest"
strategy = "metadata_max"
values_a = ["name", "town"]
values_b = ["name", "city"]
meta_a = "updated"
meta_b = "updated"
"#;
    let (_dir, config) = workspace(config_toml);
    let out = run(&["fuse", "run"], &config);
    assert_eq!(out.status.code(), Some(61));
    let err = stderr(&out);
    assert!(err.contains("missing column 'town'"), "stderr: {err}");
    assert!(!err.contains("generalizing"), "stderr: {err}");
}

#[test]
fn missing_input_file() {
    let (dir, config) = workspace(PEOPLE_TOML);
    std::fs::remove_file(dir.path().join("b.csv")).unwrap();
    let out = run(&["fuse", "run"], &config);
    assert_eq!(out.status.code(), Some(61));
    assert!(stderr(&out).contains("cannot read"));
}

#[test]
fn no_subcommand_is_usage_error() {
    let out = vgrid().output().unwrap();
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("Usage: vgrid"));
}
