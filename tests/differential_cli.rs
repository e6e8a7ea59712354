//! End-to-end tests for the bixcheck binary.
//!
//! The engines are small shell scripts that filter a gzip record file with
//! awk, so the coordinate conventions under test are explicit:
//! - fake-tabix: 1-based inclusive `chrom:start-end`
//! - fake-candidate: 0-based half-open `chrom start end`
//!
//! Tests run serially: executing a script another test thread is still
//! writing can fail with ETXTBSY.

#![cfg(unix)]

use flate2::write::GzEncoder;
use flate2::Compression;
use serial_test::serial;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{Duration, Instant};
use tempfile::TempDir;

const RECORDS: &str = "##fileformat=VCFv4.2\n\
    #CHROM\tPOS\tID\tREF\tALT\n\
    1\t1000\t.\tA\tG\n\
    1\t1003\t.\tC\tT\n\
    1\t1010\t.\tG\tA\n\
    2\t5\t.\tT\tC\n";

const FAKE_TABIX: &str = r#"#!/bin/sh
region="$2"
chrom="${region%%:*}"
range="${region#*:}"
s="${range%-*}"
e="${range#*-}"
gzip -dc "$1" | awk -F'\t' -v c="$chrom" -v s="$s" -v e="$e" \
    '$1 !~ /^#/ && $1 == c && $2 >= s + 0 && $2 <= e + 0'
"#;

const FAKE_CANDIDATE: &str = r#"#!/bin/sh
gzip -dc "$1" | awk -F'\t' -v c="$2" -v s="$3" -v e="$4" \
    '$1 !~ /^#/ && $1 == c && $2 > s + 0 && $2 <= e + 0'
"#;

/// Treats the 0-based start as inclusive 1-based: one base too wide.
const OFF_BY_ONE_CANDIDATE: &str = r#"#!/bin/sh
gzip -dc "$1" | awk -F'\t' -v c="$2" -v s="$3" -v e="$4" \
    '$1 !~ /^#/ && $1 == c && $2 >= s + 0 && $2 <= e + 0'
"#;

const FAILING_CANDIDATE: &str = "#!/bin/sh\necho 'index not found' >&2\nexit 3\n";

/// bedtools-style: `-a FILE -b REGION_BED`
const FAKE_INTERSECT: &str = r#"#!/bin/sh
read c s e < "$4"
gzip -dc "$2" | awk -F'\t' -v c="$c" -v s="$s" -v e="$e" \
    '$1 !~ /^#/ && $1 == c && $2 > s + 0 && $2 <= e + 0'
"#;

/// Exits at once but leaves a background process holding stdout.
const LINGERING_CANDIDATE: &str = "#!/bin/sh\nsleep 20 &\necho started\n";

/// Like FAKE_INTERSECT but with an inclusive 0-based start.
const OFF_BY_ONE_INTERSECT: &str = r#"#!/bin/sh
read c s e < "$4"
gzip -dc "$2" | awk -F'\t' -v c="$c" -v s="$s" -v e="$e" \
    '$1 !~ /^#/ && $1 == c && $2 >= s + 0 && $2 <= e + 0'
"#;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn gz(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(content.as_bytes()).unwrap();
        fs::write(&path, enc.finish().unwrap()).unwrap();
        path
    }

    fn script(&self, name: &str, body: &str) -> String {
        let path = self.path(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_str().unwrap().to_string()
    }
}

fn run_bixcheck(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_bixcheck"))
        .args(args)
        .output()
        .expect("Failed to run bixcheck")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn run_args<'a>(input: &'a Path, reference: &'a str, candidate: &'a str) -> Vec<&'a str> {
    vec![
        "run",
        "-i",
        input.to_str().unwrap(),
        "--reference",
        reference,
        "--candidate",
        candidate,
        "--flank",
        "4",
        "--max-length",
        "5",
        "--timeout",
        "30",
    ]
}

// =============================================================================
// run
// =============================================================================

#[test]
#[serial]
fn test_run_passes_with_correct_candidate() {
    let fx = Fixture::new();
    let input = fx.gz("calls.vcf.gz", RECORDS);
    let tabix = fx.script("fake-tabix", FAKE_TABIX);
    let candidate = fx.script("fake-candidate", FAKE_CANDIDATE);

    let mut args = run_args(&input, &tabix, &candidate);
    args.push("--stats");
    let output = run_bixcheck(&args);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    // 4 anchors x 8 offsets x 5 lengths
    assert!(stderr(&output).contains("PASS: anchors=4 compared=160 skipped=0 mismatches=0"));
    assert!(stderr(&output).contains("Anchor stats: anchors=4 chroms=2 1=3 2=1"));
}

#[test]
#[serial]
fn test_run_reports_off_by_one_mismatch() {
    let fx = Fixture::new();
    let input = fx.gz("calls.vcf.gz", RECORDS);
    let tabix = fx.script("fake-tabix", FAKE_TABIX);
    let candidate = fx.script("buggy-candidate", OFF_BY_ONE_CANDIDATE);

    let output = run_bixcheck(&run_args(&input, &tabix, &candidate));

    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("Cardinality mismatch"));
    assert!(err.contains("Chromosome: 1"));
    assert!(err.contains("Anchor: 1000"));
    assert!(err.contains("To reproduce:"));
    assert!(err.contains(&candidate));
    // Fail-fast: exactly one report
    assert_eq!(err.matches("Cardinality mismatch").count(), 1);
}

#[test]
#[serial]
fn test_keep_going_logs_every_mismatch() {
    let fx = Fixture::new();
    let input = fx.gz("calls.vcf.gz", RECORDS);
    let tabix = fx.script("fake-tabix", FAKE_TABIX);
    let candidate = fx.script("buggy-candidate", OFF_BY_ONE_CANDIDATE);
    let log = fx.path("mismatches.tsv");

    let mut args = run_args(&input, &tabix, &candidate);
    args.extend(["--keep-going", "--mismatch-log", log.to_str().unwrap()]);
    let output = run_bixcheck(&args);

    assert_eq!(output.status.code(), Some(1));
    let content = fs::read_to_string(&log).unwrap();
    let mut lines = content.lines();
    assert!(lines.next().unwrap().starts_with("#file\tchrom\tanchor"));
    let rows: Vec<_> = lines.collect();
    assert!(rows.len() > 1);
    assert_eq!(
        rows.len(),
        stderr(&output).matches("Cardinality mismatch").count()
    );
    assert!(rows.iter().all(|r| r.split('\t').count() == 9));
}

#[test]
#[serial]
fn test_candidate_failure_is_harness_error() {
    let fx = Fixture::new();
    let input = fx.gz("calls.vcf.gz", RECORDS);
    let tabix = fx.script("fake-tabix", FAKE_TABIX);
    let candidate = fx.script("failing-candidate", FAILING_CANDIDATE);

    let output = run_bixcheck(&run_args(&input, &tabix, &candidate));

    assert_eq!(output.status.code(), Some(2));
    let err = stderr(&output);
    assert!(err.contains("Command exited"));
    assert!(err.contains("index not found"));
    assert!(!err.contains("Cardinality mismatch"));
}

#[test]
#[serial]
fn test_lingering_candidate_times_out() {
    let fx = Fixture::new();
    let input = fx.gz("calls.vcf.gz", RECORDS);
    let tabix = fx.script("fake-tabix", FAKE_TABIX);
    let candidate = fx.script("lingering-candidate", LINGERING_CANDIDATE);

    let mut args = run_args(&input, &tabix, &candidate);
    let timeout = args.iter().position(|a| *a == "30").unwrap();
    args[timeout] = "1";
    let started = Instant::now();
    let output = run_bixcheck(&args);

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("timed out after 1s"));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
#[serial]
fn test_position_zero_record_is_compared() {
    let fx = Fixture::new();
    let input = fx.gz("telomere.vcf.gz", "#CHROM\tPOS\n1\t0\t.\tN\t<DEL>\n1\t3\t.\tA\tG\n");
    let tabix = fx.script("fake-tabix", FAKE_TABIX);
    let candidate = fx.script("fake-candidate", FAKE_CANDIDATE);

    let mut args = run_args(&input, &tabix, &candidate);
    args.push("--stats");
    let output = run_bixcheck(&args);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    // Offsets 0..4 for POS 0 and 0..7 for POS 3, 5 lengths each
    assert!(stderr(&output).contains("PASS: anchors=2 compared=55 skipped=0"));
}

#[test]
#[serial]
fn test_comment_only_input_passes() {
    let fx = Fixture::new();
    let input = fx.gz("empty.vcf.gz", "##fileformat=VCFv4.2\n#CHROM\tPOS\n");
    let tabix = fx.script("fake-tabix", FAKE_TABIX);
    let candidate = fx.script("failing-candidate", FAILING_CANDIDATE);

    let mut args = run_args(&input, &tabix, &candidate);
    args.push("--stats");
    let output = run_bixcheck(&args);

    // No anchors means no invocations, so the failing candidate never runs
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("anchors=0 compared=0"));
}

#[test]
#[serial]
fn test_malformed_input_is_harness_error() {
    let fx = Fixture::new();
    let input = fx.gz("bad.vcf.gz", "#h\n1\t1000\n1\tten\n");
    let tabix = fx.script("fake-tabix", FAKE_TABIX);
    let candidate = fx.script("fake-candidate", FAKE_CANDIDATE);

    let output = run_bixcheck(&run_args(&input, &tabix, &candidate));

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("Parse error at line 3"));
}

#[test]
#[serial]
fn test_build_failure_stops_run() {
    let fx = Fixture::new();
    let input = fx.gz("calls.vcf.gz", RECORDS);
    let tabix = fx.script("fake-tabix", FAKE_TABIX);
    let candidate = fx.script("fake-candidate", FAKE_CANDIDATE);
    let build = fx.script("build.sh", "#!/bin/sh\necho 'compile error' >&2\nexit 1\n");

    let mut args = run_args(&input, &tabix, &candidate);
    args.extend(["--build", build.as_str()]);
    let output = run_bixcheck(&args);

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("Build failed"));
    assert!(stderr(&output).contains("compile error"));
}

#[test]
#[serial]
fn test_cross_check_agrees() {
    let fx = Fixture::new();
    let input = fx.gz("calls.vcf.gz", RECORDS);
    let tabix = fx.script("fake-tabix", FAKE_TABIX);
    let candidate = fx.script("fake-candidate", FAKE_CANDIDATE);
    let intersect = fx.script("fake-intersect", FAKE_INTERSECT);

    let mut args = run_args(&input, &tabix, &candidate);
    args.extend(["--cross-check", intersect.as_str(), "--limit", "2"]);
    let output = run_bixcheck(&args);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
}

#[test]
#[serial]
fn test_cross_check_mismatch_names_candidate() {
    let fx = Fixture::new();
    let input = fx.gz("calls.vcf.gz", RECORDS);
    let tabix = fx.script("fake-tabix", FAKE_TABIX);
    let candidate = fx.script("fake-candidate", FAKE_CANDIDATE);
    let intersect = fx.script("off-by-one-intersect", OFF_BY_ONE_INTERSECT);

    let mut args = run_args(&input, &tabix, &candidate);
    args.extend(["--cross-check", intersect.as_str(), "--limit", "1"]);
    let output = run_bixcheck(&args);

    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("intersect: "));
    assert!(err.contains("candidate: "));
    assert!(err.contains(&format!("  {} ", candidate)));
    assert!(err.contains("-b stdin"));
    assert!(!err.contains("bixcheck-region-"));
}

// =============================================================================
// query
// =============================================================================

#[test]
#[serial]
fn test_query_single_window() {
    let fx = Fixture::new();
    let input = fx.gz("calls.vcf.gz", "#h\n1\t1000\n");
    let tabix = fx.script("fake-tabix", FAKE_TABIX);
    let candidate = fx.script("fake-candidate", FAKE_CANDIDATE);

    let output = run_bixcheck(&[
        "query",
        "-i",
        input.to_str().unwrap(),
        "--chrom",
        "1",
        "--start",
        "995",
        "--end",
        "1005",
        "--reference",
        &tabix,
        "--candidate",
        &candidate,
    ]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "MATCH\t1\t995\t1005\t1\n");
}

#[test]
#[serial]
fn test_query_inverted_window_rejected() {
    let fx = Fixture::new();
    let input = fx.gz("calls.vcf.gz", "#h\n1\t1000\n");

    let output = run_bixcheck(&[
        "query",
        "-i",
        input.to_str().unwrap(),
        "--chrom",
        "1",
        "--start",
        "1005",
        "--end",
        "995",
        "--candidate",
        "true",
    ]);

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("start is greater than end"));
}

// =============================================================================
// windows
// =============================================================================

#[test]
#[serial]
fn test_windows_are_deterministic() {
    let fx = Fixture::new();
    let input = fx.gz("calls.vcf.gz", RECORDS);
    let args = [
        "windows",
        "-i",
        input.to_str().unwrap(),
        "--flank",
        "2",
        "--max-length",
        "3",
        "--sample",
        "2",
        "--seed",
        "7",
    ];

    let first = run_bixcheck(&args);
    let second = run_bixcheck(&args);

    assert!(first.status.success(), "stderr: {}", stderr(&first));
    assert_eq!(stdout(&first), stdout(&second));
    // 2 anchors x 4 offsets x 3 lengths
    assert_eq!(stdout(&first).lines().count(), 24);
}

#[test]
#[serial]
fn test_windows_limit() {
    let fx = Fixture::new();
    let input = fx.gz("calls.vcf.gz", RECORDS);

    let output = run_bixcheck(&[
        "windows",
        "-i",
        input.to_str().unwrap(),
        "--flank",
        "1",
        "--max-length",
        "1",
        "-n",
        "1",
    ]);

    assert!(output.status.success());
    assert_eq!(stdout(&output), "1\t999\t1000\n1\t1000\t1001\n");
}
