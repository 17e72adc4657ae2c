use predicates::prelude::*;

#[test]
fn status_with_no_resume_file_reports_nothing_recorded() {
    let temp = tempfile::TempDir::new().unwrap();
    let resume = temp.path().join("resume.json");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("chapterbind");
    cmd.args(["status", "--resume-file", resume.to_str().unwrap()])
        .assert()
        .success()
        .stdout("no completed chapters recorded\n");
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() {
    let temp = tempfile::TempDir::new().unwrap();
    let resume = temp.path().join("resume.json");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("chapterbind");
    cmd.env("RUST_LOG", "debug")
        .args(["status", "--resume-file", resume.to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
}

#[test]
fn download_requires_a_readable_toc() {
    let temp = tempfile::TempDir::new().unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("chapterbind");
    cmd.args([
        "download",
        "--toc",
        temp.path().join("missing.yaml").to_str().unwrap(),
        "--out",
        temp.path().join("out").to_str().unwrap(),
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("read toc"));
}
