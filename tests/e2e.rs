use std::process::Command;

fn run(fixture: &str) -> (String, String, bool) {
    let path = format!("tests/fixtures/{fixture}");
    let output = Command::new(env!("CARGO_BIN_EXE_tasks-eng"))
        .arg(&path)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run binary");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn full_lifecycle_settles_and_ranks() {
    let (stdout, stderr, success) = run("valid.csv");

    assert!(success);
    assert!(stderr.is_empty());

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], "user,balance,held,total");
    // Poster 1 paid the full budget; doer 2 received it
    assert_eq!(lines[1], "1,0,0,0");
    assert_eq!(lines[2], "2,500,0,500");

    assert_eq!(lines[3], "rank,user,points,rating,weekly_change");
    // Completion award plus the high-rating bonus
    assert_eq!(lines[4], "1,2,15,5.00,0");
}

#[test]
fn errors_warn_but_do_not_block() {
    let (stdout, stderr, success) = run("with_errors.csv");

    assert!(success);
    assert!(stderr.contains("unrecognized event"));
    assert!(stderr.contains("missing amount"));

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], "user,balance,held,total");
    // 500 deposited, oversized withdrawal skipped, 200 withdrawn
    assert_eq!(lines[1], "1,300,0,300");
}
