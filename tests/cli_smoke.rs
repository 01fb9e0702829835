mod support;

use predicates::str::contains;

use support::tg_cmd;

#[test]
fn tg_help_works() {
    tg_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("Usage: tg"))
        .stdout(contains("validate"));
}

#[test]
fn subcommand_help_works() {
    let subcommands = ["next", "list", "validate", "deps", "graph", "status", "cache"];

    for cmd in subcommands {
        tg_cmd().arg(cmd).arg("--help").assert().success();
    }
}

#[test]
fn unknown_status_is_rejected_by_parser() {
    tg_cmd()
        .args(["status", "T-1", "closed"])
        .assert()
        .failure()
        .stderr(contains("unknown task status"));
}
