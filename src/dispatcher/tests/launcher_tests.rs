//! Worker command line construction.

use crate::dispatcher::ProcessWorkerLauncher;
use crate::jobs::domain::JobId;
use rstest::rstest;

#[rstest]
fn worker_command_names_the_job_and_its_log() {
    let launcher = ProcessWorkerLauncher::new("/usr/bin/import_worker", "/var/log/codeimport")
        .with_args(["--config", "/etc/codeimport.toml"]);
    let job_id = JobId::new(42).expect("valid job id");

    let command = launcher.command_for(job_id);

    assert_eq!(command.program, "/usr/bin/import_worker");
    assert_eq!(
        command.args,
        vec![
            "42",
            "--log-file",
            "/var/log/codeimport/42.log",
            "--config",
            "/etc/codeimport.toml",
        ]
    );
    assert_eq!(
        command.to_string(),
        "/usr/bin/import_worker 42 --log-file /var/log/codeimport/42.log --config /etc/codeimport.toml"
    );
}
