use fleet_core::error::FleetError;
use fleet_core::executor::{Executor, VmAddress};
use fleet_core::job::{Job, JobId, PollOutcome};
use fleet_core::simulation::{parse_commands, SimulationJob, COMPLETION_MARKER, RUN_LOG};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Executor whose "remote home" is an in-memory file map.
#[derive(Default)]
struct FakeHome {
    address: VmAddress,
    files: Mutex<HashMap<String, String>>,
    commands: Mutex<Vec<(String, bool)>>,
    offline: bool,
}

impl FakeHome {
    fn put(&self, name: &str, contents: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), contents.to_string());
    }

    fn commands(&self) -> Vec<(String, bool)> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Executor for FakeHome {
    fn name(&self) -> &str {
        "fake"
    }

    fn address(&self) -> &VmAddress {
        &self.address
    }

    async fn launch(&mut self, _bootstrap: Option<&str>) -> Result<(), FleetError> {
        Ok(())
    }

    async fn upload_file(&self, local_path: &Path, _remote_dir: &str) -> Result<(), FleetError> {
        let name = local_path.file_name().unwrap().to_string_lossy().into_owned();
        self.put(&name, "binary");
        Ok(())
    }

    async fn download_file(
        &self,
        remote_path: &str,
        local_dir: &Path,
    ) -> Result<PathBuf, FleetError> {
        if self.offline {
            return Err(FleetError::Transfer("connection refused".into()));
        }
        let files = self.files.lock().unwrap();
        let contents = files
            .get(remote_path)
            .ok_or_else(|| FleetError::Transfer(format!("{}: no such file", remote_path)))?;
        let local = local_dir.join(remote_path);
        std::fs::write(&local, contents)?;
        Ok(local)
    }

    async fn send_command(&self, command: &str, wait: bool) -> Result<String, FleetError> {
        if self.offline {
            return Err(FleetError::SshConnection("connection refused".into()));
        }
        self.commands
            .lock()
            .unwrap()
            .push((command.to_string(), wait));
        let files = self.files.lock().unwrap();
        if command.starts_with("test -f") {
            let present = files.contains_key(COMPLETION_MARKER);
            return Ok(if present { "present\n" } else { "absent\n" }.to_string());
        }
        if command.starts_with("tail") {
            let last = files
                .get(RUN_LOG)
                .and_then(|log| log.lines().last().map(str::to_string))
                .unwrap_or_default();
            return Ok(format!("{}\n", last));
        }
        Ok(String::new())
    }

    async fn clean(&self) -> Result<(), FleetError> {
        self.files.lock().unwrap().clear();
        Ok(())
    }

    async fn delete(&mut self) -> Result<(), FleetError> {
        Ok(())
    }
}

fn job(output: &Path) -> SimulationJob {
    SimulationJob::new(
        JobId(4),
        "./COMPAS --number-of-binaries 25 --random-seed 4".to_string(),
        output.to_path_buf(),
        PathBuf::from("/opt/compas/COMPAS"),
    )
}

#[tokio::test]
async fn test_activate_stages_binary_and_detaches() {
    let dir = tempfile::tempdir().unwrap();
    let home = FakeHome::default();
    let mut job = job(dir.path());

    job.activate(&home).await.unwrap();

    assert!(home.files.lock().unwrap().contains_key("COMPAS"));
    let commands = home.commands();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0], ("chmod +x 'COMPAS'".to_string(), true));
    let (start, wait) = &commands[1];
    assert!(!wait, "simulation must start detached");
    assert!(start.starts_with("(./COMPAS --number-of-binaries 25 --random-seed 4)"));
    assert!(start.ends_with("echo completed >> completed.txt"));
}

#[tokio::test]
async fn test_poll_pending_until_marker_appears() {
    let dir = tempfile::tempdir().unwrap();
    let home = FakeHome::default();
    let mut job = job(dir.path());

    assert_eq!(job.poll(&home).await, PollOutcome::Pending);
    assert!(!dir.path().join(COMPLETION_MARKER).exists());

    home.put(COMPLETION_MARKER, "completed\n");
    assert_eq!(job.poll(&home).await, PollOutcome::Complete);
    // A local copy of the marker is left behind.
    assert!(dir.path().join(COMPLETION_MARKER).exists());
}

#[tokio::test]
async fn test_poll_reports_transport_errors_separately() {
    let dir = tempfile::tempdir().unwrap();
    let home = FakeHome {
        offline: true,
        ..Default::default()
    };
    let mut job = job(dir.path());

    match job.poll(&home).await {
        PollOutcome::TransportError(reason) => assert!(reason.contains("connection refused")),
        other => panic!("expected transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_marker_is_not_completion() {
    let dir = tempfile::tempdir().unwrap();
    let home = FakeHome::default();
    home.put(COMPLETION_MARKER, "");
    let mut job = job(dir.path());

    assert_eq!(job.poll(&home).await, PollOutcome::Pending);
}

#[tokio::test]
async fn test_collect_fetches_every_result_file() {
    let dir = tempfile::tempdir().unwrap();
    let home = FakeHome::default();
    for name in ["initialParameters.txt", "mergingParameters.txt", "formationHistory.txt"] {
        home.put(name, name);
    }
    let mut job = job(dir.path());

    job.collect(&home).await.unwrap();

    for name in job.result_files() {
        assert_eq!(
            std::fs::read_to_string(dir.path().join(name)).unwrap(),
            *name
        );
    }
}

#[tokio::test]
async fn test_collect_reports_all_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let home = FakeHome::default();
    home.put("mergingParameters.txt", "ok");
    let mut job = job(dir.path());

    let err = job.collect(&home).await.unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, FleetError::Transfer(_)));
    assert!(message.contains("initialParameters.txt"));
    assert!(message.contains("formationHistory.txt"));
    assert!(!message.contains("mergingParameters.txt"));
    // The file that was present still arrived.
    assert!(dir.path().join("mergingParameters.txt").exists());
}

#[tokio::test]
async fn test_status_message_is_last_log_line() {
    let dir = tempfile::tempdir().unwrap();
    let home = FakeHome::default();
    let job = job(dir.path());

    assert_eq!(job.status_message(&home).await.unwrap(), "running");

    home.put(RUN_LOG, "Evolving binary 12\nEvolving binary 13\n");
    assert_eq!(job.status_message(&home).await.unwrap(), "Evolving binary 13");

    let offline = FakeHome {
        offline: true,
        ..Default::default()
    };
    assert!(matches!(
        job.status_message(&offline).await,
        Err(FleetError::StatusQuery(_))
    ));
}

#[tokio::test]
async fn test_clean_twice_is_harmless() {
    let home = FakeHome::default();
    home.put("COMPAS", "binary");
    home.clean().await.unwrap();
    home.clean().await.unwrap();
    assert!(home.files.lock().unwrap().is_empty());
}

#[test]
fn test_parse_commands_skips_blanks_and_comments() {
    let contents = "# grid point alpha=0\n./COMPAS --common-envelope-alpha 0.0\n\n   \n./COMPAS --common-envelope-alpha 1.0  \n";
    assert_eq!(
        parse_commands(contents),
        vec![
            "./COMPAS --common-envelope-alpha 0.0".to_string(),
            "./COMPAS --common-envelope-alpha 1.0".to_string(),
        ]
    );
}
