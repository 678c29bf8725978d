//! Drivers against scripted sessions: what gets staged, what gets sent,
//! and that the session is closed exactly once whichever step fails.

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cfgsnap::driver::{RetrieveContext, Retrieval, Snapshot, fetch};
use cfgsnap::platform::vendors::bind_dns::BindDnsDriver;
use cfgsnap::platform::vendors::cisco_switch::CiscoSwitchDriver;
use cfgsnap::platform::vendors::cisco_vepc::CiscoVepcDriver;
use cfgsnap::platform::vendors::ericsson_epg::EricssonEpgDriver;
use cfgsnap::platform::vendors::ericsson_mk::EricssonMkDriver;
use cfgsnap::transport::{AuthMethod, SshConfig};
use cfgsnap::{DeviceDriver, FailureKind, Repository};
use tempfile::TempDir;

use common::{DeviceScript, FakeConnector, PASSWORD, password, switch_script, vepc_script};

struct Bench {
    _dir: TempDir,
    repository: Repository,
    staging: PathBuf,
}

impl Bench {
    fn new(host: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self {
            repository: Repository::new(dir.path().join("repo")),
            staging: dir.path().join("staging").join(host),
            _dir: dir,
        }
    }

    async fn fetch<D: DeviceDriver>(
        &self,
        connector: &FakeConnector,
        driver: &D,
        host: &str,
    ) -> Retrieval {
        let secret = password();
        let ctx = RetrieveContext {
            hostname: host,
            username: "kubebot",
            password: &secret,
            staging_dir: &self.staging,
        };
        let ssh = SshConfig::new(host, "kubebot", AuthMethod::Password(Arc::new(password())));
        fetch(connector, driver, &ssh, &ctx, &self.repository).await
    }

    fn error_log(&self, host: &str) -> String {
        let path = self
            .repository
            .host_dir(host)
            .join(format!("{host}-errors.log"));
        fs::read_to_string(path).unwrap_or_default()
    }
}

fn single(retrieval: Retrieval) -> cfgsnap::driver::Artifact {
    match retrieval {
        Retrieval::Snapshot(Snapshot::Single(artifact)) => artifact,
        other => panic!("expected a single-file snapshot, got {other:?}"),
    }
}

fn failure_kind(retrieval: &Retrieval) -> FailureKind {
    match retrieval {
        Retrieval::Failed { kind, .. } => *kind,
        other => panic!("expected a failure, got {other:?}"),
    }
}

fn epg_script() -> DeviceScript {
    let name = "EPG1_CXS101289_R8A01.xml";
    DeviceScript::new()
        .banner("\r\n[local]EPG1#")
        .reply("start shell", "start shell\r\nbash-4.2$ ")
        .reply(
            "show_epg_version |grep -v +",
            "show_epg_version |grep -v +\r\n\
             Previous EPG software version: CXS101289_R7A01\r\n\
             Current EPG software version: CXS101289_R8A01\r\nbash-4.2$ ",
        )
        .reply("exit", "exit\r\n[local]EPG1#")
        .reply("config", "config\r\n[local]EPG1(config)#")
        .reply(
            &format!("save {name}"),
            &format!("save {name}\r\nFile {name} exists, overwrite? [yes,no] "),
        )
        .reply("yes", "yes\r\n[local]EPG1(config)#")
        .reply("exit", "exit\r\n[local]EPG1#")
        .file(
            &format!("/flash/{name}"),
            "<config>\n  <!-- saved +0200 -->\n  <apn>internet</apn>\n</config>\n",
        )
        .reply(
            &format!("delete {name}"),
            &format!("delete {name}\r\nDelete {name} (y/n)? "),
        )
        .reply("y", "y\r\n[local]EPG1#")
}

fn mk_script() -> DeviceScript {
    let prompt = "\r\n=== MK1 (blade 0-1) ANCB ~ # ";
    DeviceScript::new()
        .banner(prompt)
        .reply(
            "gsh get_ne",
            &format!("gsh get_ne\r\nNeName        : MK1\r\nSoftwareLevel : MK_R12(R12A05){prompt}"),
        )
        .reply(
            "gsh export_config_active",
            &format!("gsh export_config_active\r\nexport done{prompt}"),
        )
        .file(
            "/Core/home/kubebot/ConfigFile_from_export",
            "# exported 2026-10-18\nne MK1\n",
        )
        .reply("rm ConfigFile_from_export", &format!("rm ConfigFile_from_export{prompt}"))
}

fn dns_script() -> DeviceScript {
    DeviceScript::new()
        .dir("/var/named/zones", &["zone.example.com", "zone.example.org", "README"])
        .dir("/var/named/zones/private/priv1", &["db.internal"])
        .dir("/var/named/zones/private/priv2", &[])
        .file("/var/named/named.conf", "options { directory \"/var/named\"; };\n")
        .file("/var/named/zones/zone.example.com", "$ORIGIN example.com.\n")
        .file("/var/named/zones/zone.example.org", "$ORIGIN example.org.\n")
        .file("/var/named/zones/private/priv1/db.internal", "$ORIGIN internal.\n")
}

#[tokio::test]
async fn test_switch_stages_running_config() {
    let bench = Bench::new("SW1");
    let connector =
        FakeConnector::new().with("SW1", switch_script("SW1", "hostname SW1\ninterface Gi0/1"));

    let artifact = single(
        bench
            .fetch(&connector, &CiscoSwitchDriver::default(), "SW1")
            .await,
    );
    assert_eq!(artifact.name, "SW1.cfg");
    assert_eq!(artifact.version, None);
    assert_eq!(
        fs::read_to_string(&artifact.path).unwrap(),
        "hostname SW1\ninterface Gi0/1\n"
    );

    let activity = connector.activity("SW1");
    assert_eq!(
        activity.shell_lines,
        vec!["enable", PASSWORD, "terminal length 0", "show running-config"]
    );
    assert_eq!((activity.closes, activity.aborts), (1, 0));
}

#[tokio::test]
async fn test_switch_already_privileged_skips_enable() {
    let bench = Bench::new("SW1");
    let script = DeviceScript::new()
        .banner("\r\nSW1#")
        .reply("terminal length 0", "terminal length 0\r\nSW1#")
        .reply("show running-config", "show running-config\r\nhostname SW1\r\nSW1#");
    let connector = FakeConnector::new().with("SW1", script);

    single(
        bench
            .fetch(&connector, &CiscoSwitchDriver::default(), "SW1")
            .await,
    );
    let activity = connector.activity("SW1");
    assert!(!activity.shell_lines.iter().any(|l| l == "enable"));
}

#[tokio::test]
async fn test_switch_failure_at_every_step_closes_once() {
    let script = switch_script("SW1", "hostname SW1");
    for step in script.steps() {
        let bench = Bench::new("SW1");
        let connector = FakeConnector::new().with("SW1", script.clone().fail(&step));

        let retrieval = bench
            .fetch(&connector, &CiscoSwitchDriver::default(), "SW1")
            .await;
        failure_kind(&retrieval);

        let activity = connector.activity("SW1");
        let expected_closes = if step == "connect" { 0 } else { 1 };
        assert_eq!(activity.closes, expected_closes, "step {step}");
        assert_eq!(activity.aborts, 0, "step {step}");
        assert!(!bench.staging.exists(), "step {step}");
        assert_eq!(bench.error_log("SW1").lines().count(), 1, "step {step}");
    }
}

#[tokio::test]
async fn test_switch_error_log_never_contains_password() {
    let bench = Bench::new("SW1");
    let script = switch_script("SW1", "hostname SW1").fail(&format!("shell:{PASSWORD}"));
    let connector = FakeConnector::new().with("SW1", script);

    bench
        .fetch(&connector, &CiscoSwitchDriver::default(), "SW1")
        .await;
    let log = bench.error_log("SW1");
    assert!(log.contains("ConnectionFailure"));
    assert!(!log.contains(PASSWORD));
}

#[tokio::test(start_paused = true)]
async fn test_switch_silent_device_is_prompt_timeout() {
    let bench = Bench::new("SW1");
    let script = switch_script("SW1", "hostname SW1").fail("silent:show running-config");
    let connector = FakeConnector::new().with("SW1", script);

    let retrieval = bench
        .fetch(&connector, &CiscoSwitchDriver::default(), "SW1")
        .await;
    assert_eq!(failure_kind(&retrieval), FailureKind::PromptTimeout);
    assert_eq!(connector.activity("SW1").closes, 1);
    assert!(bench.error_log("SW1").contains(" : PromptTimeout: "));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_fetch_aborts_session_once() {
    let bench = Bench::new("SW1");
    let script = switch_script("SW1", "hostname SW1").fail("silent:show running-config");
    let connector = FakeConnector::new().with("SW1", script);

    let driver = CiscoSwitchDriver::default();
    let cancelled = tokio::time::timeout(
        Duration::from_secs(1),
        bench.fetch(&connector, &driver, "SW1"),
    )
    .await;
    assert!(cancelled.is_err());

    let activity = connector.activity("SW1");
    assert_eq!(activity.closes, 0);
    assert_eq!(activity.aborts, 1);
    assert_eq!(activity.closes + activity.aborts, 1);
    // Cancelled retrievals are not failures: nothing is logged.
    assert!(bench.error_log("SW1").is_empty());
}

#[tokio::test]
async fn test_switch_rejected_command() {
    let bench = Bench::new("SW1");
    let script = DeviceScript::new()
        .banner("\r\nSW1#")
        .reply(
            "terminal length 0",
            "terminal length 0\r\n% Invalid input detected at '^' marker.\r\nSW1#",
        );
    let connector = FakeConnector::new().with("SW1", script);

    let retrieval = bench
        .fetch(&connector, &CiscoSwitchDriver::default(), "SW1")
        .await;
    assert!(matches!(retrieval, Retrieval::Failed { .. }));
    assert_eq!(connector.activity("SW1").closes, 1);
}

#[tokio::test]
async fn test_vepc_saves_downloads_and_deletes() {
    let bench = Bench::new("CORE1");
    let connector =
        FakeConnector::new().with("CORE1", vepc_script("CORE1", "21.9.0.69927", "config\n"));

    let artifact = single(
        bench
            .fetch(&connector, &CiscoVepcDriver::default(), "CORE1")
            .await,
    );
    assert_eq!(artifact.name, "CORE1_21.9.0.69927.cfg");
    assert_eq!(artifact.version.as_deref(), Some("21.9.0.69927"));
    assert_eq!(fs::read_to_string(&artifact.path).unwrap(), "config\n");

    let activity = connector.activity("CORE1");
    assert_eq!(
        activity.execs,
        vec![
            "show version",
            "save configuration /sftp/CORE1_21.9.0.69927.cfg",
            "delete /sftp/CORE1_21.9.0.69927.cfg",
        ]
    );
    assert_eq!(activity.downloads, vec!["/sftp/CORE1_21.9.0.69927.cfg"]);
    assert_eq!(activity.closes, 1);
}

#[tokio::test]
async fn test_vepc_failed_delete_still_succeeds() {
    let bench = Bench::new("CORE1");
    let script =
        vepc_script("CORE1", "21.9.0", "config\n").fail("exec:delete /sftp/CORE1_21.9.0.cfg");
    let connector = FakeConnector::new().with("CORE1", script);

    single(
        bench
            .fetch(&connector, &CiscoVepcDriver::default(), "CORE1")
            .await,
    );
    assert_eq!(connector.activity("CORE1").closes, 1);
}

#[tokio::test]
async fn test_vepc_failures() {
    let bench = Bench::new("CORE1");
    let script = vepc_script("CORE1", "21.9.0", "config\n").fail("copy_down:/sftp/CORE1_21.9.0.cfg");
    let connector = FakeConnector::new().with("CORE1", script);
    let retrieval = bench
        .fetch(&connector, &CiscoVepcDriver::default(), "CORE1")
        .await;
    assert_eq!(failure_kind(&retrieval), FailureKind::TransferFailure);
    assert_eq!(connector.activity("CORE1").closes, 1);

    let bench = Bench::new("CORE1");
    let script = DeviceScript::new().exec("show version", "Active Software:");
    let connector = FakeConnector::new().with("CORE1", script);
    let retrieval = bench
        .fetch(&connector, &CiscoVepcDriver::default(), "CORE1")
        .await;
    assert_eq!(failure_kind(&retrieval), FailureKind::ParseFailure);
    assert!(bench.error_log("CORE1").contains("ParseFailure"));
}

#[tokio::test]
async fn test_unreachable_host() {
    let bench = Bench::new("GONE");
    let connector = FakeConnector::new();
    let retrieval = bench
        .fetch(&connector, &CiscoVepcDriver::default(), "GONE")
        .await;
    assert_eq!(failure_kind(&retrieval), FailureKind::ConnectionFailure);
    assert!(bench.error_log("GONE").contains("ConnectionFailure"));
}

#[tokio::test]
async fn test_epg_full_sequence() {
    let bench = Bench::new("EPG1");
    let connector = FakeConnector::new().with("EPG1", epg_script());

    let artifact = single(
        bench
            .fetch(&connector, &EricssonEpgDriver::default(), "EPG1")
            .await,
    );
    assert_eq!(artifact.name, "EPG1_CXS101289_R8A01.xml");
    assert!(
        fs::read_to_string(&artifact.path)
            .unwrap()
            .contains("<apn>internet</apn>")
    );

    let activity = connector.activity("EPG1");
    assert_eq!(
        activity.shell_lines,
        vec![
            "start shell",
            "show_epg_version |grep -v +",
            "exit",
            "config",
            "save EPG1_CXS101289_R8A01.xml",
            "yes",
            "exit",
            "delete EPG1_CXS101289_R8A01.xml",
            "y",
        ]
    );
    assert_eq!(activity.downloads, vec!["/flash/EPG1_CXS101289_R8A01.xml"]);
    assert_eq!((activity.closes, activity.aborts), (1, 0));
}

#[tokio::test]
async fn test_epg_failure_at_every_step_closes_once() {
    let steps = [
        "connect",
        "open_shell",
        "shell:start shell",
        "shell:show_epg_version |grep -v +",
        "shell:exit",
        "shell:config",
        "shell:save EPG1_CXS101289_R8A01.xml",
        "shell:yes",
        "copy_down:/flash/EPG1_CXS101289_R8A01.xml",
    ];
    for step in steps {
        let bench = Bench::new("EPG1");
        let connector = FakeConnector::new().with("EPG1", epg_script().fail(step));

        let retrieval = bench
            .fetch(&connector, &EricssonEpgDriver::default(), "EPG1")
            .await;
        failure_kind(&retrieval);

        let activity = connector.activity("EPG1");
        let expected_closes = if step == "connect" { 0 } else { 1 };
        assert_eq!(activity.closes, expected_closes, "step {step}");
        assert_eq!(activity.aborts, 0, "step {step}");
        assert_eq!(bench.error_log("EPG1").lines().count(), 1, "step {step}");
    }
}

#[tokio::test]
async fn test_epg_failed_delete_is_not_a_failure() {
    let bench = Bench::new("EPG1");
    let script = epg_script().fail("shell:delete EPG1_CXS101289_R8A01.xml");
    let connector = FakeConnector::new().with("EPG1", script);

    single(
        bench
            .fetch(&connector, &EricssonEpgDriver::default(), "EPG1")
            .await,
    );
    assert_eq!(connector.activity("EPG1").closes, 1);
    assert_eq!(bench.error_log("EPG1"), "");
}

#[tokio::test]
async fn test_mk_exports_and_removes() {
    let bench = Bench::new("MK1");
    let connector = FakeConnector::new().with("MK1", mk_script());

    let artifact = single(
        bench
            .fetch(&connector, &EricssonMkDriver::default(), "MK1")
            .await,
    );
    assert_eq!(artifact.name, "MK1_R12A05.cfg");

    let activity = connector.activity("MK1");
    assert_eq!(
        activity.shell_lines,
        vec!["gsh get_ne", "gsh export_config_active", "rm ConfigFile_from_export"]
    );
    assert_eq!(
        activity.downloads,
        vec!["/Core/home/kubebot/ConfigFile_from_export"]
    );
    assert_eq!(activity.closes, 1);
}

#[tokio::test]
async fn test_dns_stages_every_zone_set() {
    let bench = Bench::new("DNS");
    let connector = FakeConnector::new().with("DNS", dns_script());

    let retrieval = bench
        .fetch(&connector, &BindDnsDriver::default(), "DNS")
        .await;
    let Retrieval::Snapshot(Snapshot::Zoned(zoned)) = retrieval else {
        panic!("expected a zoned snapshot, got {retrieval:?}");
    };

    assert_eq!(zoned.primary.name, "named.conf");
    assert!(zoned.primary.path.is_file());

    let labels: Vec<_> = zoned.sets.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["zones", "Priv1", "Priv2"]);

    let public = &zoned.sets[0];
    let names: Vec<_> = public.names.iter().map(String::as_str).collect();
    assert_eq!(names, vec!["zone.example.com", "zone.example.org"]);
    assert!(public.staged_dir.join("zone.example.org").is_file());
    assert!(!public.staged_dir.join("README").exists());
    assert_eq!(public.archive_dir, Path::new("zones").join("archive"));

    let private = &zoned.sets[1];
    assert_eq!(private.repo_dir, Path::new("zones/private/Priv1"));
    assert!(private.staged_dir.join("db.internal").is_file());
    assert!(zoned.sets[2].names.is_empty());
    assert_eq!(connector.activity("DNS").closes, 1);
}

#[tokio::test]
async fn test_dns_listing_failure_downloads_nothing() {
    let bench = Bench::new("DNS");
    let script = dns_script().fail("list_dir:/var/named/zones/private/priv2");
    let connector = FakeConnector::new().with("DNS", script);

    let retrieval = bench
        .fetch(&connector, &BindDnsDriver::default(), "DNS")
        .await;
    assert_eq!(failure_kind(&retrieval), FailureKind::TransferFailure);

    let activity = connector.activity("DNS");
    assert!(activity.downloads.is_empty());
    assert_eq!(activity.closes, 1);
    assert!(!bench.staging.exists());
}
