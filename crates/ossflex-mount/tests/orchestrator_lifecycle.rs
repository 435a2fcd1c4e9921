//! Mount and unmount sequences against the fake host.

use std::fs;

use ossflex_mount::testing::{DriverFixture, FakeHost, StaticCredentials};
use ossflex_mount::{
    CommandOutput, DriverError, FuseTools, KeyFileCredentials, Orchestrator, VolumeOptions,
    VolumeRequest,
};

fn orchestrator(fixture: &DriverFixture, host: &FakeHost) -> Orchestrator<FakeHost, FakeHost> {
    Orchestrator::new(
        fixture.paths().clone(),
        FuseTools::default(),
        host.clone(),
        host.clone(),
    )
}

fn request(json: &str) -> VolumeRequest {
    VolumeOptions::from_json(json)
        .unwrap()
        .into_request(&StaticCredentials::new("ambient-id", "ambient-secret"))
        .unwrap()
}

fn basic_request() -> VolumeRequest {
    request(
        r#"{"bucket":"logs","url":"oss-cn-hangzhou.aliyuncs.com","akId":"id1","akSecret":"sec1",
            "kubernetes.io/pvOrVolumeName":"oss1","kubernetes.io/pod.name":"nginx"}"#,
    )
}

#[test]
fn test_mount_without_subpath_links_to_shared_mount() {
    let fixture = DriverFixture::new();
    let host = FakeHost::new();
    let target = fixture.pod_volume_dir("pod1", "oss1");
    let shared = fixture.paths().shared_mount_root.join("pod1~oss1");

    orchestrator(&fixture, &host)
        .mount(&basic_request(), &target)
        .unwrap();

    assert!(host.has_mount(&shared));
    assert_eq!(fs::read_link(&target).unwrap(), shared);
    assert_eq!(fixture.credential_file(), "logs:id1:sec1\n");

    let mounts = host.calls_to("ossfs");
    assert_eq!(mounts.len(), 1);
    assert_eq!(
        mounts[0].arguments(),
        [
            "logs",
            shared.to_str().unwrap(),
            "-ourl=oss-cn-hangzhou.aliyuncs.com",
            "-o",
            "allow_other",
        ]
    );
}

#[test]
fn test_mount_with_subpath_creates_and_owns_directory() {
    let fixture = DriverFixture::new();
    let host = FakeHost::new();
    let target = fixture.pod_volume_dir("pod1", "oss1");
    let (uid, gid) = fixture.owner();

    let request = request(&format!(
        r#"{{"bucket":"logs","url":"u","akId":"id1","akSecret":"sec1",
            "subpath":"/data/app/","uid":"{uid}","gid":"{gid}"}}"#
    ));
    orchestrator(&fixture, &host).mount(&request, &target).unwrap();

    let exposed = fixture.paths().shared_mount_root.join("pod1~oss1/data/app");
    assert!(exposed.is_dir());
    assert_eq!(fs::read_link(&target).unwrap(), exposed);

    use std::os::unix::fs::MetadataExt;
    let meta = fs::metadata(&exposed).unwrap();
    assert_eq!((meta.uid(), meta.gid()), (uid, gid));
}

#[test]
fn test_second_mount_is_a_no_op() {
    let fixture = DriverFixture::new();
    let host = FakeHost::new();
    let target = fixture.pod_volume_dir("pod1", "oss1");
    let orchestrator = orchestrator(&fixture, &host);

    orchestrator.mount(&basic_request(), &target).unwrap();
    let calls_after_first = host.calls().len();
    fs::write(&fixture.paths().credential_file, "marker:x:y\n").unwrap();

    orchestrator.mount(&basic_request(), &target).unwrap();
    assert_eq!(host.calls().len(), calls_after_first);
    assert_eq!(fixture.credential_file(), "marker:x:y\n");
}

#[test]
fn test_mount_reuses_existing_shared_mount() {
    let fixture = DriverFixture::new();
    let host = FakeHost::new();
    let target = fixture.pod_volume_dir("pod1", "oss1");
    host.add_mount(fixture.paths().shared_mount_root.join("pod1~oss1"));

    orchestrator(&fixture, &host)
        .mount(&basic_request(), &target)
        .unwrap();

    assert!(host.calls_to("ossfs").is_empty());
    assert!(host.calls_to("which").is_empty());
    assert!(fs::symlink_metadata(&target).unwrap().file_type().is_symlink());
}

#[test]
fn test_mount_goes_through_systemd_scope_when_available() {
    let fixture = DriverFixture::new();
    let host = FakeHost::new();
    host.set_scope_helper(true);
    let target = fixture.pod_volume_dir("pod1", "oss1");

    orchestrator(&fixture, &host)
        .mount(&basic_request(), &target)
        .unwrap();

    let scoped = host.calls_to("systemd-run");
    assert_eq!(scoped.len(), 1);
    assert_eq!(&scoped[0].arguments()[..4], ["--scope", "--", "ossfs", "logs"]);
    assert!(host.calls_to("ossfs").is_empty());
}

#[test]
fn test_extra_flags_are_passed_through_in_order() {
    let fixture = DriverFixture::new();
    let host = FakeHost::new();
    let target = fixture.pod_volume_dir("pod1", "oss1");

    let request = request(
        r#"{"bucket":"logs","url":"u","otherOpts":"-o max_stat_cache_size=0 -o allow_other"}"#,
    );
    orchestrator(&fixture, &host).mount(&request, &target).unwrap();

    let args = host.calls_to("ossfs")[0].arguments().to_vec();
    assert_eq!(
        &args[args.len() - 4..],
        ["-o", "max_stat_cache_size=0", "-o", "allow_other"]
    );
    // Ambient credentials fill in when the options carry none
    assert_eq!(fixture.credential_file(), "logs:ambient-id:ambient-secret\n");
}

#[test]
fn test_mount_with_node_key_files() {
    let fixture = DriverFixture::new();
    let host = FakeHost::new();
    let target = fixture.pod_volume_dir("pod1", "oss1");
    fixture.write_ambient_keys("node-id\n", "node-secret\n");

    let request = VolumeOptions::from_json(r#"{"bucket":"logs","url":"u"}"#)
        .unwrap()
        .into_request(&KeyFileCredentials::new(&fixture.paths().ambient_key_dir))
        .unwrap();
    orchestrator(&fixture, &host).mount(&request, &target).unwrap();

    assert_eq!(fixture.credential_file(), "logs:node-id:node-secret\n");
}

#[test]
fn test_failed_ossfs_leaves_target_directory() {
    let fixture = DriverFixture::new();
    let host = FakeHost::new();
    host.fail_next(&["ossfs"], CommandOutput::failed(1, "ossfs: bad endpoint"));
    let target = fixture.pod_volume_dir("pod1", "oss1");

    let err = orchestrator(&fixture, &host)
        .mount(&basic_request(), &target)
        .unwrap_err();

    assert!(matches!(err, DriverError::Subprocess { .. }));
    assert!(err.to_string().contains("bad endpoint"));
    assert!(target.is_dir());
    assert!(!fs::symlink_metadata(&target).unwrap().file_type().is_symlink());
}

#[test]
fn test_unmount_of_missing_target_is_fatal() {
    let fixture = DriverFixture::new();
    let host = FakeHost::new();
    let target = fixture.pod_volume_dir("pod1", "oss1");

    let err = orchestrator(&fixture, &host).unmount(&target).unwrap_err();
    assert_eq!(err.io_kind(), Some(std::io::ErrorKind::NotFound));
    assert!(host.calls().is_empty());
}

#[test]
fn test_mount_then_unmount_round_trip() {
    let fixture = DriverFixture::new();
    let host = FakeHost::new();
    let target = fixture.pod_volume_dir("pod1", "oss1");
    let shared = fixture.paths().shared_mount_root.join("pod1~oss1");
    let orchestrator = orchestrator(&fixture, &host);

    orchestrator.mount(&basic_request(), &target).unwrap();
    orchestrator.unmount(&target).unwrap();

    assert!(fs::symlink_metadata(&target).is_err());
    assert!(!shared.exists());
    assert!(!host.has_mount(&shared));
    assert_eq!(fixture.credential_file(), "logs:id1:sec1\n");
    assert!(!fixture.paths().lock_dir.join("pod1~oss1.lock").exists());
}

#[test]
fn test_unmount_of_absent_shared_mount_skips_fusermount() {
    let fixture = DriverFixture::new();
    let host = FakeHost::new();
    let target = fixture.pod_volume_dir("pod1", "oss1");
    fs::create_dir(&target).unwrap();

    orchestrator(&fixture, &host).unmount(&target).unwrap();

    assert!(!target.exists());
    assert!(host.calls_to("fusermount").is_empty());
}

#[test]
fn test_busy_unmount_detaches_lazily_and_keeps_directory() {
    let fixture = DriverFixture::new();
    let host = FakeHost::new();
    let target = fixture.pod_volume_dir("pod1", "oss1");
    let shared = fixture.paths().shared_mount_root.join("pod1~oss1");
    let orchestrator = orchestrator(&fixture, &host);
    orchestrator.mount(&basic_request(), &target).unwrap();

    host.fail_next(
        &["fusermount", "-u"],
        CommandOutput::failed(1, "fusermount: failed to unmount: Device or resource busy"),
    );
    orchestrator.unmount(&target).unwrap();

    let fusermount: Vec<String> = host
        .calls_to("fusermount")
        .iter()
        .map(|c| c.arguments()[0].clone())
        .collect();
    assert_eq!(fusermount, ["-u", "-uz"]);
    assert!(!host.has_mount(&shared));
    assert!(shared.is_dir());
    assert!(fixture.paths().lock_dir.join("pod1~oss1.lock").exists());
}

#[test]
fn test_other_unmount_failure_is_fatal() {
    let fixture = DriverFixture::new();
    let host = FakeHost::new();
    let target = fixture.pod_volume_dir("pod1", "oss1");
    let shared = fixture.paths().shared_mount_root.join("pod1~oss1");
    let orchestrator = orchestrator(&fixture, &host);
    orchestrator.mount(&basic_request(), &target).unwrap();

    host.fail_next(
        &["fusermount", "-u"],
        CommandOutput::failed(1, "fusermount: Operation not permitted"),
    );
    let err = orchestrator.unmount(&target).unwrap_err();

    assert!(matches!(err, DriverError::Subprocess { .. }));
    assert_eq!(host.calls_to("fusermount").len(), 1);
    assert!(host.has_mount(&shared));
}

#[test]
fn test_failed_lazy_unmount_is_fatal() {
    let fixture = DriverFixture::new();
    let host = FakeHost::new();
    let target = fixture.pod_volume_dir("pod1", "oss1");
    let orchestrator = orchestrator(&fixture, &host);
    orchestrator.mount(&basic_request(), &target).unwrap();

    host.fail_next(
        &["fusermount", "-u"],
        CommandOutput::failed(1, "Device or resource busy"),
    );
    host.fail_next(
        &["fusermount", "-uz"],
        CommandOutput::failed(1, "fusermount: lazy unmount failed"),
    );

    let err = orchestrator.unmount(&target).unwrap_err();
    assert!(err.to_string().contains("lazy unmount failed"));
}

#[test]
fn test_unmount_releases_subpath_bind_mounts_first() {
    let fixture = DriverFixture::new();
    let host = FakeHost::new();
    let target = fixture.pod_volume_dir("pod1", "oss1");
    let orchestrator = orchestrator(&fixture, &host);
    orchestrator.mount(&basic_request(), &target).unwrap();

    let bind = fixture.subpath_root("pod1", "oss1").join("nginx/0");
    host.add_mount(&bind);
    // Failures here are only logged
    let stuck = fixture.subpath_root("pod1", "oss1").join("sidecar/0");
    host.add_mount(&stuck);
    host.fail_next(
        &["fusermount", "-u", stuck.to_str().unwrap()],
        CommandOutput::failed(1, "fusermount: Invalid argument"),
    );

    orchestrator.unmount(&target).unwrap();

    let first = &host.calls_to("fusermount")[0];
    assert_eq!(first.arguments()[1], bind.to_str().unwrap());
    assert!(!host.has_mount(&bind));
    assert!(host.has_mount(&stuck));
}

#[test]
fn test_remount_after_partial_failure() {
    let fixture = DriverFixture::new();
    let host = FakeHost::new();
    let target = fixture.pod_volume_dir("pod1", "oss1");
    let shared = fixture.paths().shared_mount_root.join("pod1~oss1");
    let orchestrator = orchestrator(&fixture, &host);

    // A stale symlink from an earlier attempt whose bucket mount went away
    fs::create_dir_all(&shared).unwrap();
    std::os::unix::fs::symlink(&shared, &target).unwrap();

    orchestrator.mount(&basic_request(), &target).unwrap();
    assert!(host.has_mount(&shared));
    assert_eq!(fs::read_link(&target).unwrap(), shared);
}
