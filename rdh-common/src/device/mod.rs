//! Remote device controller.
//!
//! Every interaction with the device is a bridge command composed here and
//! interpreted from its textual output. The controller keeps no protocol
//! state; the device itself is the only mutable resource and the suite
//! serializes access to it.

pub mod bridge;
pub mod parse;

pub use bridge::{AdbBridge, Bridge};
pub use parse::{DeviceListing, normalize_whitespace, parse_pid};

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::errors::{ErrorCode, HarnessError, Result};

/// Kill attempts before a stuck process escalates to a reboot.
pub const KILL_ATTEMPTS: usize = 4;

/// Processes that must not survive between tests.
pub const DEBUG_SERVER_PROCESSES: [&str; 2] = ["gdbserver", "lldb-server"];

/// Device directory receiving pushed native binaries.
pub const DEVICE_BIN_DIR: &str = "/data";

/// Remote platform kind the debug-server is started as.
const SERVER_PLATFORM_MODE: &str = "platform";

/// Fixed waits that let the device settle between commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceTimings {
    /// After starting an app, so crash-on-start surfaces before pid lookup.
    pub launch_settle: Duration,
    /// After starting the debug-server, before anything connects to it.
    pub server_start: Duration,
    /// Between the steps of the reboot sequence.
    pub reboot_step: Duration,
}

impl Default for DeviceTimings {
    fn default() -> Self {
        Self {
            launch_settle: Duration::from_secs(2),
            server_start: Duration::from_secs(5),
            reboot_step: Duration::from_secs(1),
        }
    }
}

impl DeviceTimings {
    /// No waiting at all; for scripted bridges.
    pub fn none() -> Self {
        Self {
            launch_settle: Duration::ZERO,
            server_start: Duration::ZERO,
            reboot_step: Duration::ZERO,
        }
    }

    pub fn pause(delay: Duration) {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

/// A launched target process. Owned by exactly one test iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteProcessHandle {
    pub pid: u32,
    pub target: String,
}

/// How a debug-server binary on the device is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugServer {
    pub path: String,
    /// Server log file and channels; `None` disables server logging.
    pub log: Option<ServerLog>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLog {
    pub path: String,
    pub channels: Vec<String>,
}

impl DebugServer {
    pub fn from_config(config: &HarnessConfig) -> Self {
        let log = (!config.server_log_channels.is_empty()).then(|| ServerLog {
            path: config.server_log_path.clone(),
            channels: config.server_log_channels.clone(),
        });
        Self {
            path: config.lldb_server_path.clone(),
            log,
        }
    }

    /// Shell command line that starts the server listening on `port`.
    pub fn command_line(&self, port: u16) -> String {
        let path = shell_quote(&self.path);
        let mut cmd = format!(
            "export LLDB_DEBUGSERVER_PATH={path}; {path} {SERVER_PLATFORM_MODE} --listen '*:{port}'"
        );
        if let Some(log) = &self.log {
            let channels: String = log.channels.iter().map(|ch| format!("{ch};")).collect();
            cmd.push_str(&format!(
                " -l {} -c {}",
                shell_quote(&log.path),
                shell_quote(&channels)
            ));
        }
        cmd
    }
}

/// Result of [`RemoteDevice::kill_process_with_escalation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// The process was gone after `kills` kill commands.
    Cleared { kills: usize },
    /// Every attempt found the process and it survived; the device was rebooted.
    Rebooted,
}

/// Controller over a single attached device.
pub struct RemoteDevice<B: Bridge> {
    bridge: B,
    timings: DeviceTimings,
    process_list_command: String,
}

impl<B: Bridge> RemoteDevice<B> {
    pub fn new(bridge: B) -> Self {
        Self {
            bridge,
            timings: DeviceTimings::default(),
            process_list_command: "ps".to_string(),
        }
    }

    pub fn with_timings(mut self, timings: DeviceTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_process_list_command(mut self, command: impl Into<String>) -> Self {
        self.process_list_command = command.into();
        self
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn timings(&self) -> DeviceTimings {
        self.timings
    }

    /// Run a raw bridge command and return its combined output.
    pub fn bridge_command(&self, args: &[&str]) -> Result<String> {
        let output = self.bridge.run(args)?;
        debug!(command = %args.join(" "), output = %output.trim_end(), "bridge");
        Ok(output)
    }

    /// Run `command` in the device shell.
    ///
    /// Synchronous calls return the combined output; asynchronous calls return
    /// `None` as soon as the bridge is spawned.
    pub fn run_shell(&self, command: &str, run_async: bool) -> Result<Option<String>> {
        if run_async {
            self.bridge.spawn(&["shell", command])?;
            Ok(None)
        } else {
            self.bridge_command(&["shell", command]).map(Some)
        }
    }

    fn shell(&self, command: &str) -> Result<String> {
        Ok(self.run_shell(command, false)?.unwrap_or_default())
    }

    /// Pid of the first listed process whose line contains `name`.
    pub fn find_process_id(&self, name: &str) -> Result<Option<u32>> {
        require("find_process_id", "process name", name)?;
        let listing = self.shell(&self.process_list_command)?;
        let pid = parse_pid(&listing, name);
        match pid {
            Some(pid) => debug!(name, pid, "process found"),
            None => debug!(name, "process not found"),
        }
        Ok(pid)
    }

    pub fn kill_pid(&self, pid: u32) -> Result<()> {
        self.shell(&format!("kill {pid}")).map(drop)
    }

    /// Send a kill to `name` if it is running; returns whether one was sent.
    pub fn kill_process(&self, name: &str) -> Result<bool> {
        match self.find_process_id(name)? {
            Some(pid) => {
                self.kill_pid(pid)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Kill `name` until it is gone, rebooting the device if it will not die.
    ///
    /// Returns as soon as an attempt finds nothing to kill. When all
    /// [`KILL_ATTEMPTS`] attempts found and signaled the process, one last
    /// lookup decides whether a reboot is needed.
    pub fn kill_process_with_escalation(&self, name: &str) -> Result<Escalation> {
        for kills in 0..KILL_ATTEMPTS {
            if !self.kill_process(name)? {
                return Ok(Escalation::Cleared { kills });
            }
        }
        if self.find_process_id(name)?.is_none() {
            return Ok(Escalation::Cleared {
                kills: KILL_ATTEMPTS,
            });
        }
        warn!(
            name,
            attempts = KILL_ATTEMPTS,
            "process survived kill attempts, rebooting device"
        );
        self.reboot_device()?;
        Ok(Escalation::Rebooted)
    }

    /// Remove any debug-server left over from a previous test.
    ///
    /// Returns `true` when a stuck server forced a reboot, which drops every
    /// port forward on the device.
    pub fn clean_device(&self) -> Result<bool> {
        let mut rebooted = false;
        for name in DEBUG_SERVER_PROCESSES {
            rebooted |= self.kill_process_with_escalation(name)? == Escalation::Rebooted;
        }
        Ok(rebooted)
    }

    /// Reboot, then restore root and a writable system partition.
    pub fn reboot_device(&self) -> Result<()> {
        info!("rebooting device");
        self.bridge_command(&["reboot"])?;
        self.wait_for_device()?;
        DeviceTimings::pause(self.timings.reboot_step);
        self.root()?;
        DeviceTimings::pause(self.timings.reboot_step);
        self.remount()?;
        DeviceTimings::pause(self.timings.reboot_step);
        Ok(())
    }

    pub fn root(&self) -> Result<()> {
        self.bridge_command(&["root"]).map(drop)
    }

    pub fn wait_for_device(&self) -> Result<()> {
        self.bridge_command(&["wait-for-device"]).map(drop)
    }

    pub fn remount(&self) -> Result<()> {
        self.bridge_command(&["remount"]).map(drop)
    }

    /// Fail unless the bridge runs and prints a version banner.
    pub fn validate_bridge_available(&self) -> Result<()> {
        let program = self.bridge.program().display().to_string();
        let output = self.bridge_command(&["version"]).map_err(|err| {
            HarnessError::environment(
                ErrorCode::BridgeUnavailable,
                format!("unable to run {program}: {err}"),
            )
        })?;
        if !parse::is_bridge_banner(&output) {
            return Err(HarnessError::environment(
                ErrorCode::BridgeUnavailable,
                format!("{program} did not report a version banner"),
            ));
        }
        info!("bridge found: {}", output.lines().next().unwrap_or_default());
        Ok(())
    }

    /// Fail unless exactly one device is attached; returns its serial.
    pub fn validate_single_device_attached(&self) -> Result<String> {
        let output = self.bridge_command(&["devices"])?;
        let devices = match parse::parse_device_list(&output) {
            DeviceListing::Unreadable => {
                return Err(HarnessError::environment(
                    ErrorCode::DeviceListFailed,
                    "unable to list devices",
                ));
            }
            DeviceListing::Devices(devices) => devices,
        };
        match devices.as_slice() {
            [] => Err(HarnessError::environment(
                ErrorCode::NoDeviceAttached,
                "the bridge is unable to find a connected device or emulator to test",
            )),
            [serial] => {
                info!(serial = %serial, "device attached");
                Ok(serial.clone())
            }
            many => Err(HarnessError::environment(
                ErrorCode::MultipleDevicesAttached,
                format!(
                    "found {} devices ({}); disconnect all but one",
                    many.len(),
                    many.join(", ")
                ),
            )),
        }
    }

    /// Fail unless the debug-server binary exists on the device and runs.
    pub fn validate_debug_server(&self, path: &str) -> Result<()> {
        require("validate_debug_server", "server path", path)?;
        let output = self.shell(&format!("{} version", shell_quote(path)))?;
        let missing = ["not found", "No such file", "Permission denied"]
            .iter()
            .any(|marker| output.contains(marker));
        if missing || !output.to_lowercase().contains("version") {
            return Err(HarnessError::environment(
                ErrorCode::DebugServerMissing,
                format!("couldn't find {path} on the device: {}", output.trim()),
            ));
        }
        Ok(())
    }

    /// Primary ABI reported by the device.
    pub fn get_abi(&self) -> Result<String> {
        Ok(self.shell("getprop ro.product.cpu.abi")?.trim().to_string())
    }

    /// Install an APK, forcing the 32-bit ABI on 64-bit ARM devices.
    pub fn install_app(&self, package: &str, apk: &Path) -> Result<()> {
        require("install_app", "package name", package)?;
        require_path("install_app", "apk path", apk)?;
        let apk = apk.to_string_lossy().into_owned();
        let abi = self.get_abi()?;
        let mut args = vec!["install"];
        if abi.contains("arm64-v8a") {
            args.extend(["--abi", "armeabi-v7a"]);
        }
        args.push(apk.as_str());
        let output = self.bridge_command(&args)?;
        if !parse::install_succeeded(&output) {
            return Err(HarnessError::Install {
                app: package.to_string(),
                output,
            });
        }
        Ok(())
    }

    /// Uninstall a package; "not installed" outcomes are not errors.
    pub fn uninstall_app(&self, package: &str) -> Result<()> {
        require("uninstall_app", "package name", package)?;
        self.bridge_command(&["uninstall", package]).map(drop)
    }

    /// Push a native binary into [`DEVICE_BIN_DIR`].
    pub fn push_binary(&self, binary: &str, local: &Path) -> Result<()> {
        require("push_binary", "binary name", binary)?;
        require_path("push_binary", "local path", local)?;
        let local = local.to_string_lossy().into_owned();
        let output = self.bridge_command(&["push", local.as_str(), DEVICE_BIN_DIR])?;
        if !parse::push_succeeded(&output) {
            return Err(HarnessError::Push {
                binary: binary.to_string(),
                output,
            });
        }
        Ok(())
    }

    /// Make a pushed binary executable.
    pub fn chmod_executable(&self, binary: &str) -> Result<()> {
        require("chmod_executable", "binary name", binary)?;
        self.shell(&format!("chmod 777 {DEVICE_BIN_DIR}/{}", shell_quote(binary)))
            .map(drop)
    }

    pub fn stop_app(&self, package: &str) -> Result<()> {
        require("stop_app", "package name", package)?;
        self.shell(&format!("am force-stop {package}")).map(drop)
    }

    /// Start `activity` of `package`, restarting it if it was running.
    pub fn launch_app(&self, package: &str, activity: &str) -> Result<()> {
        require("launch_app", "package name", package)?;
        require("launch_app", "activity", activity)?;
        self.shell(&format!("am start -S -n {package}/{package}.{activity}"))
            .map(drop)
    }

    /// Start a pushed native binary in the background.
    pub fn launch_native_binary(
        &self,
        binary: &str,
        args: &[&str],
        env: &[(&str, &str)],
    ) -> Result<()> {
        require("launch_native_binary", "binary name", binary)?;
        let mut cmd = String::new();
        for (key, value) in env {
            cmd.push_str(&format!("export {key}={}; ", shell_quote(value)));
        }
        cmd.push_str(&format!("exec {DEVICE_BIN_DIR}/{}", shell_quote(binary)));
        for arg in args {
            cmd.push(' ');
            cmd.push_str(&shell_quote(arg));
        }
        self.run_shell(&cmd, true).map(drop)
    }

    /// Forward host `local` to device `remote` over TCP.
    pub fn forward_port(&self, local: u16, remote: u16) -> Result<()> {
        if local == 0 || remote == 0 {
            return Err(HarnessError::InvalidArgument {
                operation: "forward_port",
                argument: "port",
            });
        }
        let local = format!("tcp:{local}");
        let remote = format!("tcp:{remote}");
        self.bridge_command(&["forward", local.as_str(), remote.as_str()]).map(drop)
    }

    /// Start the debug-server in the background and give it time to listen.
    pub fn start_remote_debug_server(&self, server: &DebugServer, port: u16) -> Result<()> {
        require("start_remote_debug_server", "server path", &server.path)?;
        if port == 0 {
            return Err(HarnessError::InvalidArgument {
                operation: "start_remote_debug_server",
                argument: "port",
            });
        }
        info!(port, "starting debug-server");
        self.run_shell(&server.command_line(port), true)?;
        DeviceTimings::pause(self.timings.server_start);
        Ok(())
    }
}

fn require(operation: &'static str, argument: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(HarnessError::InvalidArgument {
            operation,
            argument,
        });
    }
    Ok(())
}

fn require_path(operation: &'static str, argument: &'static str, value: &Path) -> Result<()> {
    if value.as_os_str().is_empty() {
        return Err(HarnessError::InvalidArgument {
            operation,
            argument,
        });
    }
    Ok(())
}

fn shell_quote(value: &str) -> String {
    shell_escape::unix::escape(value.into()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBridge;

    fn device(bridge: MockBridge) -> RemoteDevice<MockBridge> {
        RemoteDevice::new(bridge).with_timings(DeviceTimings::none())
    }

    #[test]
    fn test_run_shell_sync_and_async() {
        let dev = device(MockBridge::new().respond("shell echo hi", "hi\n"));
        assert_eq!(dev.run_shell("echo hi", false).unwrap().as_deref(), Some("hi\n"));
        assert_eq!(dev.run_shell("sleep 100", true).unwrap(), None);
        assert_eq!(dev.bridge().async_calls(), vec!["shell sleep 100".to_string()]);
    }

    #[test]
    fn test_spawn_failure_is_device_command_error() {
        let dev = device(MockBridge::new().fail_spawn());
        let err = dev.run_shell("ps", false).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BridgeSpawnFailed);
    }

    #[test]
    fn test_find_process_id_filters_listing_host_side() {
        let dev = device(MockBridge::new().respond(
            "shell ps",
            "USER PID PPID NAME\nu0_a1    1234  5  6 ...\tcom.example.app\n",
        ));
        assert_eq!(dev.find_process_id("com.example.app").unwrap(), Some(1234));
        assert_eq!(dev.find_process_id("lldb-server").unwrap(), None);
    }

    #[test]
    fn test_empty_arguments_are_rejected_before_any_command() {
        let dev = device(MockBridge::new());
        for err in [
            dev.find_process_id("").unwrap_err(),
            dev.stop_app(" ").unwrap_err(),
            dev.launch_app("com.example.app", "").unwrap_err(),
            dev.install_app("com.example.app", Path::new("")).unwrap_err(),
            dev.forward_port(0, 1234).unwrap_err(),
        ] {
            assert_eq!(err.code(), ErrorCode::InvalidArgument);
        }
        assert!(dev.bridge().calls().is_empty());
    }

    #[test]
    fn test_escalation_stops_when_process_is_gone() {
        let dev = device(MockBridge::new().respond_seq(
            "shell ps",
            ["root 77 1 lldb-server", "root 77 1 lldb-server", ""],
        ));
        let outcome = dev.kill_process_with_escalation("lldb-server").unwrap();
        assert_eq!(outcome, Escalation::Cleared { kills: 2 });
        assert_eq!(dev.bridge().count_matching("shell kill 77"), 2);
        assert_eq!(dev.bridge().count_matching("reboot"), 0);
    }

    #[test]
    fn test_escalation_reboots_stuck_process() {
        let dev = device(MockBridge::new().respond("shell ps", "root 77 1 lldb-server"));
        let outcome = dev.kill_process_with_escalation("lldb-server").unwrap();
        assert_eq!(outcome, Escalation::Rebooted);
        assert_eq!(dev.bridge().count_matching("shell kill 77"), KILL_ATTEMPTS);
        let calls = dev.bridge().calls();
        let tail: Vec<&str> = calls[calls.len() - 4..].iter().map(String::as_str).collect();
        assert_eq!(tail, ["reboot", "wait-for-device", "root", "remount"]);
    }

    #[test]
    fn test_escalation_without_reboot_when_last_kill_lands() {
        let dev = device(MockBridge::new().respond_seq(
            "shell ps",
            ["x 5 lldb-server", "x 5 lldb-server", "x 5 lldb-server", "x 5 lldb-server", ""],
        ));
        let outcome = dev.kill_process_with_escalation("lldb-server").unwrap();
        assert_eq!(outcome, Escalation::Cleared { kills: KILL_ATTEMPTS });
        assert_eq!(dev.bridge().count_matching("reboot"), 0);
    }

    #[test]
    fn test_clean_device_targets_both_servers() {
        let dev = device(MockBridge::new());
        assert!(!dev.clean_device().unwrap());
        assert_eq!(dev.bridge().count_matching("shell ps"), 2);
    }

    #[test]
    fn test_clean_device_reports_reboot() {
        let dev = device(MockBridge::new().respond(
            "shell ps",
            "root 777 1 9000 800 ffffffff 00000000 S /data/lldb-server\n",
        ));
        assert!(dev.clean_device().unwrap());
        assert_eq!(dev.bridge().count_matching("reboot"), 1);
    }

    #[test]
    fn test_validate_bridge_banner() {
        let ok = device(
            MockBridge::new().respond("version", "Android Debug Bridge version 1.0.41"),
        );
        ok.validate_bridge_available().unwrap();

        let bad = device(MockBridge::new().respond("version", "command not found"));
        assert_eq!(
            bad.validate_bridge_available().unwrap_err().code(),
            ErrorCode::BridgeUnavailable
        );

        let missing = device(MockBridge::new().fail_spawn());
        assert_eq!(
            missing.validate_bridge_available().unwrap_err().code(),
            ErrorCode::BridgeUnavailable
        );
    }

    #[test]
    fn test_validate_single_device() {
        let one = device(MockBridge::new().respond(
            "devices",
            "List of devices attached\nemulator-5554\tdevice\nabc\toffline\n",
        ));
        assert_eq!(one.validate_single_device_attached().unwrap(), "emulator-5554");

        let none = device(MockBridge::new().respond("devices", "List of devices attached\n\n"));
        assert_eq!(
            none.validate_single_device_attached().unwrap_err().code(),
            ErrorCode::NoDeviceAttached
        );

        let two = device(MockBridge::new().respond(
            "devices",
            "List of devices attached\na\tdevice\nb\tdevice\n",
        ));
        let err = two.validate_single_device_attached().unwrap_err();
        assert_eq!(err.code(), ErrorCode::MultipleDevicesAttached);
        assert_eq!(err.exit_code(), crate::errors::EXIT_SUITE);

        let broken = device(MockBridge::new().respond("devices", "daemon not running"));
        assert_eq!(
            broken.validate_single_device_attached().unwrap_err().code(),
            ErrorCode::DeviceListFailed
        );
    }

    #[test]
    fn test_validate_debug_server_version_check() {
        let ok = device(
            MockBridge::new().respond("shell /data/lldb-server version", "lldb version 17.0.2"),
        );
        ok.validate_debug_server("/data/lldb-server").unwrap();

        let missing = device(MockBridge::new().respond(
            "shell /data/lldb-server version",
            "/system/bin/sh: /data/lldb-server: not found",
        ));
        assert_eq!(
            missing.validate_debug_server("/data/lldb-server").unwrap_err().code(),
            ErrorCode::DebugServerMissing
        );
    }

    #[test]
    fn test_install_uses_abi_override_on_arm64() {
        let dev = device(
            MockBridge::new()
                .respond("shell getprop", "arm64-v8a\n")
                .respond("install", "Success\n"),
        );
        dev.install_app("com.android.rs.infiniteLoop", Path::new("/out/JavaInfiniteLoop.apk"))
            .unwrap();
        assert!(dev
            .bridge()
            .calls()
            .contains(&"install --abi armeabi-v7a /out/JavaInfiniteLoop.apk".to_string()));
    }

    #[test]
    fn test_install_rejects_missing_source_even_with_success() {
        let dev = device(
            MockBridge::new()
                .respond("shell getprop", "x86_64\n")
                .respond("install", "can't find '/out/X.apk' to install\nSuccess"),
        );
        let err = dev.install_app("com.x", Path::new("/out/X.apk")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InstallFailed);
        assert!(err.to_string().contains("com.x"));
    }

    #[test]
    fn test_push_requires_transfer_rate() {
        let ok = device(MockBridge::new().respond("push", "1 file pushed. 3.1 MB/s"));
        ok.push_binary("lldb-server", Path::new("/out/system/bin/lldb-server"))
            .unwrap();
        assert_eq!(ok.bridge().calls(), vec!["push /out/system/bin/lldb-server /data"]);

        let bad = device(
            MockBridge::new().respond("push", "failed to copy: Read-only file system"),
        );
        assert_eq!(
            bad.push_binary("x", Path::new("/out/x")).unwrap_err().code(),
            ErrorCode::PushFailed
        );
    }

    #[test]
    fn test_launch_and_forward_compose_commands() {
        let dev = device(MockBridge::new());
        dev.launch_app("com.android.rs.infiniteLoop", "MainActivity").unwrap();
        dev.forward_port(5039, 1234).unwrap();
        dev.launch_native_binary("demo", &["--iterations", "3"], &[("RS_DEBUG", "1 2")])
            .unwrap();
        assert_eq!(
            dev.bridge().calls(),
            vec![
                "shell am start -S -n com.android.rs.infiniteLoop/com.android.rs.infiniteLoop.MainActivity",
                "forward tcp:5039 tcp:1234",
            ]
        );
        assert_eq!(
            dev.bridge().async_calls(),
            vec!["shell export RS_DEBUG='1 2'; exec /data/demo --iterations 3"]
        );
    }

    #[test]
    fn test_debug_server_command_line() {
        let mut config = HarnessConfig::default();
        let plain = DebugServer::from_config(&config);
        assert_eq!(
            plain.command_line(1234),
            "export LLDB_DEBUGSERVER_PATH=/data/lldb-server; /data/lldb-server platform --listen '*:1234'"
        );

        config.server_log_channels = vec!["lldb process".to_string(), "gdb-remote all".to_string()];
        let logged = DebugServer::from_config(&config);
        assert!(logged
            .command_line(1234)
            .ends_with(" -l /data/lldblog.txt -c 'lldb process;gdb-remote all;'"));
    }

    #[test]
    fn test_start_debug_server_is_async() {
        let dev = device(MockBridge::new());
        let server = DebugServer::from_config(&HarnessConfig::default());
        dev.start_remote_debug_server(&server, 1234).unwrap();
        assert!(dev.bridge().calls().is_empty());
        assert_eq!(dev.bridge().async_calls().len(), 1);
    }
}
