//! Parsers for bridge and device command output.

/// Header line printed by `adb devices`.
pub const DEVICE_LIST_HEADER: &str = "List of devices attached";

/// Marker printed by `adb install` on success.
pub const INSTALL_SUCCESS_MARKER: &str = "Success";

/// Marker printed when the install source is missing; overrides success.
pub const INSTALL_MISSING_MARKER: &str = "can't find";

/// Transfer-rate suffix printed by a completed `adb push` ("KB/s", "MB/s").
pub const PUSH_RATE_MARKER: &str = "B/s";

/// Marker printed by `adb push` on failure.
pub const PUSH_FAILURE_MARKER: &str = "failed to copy";

/// Replace tabs with spaces and collapse every run of spaces to one.
///
/// Applying it twice is the same as applying it once.
pub fn normalize_whitespace(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    let mut previous_space = false;
    for ch in text.chars() {
        let ch = if ch == '\t' { ' ' } else { ch };
        if ch == ' ' {
            if !previous_space {
                normalized.push(ch);
            }
            previous_space = true;
        } else {
            normalized.push(ch);
            previous_space = false;
        }
    }
    normalized
}

/// Extract the pid of the first process-list line containing `name`.
///
/// Only the first match is considered; when several processes match, later
/// ones are ignored. The pid is the second space-delimited token after
/// whitespace normalization.
pub fn parse_pid(listing: &str, name: &str) -> Option<u32> {
    let line = listing.lines().find(|line| line.contains(name))?;
    let line = normalize_whitespace(line.trim_end_matches('\r'));
    line.split(' ').nth(1)?.parse().ok()
}

/// Outcome of parsing `adb devices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceListing {
    /// The header was missing; the bridge could not list devices.
    Unreadable,
    /// Serials of lines whose state is `device`.
    Devices(Vec<String>),
}

/// Parse `adb devices` output.
///
/// Only lines in the `device` state count; `offline` and `unauthorized`
/// entries are ignored.
pub fn parse_device_list(output: &str) -> DeviceListing {
    let mut lines = output.lines().skip_while(|line| !line.contains(DEVICE_LIST_HEADER));
    if lines.next().is_none() {
        return DeviceListing::Unreadable;
    }
    let devices = lines
        .filter(|line| line.contains("\tdevice"))
        .filter_map(|line| line.split('\t').next())
        .map(|serial| serial.trim().to_string())
        .collect();
    DeviceListing::Devices(devices)
}

/// Whether `adb version` output looks like a real bridge banner.
pub fn is_bridge_banner(output: &str) -> bool {
    output.contains("Android") && output.contains("version")
}

/// Whether `adb install` output reports success.
pub fn install_succeeded(output: &str) -> bool {
    output.contains(INSTALL_SUCCESS_MARKER) && !output.contains(INSTALL_MISSING_MARKER)
}

/// Whether `adb push` output reports a completed transfer.
pub fn push_succeeded(output: &str) -> bool {
    output.contains(PUSH_RATE_MARKER) && !output.contains(PUSH_FAILURE_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PS_LISTING: &str = "\
USER      PID   PPID  VSIZE  RSS   WCHAN            PC  NAME
root      1     0     9876   1024  SyS_epoll_ 0000000000 S /init
u0_a71    4242  512   1702m  91234 SyS_epoll_ 0000000000 S com.android.rs.infiniteLoop
u0_a72    4300  512   1702m  91234 SyS_epoll_ 0000000000 S com.android.rs.infiniteLoop:remote
";

    #[test]
    fn test_parse_pid_tab_separated_line() {
        let listing = "u0_a1    1234  5  6 ...\tcom.example.app";
        assert_eq!(parse_pid(listing, "com.example.app"), Some(1234));
    }

    #[test]
    fn test_parse_pid_takes_first_match_only() {
        assert_eq!(parse_pid(PS_LISTING, "com.android.rs.infiniteLoop"), Some(4242));
    }

    #[test]
    fn test_parse_pid_no_match_or_bad_token() {
        assert_eq!(parse_pid(PS_LISTING, "lldb-server"), None);
        assert_eq!(parse_pid("lldb-server", "lldb-server"), None);
        assert_eq!(parse_pid("root notapid lldb-server", "lldb-server"), None);
        assert_eq!(parse_pid("", "anything"), None);
    }

    #[test]
    fn test_parse_pid_handles_crlf() {
        let listing = "shell     777   1 x lldb-server\r\n";
        assert_eq!(parse_pid(listing, "lldb-server"), Some(777));
    }

    #[test]
    fn test_normalize_collapses_mixed_runs() {
        assert_eq!(normalize_whitespace("a \t  b\t\tc"), "a b c");
        assert_eq!(normalize_whitespace("no-space"), "no-space");
    }

    #[test]
    fn test_device_list_counts_only_device_state() {
        let output = "List of devices attached\n\
                      emulator-5554\tdevice\n\
                      0123456789ABCDEF\toffline\n\
                      FA7AB1A00001\tunauthorized\n\n";
        assert_eq!(
            parse_device_list(output),
            DeviceListing::Devices(vec!["emulator-5554".to_string()])
        );
    }

    #[test]
    fn test_device_list_without_header_is_unreadable() {
        assert_eq!(
            parse_device_list("error: cannot connect to daemon"),
            DeviceListing::Unreadable
        );
    }

    #[test]
    fn test_device_list_skips_daemon_preamble() {
        let output = "* daemon not running; starting now at tcp:5037\n\
                      * daemon started successfully\n\
                      List of devices attached\n\
                      HT4A1JT00042\tdevice\n\
                      emulator-5556\tdevice\n";
        match parse_device_list(output) {
            DeviceListing::Devices(devices) => assert_eq!(devices.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_install_missing_marker_overrides_success() {
        assert!(install_succeeded("Performing Streamed Install\nSuccess\n"));
        assert!(!install_succeeded(
            "can't find '/out/data/app/X/X.apk' to install\nSuccess"
        ));
        assert!(!install_succeeded("Failure [INSTALL_FAILED_OLDER_SDK]"));
    }

    #[test]
    fn test_push_markers() {
        assert!(push_succeeded("1 file pushed. 2.1 MB/s (18536 bytes in 0.008s)"));
        assert!(push_succeeded("1234 KB/s (5678 bytes in 0.004s)"));
        assert!(!push_succeeded("failed to copy 'a' to '/data/a': Read-only file system"));
        assert!(!push_succeeded("adb: error: cannot stat 'a': No such file or directory"));
    }

    #[test]
    fn test_bridge_banner() {
        assert!(is_bridge_banner(
            "Android Debug Bridge version 1.0.41\nVersion 34.0.5-10900879\n"
        ));
        assert!(!is_bridge_banner("sh: adb: command not found"));
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(text in "[ \\ta-z0-9]{0,64}") {
            let once = normalize_whitespace(&text);
            prop_assert_eq!(normalize_whitespace(&once), once.clone());
            prop_assert!(!once.contains("  "));
            prop_assert!(!once.contains('\t'));
        }

        #[test]
        fn prop_parse_pid_is_deterministic(
            pid in 1u32..100_000,
            pad_a in "[ \\t]{1,6}",
            pad_b in "[ \\t]{1,6}",
        ) {
            let listing = format!("u0_a9{pad_a}{pid}{pad_b}1 2 S com.example.target\n");
            let first = parse_pid(&listing, "com.example.target");
            prop_assert_eq!(first, Some(pid));
            prop_assert_eq!(parse_pid(&listing, "com.example.target"), first);
        }
    }
}
