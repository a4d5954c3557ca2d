//! Installable test targets and their deployment.
//!
//! A target name resolves to either an APK (identified by its package) or a
//! native binary pushed to the device. Artifacts are read from the product
//! output tree produced by the platform build.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::PRODUCT_OUT_ENV;
use crate::device::{Bridge, DeviceTimings, RemoteDevice, RemoteProcessHandle};
use crate::errors::{HarnessError, Result};
use crate::scenario::DebugTest;

/// Activity started for every APK target.
pub const MAIN_ACTIVITY: &str = "MainActivity";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Apk,
    Native,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEntry {
    pub name: String,
    pub kind: TargetKind,
    /// Package name for APKs, binary file name for native targets.
    pub id: String,
}

/// Static lookup of target names. APKs are searched before native binaries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetRegistry {
    apks: Vec<TargetEntry>,
    natives: Vec<TargetEntry>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// APKs built alongside the RenderScript debugger tests.
    pub fn builtin() -> Self {
        [
            ("JavaInfiniteLoop", "com.android.rs.infiniteLoop"),
            ("JavaDebugWaitAttach", "com.android.rs.waitattachdebug"),
            ("BranchingFunCalls", "com.android.rs.branchingfuncalls"),
            ("GlobalScalarVariables", "com.android.rs.globalscalarvariables"),
            ("JavaFunction", "com.android.rs.javafunction"),
            ("KernelVariables", "com.android.rs.kernelvariables"),
            ("KernelLocalVariables", "com.android.rs.kernellocalvariables"),
        ]
        .into_iter()
        .fold(Self::new(), |registry, (name, package)| registry.with_apk(name, package))
    }

    pub fn with_apk(mut self, name: &str, package: &str) -> Self {
        self.apks.push(TargetEntry {
            name: name.to_string(),
            kind: TargetKind::Apk,
            id: package.to_string(),
        });
        self
    }

    pub fn with_native(mut self, name: &str, binary: &str) -> Self {
        self.natives.push(TargetEntry {
            name: name.to_string(),
            kind: TargetKind::Native,
            id: binary.to_string(),
        });
        self
    }

    pub fn apks(&self) -> &[TargetEntry] {
        &self.apks
    }

    pub fn natives(&self) -> &[TargetEntry] {
        &self.natives
    }

    pub fn resolve(&self, name: &str) -> Result<&TargetEntry> {
        self.apks
            .iter()
            .chain(&self.natives)
            .find(|entry| entry.name == name)
            .ok_or_else(|| HarnessError::UnknownTarget(name.to_string()))
    }

    /// Every target referenced by `tests` must resolve.
    pub fn check_tests<T: DebugTest>(&self, tests: &[T]) -> Result<()> {
        for test in tests {
            for target in test.bundle_targets() {
                self.resolve(target)?;
            }
        }
        Ok(())
    }
}

/// Registry bound to a device and a product tree.
pub struct TestBundle<'d, B: Bridge> {
    device: &'d RemoteDevice<B>,
    registry: TargetRegistry,
    product_path: Option<PathBuf>,
}

impl<'d, B: Bridge> TestBundle<'d, B> {
    pub fn new(
        device: &'d RemoteDevice<B>,
        registry: TargetRegistry,
        product_path: Option<PathBuf>,
    ) -> Self {
        Self {
            device,
            registry,
            product_path,
        }
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn resolve_target(&self, name: &str) -> Result<(TargetKind, &str)> {
        let entry = self.registry.resolve(name)?;
        Ok((entry.kind, entry.id.as_str()))
    }

    /// Reinstall every APK and push every native binary.
    ///
    /// The first failure aborts the whole push.
    pub fn push_all(&self) -> Result<()> {
        let product = self.product_path()?;
        for entry in self.registry.apks() {
            info!(target = %entry.name, package = %entry.id, "installing");
            self.device.stop_app(&entry.id)?;
            self.device.uninstall_app(&entry.id)?;
            self.device.install_app(&entry.id, &apk_path(product, &entry.name))?;
        }
        for entry in self.registry.natives() {
            info!(target = %entry.name, binary = %entry.id, "pushing");
            self.device.kill_process(&entry.id)?;
            self.device.push_binary(&entry.id, &native_path(product, &entry.id))?;
            self.device.chmod_executable(&entry.id)?;
        }
        Ok(())
    }

    /// Start `name` fresh and look up its pid.
    ///
    /// `Ok(None)` means the target started but no process was found.
    pub fn launch(&self, name: &str) -> Result<Option<RemoteProcessHandle>> {
        let (kind, id) = self.resolve_target(name)?;
        match kind {
            TargetKind::Apk => {
                self.device.kill_process(id)?;
                self.device.launch_app(id, MAIN_ACTIVITY)?;
                DeviceTimings::pause(self.device.timings().launch_settle);
                let pid = self.device.find_process_id(id)?;
                debug!(target = name, ?pid, "launched");
                Ok(pid.map(|pid| RemoteProcessHandle {
                    pid,
                    target: name.to_string(),
                }))
            }
            TargetKind::Native => Err(HarnessError::NotImplemented(format!(
                "launching native target {name}"
            ))),
        }
    }

    fn product_path(&self) -> Result<&Path> {
        self.product_path.as_deref().ok_or_else(|| {
            HarnessError::configuration(
                crate::errors::ErrorCode::ProductPathMissing,
                format!(
                    "no product path has been provided; run `lunch` to set ${PRODUCT_OUT_ENV} \
                     or set product_path in the config file"
                ),
            )
        })
    }
}

/// `<product>/data/app/<Name>/<Name>.apk`
pub fn apk_path(product: &Path, name: &str) -> PathBuf {
    product
        .join("data")
        .join("app")
        .join(name)
        .join(format!("{name}.apk"))
}

/// `<product>/system/bin/<binary>`
pub fn native_path(product: &Path, binary: &str) -> PathBuf {
    product.join("system").join("bin").join(binary)
}
