//! Installing a CPI release for the duration of one deployer run.
//!
//! Layout under the installations directory:
//!
//! ```text
//! <installations>/<installation_id>/release/   extracted release
//! <installations>/<installation_id>/logs/      support job output
//! ```

use crate::cloud::{CloudContext, ExternalCloud};
use crate::error::{Error, Result};
use crate::release::{CPI_JOB, Release, ReleaseExtractor, ReleaseValidator};
use crate::ruby::find_bundled_ruby;
use crate::{Cloud, Installer};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// How long a support job gets to exit after SIGTERM.
const STOP_GRACE: Duration = Duration::from_secs(5);

struct SupportProcess {
    job: String,
    child: Child,
}

/// Installs CPI releases into a per-deployment directory.
pub struct ReleaseInstaller {
    root: PathBuf,
    context: CloudContext,
    extractor: ReleaseExtractor,
    validator: ReleaseValidator,
    processes: Mutex<Vec<SupportProcess>>,
}

impl ReleaseInstaller {
    /// Installer for `installation_id` under `installations_dir`.
    pub fn new(installations_dir: &Path, installation_id: &str, context: CloudContext) -> Self {
        Self {
            root: installations_dir.join(installation_id),
            context,
            extractor: ReleaseExtractor,
            validator: ReleaseValidator::default(),
            processes: Mutex::new(Vec::new()),
        }
    }

    /// Directory this installer owns.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn start_support_jobs(&self, release: &Release) -> Result<()> {
        let logs = self.root.join("logs");
        fs::create_dir_all(&logs).map_err(|e| Error::io(&logs, e))?;

        let mut processes = lock(&self.processes);
        for job in &release.manifest.jobs {
            if job.name == CPI_JOB {
                continue;
            }
            let dir = release.job_dir(&job.name);
            let run = dir.join("bin").join("run");
            if !run.is_file() {
                continue;
            }

            let log_path = logs.join(format!("{}.log", job.name));
            let stdout = File::create(&log_path).map_err(|e| Error::io(&log_path, e))?;
            let stderr = stdout.try_clone().map_err(|e| Error::io(&log_path, e))?;

            let child = Command::new(&run)
                .current_dir(&dir)
                .stdin(Stdio::null())
                .stdout(stdout)
                .stderr(stderr)
                .spawn()
                .map_err(|source| Error::Spawn {
                    path: run.clone(),
                    source,
                })?;

            log::info!("Started support job '{}' (pid {})", job.name, child.id());
            processes.push(SupportProcess {
                job: job.name.clone(),
                child,
            });
        }
        Ok(())
    }

    fn install_release(&self, tarball: &Path) -> Result<ExternalCloud> {
        let release_dir = self.root.join("release");
        let release = self.extractor.extract(tarball, &release_dir)?;
        self.validator.validate(&release)?;

        for job in &release.manifest.jobs {
            make_bin_executable(&release.job_dir(&job.name).join("bin"))?;
        }
        self.start_support_jobs(&release)?;

        let mut cloud = ExternalCloud::new(release.cpi_executable(), self.context.clone());
        if let Some(ruby) = find_bundled_ruby(&release.packages_dir()) {
            cloud = cloud.with_path_prefix(ruby.bin_dir());
        }

        log::info!(
            "Installed CPI release {}/{} into {}",
            release.manifest.name,
            release.manifest.version,
            self.root.display()
        );
        Ok(cloud)
    }
}

impl Installer for ReleaseInstaller {
    fn install(&self, tarball: &Path) -> Result<Box<dyn Cloud>> {
        self.uninstall()?;

        match self.install_release(tarball) {
            Ok(cloud) => Ok(Box::new(cloud)),
            Err(e) => {
                // Leave nothing behind a failed install.
                if let Err(cleanup) = self.uninstall() {
                    log::warn!("Cleaning up failed install: {}", cleanup);
                }
                Err(e)
            }
        }
    }

    fn uninstall(&self) -> Result<()> {
        let processes: Vec<SupportProcess> = lock(&self.processes).drain(..).collect();
        for process in processes {
            stop_process(process);
        }

        if self.root.exists() {
            fs::remove_dir_all(&self.root).map_err(|e| Error::io(&self.root, e))?;
            log::debug!("Removed CPI installation {}", self.root.display());
        }
        Ok(())
    }
}

impl Drop for ReleaseInstaller {
    fn drop(&mut self) {
        let processes = match self.processes.get_mut() {
            Ok(processes) => processes,
            Err(poisoned) => poisoned.into_inner(),
        };
        for process in processes.drain(..) {
            stop_process(process);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn stop_process(mut process: SupportProcess) {
    terminate(&process.child);

    let deadline = Instant::now() + STOP_GRACE;
    loop {
        match process.child.try_wait() {
            Ok(Some(status)) => {
                log::debug!("Support job '{}' exited with {}", process.job, status);
                return;
            }
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(50)),
            _ => break,
        }
    }

    log::warn!("Support job '{}' ignored SIGTERM, killing it", process.job);
    if let Err(e) = process.child.kill() {
        log::warn!("Killing support job '{}': {}", process.job, e);
    }
    let _ = process.child.wait();
}

#[cfg(unix)]
fn terminate(child: &Child) {
    let Ok(pid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions; pid belongs to a
    // child we have not yet reaped.
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn terminate(_child: &Child) {}

#[cfg(unix)]
fn make_bin_executable(bin: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let Ok(entries) = fs::read_dir(bin) else {
        return Ok(());
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let mut perms = fs::metadata(&path)
            .map_err(|e| Error::io(&path, e))?
            .permissions();
        perms.set_mode(perms.mode() | 0o755);
        fs::set_permissions(&path, perms).map_err(|e| Error::io(&path, e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn make_bin_executable(_bin: &Path) -> Result<()> {
    Ok(())
}
