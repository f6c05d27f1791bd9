//! Process lifecycle management for toolchain children
//!
//! `npm` and `npx` spawn their own children (node, the Prisma engines). Each tool
//! is started as the leader of a new process group so the whole tree can be
//! signalled at once, and with a parent-death signal so it cannot outlive us.
//!
//! Only one tool runs at a time. Its process group is recorded in a global slot
//! that the signal handler reads on SIGINT/SIGTERM/SIGHUP.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Process group of the tool currently running, if any
static ACTIVE_GROUP: OnceLock<Mutex<Option<u32>>> = OnceLock::new();

fn active_slot() -> &'static Mutex<Option<u32>> {
    ACTIVE_GROUP.get_or_init(|| Mutex::new(None))
}

/// Records a running tool for signal-time cleanup; clears the slot on drop
#[derive(Debug)]
pub struct ActiveTool {
    pid: u32,
}

impl ActiveTool {
    pub fn register(pid: u32) -> Self {
        if let Ok(mut slot) = active_slot().lock() {
            *slot = Some(pid);
        }
        debug!("Registered tool process group {}", pid);
        Self { pid }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for ActiveTool {
    fn drop(&mut self) {
        if let Ok(mut slot) = active_slot().lock() {
            if *slot == Some(self.pid) {
                *slot = None;
            }
        }
        debug!("Unregistered tool process group {}", self.pid);
    }
}

/// Process group currently registered, if any
pub fn active_group() -> Option<u32> {
    active_slot().lock().ok().and_then(|slot| *slot)
}

/// Send a signal to an entire process group
pub fn signal_group(pgid: u32, sig: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), sig)
}

/// Check whether the group leader is still running (zombies count as dead)
fn leader_alive(pgid: u32) -> bool {
    if signal::kill(Pid::from_raw(pgid as i32), None).is_err() {
        return false;
    }

    // Field 3 of /proc/<pid>/stat is the state; Z and X are not running
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pgid)) {
        if let Some(state) = stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
        {
            return !matches!(state, "Z" | "X");
        }
    }

    true
}

/// SIGTERM the group, wait up to `grace`, then SIGKILL whatever is left.
///
/// The caller must still reap its direct child.
pub fn terminate_group(pgid: u32, grace: Duration) {
    if let Err(e) = signal_group(pgid, Signal::SIGTERM) {
        debug!("SIGTERM to process group {} failed: {}", pgid, e);
        return;
    }

    let start = Instant::now();
    while start.elapsed() < grace && leader_alive(pgid) {
        std::thread::sleep(Duration::from_millis(100));
    }

    if leader_alive(pgid) {
        warn!("Process group {} did not terminate, sending SIGKILL", pgid);
    }
    // Sweep descendants that ignored SIGTERM; fails harmlessly once the group is gone
    if let Err(e) = signal_group(pgid, Signal::SIGKILL) {
        debug!("SIGKILL to process group {} failed: {}", pgid, e);
    }
}

/// Install handlers for SIGINT, SIGTERM and SIGHUP.
///
/// On signal the running tool's group is terminated and the process exits with
/// 128 + signal number. Call once at program start.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            let name = match sig {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                SIGHUP => "SIGHUP",
                _ => "UNKNOWN",
            };
            info!("Received {}, stopping toolchain", name);

            if let Some(pgid) = active_group() {
                terminate_group(pgid, Duration::from_secs(3));
            }
            warn!("Build interrupted; staging may be partially modified");
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait for std::process::Command to set up process groups
pub trait CommandProcessGroup {
    /// Run the command as leader of its own process group, killed if we die
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;

                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }

                Ok(())
            });
        }
        self
    }
}
