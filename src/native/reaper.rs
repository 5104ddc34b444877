//! Containment for processes that leave the process group of an execution.
//!
//! A descendant can escape a group kill with `setsid()` or `setpgid()`. Every
//! leader is made a child subreaper before exec, so orphans stay inside its
//! tree while it lives. This process is a subreaper as well: once a leader is
//! gone, whatever is left of its tree is reparented here and swept.

use std::{
    collections::BTreeSet,
    fs, io,
    sync::{Mutex, MutexGuard, OnceLock, PoisonError},
};

use nix::{
    errno::Errno,
    sys::{
        prctl,
        signal::{self, Signal},
        wait::waitpid,
    },
    unistd::Pid,
};
use tokio::process::{Child, Command};

// A tree forking while it is being swept needs another pass
const MAX_SWEEP_PASSES: usize = 64;

static LEADERS: Mutex<BTreeSet<u32>> = Mutex::new(BTreeSet::new());
static SUBREAPER: OnceLock<bool> = OnceLock::new();

fn leaders() -> MutexGuard<'static, BTreeSet<u32>> {
    LEADERS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks this process as a child subreaper. Runs once; later calls return
/// the first result.
pub fn become_subreaper() -> bool {
    *SUBREAPER.get_or_init(|| match prctl::set_child_subreaper(true) {
        Ok(()) => {
            tracing::debug!("Registered as child subreaper");
            true
        }
        Err(e) => {
            tracing::warn!(
                "Failed to become child subreaper, escaped descendants will not be swept: {}",
                e
            );
            false
        }
    })
}

/// Spawns `command` and registers the child as a live leader, so sweeps
/// leave it to its owner.
pub fn spawn_leader(command: &mut Command) -> io::Result<Child> {
    become_subreaper();

    // Held across spawn so a concurrent sweep never sees an unregistered leader
    let mut leaders = leaders();
    let child = command.spawn()?;
    if let Some(pid) = child.id() {
        leaders.insert(pid);
    }

    Ok(child)
}

pub fn release_leader(pid: u32) {
    leaders().remove(&pid);
}

/// Kills and reaps every child of this process that is not a live leader.
pub async fn sweep() {
    match tokio::task::spawn_blocking(sweep_orphans).await {
        Ok(0) => {}
        Ok(swept) => tracing::info!("Killed {} escaped descendant(s)", swept),
        Err(e) => tracing::error!("Orphan sweep failed: {}", e),
    }
}

fn sweep_orphans() -> usize {
    let me = std::process::id();
    let mut swept = 0;

    for _ in 0..MAX_SWEEP_PASSES {
        let orphans: Vec<u32> = {
            let leaders = leaders();
            children_of(me)
                .into_iter()
                .filter(|pid| !leaders.contains(pid))
                .collect()
        };
        if orphans.is_empty() {
            return swept;
        }

        for pid in orphans {
            if kill_and_reap(pid) {
                swept += 1;
            }
        }
    }

    tracing::warn!("Descendants still forking after {} sweeps", MAX_SWEEP_PASSES);
    swept
}

fn kill_and_reap(pid: u32) -> bool {
    let target = Pid::from_raw(pid as i32);

    match signal::kill(target, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!("Failed to kill descendant {}: {}", pid, e),
    }

    loop {
        match waitpid(target, None) {
            Ok(_) => return true,
            Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => return false,
            Err(e) => {
                tracing::warn!("Failed to reap descendant {}: {}", pid, e);
                return false;
            }
        }
    }
}

fn children_of(parent: u32) -> Vec<u32> {
    let Ok(entries) = fs::read_dir("/proc") else {
        return Vec::new();
    };

    entries
        .flatten()
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
        .filter(|pid| stat(*pid).is_some_and(|(_, ppid)| ppid == parent))
        .collect()
}

/// State and parent pid from `/proc/<pid>/stat`.
fn stat(pid: u32) -> Option<(char, u32)> {
    let stat = fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    // comm may hold spaces and parentheses, the fixed fields follow the last ')'
    let (_, fields) = stat.rsplit_once(')')?;
    let mut fields = fields.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let ppid = fields.next()?.parse().ok()?;
    Some((state, ppid))
}

/// True while `pid` exists and is not a zombie.
#[cfg(test)]
pub fn is_running(pid: u32) -> bool {
    stat(pid).is_some_and(|(state, _)| state != 'Z' && state != 'X')
}
